//! Metric records kept by the instrumented manager.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

/// Running duration and memory aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    /// Number of recorded calls.
    pub count: u64,
    /// Sum of durations.
    pub total_time: Duration,
    /// `total_time / count`.
    pub avg_time: Duration,
    /// Longest call.
    pub max_time: Duration,
    /// Shortest call.
    pub min_time: Duration,
    /// Sum of memory deltas, in bytes.
    pub total_memory: i64,
    /// `total_memory / count`, in bytes.
    pub avg_memory: i64,
}

impl Timing {
    pub(crate) fn record(&mut self, duration: Duration, memory_delta: i64) {
        if self.count == 0 || duration < self.min_time {
            self.min_time = duration;
        }
        self.max_time = self.max_time.max(duration);
        self.count += 1;
        self.total_time += duration;
        self.total_memory = self.total_memory.saturating_add(memory_delta);

        let count = u32::try_from(self.count).unwrap_or(u32::MAX);
        self.avg_time = self.total_time / count;
        self.avg_memory = self.total_memory / i64::from(count);
    }
}

/// Per listener aggregate.
pub type ListenerMetrics = Timing;

/// Aggregate for one event type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetrics {
    /// Whole-dispatch aggregate. Only successful dispatches count.
    pub timing: Timing,
    /// Aggregates keyed by listener label.
    pub listeners: BTreeMap<String, ListenerMetrics>,
}

impl EventMetrics {
    /// Successful dispatches recorded.
    pub fn count(&self) -> u64 {
        self.timing.count
    }

    /// Mean dispatch duration.
    pub fn avg_time(&self) -> Duration {
        self.timing.avg_time
    }

    /// Longest dispatch.
    pub fn max_time(&self) -> Duration {
        self.timing.max_time
    }

    /// Shortest dispatch.
    pub fn min_time(&self) -> Duration {
        self.timing.min_time
    }
}

/// One entry of the dispatch history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSample {
    /// Event tag.
    pub event: String,
    /// When the dispatch finished.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Memory delta in bytes.
    pub memory_delta: i64,
}

/// An event type whose average dispatch time exceeds the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowEvent {
    /// Event tag.
    pub event: String,
    /// Mean dispatch duration.
    pub avg_time: Duration,
    /// Dispatches recorded.
    pub count: u64,
}

/// A listener whose average run time exceeds the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowListener {
    /// Event tag the listener ran for.
    pub event: String,
    /// Listener label.
    pub listener: String,
    /// Mean run time.
    pub avg_time: Duration,
    /// Runs recorded.
    pub count: u64,
}

/// Slow events and listeners, slowest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlowEventsReport {
    /// Threshold the report was computed against.
    pub threshold: Duration,
    /// Slow event types.
    pub events: Vec<SlowEvent>,
    /// Slow listeners.
    pub listeners: Vec<SlowListener>,
}

impl SlowEventsReport {
    /// Whether nothing exceeded the threshold.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.listeners.is_empty()
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct MetricsState {
    pub(crate) events: BTreeMap<String, EventMetrics>,
    pub(crate) history: VecDeque<DispatchSample>,
}

impl MetricsState {
    pub(crate) fn record_dispatch(
        &mut self,
        event: &str,
        duration: Duration,
        memory_delta: i64,
        max_history: usize,
    ) {
        self.events
            .entry(event.to_string())
            .or_default()
            .timing
            .record(duration, memory_delta);

        self.history.push_back(DispatchSample {
            event: event.to_string(),
            timestamp: Utc::now(),
            duration,
            memory_delta,
        });
        while self.history.len() > max_history {
            self.history.pop_front();
        }
    }

    pub(crate) fn record_listener(
        &mut self,
        event: &str,
        listener: &str,
        duration: Duration,
        memory_delta: i64,
    ) {
        self.events
            .entry(event.to_string())
            .or_default()
            .listeners
            .entry(listener.to_string())
            .or_default()
            .record(duration, memory_delta);
    }

    pub(crate) fn slow_report(&self, threshold: Duration) -> SlowEventsReport {
        let mut report = SlowEventsReport {
            threshold,
            ..SlowEventsReport::default()
        };

        for (event, metrics) in &self.events {
            if metrics.timing.count > 0 && metrics.timing.avg_time > threshold {
                report.events.push(SlowEvent {
                    event: event.clone(),
                    avg_time: metrics.timing.avg_time,
                    count: metrics.timing.count,
                });
            }
            for (listener, timing) in &metrics.listeners {
                if timing.avg_time > threshold {
                    report.listeners.push(SlowListener {
                        event: event.clone(),
                        listener: listener.clone(),
                        avg_time: timing.avg_time,
                        count: timing.count,
                    });
                }
            }
        }

        report.events.sort_by(|a, b| b.avg_time.cmp(&a.avg_time));
        report.listeners.sort_by(|a, b| b.avg_time.cmp(&a.avg_time));
        report
    }

    pub(crate) fn export(&self, threshold: Duration) -> MetricsExport {
        MetricsExport {
            slow_threshold_ms: millis(threshold),
            events: self
                .events
                .iter()
                .map(|(event, metrics)| {
                    let exported = ExportedEvent {
                        timing: ExportedTiming::from(&metrics.timing),
                        listeners: metrics
                            .listeners
                            .iter()
                            .map(|(label, timing)| (label.clone(), ExportedTiming::from(timing)))
                            .collect(),
                    };
                    (event.clone(), exported)
                })
                .collect(),
            history: self
                .history
                .iter()
                .map(|sample| ExportedSample {
                    event: sample.event.clone(),
                    timestamp: sample.timestamp,
                    duration_ms: millis(sample.duration),
                    memory_delta_kb: kilobytes(sample.memory_delta),
                })
                .collect(),
        }
    }
}

// ============================================================================
// Export
// ============================================================================

/// Serializable snapshot in milliseconds and kilobytes.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsExport {
    /// Slow threshold in milliseconds.
    pub slow_threshold_ms: f64,
    /// Per event type aggregates.
    pub events: BTreeMap<String, ExportedEvent>,
    /// Dispatch history, oldest first.
    pub history: Vec<ExportedSample>,
}

/// Exported aggregate of one event type.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedEvent {
    /// Whole-dispatch aggregate.
    #[serde(flatten)]
    pub timing: ExportedTiming,
    /// Listener aggregates keyed by label.
    pub listeners: BTreeMap<String, ExportedTiming>,
}

/// Exported aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedTiming {
    /// Recorded calls.
    pub count: u64,
    /// Total time in milliseconds.
    pub total_time_ms: f64,
    /// Mean time in milliseconds.
    pub avg_time_ms: f64,
    /// Longest call in milliseconds.
    pub max_time_ms: f64,
    /// Shortest call in milliseconds.
    pub min_time_ms: f64,
    /// Total memory delta in kilobytes.
    pub total_memory_kb: f64,
    /// Mean memory delta in kilobytes.
    pub avg_memory_kb: f64,
}

impl From<&Timing> for ExportedTiming {
    fn from(timing: &Timing) -> Self {
        Self {
            count: timing.count,
            total_time_ms: millis(timing.total_time),
            avg_time_ms: millis(timing.avg_time),
            max_time_ms: millis(timing.max_time),
            min_time_ms: millis(timing.min_time),
            total_memory_kb: kilobytes(timing.total_memory),
            avg_memory_kb: kilobytes(timing.avg_memory),
        }
    }
}

/// Exported history entry.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedSample {
    /// Event tag.
    pub event: String,
    /// When the dispatch finished.
    pub timestamp: DateTime<Utc>,
    /// Duration in milliseconds.
    pub duration_ms: f64,
    /// Memory delta in kilobytes.
    pub memory_delta_kb: f64,
}

#[allow(clippy::cast_precision_loss)]
fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

#[allow(clippy::cast_precision_loss)]
fn kilobytes(bytes: i64) -> f64 {
    bytes as f64 / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_tracks_extremes_and_means() {
        let mut timing = Timing::default();
        timing.record(Duration::from_millis(30), 2048);
        timing.record(Duration::from_millis(10), 0);
        timing.record(Duration::from_millis(20), -1024);

        assert_eq!(timing.count, 3);
        assert_eq!(timing.total_time, Duration::from_millis(60));
        assert_eq!(timing.avg_time, Duration::from_millis(20));
        assert_eq!(timing.max_time, Duration::from_millis(30));
        assert_eq!(timing.min_time, Duration::from_millis(10));
        assert_eq!(timing.total_memory, 1024);
        assert_eq!(timing.avg_memory, 341);
    }

    #[test]
    fn history_is_fifo_bounded() {
        let mut state = MetricsState::default();
        for event in ["first", "second", "third"] {
            state.record_dispatch(event, Duration::from_millis(1), 0, 2);
        }

        let events: Vec<&str> = state.history.iter().map(|s| s.event.as_str()).collect();
        assert_eq!(events, vec!["second", "third"]);
        assert_eq!(state.events["first"].count(), 1);
    }

    #[test]
    fn zero_history_keeps_nothing() {
        let mut state = MetricsState::default();
        state.record_dispatch("only", Duration::from_millis(1), 0, 0);
        assert!(state.history.is_empty());
        assert_eq!(state.events["only"].count(), 1);
    }

    #[test]
    fn slow_report_uses_averages() {
        let mut state = MetricsState::default();
        state.record_dispatch("slow", Duration::from_millis(250), 0, 10);
        state.record_dispatch("slow", Duration::from_millis(50), 0, 10);
        state.record_dispatch("spiky", Duration::from_millis(190), 0, 10);
        state.record_dispatch("spiky", Duration::from_millis(1), 0, 10);
        state.record_dispatch("spiky", Duration::from_millis(1), 0, 10);
        state.record_listener("slow", "audit", Duration::from_millis(120), 0);

        let report = state.slow_report(Duration::from_millis(100));
        let events: Vec<&str> = report.events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(events, vec!["slow"]);
        assert_eq!(report.listeners.len(), 1);
        assert_eq!(report.listeners[0].listener, "audit");
    }

    #[test]
    fn export_normalizes_units() {
        let mut state = MetricsState::default();
        state.record_dispatch("order", Duration::from_millis(4), 2048, 10);
        state.record_listener("order", "audit", Duration::from_millis(2), 1024);

        let export = state.export(Duration::from_millis(100));
        let order = &export.events["order"];
        assert_eq!(export.slow_threshold_ms, 100.0);
        assert_eq!(order.timing.avg_time_ms, 4.0);
        assert_eq!(order.timing.total_memory_kb, 2.0);
        assert_eq!(order.listeners["audit"].avg_memory_kb, 1.0);
        assert_eq!(export.history[0].duration_ms, 4.0);
    }

    #[test]
    fn export_serializes_flat_event_entries() {
        let mut state = MetricsState::default();
        state.record_dispatch("order", Duration::from_millis(2), 0, 10);

        let json = serde_json::to_value(state.export(Duration::from_millis(100))).unwrap();
        assert_eq!(json["events"]["order"]["count"], 1);
        assert_eq!(json["events"]["order"]["avg_time_ms"], 2.0);
        assert!(json["events"]["order"]["listeners"].as_object().unwrap().is_empty());
        assert_eq!(json["history"][0]["event"], "order");
    }
}
