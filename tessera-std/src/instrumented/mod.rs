//! Instrumented event manager.
//!
//! A decorator over any [`EventDispatcher`] that times every dispatch and
//! every listener registered through it, keeps a bounded dispatch history
//! and reports slow listeners through `tracing`. Dispatch semantics are
//! unchanged: listener errors are logged, then returned as-is.

mod memory;
mod metrics;

pub use memory::{MemoryProbe, ProcessMemory};
pub use metrics::{
    DispatchSample, EventMetrics, ExportedEvent, ExportedSample, ExportedTiming, ListenerMetrics,
    MetricsExport, SlowEvent, SlowEventsReport, SlowListener, Timing,
};

use crate::manager::EventDispatcher;
use futures::future::BoxFuture;
use metrics::MetricsState;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tessera_core::{BoxError, DynListener, Event, ListenerRef};

/// Instrumentation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentationConfig {
    /// Listeners slower than this are reported. Defaults to 100ms.
    pub slow_threshold: Duration,
    /// Dispatch samples kept in history. Defaults to 1000.
    pub max_history: usize,
}

impl InstrumentationConfig {
    /// Override the slow threshold.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Override the history size.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            slow_threshold: Duration::from_millis(100),
            max_history: 1000,
        }
    }
}

/// State shared between the manager and its listener adapters.
struct Shared {
    config: InstrumentationConfig,
    probe: Arc<dyn MemoryProbe>,
    state: Mutex<MetricsState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Metrics-collecting decorator over another [`EventDispatcher`].
///
/// # Example
///
/// ```rust,ignore
/// let manager = InstrumentedEventManager::new(EventManager::new());
/// manager.listen(|order: &mut OrderPlaced| Ok(()), 0);
/// manager.dispatch(OrderPlaced::new(42)).await?;
///
/// let metrics = manager.event_metrics("OrderPlaced").unwrap();
/// assert_eq!(metrics.count(), 1);
/// ```
pub struct InstrumentedEventManager {
    inner: Arc<dyn EventDispatcher>,
    shared: Arc<Shared>,
}

impl InstrumentedEventManager {
    /// Decorate `inner` with the default configuration.
    pub fn new<D: EventDispatcher>(inner: D) -> Self {
        Self::with_config(Arc::new(inner), InstrumentationConfig::default())
    }

    /// Decorate a shared manager with `config`, measuring process memory.
    pub fn with_config(inner: Arc<dyn EventDispatcher>, config: InstrumentationConfig) -> Self {
        Self::with_probe(inner, config, Arc::new(ProcessMemory))
    }

    /// Decorate a shared manager with `config` and a custom memory probe.
    pub fn with_probe(
        inner: Arc<dyn EventDispatcher>,
        config: InstrumentationConfig,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        Self {
            inner,
            shared: Arc::new(Shared {
                config,
                probe,
                state: Mutex::new(MetricsState::default()),
            }),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> InstrumentationConfig {
        self.shared.config
    }

    /// The decorated manager.
    pub fn inner(&self) -> &Arc<dyn EventDispatcher> {
        &self.inner
    }

    /// Aggregates for every event type seen so far.
    pub fn metrics(&self) -> BTreeMap<String, EventMetrics> {
        self.shared.state().events.clone()
    }

    /// Aggregate for one event type.
    pub fn event_metrics(&self, event: &str) -> Option<EventMetrics> {
        self.shared.state().events.get(event).cloned()
    }

    /// Dispatch history, oldest first.
    pub fn history(&self) -> Vec<DispatchSample> {
        self.shared.state().history.iter().cloned().collect()
    }

    /// Events and listeners whose average time exceeds the slow threshold.
    pub fn slow_events_report(&self) -> SlowEventsReport {
        self.shared.state().slow_report(self.shared.config.slow_threshold)
    }

    /// Serializable snapshot of aggregates and history.
    pub fn export_metrics(&self) -> MetricsExport {
        self.shared.state().export(self.shared.config.slow_threshold)
    }

    /// Drop all aggregates and history.
    pub fn reset_metrics(&self) {
        let mut state = self.shared.state();
        state.events.clear();
        state.history.clear();
    }
}

impl EventDispatcher for InstrumentedEventManager {
    fn dispatch_event<'a>(
        &'a self,
        event: &'a mut dyn Event,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            let name = event.event_name();
            let memory_before = self.shared.probe.current_bytes();
            let started = Instant::now();

            match self.inner.dispatch_event(event).await {
                Ok(()) => {
                    let duration = started.elapsed();
                    let delta = memory::delta(memory_before, self.shared.probe.current_bytes());
                    self.shared.state().record_dispatch(
                        name,
                        duration,
                        delta,
                        self.shared.config.max_history,
                    );
                    Ok(())
                }
                Err(error) => {
                    tracing::error!(event = name, error = %error, "event dispatch failed");
                    Err(error)
                }
            }
        })
    }

    fn add_listener(&self, event_type: &str, listener: ListenerRef, priority: i32) {
        let timed = listener.wrap(Timed {
            listener: listener.clone(),
            shared: Arc::clone(&self.shared),
        });
        self.inner.add_listener(event_type, timed, priority);
    }

    fn remove_listener(&self, event_type: &str, listener: &ListenerRef) -> bool {
        self.inner.remove_listener(event_type, listener)
    }

    fn has_listeners(&self, event_type: &str) -> bool {
        self.inner.has_listeners(event_type)
    }
}

/// Timing adapter installed around every listener registered through the
/// instrumented manager. Shares the wrapped handle's id.
struct Timed {
    listener: ListenerRef,
    shared: Arc<Shared>,
}

impl DynListener for Timed {
    fn call<'a>(&'a self, event: &'a mut dyn Event) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            let name = event.event_name();
            let label = self.listener.label();
            let memory_before = self.shared.probe.current_bytes();
            let started = Instant::now();

            if let Err(error) = self.listener.call(event).await {
                tracing::error!(
                    event = name,
                    listener = label,
                    error = %error,
                    "event listener failed"
                );
                return Err(error);
            }

            let duration = started.elapsed();
            let delta = memory::delta(memory_before, self.shared.probe.current_bytes());
            if duration > self.shared.config.slow_threshold {
                tracing::warn!(
                    event = name,
                    listener = label,
                    duration_ms = duration.as_millis() as u64,
                    "slow event listener"
                );
            }
            self.shared
                .state()
                .record_listener(name, label, duration, delta);
            Ok(())
        })
    }

    fn label(&self) -> String {
        self.listener.label().to_string()
    }
}
