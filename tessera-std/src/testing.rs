//! Testing utilities for Tessera.
//!
//! This module provides helpers that make listener ordering, invocation
//! counts and failure paths easy to assert on.
//!
//! # Features
//!
//! - [`OrderLog`]: shared log of listener labels in invocation order
//! - [`RecordingListener`]: a typed listener that records every event it receives
//! - [`CountingListener`]: a listener that counts invocations
//! - [`FailingListener`]: a listener that always fails
//! - [`Sample`]: a small stoppable event with one interface tag
//! - [`ScriptedMemory`]: a [`MemoryProbe`] returning scripted readings

use crate::instrumented::MemoryProbe;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};
use tessera_core::{
    BoxError, BoxFuture, DynListener, Event, Listener, ListenerRef, NamedEvent, Propagation,
};

// ============================================================================
// Sample Event
// ============================================================================

/// A stoppable event tagged with one interface.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    /// Free-form payload.
    pub payload: String,
    stop: Propagation,
}

impl Sample {
    /// The interface tag `Sample` declares.
    pub const INTERFACE_TAG: &'static str = "Observable";

    /// A sample with an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sample carrying `payload`.
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            stop: Propagation::new(),
        }
    }
}

impl Event for Sample {
    fn event_name(&self) -> &'static str {
        Self::NAME
    }

    fn declared_interfaces(&self) -> &'static [&'static str] {
        &[Self::INTERFACE_TAG]
    }

    fn propagation(&self) -> Option<&Propagation> {
        Some(&self.stop)
    }

    fn propagation_mut(&mut self) -> Option<&mut Propagation> {
        Some(&mut self.stop)
    }
}

impl NamedEvent for Sample {
    const NAME: &'static str = "Sample";
}

// ============================================================================
// Order Log
// ============================================================================

/// A shared log of listener labels, in the order listeners ran.
///
/// # Example
///
/// ```rust,ignore
/// let log = OrderLog::new();
/// registry.add_listener("Sample", log.listener("first"), 10);
/// registry.add_listener("Sample", log.listener("second"), 0);
///
/// dispatcher.dispatch(&mut Sample::new()).await?;
/// assert_eq!(log.entries(), vec!["first", "second"]);
/// ```
#[derive(Clone, Default)]
pub struct OrderLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl OrderLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener that appends `label` to this log when it runs.
    pub fn listener(&self, label: &str) -> ListenerRef {
        let entries = Arc::clone(&self.entries);
        let entry = label.to_string();
        ListenerRef::erased(move |_| {
            entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(entry.clone());
            Ok(())
        })
        .with_label(label)
    }

    /// Append an entry directly.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Snapshot of the entries so far.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear the log.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ============================================================================
// Recording Listener
// ============================================================================

/// A typed listener that records a clone of every event it receives.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = RecordingListener::<Sample>::new();
/// manager.listen_with(recorder.clone(), 0);
///
/// manager.dispatch(Sample::with_payload("a")).await?;
/// assert_eq!(recorder.count(), 1);
/// ```
pub struct RecordingListener<E: Clone> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E: Clone> RecordingListener<E> {
    /// Create a new recording listener.
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get a clone of the recorded events.
    pub fn events(&self) -> Vec<E> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the number of recorded events.
    pub fn count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<E: Clone> Default for RecordingListener<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Clone for RecordingListener<E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<E: NamedEvent + Clone> Listener<E> for RecordingListener<E> {
    async fn handle(&self, event: &mut E) -> Result<(), BoxError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

// ============================================================================
// Counting Listener
// ============================================================================

/// An erased listener that counts invocations.
#[derive(Clone, Default)]
pub struct CountingListener {
    count: Arc<AtomicUsize>,
}

impl CountingListener {
    /// Create a new counting listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    /// A registrable handle sharing this counter.
    pub fn handle(&self) -> ListenerRef {
        ListenerRef::new(self.clone())
    }
}

impl DynListener for CountingListener {
    fn call<'a>(&'a self, _event: &'a mut dyn Event) -> BoxFuture<'a, Result<(), BoxError>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Box::pin(futures::future::ready(Ok(())))
    }
}

// ============================================================================
// Failing Listener
// ============================================================================

/// An erased listener that always fails with `message`.
pub struct FailingListener {
    message: String,
}

impl FailingListener {
    /// Create a listener failing with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl DynListener for FailingListener {
    fn call<'a>(&'a self, _event: &'a mut dyn Event) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(futures::future::ready(Err(BoxError::from(self.message.clone()))))
    }
}

// ============================================================================
// Scripted Memory
// ============================================================================

/// A [`MemoryProbe`] that replays scripted readings, then repeats the last.
#[derive(Default)]
pub struct ScriptedMemory {
    readings: Mutex<VecDeque<u64>>,
    last: AtomicU64,
}

impl ScriptedMemory {
    /// Replay `readings` in order.
    pub fn new(readings: impl IntoIterator<Item = u64>) -> Self {
        Self {
            readings: Mutex::new(readings.into_iter().collect()),
            last: AtomicU64::new(0),
        }
    }
}

impl MemoryProbe for ScriptedMemory {
    fn current_bytes(&self) -> u64 {
        let next = self
            .readings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(value) => {
                self.last.store(value, Ordering::SeqCst);
                value
            }
            None => self.last.load(Ordering::SeqCst),
        }
    }
}
