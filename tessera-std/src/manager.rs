//! Event manager facade.
//!
//! [`EventDispatcher`] is the object-safe surface shared by the plain
//! [`EventManager`] and the
//! [`InstrumentedEventManager`](crate::instrumented::InstrumentedEventManager)
//! decorator. [`EventDispatcherExt`] layers the typed conveniences on top
//! of any implementation, including `dyn EventDispatcher`.

use crate::{dispatcher::Dispatcher, registry::ListenerRegistry};
use futures::future::BoxFuture;
use std::{fmt, future::Future, ops::Deref, sync::Arc};
use tessera_core::{
    BoxError, Event, Listener, ListenerRef, NamedEvent, Subscriber, SubscriberMethod,
};

/// Object-safe event manager surface.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot dispatch events",
    label = "missing `EventDispatcher` implementation",
    note = "Implement `EventDispatcher` or wrap an `EventManager`."
)]
pub trait EventDispatcher: Send + Sync + 'static {
    /// Dispatch `event` to every resolved listener.
    fn dispatch_event<'a>(&'a self, event: &'a mut dyn Event)
    -> BoxFuture<'a, Result<(), BoxError>>;

    /// Register `listener` for `event_type` at `priority`.
    fn add_listener(&self, event_type: &str, listener: ListenerRef, priority: i32);

    /// Remove one registration of `listener` for exactly `event_type`.
    fn remove_listener(&self, event_type: &str, listener: &ListenerRef) -> bool;

    /// Whether `event_type` has listeners of its own.
    fn has_listeners(&self, event_type: &str) -> bool;

    /// Register every binding a subscriber declares.
    ///
    /// Bindings with an empty event tag or method name are skipped with a
    /// warning rather than failing the whole subscription. Returns the
    /// handles that were registered.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Vec<ListenerRef> {
        let mut registered = Vec::new();
        for (event_type, subscription) in subscriber.subscribed_events() {
            if event_type.is_empty() || subscription.method().is_empty() {
                tracing::warn!(
                    subscriber = subscriber.name(),
                    event = event_type,
                    method = subscription.method(),
                    "skipping malformed subscriber binding"
                );
                continue;
            }
            let listener =
                SubscriberMethod::new(Arc::clone(&subscriber), subscription.method()).into_listener();
            self.add_listener(event_type, listener.clone(), subscription.priority());
            registered.push(listener);
        }
        registered
    }
}

/// Typed conveniences over any [`EventDispatcher`].
pub trait EventDispatcherExt: EventDispatcher {
    /// Dispatch an owned event and hand it back after every listener ran.
    ///
    /// # Errors
    ///
    /// The first listener error, unchanged.
    fn dispatch<E: Event>(&self, mut event: E) -> impl Future<Output = Result<E, BoxError>> + Send {
        async move {
            self.dispatch_event(&mut event).await?;
            Ok(event)
        }
    }

    /// Register a closure for `E` and return its handle.
    fn listen<E, F>(&self, listener: F, priority: i32) -> ListenerRef
    where
        E: NamedEvent,
        F: Fn(&mut E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let handle = ListenerRef::from_fn(listener);
        self.add_listener(E::NAME, handle.clone(), priority);
        handle
    }

    /// Register a typed (possibly async) listener for `E`.
    fn listen_with<E, L>(&self, listener: L, priority: i32) -> ListenerRef
    where
        E: NamedEvent,
        L: Listener<E>,
    {
        let handle = ListenerRef::typed(listener);
        self.add_listener(E::NAME, handle.clone(), priority);
        handle
    }

    /// Register a closure over the erased event under an arbitrary tag,
    /// typically an ancestor or interface tag.
    fn listen_tag<F>(&self, tag: &str, listener: F, priority: i32) -> ListenerRef
    where
        F: Fn(&mut dyn Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let handle = ListenerRef::erased(listener);
        self.add_listener(tag, handle.clone(), priority);
        handle
    }
}

impl<T: EventDispatcher + ?Sized> EventDispatcherExt for T {}

// ============================================================================
// EventManager
// ============================================================================

/// Registry plus dispatcher behind one facade.
pub struct EventManager {
    dispatcher: Dispatcher<Arc<ListenerRegistry>>,
}

impl EventManager {
    /// A manager with a fresh registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ListenerRegistry::new()))
    }

    /// A manager over an existing registry.
    pub fn with_registry(registry: Arc<ListenerRegistry>) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry),
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        self.dispatcher.provider()
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher for EventManager {
    fn dispatch_event<'a>(
        &'a self,
        event: &'a mut dyn Event,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.dispatcher.dispatch(event))
    }

    fn add_listener(&self, event_type: &str, listener: ListenerRef, priority: i32) {
        self.registry().add_listener(event_type, listener, priority);
    }

    fn remove_listener(&self, event_type: &str, listener: &ListenerRef) -> bool {
        self.registry().remove_listener(event_type, listener)
    }

    fn has_listeners(&self, event_type: &str) -> bool {
        self.registry().has_listeners(event_type)
    }
}

// ============================================================================
// Events handle
// ============================================================================

/// Cloneable handle to the process-wide event manager.
///
/// This is what collaborators hold; it derefs to `dyn EventDispatcher`, so
/// both the object-safe and the typed methods are available.
#[derive(Clone)]
pub struct Events(Arc<dyn EventDispatcher>);

impl Events {
    /// Wrap a concrete manager.
    pub fn new<D: EventDispatcher>(dispatcher: D) -> Self {
        Self(Arc::new(dispatcher))
    }

    /// Wrap an already shared manager.
    pub fn from_arc(dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self(dispatcher)
    }

    /// The shared manager.
    pub fn as_arc(&self) -> &Arc<dyn EventDispatcher> {
        &self.0
    }
}

impl Deref for Events {
    type Target = dyn EventDispatcher;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingListener, OrderLog, RecordingListener, Sample};
    use tessera_core::{BoxFuture, Subscription};

    struct Audit {
        log: OrderLog,
    }

    impl Subscriber for Audit {
        fn subscribed_events(&self) -> Vec<(&'static str, Subscription)> {
            vec![
                ("Sample", Subscription::Method("on_low")),
                ("Sample", Subscription::WithPriority("on_high", 10)),
                ("", Subscription::Method("on_nothing")),
                ("Sample", Subscription::Method("")),
            ]
        }

        fn handle<'a>(
            &'a self,
            method: &'a str,
            _event: &'a mut dyn Event,
        ) -> BoxFuture<'a, Result<(), BoxError>> {
            self.log.push(method);
            Box::pin(futures::future::ready(Ok(())))
        }
    }

    #[tokio::test]
    async fn typed_dispatch_returns_the_event() {
        let manager = EventManager::new();
        manager.listen(
            |event: &mut Sample| {
                event.payload.push_str(" seen");
                Ok(())
            },
            0,
        );

        let event = manager.dispatch(Sample::with_payload("order")).await.unwrap();
        assert_eq!(event.payload, "order seen");
    }

    #[tokio::test]
    async fn subscriber_bindings_respect_priority_and_skip_malformed() {
        let manager = EventManager::new();
        let log = OrderLog::new();
        let registered = manager.subscribe(Arc::new(Audit { log: log.clone() }));

        assert_eq!(registered.len(), 2);
        assert!(registered[0].label().ends_with("Audit::on_low"));

        manager.dispatch(Sample::new()).await.unwrap();
        assert_eq!(log.entries(), vec!["on_high", "on_low"]);
    }

    #[tokio::test]
    async fn interface_listeners_run_after_exact_ones() {
        let manager = EventManager::new();
        let log = OrderLog::new();
        manager.add_listener(Sample::INTERFACE_TAG, log.listener("interface"), 99);
        manager.add_listener("Sample", log.listener("exact"), -99);

        manager.dispatch(Sample::new()).await.unwrap();
        assert_eq!(log.entries(), vec!["exact", "interface"]);
    }

    #[tokio::test]
    async fn removal_and_existence_pass_through() {
        let manager = EventManager::new();
        let counter = CountingListener::new();
        let handle = counter.handle();

        manager.add_listener("Sample", handle.clone(), 0);
        assert!(manager.has_listeners("Sample"));
        assert!(!manager.has_listeners(Sample::INTERFACE_TAG));

        assert!(manager.remove_listener("Sample", &handle));
        manager.dispatch(Sample::new()).await.unwrap();
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test]
    async fn events_handle_derefs_to_the_manager() {
        let events = Events::new(EventManager::new());
        let recorder = RecordingListener::<Sample>::new();
        events.listen_with(recorder.clone(), 0);

        events.dispatch(Sample::with_payload("a")).await.unwrap();
        events.dispatch(Sample::with_payload("b")).await.unwrap();

        let payloads: Vec<String> = recorder.events().into_iter().map(|e| e.payload).collect();
        assert_eq!(payloads, vec!["a", "b"]);
    }
}
