//! # Listeners
//!
//! A listener is a callable registered against an event tag and a priority.
//! Two layers exist, mirroring the static/dynamic split used for hooks:
//!
//! - [`Listener<E>`]: typed, native `async fn`, zero-cost. Plain closures
//!   `Fn(&mut E) -> Result<(), BoxError>` implement it.
//! - [`DynListener`]: object-safe and type-erased over `&mut dyn Event`.
//!   This is what registries store.
//!
//! [`ListenerRef`] is the shared handle handed out at registration. Its
//! identity (a [`ListenerId`]) is what removal compares against.

use crate::{
    error::BoxError,
    event::{Event, NamedEvent},
};
use futures::future::{self, BoxFuture};
use std::{
    fmt,
    future::Future,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// A typed event listener.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Listener` for `{E}`",
    label = "missing `Listener` implementation",
    note = "Listeners must implement `handle` for `{E}`, or be a closure `Fn(&mut {E}) -> Result<(), BoxError>`."
)]
pub trait Listener<E: NamedEvent>: Send + Sync + 'static {
    /// Handle one dispatched event.
    fn handle(&self, event: &mut E) -> impl Future<Output = Result<(), BoxError>> + Send;
}

impl<E, F> Listener<E> for F
where
    E: NamedEvent,
    F: Fn(&mut E) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn handle(&self, event: &mut E) -> impl Future<Output = Result<(), BoxError>> + Send {
        future::ready(self(event))
    }
}

/// Object-safe, type-erased listener.
pub trait DynListener: Send + Sync + 'static {
    /// Handle one dispatched event.
    fn call<'a>(&'a self, event: &'a mut dyn Event) -> BoxFuture<'a, Result<(), BoxError>>;

    /// Human-readable label used in diagnostics and metrics.
    fn label(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Adapts a typed [`Listener`] to [`DynListener`].
///
/// Events that cannot be viewed as `E` (neither `E` itself nor a descendant
/// embedding an `E`) are skipped.
struct Typed<E, L> {
    listener: L,
    _marker: PhantomData<fn(&mut E)>,
}

impl<E, L> DynListener for Typed<E, L>
where
    E: NamedEvent,
    L: Listener<E>,
{
    fn call<'a>(&'a self, event: &'a mut dyn Event) -> BoxFuture<'a, Result<(), BoxError>> {
        match event.view_mut::<E>() {
            Some(typed) => Box::pin(self.listener.handle(typed)),
            None => Box::pin(future::ready(Ok(()))),
        }
    }

    fn label(&self) -> String {
        std::any::type_name::<L>().to_string()
    }
}

/// A closure over the erased event.
struct Erased<F>(F);

impl<F> DynListener for Erased<F>
where
    F: Fn(&mut dyn Event) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, event: &'a mut dyn Event) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(future::ready((self.0)(event)))
    }

    fn label(&self) -> String {
        std::any::type_name::<F>().to_string()
    }
}

/// Stable identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Shared handle to a registered listener.
///
/// Cloning a `ListenerRef` does not create a new listener: clones share the
/// same [`ListenerId`] and compare equal. Registering the same handle twice
/// registers the listener twice.
#[derive(Clone)]
pub struct ListenerRef {
    id: ListenerId,
    label: Arc<str>,
    inner: Arc<dyn DynListener>,
}

impl ListenerRef {
    /// Wrap an erased listener, allocating a fresh identity.
    pub fn new<L: DynListener>(listener: L) -> Self {
        let label: Arc<str> = listener.label().into();
        Self {
            id: ListenerId::next(),
            label,
            inner: Arc::new(listener),
        }
    }

    /// Wrap a typed listener for `E`.
    pub fn typed<E, L>(listener: L) -> Self
    where
        E: NamedEvent,
        L: Listener<E>,
    {
        Self::new(Typed {
            listener,
            _marker: PhantomData,
        })
    }

    /// Wrap a synchronous closure over `E`.
    pub fn from_fn<E, F>(f: F) -> Self
    where
        E: NamedEvent,
        F: Fn(&mut E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::typed::<E, F>(f)
    }

    /// Wrap a synchronous closure over any event. Used for ancestor and
    /// interface tags where no single concrete type applies.
    pub fn erased<F>(f: F) -> Self
    where
        F: Fn(&mut dyn Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::new(Erased(f))
    }

    /// Replace the diagnostic label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Arc::from(label.into());
        self
    }

    /// Replace the callable while keeping this handle's identity and label.
    ///
    /// Decorators use this so that removal with the original handle still
    /// finds the decorated entry.
    pub fn wrap<L: DynListener>(&self, listener: L) -> Self {
        Self {
            id: self.id,
            label: Arc::clone(&self.label),
            inner: Arc::new(listener),
        }
    }

    /// The listener's identity.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// The diagnostic label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Invoke the listener.
    pub fn call<'a>(&'a self, event: &'a mut dyn Event) -> BoxFuture<'a, Result<(), BoxError>> {
        self.inner.call(event)
    }
}

impl PartialEq for ListenerRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ListenerRef {}

impl fmt::Debug for ListenerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRef")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Propagation;

    struct Ping {
        hits: u32,
        stop: Propagation,
    }

    impl Event for Ping {
        fn event_name(&self) -> &'static str {
            Self::NAME
        }
        fn propagation(&self) -> Option<&Propagation> {
            Some(&self.stop)
        }
        fn propagation_mut(&mut self) -> Option<&mut Propagation> {
            Some(&mut self.stop)
        }
    }

    impl NamedEvent for Ping {
        const NAME: &'static str = "Ping";
    }

    struct Pong;

    impl Event for Pong {
        fn event_name(&self) -> &'static str {
            "Pong"
        }
    }

    struct AsyncCounter;

    impl Listener<Ping> for AsyncCounter {
        async fn handle(&self, event: &mut Ping) -> Result<(), BoxError> {
            event.hits += 10;
            Ok(())
        }
    }

    fn ping() -> Ping {
        Ping {
            hits: 0,
            stop: Propagation::new(),
        }
    }

    #[tokio::test]
    async fn typed_closure_mutates_event() {
        let listener = ListenerRef::from_fn(|event: &mut Ping| {
            event.hits += 1;
            Ok(())
        });

        let mut event = ping();
        listener.call(&mut event).await.unwrap();
        listener.call(&mut event).await.unwrap();
        assert_eq!(event.hits, 2);
    }

    #[tokio::test]
    async fn async_listener_is_awaited() {
        let listener = ListenerRef::typed(AsyncCounter);
        let mut event = ping();
        listener.call(&mut event).await.unwrap();
        assert_eq!(event.hits, 10);
        assert!(listener.label().ends_with("AsyncCounter"));
    }

    #[tokio::test]
    async fn typed_listener_skips_foreign_events() {
        let listener = ListenerRef::from_fn(|_: &mut Ping| Err("must not run".into()));
        assert!(listener.call(&mut Pong).await.is_ok());
    }

    #[tokio::test]
    async fn erased_listener_sees_any_event() {
        let listener = ListenerRef::erased(|event| {
            event.stop_propagation();
            Ok(())
        });
        let mut event = ping();
        listener.call(&mut event).await.unwrap();
        assert!(event.is_propagation_stopped());
    }

    #[test]
    fn identity_survives_clone_and_wrap() {
        let original = ListenerRef::erased(|_| Ok(())).with_label("audit");
        let clone = original.clone();
        let wrapped = original.wrap(Erased(|_: &mut dyn Event| -> Result<(), BoxError> { Ok(()) }));
        let other = ListenerRef::erased(|_| Ok(()));

        assert_eq!(original, clone);
        assert_eq!(original, wrapped);
        assert_eq!(wrapped.label(), "audit");
        assert_ne!(original, other);
    }
}
