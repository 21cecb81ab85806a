//! # Subscribers
//!
//! A subscriber declares a batch of `event tag -> method` bindings and is
//! registered in one call. The binding table is read once at registration;
//! afterwards each binding is an ordinary listener that forwards to
//! [`Subscriber::handle`] with the bound method name.

use crate::{
    error::BoxError,
    event::Event,
    listener::{DynListener, ListenerRef},
};
use futures::future::BoxFuture;
use std::sync::Arc;

/// One binding in a subscriber's event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// Call `method` at the default priority.
    Method(&'static str),
    /// Call `method` at the given priority.
    WithPriority(&'static str, i32),
}

impl Subscription {
    /// The bound method name.
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Method(method) | Self::WithPriority(method, _) => method,
        }
    }

    /// The registration priority.
    pub const fn priority(&self) -> i32 {
        match self {
            Self::Method(_) => 0,
            Self::WithPriority(_, priority) => *priority,
        }
    }
}

impl From<&'static str> for Subscription {
    fn from(method: &'static str) -> Self {
        Self::Method(method)
    }
}

impl From<(&'static str, i32)> for Subscription {
    fn from((method, priority): (&'static str, i32)) -> Self {
        Self::WithPriority(method, priority)
    }
}

/// An object that registers several listeners at once.
///
/// ```rust,ignore
/// impl Subscriber for AuditTrail {
///     fn subscribed_events(&self) -> Vec<(&'static str, Subscription)> {
///         vec![
///             ("order.placed", "on_placed".into()),
///             ("order.cancelled", ("on_cancelled", 10).into()),
///         ]
///     }
///
///     fn handle<'a>(&'a self, method: &'a str, event: &'a mut dyn Event)
///         -> BoxFuture<'a, Result<(), BoxError>>
///     {
///         match method {
///             "on_placed" => Box::pin(self.on_placed(event)),
///             "on_cancelled" => Box::pin(self.on_cancelled(event)),
///             other => Box::pin(async move {
///                 Err(ListenerError::unknown_method(self.name(), other).into())
///             }),
///         }
///     }
/// }
/// ```
pub trait Subscriber: Send + Sync + 'static {
    /// The `event tag -> binding` table.
    fn subscribed_events(&self) -> Vec<(&'static str, Subscription)>;

    /// Run the bound `method` for `event`.
    fn handle<'a>(
        &'a self,
        method: &'a str,
        event: &'a mut dyn Event,
    ) -> BoxFuture<'a, Result<(), BoxError>>;

    /// Diagnostic name, used to label the generated listeners.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A single subscriber binding, as registered with a dispatcher.
pub struct SubscriberMethod {
    subscriber: Arc<dyn Subscriber>,
    method: &'static str,
}

impl SubscriberMethod {
    /// Bind `method` of `subscriber`.
    pub fn new(subscriber: Arc<dyn Subscriber>, method: &'static str) -> Self {
        Self { subscriber, method }
    }

    /// Wrap into a listener handle.
    pub fn into_listener(self) -> ListenerRef {
        ListenerRef::new(self)
    }
}

impl DynListener for SubscriberMethod {
    fn call<'a>(&'a self, event: &'a mut dyn Event) -> BoxFuture<'a, Result<(), BoxError>> {
        self.subscriber.handle(self.method, event)
    }

    fn label(&self) -> String {
        format!("{}::{}", self.subscriber.name(), self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ListenerError;

    struct Tally {
        name: &'static str,
    }

    impl Event for Tally {
        fn event_name(&self) -> &'static str {
            "Tally"
        }
    }

    struct Other;

    impl Event for Other {
        fn event_name(&self) -> &'static str {
            "Other"
        }
    }

    struct Recorder;

    impl Subscriber for Recorder {
        fn subscribed_events(&self) -> Vec<(&'static str, Subscription)> {
            vec![("Tally", "on_tally".into()), ("Other", ("on_other", 5).into())]
        }

        fn handle<'a>(
            &'a self,
            method: &'a str,
            event: &'a mut dyn Event,
        ) -> BoxFuture<'a, Result<(), BoxError>> {
            Box::pin(async move {
                let name = event.event_name();
                match (method, event.downcast_mut::<Tally>()) {
                    ("on_tally", Some(tally)) => {
                        tally.name = "seen";
                        Ok(())
                    }
                    ("on_tally", None) => Err(BoxError::from(ListenerError::unexpected_event(
                        format!("{}::on_tally", self.name()),
                        name,
                    ))),
                    (other, _) => Err(BoxError::from(ListenerError::unknown_method(
                        self.name(),
                        other,
                    ))),
                }
            })
        }
    }

    #[test]
    fn subscription_shapes() {
        assert_eq!(Subscription::from("a"), Subscription::Method("a"));
        assert_eq!(Subscription::from(("a", -3)).priority(), -3);
        assert_eq!(Subscription::Method("b").priority(), 0);
        assert_eq!(Subscription::WithPriority("c", 2).method(), "c");
    }

    #[tokio::test]
    async fn method_binding_forwards_to_subscriber() {
        let subscriber: Arc<dyn Subscriber> = Arc::new(Recorder);
        let listener = SubscriberMethod::new(Arc::clone(&subscriber), "on_tally").into_listener();
        assert!(listener.label().ends_with("Recorder::on_tally"));

        let mut event = Tally { name: "fresh" };
        listener.call(&mut event).await.unwrap();
        assert_eq!(event.name, "seen");

        let err = listener.call(&mut Other).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ListenerError>(),
            Some(ListenerError::UnexpectedEvent { event: "Other", .. })
        ));

        let unknown = SubscriberMethod::new(subscriber, "on_missing").into_listener();
        let err = unknown.call(&mut event).await.unwrap_err();
        assert!(err.to_string().contains("on_missing"));
    }
}
