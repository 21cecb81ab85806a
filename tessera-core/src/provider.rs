//! Listener resolution seam.

use crate::{event::Event, listener::ListenerRef};
use std::sync::Arc;

/// A source of listeners for a concrete event instance.
///
/// Dispatchers ask the provider for the ordered listener sequence on every
/// dispatch; providers must not cache across calls.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid `ListenerProvider`",
    label = "missing `ListenerProvider` implementation",
    note = "Implement `ListenerProvider` to resolve listeners for dispatched events."
)]
pub trait ListenerProvider: Send + Sync {
    /// The full, ordered listener sequence for `event`.
    fn listeners_for_event(&self, event: &dyn Event) -> Vec<ListenerRef>;
}

impl<P: ListenerProvider + ?Sized> ListenerProvider for Arc<P> {
    fn listeners_for_event(&self, event: &dyn Event) -> Vec<ListenerRef> {
        (**self).listeners_for_event(event)
    }
}
