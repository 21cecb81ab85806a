//! Sequential event dispatcher.
//!
//! Resolves listeners from a [`ListenerProvider`] and awaits them one by
//! one. Before each invocation the event's stop flag is checked; once set,
//! no further listener runs. Listener errors are not caught here.

use tessera_core::{BoxError, Event, ListenerProvider};

/// Dispatches events to the listeners a provider resolves for them.
pub struct Dispatcher<P> {
    provider: P,
}

impl<P> Dispatcher<P> {
    /// Create a dispatcher over `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: ListenerProvider> Dispatcher<P> {
    /// Run every resolved listener against `event`, in order.
    ///
    /// # Errors
    ///
    /// Returns the first listener error unchanged; later listeners do not run.
    pub async fn dispatch(&self, event: &mut dyn Event) -> Result<(), BoxError> {
        let listeners = self.provider.listeners_for_event(event);

        for listener in &listeners {
            if event.is_propagation_stopped() {
                break;
            }
            listener.call(&mut *event).await?;
        }
        Ok(())
    }
}
