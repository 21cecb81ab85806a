//! Error types for Tessera's event core.
//!
//! Listener and handler failures travel as [`BoxError`] so that the caller
//! sees exactly what the listener raised. The enums here cover the few
//! failures the core itself can produce.

use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by listeners built on top of the core adapters.
#[derive(Error, Debug)]
pub enum ListenerError {
    /// A subscriber was asked to run a method it does not declare.
    #[error("subscriber `{subscriber}` has no handler method `{method}`")]
    UnknownMethod {
        /// Subscriber type name.
        subscriber: &'static str,
        /// Requested method.
        method: String,
    },

    /// A subscriber method received an event it cannot handle.
    #[error("`{listener}` cannot handle event `{event}`")]
    UnexpectedEvent {
        /// Listener label.
        listener: String,
        /// Dispatched event name.
        event: &'static str,
    },
}

impl ListenerError {
    /// Convenience for subscriber `handle` implementations.
    pub fn unknown_method(subscriber: &'static str, method: &str) -> Self {
        Self::UnknownMethod {
            subscriber,
            method: method.to_string(),
        }
    }

    /// Convenience for listeners handed an event they do not expect.
    pub fn unexpected_event(listener: impl Into<String>, event: &'static str) -> Self {
        Self::UnexpectedEvent {
            listener: listener.into(),
            event,
        }
    }
}
