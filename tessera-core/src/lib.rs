//! # tessera-core
//!
//! Core traits for the Tessera event dispatch core.
//!
//! This crate has minimal dependencies and is meant to be imported by
//! modules and plugins that publish or consume events without depending on
//! a concrete dispatcher.
//!
//! # Building Blocks
//!
//! ## Events ([`Event`])
//!
//! Caller-defined values. The framework only sees their type tags: exact
//! name, ancestors (via embedded parent events) and interface tags. Events
//! that carry a [`Propagation`] flag are stoppable.
//!
//! ## Listeners ([`Listener`], [`DynListener`], [`ListenerRef`])
//!
//! Typed listeners are native `async fn`; registries store the erased form.
//! A [`ListenerRef`] is the handle used for registration and removal.
//!
//! ## Subscribers ([`Subscriber`])
//!
//! Objects that bind several event tags to their own methods in one call.
//!
//! ## Resolution ([`ListenerProvider`])
//!
//! The seam between a listener store and a dispatcher.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod error;
mod event;
mod listener;
mod provider;
mod subscriber;

// Re-exports
pub use error::{BoxError, ListenerError};
pub use event::{AsAny, Event, NamedEvent, Propagation};
pub use futures::future::BoxFuture;
pub use listener::{DynListener, Listener, ListenerId, ListenerRef};
pub use provider::ListenerProvider;
pub use subscriber::{Subscriber, SubscriberMethod, Subscription};
