//! # tessera-std
//!
//! Standard implementations for the Tessera event dispatch core.
//!
//! This crate provides:
//! - **Registry**: [`ListenerRegistry`], listeners keyed by tag and priority
//! - **Dispatch**: [`Dispatcher`], sequential and stop-aware
//! - **Manager**: [`EventManager`] behind the object-safe [`EventDispatcher`]
//! - **Instrumentation**: [`InstrumentedEventManager`], timing and memory metrics
//! - **Testing**: helpers in [`testing`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use tessera_core;

// Modules
pub mod dispatcher;
pub mod instrumented;
pub mod manager;
pub mod registry;
pub mod testing;

pub use dispatcher::Dispatcher;
pub use instrumented::{InstrumentationConfig, InstrumentedEventManager};
pub use manager::{EventDispatcher, EventDispatcherExt, EventManager, Events};
pub use registry::ListenerRegistry;
