//! # tessera - Event Dispatch Core and HTTP Request Kernel
//!
//! `tessera` is the runtime spine of a modular web application: a typed
//! event system with hierarchical listener resolution, an application
//! bootstrap built from service providers, and an HTTP kernel that runs
//! requests through a middleware onion while emitting lifecycle events.
//!
//! ## Events
//!
//! ```rust,ignore
//! use tessera::prelude::*;
//!
//! #[derive(Event)]
//! #[event(interfaces("Auditable"))]
//! struct OrderPlaced {
//!     id: u64,
//!     #[event(propagation)]
//!     propagation: Propagation,
//! }
//!
//! let events = Events::new(EventManager::new());
//! events.listen(|order: &mut OrderPlaced| {
//!     tracing::info!(id = order.id, "order placed");
//!     Ok(())
//! }, 10);
//! let order = events.dispatch(OrderPlaced { id: 7, propagation: Propagation::new() }).await?;
//! ```
//!
//! Listeners registered for an event's own tag run first, then those for
//! its ancestors (nearest first), then those for its interfaces. Within a
//! tier, higher priority runs first.
//!
//! ## Application
//!
//! ```rust,ignore
//! let app = Application::new(".")?;
//! app.boot()?;
//! let response = app.kernel()?.handle(request).await?;
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod container;
pub mod env;
pub mod error;
pub mod http;

pub use tessera_core::{
    AsAny, BoxError, BoxFuture, DynListener, Event, Listener, ListenerError, ListenerId,
    ListenerProvider, ListenerRef, NamedEvent, Propagation, Subscriber, SubscriberMethod,
    Subscription,
};

pub use tessera_std::{
    Dispatcher, EventDispatcher, EventDispatcherExt, EventManager, Events, InstrumentationConfig,
    InstrumentedEventManager, ListenerRegistry,
};

pub use app::{AppContext, Application, ApplicationBuilder, ProviderFactory, ServiceProvider};
pub use config::{Config, ConfigError};
pub use container::{Container, Scope};
pub use env::{EnvError, Environment};
pub use error::{ProviderPhase, TesseraError};

#[cfg(feature = "macros")]
pub use tessera_macros::Event;

/// Metrics types of the instrumented event manager.
pub mod instrumented {
    #![allow(clippy::wildcard_imports)]
    pub use tessera_std::instrumented::*;
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use tessera_std::testing::*;
}

/// Prelude module - common imports for Tessera.
///
/// ```rust,ignore
/// use tessera::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Application, BoxError, Container, Event, EventDispatcher, EventDispatcherExt, EventManager,
        Events, Listener, ListenerRef, NamedEvent, Propagation, ServiceProvider, Subscriber,
        Subscription,
        http::{HttpError, Kernel, Middleware, Next, Request, Response},
    };
}
