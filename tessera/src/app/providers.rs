//! Core providers registered by every application.

use super::{AppContext, ProviderFactory, ServiceProvider};
use crate::{
    container::Container,
    env::Environment,
    http::{Kernel, RouteTable},
};
use std::sync::Arc;
use tessera_core::BoxError;
use tessera_std::Events;
use tracing_subscriber::{EnvFilter, fmt};

fn require<T: Send + Sync + 'static>(container: &Container) -> Result<Arc<T>, BoxError> {
    container
        .get::<T>()
        .ok_or_else(|| format!("`{}` is not bound", std::any::type_name::<T>()).into())
}

// ============================================================================
// Logging
// ============================================================================

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `LOG_LEVEL`, falling back to `debug` when
/// `APP_DEBUG` is on and `info` otherwise. A subscriber installed earlier by
/// the host is left in place.
#[derive(Debug, Default)]
pub struct LoggingProvider;

impl LoggingProvider {
    /// The filter directive for `environment`.
    pub fn directive(environment: &Environment) -> String {
        environment.get("LOG_LEVEL").unwrap_or_else(|| {
            let level = if environment.is_debug() { "debug" } else { "info" };
            level.to_string()
        })
    }
}

impl ServiceProvider for LoggingProvider {
    fn register(&self, container: &Container) -> Result<(), BoxError> {
        let environment = require::<Environment>(container)?;
        let directive = Self::directive(&environment);
        let filter = EnvFilter::try_new(&directive)?;

        if fmt().with_env_filter(filter).try_init().is_err() {
            tracing::debug!("global subscriber already installed");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}

impl ProviderFactory for LoggingProvider {
    fn create(_container: &Container) -> Self {
        Self
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Binds the application's [`RouteTable`].
#[derive(Debug, Default)]
pub struct RoutingProvider;

impl ServiceProvider for RoutingProvider {
    fn register(&self, container: &Container) -> Result<(), BoxError> {
        if !container.has::<RouteTable>() {
            container.instance(Arc::new(RouteTable::new()));
        }
        container.alias::<RouteTable>("router");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "routing"
    }
}

impl ProviderFactory for RoutingProvider {
    fn create(_container: &Container) -> Self {
        Self
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Binds the [`Kernel`], built on first use.
#[derive(Debug, Default)]
pub struct HttpProvider;

impl ServiceProvider for HttpProvider {
    fn register(&self, container: &Container) -> Result<(), BoxError> {
        let router = require::<RouteTable>(container)?;
        let events = require::<Events>(container)?;
        let context = require::<AppContext>(container)?;

        container.singleton(move |_: &Container| {
            Kernel::new(
                Arc::clone(&router) as Arc<dyn crate::http::Router>,
                Events::clone(&events),
                context.container_handle(),
                context.environment().name(),
            )
        });
        container.alias::<Kernel>("kernel");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

impl ProviderFactory for HttpProvider {
    fn create(_container: &Container) -> Self {
        Self
    }
}
