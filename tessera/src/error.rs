//! Top-level error type for application bootstrap.

use crate::{config::ConfigError, env::EnvError};
use tessera_core::BoxError;
use thiserror::Error;

/// Errors raised while bootstrapping an [`Application`](crate::Application).
#[derive(Error, Debug)]
pub enum TesseraError {
    /// Environment files could not be loaded.
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Configuration files could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A service provider failed to register or boot.
    #[error("provider `{provider}` failed during {phase}")]
    Provider {
        /// Provider name.
        provider: &'static str,
        /// `register` or `boot`.
        phase: ProviderPhase,
        /// What the provider returned.
        #[source]
        source: BoxError,
    },

    /// A required service is not bound in the container.
    #[error("`{0}` is not bound in the container")]
    Missing(&'static str),
}

/// Lifecycle step a provider failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPhase {
    /// `ServiceProvider::register`.
    Register,
    /// `ServiceProvider::boot`.
    Boot,
}

impl std::fmt::Display for ProviderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Register => "register",
            Self::Boot => "boot",
        })
    }
}
