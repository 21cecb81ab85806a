//! Application bootstrap.
//!
//! Construction is fixed: environment, container, event manager,
//! configuration, base bindings, then the core providers. Providers only
//! register during construction; [`Application::boot`] runs every boot step
//! once all of them are in place.
//!
//! ```rust,ignore
//! let app = Application::builder(".")
//!     .provider(CartProvider::default())
//!     .build()?;
//! app.register::<SearchProvider>(false)?;
//! app.boot()?;
//!
//! let response = app.kernel()?.handle(request).await?;
//! ```

mod provider;
mod providers;

pub use provider::{ProviderFactory, ServiceProvider};
pub use providers::{HttpProvider, LoggingProvider, RoutingProvider};

use crate::{
    config::Config,
    container::Container,
    env::{Environment, EnvironmentBuilder, ProcessEnv},
    error::{ProviderPhase, TesseraError},
    http::Kernel,
};
use std::{
    any::{Any, TypeId},
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc, PoisonError, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
};
use tessera_std::{EventDispatcher, EventManager, Events, InstrumentationConfig, InstrumentedEventManager};

/// The application as seen from inside the container.
///
/// Bound under the `app` alias. It holds the container weakly, so it does
/// not keep the application alive.
pub struct AppContext {
    base_path: PathBuf,
    environment: Arc<Environment>,
    config: Arc<Config>,
    events: Events,
    container: Weak<Container>,
}

impl AppContext {
    /// Application root.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolved environment.
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The event manager.
    pub fn events(&self) -> &Events {
        &self.events
    }

    /// The container, while the application is alive.
    pub fn container(&self) -> Option<Arc<Container>> {
        self.container.upgrade()
    }

    /// Weak handle to the container.
    pub fn container_handle(&self) -> Weak<Container> {
        Weak::clone(&self.container)
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("base_path", &self.base_path)
            .field("environment", &self.environment.name())
            .finish_non_exhaustive()
    }
}

struct Registered {
    type_id: TypeId,
    provider: Arc<dyn ServiceProvider>,
    any: Arc<dyn Any + Send + Sync>,
    booted: AtomicBool,
}

type CoreRegistration = Box<dyn FnOnce(&Application) -> Result<(), TesseraError> + Send>;

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Application`].
pub struct ApplicationBuilder {
    base_path: PathBuf,
    environment: EnvironmentBuilder,
    instrumentation: InstrumentationConfig,
    providers: Vec<CoreRegistration>,
}

impl ApplicationBuilder {
    fn new(base_path: PathBuf) -> Self {
        Self {
            environment: Environment::builder(base_path.clone()),
            base_path,
            instrumentation: InstrumentationConfig::default(),
            providers: Vec::new(),
        }
    }

    /// Command-line arguments used for `--env=<name>`.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environment = self.environment.args(args);
        self
    }

    /// Force console mode on or off instead of detecting it.
    pub fn console(mut self, console: bool) -> Self {
        self.environment = self.environment.console(console);
        self
    }

    /// Process environment layer.
    pub fn process(mut self, process: Arc<dyn ProcessEnv>) -> Self {
        self.environment = self.environment.process(process);
        self
    }

    /// Settings for the instrumented event manager used in debug mode.
    pub fn instrumentation(mut self, config: InstrumentationConfig) -> Self {
        self.instrumentation = config;
        self
    }

    /// Append a core provider, registered after the built-in ones.
    pub fn provider<P: ServiceProvider>(mut self, provider: P) -> Self {
        self.providers.push(Box::new(move |app: &Application| {
            app.register_instance(provider, false).map(drop)
        }));
        self
    }

    /// Construct the application and register the core providers.
    ///
    /// # Errors
    ///
    /// Env file, config file and provider registration failures.
    pub fn build(self) -> Result<Application, TesseraError> {
        let environment = Arc::new(self.environment.build()?);
        let container = Arc::new(Container::new());

        let events = if environment.is_debug() {
            let manager = Arc::new(InstrumentedEventManager::with_config(
                Arc::new(EventManager::new()),
                self.instrumentation,
            ));
            container.instance(Arc::clone(&manager));
            Events::from_arc(manager as Arc<dyn EventDispatcher>)
        } else {
            let manager = Arc::new(EventManager::new());
            container.instance(Arc::clone(&manager));
            Events::from_arc(manager as Arc<dyn EventDispatcher>)
        };

        let config = Arc::new(Config::load(&self.base_path, environment.name())?);

        let context = Arc::new(AppContext {
            base_path: self.base_path.clone(),
            environment: Arc::clone(&environment),
            config: Arc::clone(&config),
            events: events.clone(),
            container: Arc::downgrade(&container),
        });
        container.instance(context);
        container.instance(Arc::new(events.clone()));
        container.instance(Arc::clone(&config));
        container.instance(Arc::clone(&environment));
        container.alias::<AppContext>("app");
        container.alias::<Events>("events");
        container.alias::<Config>("config");
        container.alias::<Environment>("env");

        let app = Application {
            base_path: self.base_path,
            environment,
            container,
            events,
            config,
            providers: RwLock::new(Vec::new()),
            booted: AtomicBool::new(false),
        };

        app.register::<LoggingProvider>(false)?;
        app.register::<RoutingProvider>(false)?;
        app.register::<HttpProvider>(false)?;
        for register in self.providers {
            register(&app)?;
        }

        tracing::info!(
            environment = app.environment.name(),
            debug = app.environment.is_debug(),
            providers = app.providers_len(),
            "application created"
        );
        Ok(app)
    }
}

// ============================================================================
// Application
// ============================================================================

/// The composition root: environment, configuration, container, events and
/// service providers.
pub struct Application {
    base_path: PathBuf,
    environment: Arc<Environment>,
    container: Arc<Container>,
    events: Events,
    config: Arc<Config>,
    providers: RwLock<Vec<Registered>>,
    booted: AtomicBool,
}

impl Application {
    /// Build with defaults.
    ///
    /// # Errors
    ///
    /// See [`ApplicationBuilder::build`].
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, TesseraError> {
        Self::builder(base_path).build()
    }

    /// Start configuring an application rooted at `base_path`.
    pub fn builder(base_path: impl Into<PathBuf>) -> ApplicationBuilder {
        ApplicationBuilder::new(base_path.into())
    }

    /// Register provider `P`, built with [`ProviderFactory::create`].
    ///
    /// Without `force`, an already registered `P` is returned unchanged.
    /// When the application has booted, the new provider boots right away.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Provider`] if `register` or the late `boot` fails.
    pub fn register<P: ProviderFactory>(&self, force: bool) -> Result<Arc<P>, TesseraError> {
        if !force {
            if let Some(existing) = self.provider::<P>() {
                return Ok(existing);
            }
        }
        self.add(Arc::new(P::create(&self.container)))
    }

    /// Register an already constructed provider.
    ///
    /// Same rules as [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// [`TesseraError::Provider`] if `register` or the late `boot` fails.
    pub fn register_instance<P: ServiceProvider>(
        &self,
        provider: P,
        force: bool,
    ) -> Result<Arc<P>, TesseraError> {
        if !force {
            if let Some(existing) = self.provider::<P>() {
                return Ok(existing);
            }
        }
        self.add(Arc::new(provider))
    }

    fn add<P: ServiceProvider>(&self, provider: Arc<P>) -> Result<Arc<P>, TesseraError> {
        provider
            .register(&self.container)
            .map_err(|source| TesseraError::Provider {
                provider: provider.name(),
                phase: ProviderPhase::Register,
                source,
            })?;
        tracing::debug!(provider = provider.name(), "provider registered");

        let entry = Registered {
            type_id: TypeId::of::<P>(),
            provider: Arc::clone(&provider) as Arc<dyn ServiceProvider>,
            any: Arc::clone(&provider) as Arc<dyn Any + Send + Sync>,
            booted: AtomicBool::new(false),
        };
        if self.is_booted() {
            self.boot_one(&entry)?;
        }
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(provider)
    }

    fn boot_one(&self, entry: &Registered) -> Result<(), TesseraError> {
        if entry.booted.load(Ordering::Acquire) {
            return Ok(());
        }
        entry
            .provider
            .boot(&self.container)
            .map_err(|source| TesseraError::Provider {
                provider: entry.provider.name(),
                phase: ProviderPhase::Boot,
                source,
            })?;
        entry.booted.store(true, Ordering::Release);
        tracing::debug!(provider = entry.provider.name(), "provider booted");
        Ok(())
    }

    /// Boot every registered provider in registration order.
    ///
    /// Runs once; later calls are no-ops. A failed boot leaves the
    /// application unbooted, and a retry skips providers that already booted.
    ///
    /// # Errors
    ///
    /// The first [`TesseraError::Provider`] raised by a `boot` step.
    pub fn boot(&self) -> Result<(), TesseraError> {
        if self.is_booted() {
            return Ok(());
        }
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        for entry in providers.iter() {
            self.boot_one(entry)?;
        }
        drop(providers);

        self.booted.store(true, Ordering::Release);
        tracing::info!(providers = self.providers_len(), "application booted");
        Ok(())
    }

    /// Whether [`boot`](Self::boot) completed.
    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    /// The first registered provider of type `P`.
    pub fn provider<P: ServiceProvider>(&self) -> Option<Arc<P>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| entry.type_id == TypeId::of::<P>())
            .and_then(|entry| Arc::clone(&entry.any).downcast::<P>().ok())
    }

    /// Names of every registered provider, in registration order.
    pub fn registered_providers(&self) -> Vec<&'static str> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| entry.provider.name())
            .collect()
    }

    /// Names of the providers that have booted.
    pub fn loaded_providers(&self) -> Vec<&'static str> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.booted.load(Ordering::Acquire))
            .map(|entry| entry.provider.name())
            .collect()
    }

    fn providers_len(&self) -> usize {
        self.providers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Application root.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The service container.
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// The event manager.
    pub fn events(&self) -> &Events {
        &self.events
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Resolved environment.
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// The instrumented event manager, when running in debug mode.
    pub fn instrumentation(&self) -> Option<Arc<InstrumentedEventManager>> {
        self.container.get::<InstrumentedEventManager>()
    }

    /// The HTTP kernel bound by [`HttpProvider`].
    ///
    /// # Errors
    ///
    /// If no kernel is bound.
    pub fn kernel(&self) -> Result<Arc<Kernel>, TesseraError> {
        self.container
            .get::<Kernel>()
            .ok_or_else(|| TesseraError::Missing(std::any::type_name::<Kernel>()))
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("base_path", &self.base_path)
            .field("environment", &self.environment.name())
            .field("providers", &self.registered_providers())
            .field("booted", &self.is_booted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;
    use tessera_core::BoxError;

    fn app(process: MapEnv) -> (tempfile::TempDir, Application) {
        let dir = tempfile::tempdir().unwrap();
        let app = Application::builder(dir.path())
            .args(Vec::<String>::new())
            .process(Arc::new(process))
            .build()
            .unwrap();
        (dir, app)
    }

    #[derive(Debug)]
    struct Failing;

    impl ServiceProvider for Failing {
        fn register(&self, _container: &Container) -> Result<(), BoxError> {
            Err("no database".into())
        }
    }

    #[test]
    fn core_bindings_and_providers_are_in_place() {
        let (_dir, app) = app(MapEnv::new());
        let container = app.container();

        assert!(container.has::<Events>());
        assert!(container.has::<EventManager>());
        assert!(container.has::<Config>());
        assert!(container.get_by_alias::<Environment>("env").is_some());
        assert_eq!(
            container.get_by_alias::<AppContext>("app").unwrap().base_path(),
            app.base_path()
        );
        assert_eq!(app.registered_providers(), vec!["logging", "routing", "http"]);
        assert!(app.loaded_providers().is_empty());
        assert!(app.instrumentation().is_none());
        assert!(!app.kernel().unwrap().diagnostics());
    }

    #[test]
    fn debug_mode_selects_the_instrumented_manager() {
        let (_dir, app) = app(MapEnv::new().with_var("APP_DEBUG", "true"));
        assert!(app.instrumentation().is_some());
        assert!(!app.container().has::<EventManager>());
    }

    #[test]
    fn registration_errors_name_the_provider() {
        let (_dir, app) = app(MapEnv::new());
        let err = app.register_instance(Failing, false).unwrap_err();

        assert!(matches!(
            err,
            TesseraError::Provider { phase: ProviderPhase::Register, .. }
        ));
        assert_eq!(app.registered_providers().len(), 3);
    }
}
