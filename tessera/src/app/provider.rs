//! Service provider contract.

use crate::container::Container;
use tessera_core::BoxError;

/// A unit of bootstrap work.
///
/// Providers run in two phases. Every provider [`register`](Self::register)s
/// its bindings first; only then does each one [`boot`](Self::boot), so a
/// provider may rely on bindings contributed by providers registered after
/// it.
///
/// ```rust,ignore
/// struct CartProvider;
///
/// impl ServiceProvider for CartProvider {
///     fn register(&self, container: &Container) -> Result<(), BoxError> {
///         container.singleton(|_| CartService::default());
///         Ok(())
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `ServiceProvider`",
    label = "missing `ServiceProvider` implementation",
    note = "Providers implement `register(&self, &Container)` and optionally `boot`."
)]
pub trait ServiceProvider: Send + Sync + 'static {
    /// Contribute container bindings.
    ///
    /// # Errors
    ///
    /// Aborts the registration; the provider is not recorded.
    fn register(&self, container: &Container) -> Result<(), BoxError>;

    /// Finish setup once every provider registered.
    ///
    /// # Errors
    ///
    /// Aborts booting; later providers are not booted.
    fn boot(&self, container: &Container) -> Result<(), BoxError> {
        let _ = container;
        Ok(())
    }

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A provider the application can construct on its own.
pub trait ProviderFactory: ServiceProvider + Sized {
    /// Build the provider, reading whatever it needs from `container`.
    fn create(container: &Container) -> Self;
}
