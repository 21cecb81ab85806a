//! Handlers, middleware and the onion pipeline.
//!
//! A [`Pipeline`] is built by folding the middleware list in reverse around
//! the route handler, so the first registered middleware is the outermost
//! layer: it runs first on the way in and last on the way out.

use super::{Request, Response};
use futures::future::BoxFuture;
use std::{fmt, future::Future, sync::Arc};
use tessera_core::BoxError;

// ============================================================================
// Handler
// ============================================================================

/// A route endpoint.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a route `Handler`",
    label = "missing `Handler` implementation",
    note = "Handlers are `async fn(Request) -> Result<Response, BoxError>` or implement `Handler`."
)]
pub trait Handler: Send + Sync + 'static {
    /// Produce the response for `request`.
    fn call(&self, request: Request) -> impl Future<Output = Result<Response, BoxError>> + Send;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, BoxError>> + Send,
{
    fn call(&self, request: Request) -> impl Future<Output = Result<Response, BoxError>> + Send {
        (self)(request)
    }
}

/// Object-safe [`Handler`].
pub trait DynHandler: Send + Sync + 'static {
    /// Produce the response for `request`.
    fn call_dyn(&self, request: Request) -> BoxFuture<'_, Result<Response, BoxError>>;
}

impl<H: Handler> DynHandler for H {
    fn call_dyn(&self, request: Request) -> BoxFuture<'_, Result<Response, BoxError>> {
        Box::pin(self.call(request))
    }
}

/// Shared, type-erased handler.
pub type BoxHandler = Arc<dyn DynHandler>;

// ============================================================================
// Middleware
// ============================================================================

/// A layer of the request pipeline.
///
/// ```rust,ignore
/// struct RequireToken;
///
/// impl Middleware for RequireToken {
///     async fn handle(&self, request: Request, next: Next) -> Result<Response, BoxError> {
///         if !request.headers().contains_key("x-token") {
///             return Err(HttpError::new(StatusCode::UNAUTHORIZED, "missing token").into());
///         }
///         next.run(request).await
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Middleware`",
    label = "missing `Middleware` implementation",
    note = "Middleware must implement `handle(request, next)`."
)]
pub trait Middleware: Send + Sync + 'static {
    /// Handle `request`, usually by calling `next.run(request)`.
    fn handle(
        &self,
        request: Request,
        next: Next,
    ) -> impl Future<Output = Result<Response, BoxError>> + Send;
}

/// Object-safe [`Middleware`].
pub trait DynMiddleware: Send + Sync + 'static {
    /// Handle `request`.
    fn handle_dyn(&self, request: Request, next: Next) -> BoxFuture<'_, Result<Response, BoxError>>;
}

impl<M: Middleware> DynMiddleware for M {
    fn handle_dyn(&self, request: Request, next: Next) -> BoxFuture<'_, Result<Response, BoxError>> {
        Box::pin(self.handle(request, next))
    }
}

/// Shared, type-erased middleware.
pub type BoxMiddleware = Arc<dyn DynMiddleware>;

type Layer = Arc<dyn Fn(Request) -> BoxFuture<'static, Result<Response, BoxError>> + Send + Sync>;

/// Everything inside the current middleware, down to the route handler.
#[derive(Clone)]
pub struct Next {
    inner: Layer,
}

impl Next {
    /// Run the rest of the pipeline.
    pub async fn run(self, request: Request) -> Result<Response, BoxError> {
        (self.inner)(request).await
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// A composed middleware stack around one endpoint.
#[derive(Clone)]
pub struct Pipeline {
    entry: Next,
}

impl Pipeline {
    /// Compose `middleware` around `endpoint`, first entry outermost.
    pub fn build(middleware: &[BoxMiddleware], endpoint: BoxHandler) -> Self {
        let innermost: Layer = Arc::new(
            move |request: Request| -> BoxFuture<'static, Result<Response, BoxError>> {
                let endpoint = Arc::clone(&endpoint);
                Box::pin(async move { endpoint.call_dyn(request).await })
            },
        );

        let entry = middleware.iter().rev().fold(innermost, |inner, layer| {
            let layer = Arc::clone(layer);
            let next = Next { inner };
            let wrapped: Layer = Arc::new(
                move |request: Request| -> BoxFuture<'static, Result<Response, BoxError>> {
                    let layer = Arc::clone(&layer);
                    let next = next.clone();
                    Box::pin(async move { layer.handle_dyn(request, next).await })
                },
            );
            wrapped
        });

        Self {
            entry: Next { inner: entry },
        }
    }

    /// Send `request` through the stack.
    ///
    /// # Errors
    ///
    /// Whatever a middleware or the endpoint returned.
    pub async fn run(&self, request: Request) -> Result<Response, BoxError> {
        self.entry.clone().run(request).await
    }
}
