//! The request kernel.

use super::{
    CurrentRequest, Request, Response,
    error::{error_response, not_found},
    events::{ExceptionOccurred, RequestReceived, RequestTerminated, ResponsePrepared},
    middleware::{BoxMiddleware, Middleware, Pipeline},
    router::Router,
};
use crate::container::{Container, Scope};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tessera_core::BoxError;
use tessera_std::{EventDispatcherExt, Events};
use tracing::Instrument;

/// Turns requests into responses.
///
/// For each request the kernel
///
/// 1. scopes a [`CurrentRequest`] binding to the call,
/// 2. dispatches [`RequestReceived`],
/// 3. resolves the route, answering an empty `404` when there is none,
/// 4. runs the middleware pipeline around the route handler,
/// 5. dispatches [`ResponsePrepared`].
///
/// Failures in steps 3 to 5 dispatch [`ExceptionOccurred`] and are rendered
/// by [`error_response`]. Listener errors for `RequestReceived` and
/// `ExceptionOccurred` are returned to the caller.
pub struct Kernel {
    router: Arc<dyn Router>,
    events: Events,
    container: Weak<Container>,
    diagnostics: bool,
    middleware: RwLock<Vec<BoxMiddleware>>,
}

impl Kernel {
    /// A kernel with no middleware.
    ///
    /// The container is held weakly since it usually owns the kernel.
    /// `environment` decides whether error bodies carry diagnostics: only
    /// `development` does.
    pub fn new(
        router: Arc<dyn Router>,
        events: Events,
        container: Weak<Container>,
        environment: &str,
    ) -> Self {
        Self {
            router,
            events,
            container,
            diagnostics: environment == "development",
            middleware: RwLock::new(Vec::new()),
        }
    }

    /// Append `middleware`. Earlier entries wrap later ones.
    pub fn push_middleware<M: Middleware>(&self, middleware: M) -> &Self {
        self.push_boxed(Arc::new(middleware))
    }

    /// Append already shared middleware.
    pub fn push_boxed(&self, middleware: BoxMiddleware) -> &Self {
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
        self
    }

    /// Number of registered middleware.
    pub fn middleware_len(&self) -> usize {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether error bodies include file, line and trace.
    pub fn diagnostics(&self) -> bool {
        self.diagnostics
    }

    /// Handle one request.
    ///
    /// # Errors
    ///
    /// Only listener failures for [`RequestReceived`] or
    /// [`ExceptionOccurred`]. Everything else becomes an error response.
    pub async fn handle(&self, request: Request) -> Result<Response, BoxError> {
        let current = CurrentRequest::from_request(&request);
        let span = tracing::info_span!(
            "http.request",
            method = %current.method,
            path = current.path(),
            status = tracing::field::Empty,
        );

        async {
            let run = self.run(request, &current);
            let result = match self.container.upgrade() {
                Some(container) => {
                    let scope = Scope::new().with(Arc::new(current.clone()));
                    container.scoped(scope, run).await
                }
                None => run.await,
            };

            let response = result?;
            tracing::Span::current().record("status", response.status().as_u16());
            Ok(response)
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: Request, current: &CurrentRequest) -> Result<Response, BoxError> {
        let received = self.events.dispatch(RequestReceived::new(request)).await?;
        let request = received.into_request();

        match self.respond(request, current).await {
            Ok(response) => Ok(response),
            Err(error) => {
                tracing::error!(error = %error, path = current.path(), "request failed");
                let occurred = self
                    .events
                    .dispatch(ExceptionOccurred::new(current.clone(), error))
                    .await?;
                Ok(error_response(&*occurred.into_error(), self.diagnostics))
            }
        }
    }

    async fn respond(
        &self,
        mut request: Request,
        current: &CurrentRequest,
    ) -> Result<Response, BoxError> {
        let Some(route) = self.router.find_route(&request) else {
            tracing::debug!(path = current.path(), "no route matched");
            return Ok(not_found());
        };

        let (handler, params) = route.into_parts();
        request.extensions_mut().insert(params);
        request.extensions_mut().insert(current.clone());

        let stack = self
            .middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let response = Pipeline::build(&stack, handler).run(request).await?;

        let prepared = self
            .events
            .dispatch(ResponsePrepared::new(current.clone(), response))
            .await?;
        Ok(prepared.into_response())
    }

    /// Dispatch [`RequestTerminated`] once the response has been sent.
    ///
    /// # Errors
    ///
    /// The first listener error.
    pub async fn terminate(&self, request: &CurrentRequest, response: &Response) -> Result<(), BoxError> {
        self.finish(RequestTerminated::new(request.clone(), response))
            .await
    }

    pub(crate) async fn finish(&self, event: RequestTerminated) -> Result<(), BoxError> {
        self.events.dispatch(event).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("diagnostics", &self.diagnostics)
            .field("middleware", &self.middleware_len())
            .finish_non_exhaustive()
    }
}
