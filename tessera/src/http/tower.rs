//! Tower integration.
//!
//! [`KernelService`] exposes a [`Kernel`] as a `tower::Service`, so it can be
//! wrapped in tower layers or mounted in any tower-based server.
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .concurrency_limit(64)
//!     .service(KernelService::new(app.kernel()?));
//! ```

use super::{CurrentRequest, Kernel, Request, Response, events::RequestTerminated};
use futures::future::BoxFuture;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tessera_core::BoxError;
use tokio::runtime::Handle;

/// A [`Kernel`] as a `tower::Service`.
///
/// Each call resolves as soon as the kernel produced the response.
/// `RequestTerminated` is then dispatched on a spawned task, and a listener
/// failure there is logged without touching the response.
#[derive(Clone, Debug)]
pub struct KernelService {
    kernel: Arc<Kernel>,
}

impl KernelService {
    /// Serve requests with `kernel`.
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }

    /// The wrapped kernel.
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }
}

async fn finish(kernel: Arc<Kernel>, event: RequestTerminated) {
    let path = event.request.path().to_string();
    if let Err(error) = kernel.finish(event).await {
        tracing::error!(error = %error, path = %path, "request termination failed");
    }
}

impl ::tower::Service<Request> for KernelService {
    type Response = Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Response, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let kernel = Arc::clone(&self.kernel);
        Box::pin(async move {
            let current = CurrentRequest::from_request(&request);
            let response = kernel.handle(request).await?;

            let event = RequestTerminated::new(current, &response);
            match Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(finish(kernel, event));
                }
                // No runtime to hand the work to, so it runs before returning.
                Err(_) => finish(kernel, event).await,
            }
            Ok(response)
        })
    }
}
