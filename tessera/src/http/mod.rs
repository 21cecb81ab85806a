//! HTTP request kernel.
//!
//! Requests and responses are [`http`](::http) types over an in-memory
//! body. The [`Kernel`] routes a request, runs it through the middleware
//! [`Pipeline`], maps failures to JSON error responses and emits the
//! lifecycle events in [`events`].

mod error;
pub mod events;
mod kernel;
mod middleware;
mod router;

#[cfg(feature = "matchit")]
mod matchit;
#[cfg(feature = "tower")]
mod tower;

pub use error::{HttpError, error_response};
pub use kernel::Kernel;
pub use middleware::{
    BoxHandler, BoxMiddleware, DynHandler, DynMiddleware, Handler, Middleware, Next, Pipeline,
};
pub use router::{Route, RouteParams, RouteTable, Router};

#[cfg(feature = "matchit")]
pub use self::matchit::MatchitRouter;
#[cfg(feature = "tower")]
pub use self::tower::KernelService;

use ::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, Version, header::CONTENT_TYPE};
use serde::Serialize;

/// In-memory request and response body.
pub type Body = Vec<u8>;

/// Inbound request.
pub type Request = ::http::Request<Body>;

/// Outbound response.
pub type Response = ::http::Response<Body>;

/// Snapshot of the request being handled.
///
/// Bound into the container for the duration of [`Kernel::handle`] and
/// inserted into the request extensions.
#[derive(Debug, Clone)]
pub struct CurrentRequest {
    /// Request method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// HTTP version.
    pub version: Version,
    /// Request headers.
    pub headers: HeaderMap,
}

impl CurrentRequest {
    /// Snapshot `request`.
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }

    /// The request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// A `text/plain` response.
pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    with_content_type(status, body.into().into_bytes(), "text/plain; charset=utf-8")
}

/// An `application/json` response.
///
/// # Errors
///
/// Fails if `value` cannot be serialized.
pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<Response, serde_json::Error> {
    Ok(with_content_type(status, serde_json::to_vec(value)?, "application/json"))
}

fn with_content_type(status: StatusCode, body: Body, content_type: &'static str) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
