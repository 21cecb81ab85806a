//! Request lifecycle events.
//!
//! All four declare the `KernelEvent` interface tag, so one listener on that
//! tag observes the whole lifecycle. Stopping propagation only skips later
//! listeners; it never alters the kernel's flow.

use super::{CurrentRequest, Request, Response};
use ::http::{HeaderMap, StatusCode};
use tessera_core::{BoxError, Event, NamedEvent, Propagation};

/// Interface tag shared by every kernel lifecycle event.
pub const KERNEL_EVENT: &str = "KernelEvent";

macro_rules! kernel_event {
    ($ty:ident, $name:literal) => {
        impl Event for $ty {
            fn event_name(&self) -> &'static str {
                Self::NAME
            }

            fn declared_interfaces(&self) -> &'static [&'static str] {
                &[KERNEL_EVENT]
            }

            fn propagation(&self) -> Option<&Propagation> {
                Some(&self.propagation)
            }

            fn propagation_mut(&mut self) -> Option<&mut Propagation> {
                Some(&mut self.propagation)
            }
        }

        impl NamedEvent for $ty {
            const NAME: &'static str = $name;
        }
    };
}

/// Dispatched before routing, carrying the inbound request.
#[derive(Debug)]
pub struct RequestReceived {
    /// The request, as it will enter the pipeline.
    pub request: Request,
    propagation: Propagation,
}

impl RequestReceived {
    pub(crate) fn new(request: Request) -> Self {
        Self {
            request,
            propagation: Propagation::new(),
        }
    }

    pub(crate) fn into_request(self) -> Request {
        self.request
    }
}

kernel_event!(RequestReceived, "RequestReceived");

/// Dispatched after the pipeline produced a response.
#[derive(Debug)]
pub struct ResponsePrepared {
    /// The request snapshot.
    pub request: CurrentRequest,
    /// The response about to be returned.
    pub response: Response,
    propagation: Propagation,
}

impl ResponsePrepared {
    pub(crate) fn new(request: CurrentRequest, response: Response) -> Self {
        Self {
            request,
            response,
            propagation: Propagation::new(),
        }
    }

    pub(crate) fn into_response(self) -> Response {
        self.response
    }
}

kernel_event!(ResponsePrepared, "ResponsePrepared");

/// Dispatched when routing, the pipeline or `ResponsePrepared` failed.
#[derive(Debug)]
pub struct ExceptionOccurred {
    /// The request snapshot.
    pub request: CurrentRequest,
    error: BoxError,
    propagation: Propagation,
}

impl ExceptionOccurred {
    /// The failure about to be rendered. Listeners observe it but cannot
    /// replace it.
    pub fn error(&self) -> &BoxError {
        &self.error
    }

    pub(crate) fn new(request: CurrentRequest, error: BoxError) -> Self {
        Self {
            request,
            error,
            propagation: Propagation::new(),
        }
    }

    pub(crate) fn into_error(self) -> BoxError {
        self.error
    }
}

kernel_event!(ExceptionOccurred, "ExceptionOccurred");

/// Dispatched by [`Kernel::terminate`](super::Kernel::terminate) after the
/// response was sent.
#[derive(Debug)]
pub struct RequestTerminated {
    /// The request snapshot.
    pub request: CurrentRequest,
    /// Status that was sent.
    pub status: StatusCode,
    /// Headers that were sent.
    pub headers: HeaderMap,
    propagation: Propagation,
}

impl RequestTerminated {
    pub(crate) fn new(request: CurrentRequest, response: &Response) -> Self {
        Self {
            request,
            status: response.status(),
            headers: response.headers().clone(),
            propagation: Propagation::new(),
        }
    }
}

kernel_event!(RequestTerminated, "RequestTerminated");
