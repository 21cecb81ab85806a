//! Structured HTTP errors and the error response renderer.

use super::{Body, Response};
use ::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE};
use serde_json::{Map, Value, json};
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    error::Error as StdError,
    panic::Location,
};
use tessera_core::BoxError;
use thiserror::Error;

const TRACE_DEPTH: usize = 5;

/// An error with an explicit status code and response headers.
///
/// The source location is captured where the error is constructed, along
/// with a backtrace when `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE` enables one.
///
/// ```rust,ignore
/// return Err(HttpError::forbidden("blocked")
///     .with_header(HeaderName::from_static("x-reason"), HeaderValue::from_static("blocked"))
///     .into());
/// ```
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
    location: &'static Location<'static>,
    backtrace: Box<Backtrace>,
    #[source]
    source: Option<BoxError>,
}

impl HttpError {
    /// An error with `status` and `message`.
    #[track_caller]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: HeaderMap::new(),
            location: Location::caller(),
            backtrace: Box::new(Backtrace::capture()),
            source: None,
        }
    }

    /// `400 Bad Request`.
    #[track_caller]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// `401 Unauthorized`.
    #[track_caller]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// `403 Forbidden`.
    #[track_caller]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// `404 Not Found`.
    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Add a response header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Client-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the error was constructed.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Call stack at construction. Disabled unless the environment asks
    /// for backtraces.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

/// Render `error` as a JSON error response.
///
/// [`HttpError`] supplies status and headers; anything else is a 500. With
/// `diagnostics` on, the body also carries `file`, `line` and `trace`.
pub fn error_response(error: &(dyn StdError + Send + Sync + 'static), diagnostics: bool) -> Response {
    let http_error = error.downcast_ref::<HttpError>();
    let status = http_error.map_or(StatusCode::INTERNAL_SERVER_ERROR, HttpError::status);

    let mut message = error.to_string();
    if message.is_empty() {
        message = status
            .canonical_reason()
            .unwrap_or("Internal Server Error")
            .to_string();
    }

    let mut body = Map::new();
    body.insert("error".into(), Value::String(message));
    body.insert("code".into(), json!(status.as_u16()));
    if diagnostics {
        let (file, line) = http_error.map_or(("<unknown>", 0), |e| {
            (e.location().file(), e.location().line())
        });
        body.insert("file".into(), json!(file));
        body.insert("line".into(), json!(line));
        body.insert("trace".into(), json!(trace(error)));
    }

    let mut response = Response::new(serde_json::to_vec(&Value::Object(body)).unwrap_or_default());
    *response.status_mut() = status;
    if let Some(http_error) = http_error {
        for (name, value) in http_error.headers() {
            response.headers_mut().append(name.clone(), value.clone());
        }
    }
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// At most [`TRACE_DEPTH`] entries: the call frames of an [`HttpError`]'s
/// captured backtrace, otherwise the error followed by its causes.
fn trace(error: &(dyn StdError + 'static)) -> Vec<String> {
    if let Some(captured) = error
        .downcast_ref::<HttpError>()
        .map(HttpError::backtrace)
        .filter(|backtrace| backtrace.status() == BacktraceStatus::Captured)
    {
        let frames = call_frames(&captured.to_string());
        if !frames.is_empty() {
            return frames;
        }
    }

    let mut frames = Vec::new();
    let mut current = Some(error);
    while let Some(err) = current {
        if frames.len() == TRACE_DEPTH {
            break;
        }
        frames.push(err.to_string());
        current = err.source();
    }
    frames
}

/// Symbol names from a rendered backtrace, minus std and capture frames.
fn call_frames(rendered: &str) -> Vec<String> {
    rendered
        .lines()
        .filter_map(|line| {
            let (index, symbol) = line.trim_start().split_once(": ")?;
            index.parse::<usize>().ok()?;
            Some(symbol.trim())
        })
        .filter(|symbol| !is_capture_frame(symbol))
        .take(TRACE_DEPTH)
        .map(str::to_string)
        .collect()
}

fn is_capture_frame(symbol: &str) -> bool {
    ["std::", "core::", "<std::", "<core::", "tessera::http::error::HttpError::"]
        .iter()
        .any(|prefix| symbol.starts_with(prefix))
}

/// Shorthand for an empty `404` response.
pub(crate) fn not_found() -> Response {
    let mut response = Response::new(Body::new());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Error, Debug)]
    #[error("layer {depth}")]
    struct Layered {
        depth: usize,
        #[source]
        source: Option<Box<Layered>>,
    }

    fn layered(depth: usize) -> Layered {
        Layered {
            depth,
            source: (depth > 0).then(|| Box::new(layered(depth - 1))),
        }
    }

    fn body(response: &Response) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn http_error_keeps_status_and_headers() {
        let error = HttpError::forbidden("blocked")
            .with_header(HeaderName::from_static("x-reason"), HeaderValue::from_static("blocked"));
        let response = error_response(&error, false);

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["x-reason"], "blocked");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body(&response), json!({"error": "blocked", "code": 403}));
    }

    #[test]
    fn other_errors_are_internal() {
        let error: BoxError = "database unavailable".into();
        let response = error_response(&*error, false);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&response), json!({"error": "database unavailable", "code": 500}));
    }

    #[test]
    fn empty_messages_fall_back_to_the_reason_phrase() {
        let response = error_response(&HttpError::new(StatusCode::CONFLICT, ""), false);
        assert_eq!(body(&response)["error"], "Conflict");
    }

    #[test]
    fn diagnostics_include_location_and_bounded_trace() {
        let mut error = HttpError::bad_request("invalid cart").with_source(layered(9));
        error.backtrace = Box::new(Backtrace::disabled());
        let line = error.location().line();
        let response = error_response(&error, true);
        let body = body(&response);

        assert_eq!(body["file"], json!(file!()));
        assert_eq!(body["line"], json!(line));
        let trace = body["trace"].as_array().unwrap();
        assert_eq!(trace.len(), 5);
        assert_eq!(trace[0], "invalid cart");
        assert_eq!(trace[1], "layer 9");
    }

    #[test]
    fn captured_backtraces_become_the_trace() {
        let mut error = HttpError::bad_request("invalid cart").with_source(layered(2));
        error.backtrace = Box::new(Backtrace::force_capture());
        let body = body(&error_response(&error, true));

        let trace = body["trace"].as_array().unwrap();
        assert!(!trace.is_empty() && trace.len() <= 5);
        assert_ne!(trace[0], "invalid cart");
        assert!(trace.iter().all(|frame| !frame.as_str().unwrap().starts_with("std::")));
        assert!(
            trace
                .iter()
                .any(|frame| frame.as_str().unwrap().contains("captured_backtraces_become_the_trace"))
        );
    }

    #[test]
    fn call_frames_skip_capture_machinery() {
        let rendered = "   0: std::backtrace_rs::backtrace::libunwind::trace
             at /rustc/library/std/src/../../backtrace/src/backtrace/libunwind.rs:116:5
   1: std::backtrace::Backtrace::create
   2: tessera::http::error::HttpError::new
   3: shop::checkout::submit
             at ./src/checkout.rs:40:9
   4: shop::main
";
        assert_eq!(call_frames(rendered), vec!["shop::checkout::submit", "shop::main"]);
    }

    #[test]
    fn diagnostics_for_foreign_errors_have_no_location() {
        let error: BoxError = "boom".into();
        let body = body(&error_response(&*error, true));
        assert_eq!(body["file"], "<unknown>");
        assert_eq!(body["line"], 0);
        assert_eq!(body["trace"], json!(["boom"]));
    }
}
