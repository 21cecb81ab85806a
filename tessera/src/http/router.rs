//! Route lookup.
//!
//! The kernel only needs [`Router::find_route`]. [`RouteTable`] is a small
//! method + path table with `{name}` segment parameters; the `matchit`
//! feature adds a radix-tree backed alternative.

use super::{
    Request,
    middleware::{BoxHandler, Handler},
};
use ::http::Method;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// Path parameters captured by a route match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(BTreeMap<String, String>);

impl RouteParams {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The value captured for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Record a capture.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over captures in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A matched route: the endpoint plus captured parameters.
#[derive(Clone)]
pub struct Route {
    handler: BoxHandler,
    params: RouteParams,
}

impl Route {
    /// A route for `handler` with `params`.
    pub fn new(handler: BoxHandler, params: RouteParams) -> Self {
        Self { handler, params }
    }

    /// The endpoint.
    pub fn handler(&self) -> &BoxHandler {
        &self.handler
    }

    /// Captured parameters.
    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    pub(crate) fn into_parts(self) -> (BoxHandler, RouteParams) {
        (self.handler, self.params)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Resolves the route for a request.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Router`",
    label = "missing `Router` implementation",
    note = "Routers implement `find_route(&Request) -> Option<Route>`."
)]
pub trait Router: Send + Sync + 'static {
    /// The matching route, or `None` for a 404.
    fn find_route(&self, request: &Request) -> Option<Route>;
}

impl<R: Router + ?Sized> Router for Arc<R> {
    fn find_route(&self, request: &Request) -> Option<Route> {
        (**self).find_route(request)
    }
}

// ============================================================================
// RouteTable
// ============================================================================

enum Segment {
    Literal(String),
    Param(String),
}

struct Entry {
    method: Method,
    segments: Vec<Segment>,
    handler: BoxHandler,
}

impl Entry {
    fn matches(&self, method: &Method, path: &[&str]) -> Option<RouteParams> {
        if self.method != *method || self.segments.len() != path.len() {
            return None;
        }
        let mut params = RouteParams::new();
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(expected) if expected.as_str() == *actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.insert(name.as_str(), *actual),
            }
        }
        Some(params)
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Method + path route table. First registered match wins.
///
/// ```rust,ignore
/// let routes = RouteTable::new();
/// routes.add(Method::GET, "/products/{id}", show_product);
/// ```
#[derive(Default)]
pub struct RouteTable {
    entries: RwLock<Vec<Entry>>,
}

impl RouteTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` and `pattern`.
    pub fn add<H: Handler>(&self, method: Method, pattern: &str, handler: H) -> &Self {
        self.add_boxed(method, pattern, Arc::new(handler))
    }

    /// Register an already shared handler.
    pub fn add_boxed(&self, method: Method, pattern: &str, handler: BoxHandler) -> &Self {
        let segments = split(pattern)
            .into_iter()
            .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry {
                method,
                segments,
                handler,
            });
        self
    }

    /// `GET` shorthand.
    pub fn get<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.add(Method::GET, pattern, handler)
    }

    /// `POST` shorthand.
    pub fn post<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.add(Method::POST, pattern, handler)
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no route is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Router for RouteTable {
    fn find_route(&self, request: &Request) -> Option<Route> {
        let path = split(request.uri().path());
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find_map(|entry| {
                entry
                    .matches(request.method(), &path)
                    .map(|params| Route::new(Arc::clone(&entry.handler), params))
            })
    }
}
