//! Radix-tree router backed by `matchit`.

use super::{
    Request,
    middleware::{BoxHandler, Handler},
    router::{Route, RouteParams, Router},
};
use ::http::Method;
use ::matchit::{InsertError, Match, Router as InnerRouter};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// A [`Router`] with one `matchit` tree per method.
///
/// Patterns use `matchit` syntax: `/users/{id}` and catch-alls such as
/// `/assets/{*path}`. Static segments take precedence over parameters.
#[derive(Default)]
pub struct MatchitRouter {
    trees: RwLock<HashMap<Method, InnerRouter<BoxHandler>>>,
}

impl MatchitRouter {
    /// An empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` and `path`.
    ///
    /// # Errors
    ///
    /// Fails when the pattern is malformed or conflicts with an existing one.
    pub fn route<H: Handler>(&self, method: Method, path: &str, handler: H) -> Result<&Self, InsertError> {
        self.trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(method)
            .or_insert_with(InnerRouter::new)
            .insert(path, Arc::new(handler) as BoxHandler)?;
        Ok(self)
    }
}

impl Router for MatchitRouter {
    fn find_route(&self, request: &Request) -> Option<Route> {
        let trees = self.trees.read().unwrap_or_else(PoisonError::into_inner);
        let Match { value, params } = trees.get(request.method())?.at(request.uri().path()).ok()?;

        let mut captured = RouteParams::new();
        for (name, capture) in params.iter() {
            captured.insert(name, capture);
        }
        Some(Route::new(Arc::clone(value), captured))
    }
}

impl std::fmt::Debug for MatchitRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let trees = self.trees.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MatchitRouter")
            .field("methods", &trees.keys().collect::<Vec<_>>())
            .finish()
    }
}
