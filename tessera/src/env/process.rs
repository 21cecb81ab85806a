//! Process-level environment variables.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

/// Serializes every [`SystemEnv`] access.
static PROCESS_ENV: RwLock<()> = RwLock::new(());

/// The process environment layer consulted by [`Environment`](super::Environment).
pub trait ProcessEnv: Send + Sync + 'static {
    /// Read a variable.
    fn var(&self, key: &str) -> Option<String>;

    /// Write a variable so that child processes inherit it.
    fn set_var(&self, key: &str, value: &str);

    /// Command-line arguments, program name first.
    fn args(&self) -> Vec<String>;
}

/// The real process environment.
///
/// Reads and writes made through this type are serialized with each other.
/// Code outside it that reads the environment (libc lookups, other crates)
/// is not, so writes belong to bootstrap, before worker threads start.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl ProcessEnv for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        let _guard = PROCESS_ENV.read().unwrap_or_else(PoisonError::into_inner);
        std::env::var(key).ok()
    }

    fn set_var(&self, key: &str, value: &str) {
        let _guard = PROCESS_ENV.write().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: the write lock excludes every `SystemEnv` reader. Readers
        // outside `SystemEnv` are the caller's concern: `Environment::set`
        // on the real process is documented as a bootstrap-time call.
        unsafe { std::env::set_var(key, value) }
    }

    fn args(&self) -> Vec<String> {
        std::env::args().collect()
    }
}

/// An in-memory process environment.
#[derive(Debug, Default)]
pub struct MapEnv {
    vars: RwLock<HashMap<String, String>>,
    args: Vec<String>,
}

impl MapEnv {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn with_var(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        self
    }

    /// Replace the command-line arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl ProcessEnv for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_var(&self, key: &str, value: &str) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn args(&self) -> Vec<String> {
        self.args.clone()
    }
}
