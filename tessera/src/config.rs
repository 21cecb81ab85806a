//! Configuration repository.
//!
//! Every `<base>/config/*.json` file becomes a top-level key named after
//! the file stem. Files under `<base>/config/<environment>/` are then merged
//! over them: objects merge key by key, any other value replaces.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};
use thiserror::Error;

/// Errors raised while loading configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A config file or directory could not be read.
    #[error("failed to read config `{}`", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A config file is not valid JSON.
    #[error("invalid JSON in config file `{}`", path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
}

/// Dotted-path key/value store over JSON values.
#[derive(Debug, Default)]
pub struct Config {
    environment: String,
    root: RwLock<Map<String, Value>>,
}

impl Config {
    /// An empty configuration for `environment`.
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            root: RwLock::default(),
        }
    }

    /// Load `<base>/config` and its `<environment>` overlay.
    ///
    /// A missing directory yields an empty configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] for unreadable files, [`ConfigError::Parse`] for
    /// malformed JSON.
    pub fn load(base_path: &Path, environment: &str) -> Result<Self, ConfigError> {
        let dir = base_path.join("config");
        let mut root = Map::new();

        for (key, value) in read_dir(&dir)? {
            root.insert(key, value);
        }
        for (key, value) in read_dir(&dir.join(environment))? {
            match root.get_mut(&key) {
                Some(existing) => merge(existing, value),
                None => {
                    root.insert(key, value);
                }
            }
        }

        tracing::debug!(environment, files = root.len(), "configuration loaded");
        Ok(Self {
            environment: environment.to_string(),
            root: RwLock::new(root),
        })
    }

    /// The environment this configuration was loaded for.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The value at `path` (`"database.connections.main.host"`).
    pub fn get(&self, path: &str) -> Option<Value> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        let mut segments = path.split('.');
        let first = root.get(segments.next()?)?;
        segments
            .try_fold(first, |value, segment| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
            .cloned()
    }

    /// The value at `path`, deserialized.
    ///
    /// Returns `None` when the path is absent or the value has another shape.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.get(path)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Whether `path` holds a value.
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set the value at `path`, creating intermediate objects.
    pub fn set(&self, path: &str, value: impl Into<Value>) {
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else {
            return;
        };

        let mut current = &mut *root;
        for segment in segments {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(map) = slot else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value.into());
    }

    /// Snapshot of the whole tree.
    pub fn all(&self) -> Value {
        Value::Object(self.root.read().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

fn read_dir(dir: &Path) -> Result<Vec<(String, Value)>, ConfigError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    files
        .into_iter()
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?.to_string();
            Some((stem, path))
        })
        .map(|(stem, path)| {
            let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let value = serde_json::from_str(&contents)
                .map_err(|source| ConfigError::Parse { path, source })?;
            Ok((stem, value))
        })
        .collect()
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
