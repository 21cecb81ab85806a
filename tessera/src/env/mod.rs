//! Environment resolution.
//!
//! The environment name is resolved once, with strict precedence:
//!
//! 1. `--env=<name>` on the command line, in console mode only (see
//!    [`detect_console`]),
//! 2. the process `APP_ENV` variable,
//! 3. the `APP_ENV=` line of `<base>/.env`,
//! 4. the default, `production`.
//!
//! Variables are then loaded from `<base>/.env` and `<base>/.env.<name>`,
//! later files overwriting earlier keys.

mod parser;
mod process;

pub use process::{MapEnv, ProcessEnv, SystemEnv};

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};
use thiserror::Error;

/// Errors raised while loading environment files.
#[derive(Error, Debug)]
pub enum EnvError {
    /// An environment file exists but could not be read.
    #[error("failed to read environment file `{}`", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Resolved environment name plus loaded variables.
pub struct Environment {
    name: String,
    base_path: PathBuf,
    console: bool,
    variables: RwLock<BTreeMap<String, String>>,
    process: Arc<dyn ProcessEnv>,
}

impl Environment {
    /// Start configuring an environment rooted at `base_path`.
    pub fn builder(base_path: impl Into<PathBuf>) -> EnvironmentBuilder {
        EnvironmentBuilder::new(base_path)
    }

    /// Resolve against the real process, detecting console mode.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Read`] if an existing env file cannot be read.
    pub fn discover(base_path: impl Into<PathBuf>) -> Result<Self, EnvError> {
        Self::builder(base_path).build()
    }

    /// The resolved environment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The directory env files were read from.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Look up `key` in the loaded variables, then the process environment.
    pub fn get(&self, key: &str) -> Option<String> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .or_else(|| self.process.var(key))
    }

    /// [`get`](Self::get) with a fallback.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Set `key` locally and in the process environment.
    ///
    /// With [`SystemEnv`] this writes the real process environment, which
    /// other threads may read without coordination. Call it during
    /// bootstrap, before worker threads start.
    pub fn set(&self, key: &str, value: &str) {
        self.variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self.process.set_var(key, value);
    }

    /// Snapshot of the loaded variables.
    pub fn all(&self) -> BTreeMap<String, String> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the environment name is `name`.
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// `production`.
    pub fn is_production(&self) -> bool {
        self.is("production")
    }

    /// `development`.
    pub fn is_development(&self) -> bool {
        self.is("development")
    }

    /// `testing`.
    pub fn is_testing(&self) -> bool {
        self.is("testing")
    }

    /// `staging`.
    pub fn is_staging(&self) -> bool {
        self.is("staging")
    }

    /// `local`.
    pub fn is_local(&self) -> bool {
        self.is("local")
    }

    /// Whether `APP_DEBUG` holds a truthy value (`1`, `true`, `yes`, `on`).
    pub fn is_debug(&self) -> bool {
        self.get("APP_DEBUG").is_some_and(|value| is_truthy(&value))
    }

    /// Whether the process runs as a console command.
    pub fn is_console(&self) -> bool {
        self.console
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("base_path", &self.base_path)
            .field("console", &self.console)
            .finish_non_exhaustive()
    }
}

/// Whether `process` runs as a console command.
///
/// `APP_RUNNING_IN_CONSOLE` decides when it is set. Otherwise the process is
/// a command invocation and counts as console; hosts serving requests turn
/// it off with [`EnvironmentBuilder::console`] or the variable.
pub fn detect_console(process: &dyn ProcessEnv) -> bool {
    non_empty(process.var("APP_RUNNING_IN_CONSOLE")).is_none_or(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Builder for [`Environment`].
pub struct EnvironmentBuilder {
    base_path: PathBuf,
    args: Option<Vec<String>>,
    console: Option<bool>,
    process: Arc<dyn ProcessEnv>,
    file_name: String,
    default_environment: String,
}

impl EnvironmentBuilder {
    fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            args: None,
            console: None,
            process: Arc::new(SystemEnv),
            file_name: ".env".to_string(),
            default_environment: "production".to_string(),
        }
    }

    /// Command-line arguments. Defaults to the process layer's arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the process runs as a console command. Only then is
    /// `--env=<name>` honored. Defaults to [`detect_console`].
    pub fn console(mut self, console: bool) -> Self {
        self.console = Some(console);
        self
    }

    /// The process environment layer.
    pub fn process(mut self, process: Arc<dyn ProcessEnv>) -> Self {
        self.process = process;
        self
    }

    /// Base env file name. Defaults to `.env`.
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Fallback environment name. Defaults to `production`.
    pub fn default_environment(mut self, name: impl Into<String>) -> Self {
        self.default_environment = name.into();
        self
    }

    /// Resolve the name and load the env files.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Read`] if an env file exists but cannot be read.
    /// Missing files are skipped.
    pub fn build(self) -> Result<Environment, EnvError> {
        let base_file = self.base_path.join(&self.file_name);
        let base_contents = read_optional(&base_file)?;
        let console = self
            .console
            .unwrap_or_else(|| detect_console(&*self.process));

        let name = console
            .then(|| self.flag_environment())
            .flatten()
            .or_else(|| non_empty(self.process.var("APP_ENV")))
            .or_else(|| {
                base_contents
                    .as_deref()
                    .and_then(|contents| parser::find_raw(contents, "APP_ENV"))
                    .map(str::to_string)
                    .filter(|name| !name.is_empty())
            })
            .unwrap_or_else(|| self.default_environment.clone());

        let mut variables = BTreeMap::new();
        if let Some(contents) = &base_contents {
            parser::parse_into(contents, &mut variables, &*self.process);
        }
        let overlay = self.base_path.join(format!("{}.{name}", self.file_name));
        if let Some(contents) = read_optional(&overlay)? {
            parser::parse_into(&contents, &mut variables, &*self.process);
        }

        tracing::debug!(
            environment = %name,
            variables = variables.len(),
            "environment resolved"
        );

        Ok(Environment {
            name,
            base_path: self.base_path,
            console,
            variables: RwLock::new(variables),
            process: self.process,
        })
    }

    fn flag_environment(&self) -> Option<String> {
        let args = self.args.clone().unwrap_or_else(|| self.process.args());
        args.iter()
            .find_map(|arg| arg.strip_prefix("--env="))
            .map(str::to_string)
            .filter(|name| !name.is_empty())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn read_optional(path: &Path) -> Result<Option<String>, EnvError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(EnvError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    fn builder(dir: &Path, process: MapEnv) -> EnvironmentBuilder {
        Environment::builder(dir).process(Arc::new(process))
    }

    #[test]
    fn flag_is_ignored_outside_console_mode() {
        let dir = tempfile::tempdir().unwrap();
        let env = builder(dir.path(), MapEnv::new().with_var("APP_ENV", "testing"))
            .args(["app", "--env=staging"])
            .console(false)
            .build()
            .unwrap();
        assert!(env.is_testing());
        assert!(!env.is_console());
    }

    #[test]
    fn console_mode_is_detected_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let env = builder(dir.path(), MapEnv::new().with_var("APP_ENV", "testing"))
            .args(["app", "migrate", "--env=staging"])
            .build()
            .unwrap();
        assert!(env.is_staging());
        assert!(env.is_console());

        let serving = MapEnv::new()
            .with_var("APP_ENV", "testing")
            .with_var("APP_RUNNING_IN_CONSOLE", "false");
        let env = builder(dir.path(), serving)
            .args(["app", "--env=staging"])
            .build()
            .unwrap();
        assert!(env.is_testing());
        assert!(!env.is_console());
    }

    #[test]
    fn file_then_default() {
        let dir = tempfile::tempdir().unwrap();
        let env = builder(dir.path(), MapEnv::new()).build().unwrap();
        assert!(env.is_production());

        write(dir.path(), ".env", "APP_ENV=\"local\"\n");
        let env = builder(dir.path(), MapEnv::new()).build().unwrap();
        assert!(env.is_local());
    }

    #[test]
    fn overlay_file_overrides_base_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".env", "APP_ENV=staging\nDB_HOST=db\nCACHE=file\n");
        write(dir.path(), ".env.staging", "DB_HOST=staging-db\nURL=${DB_HOST}:5432\n");

        let env = builder(dir.path(), MapEnv::new()).build().unwrap();
        assert!(env.is_staging());
        assert_eq!(env.get("DB_HOST").as_deref(), Some("staging-db"));
        assert_eq!(env.get("URL").as_deref(), Some("staging-db:5432"));
        assert_eq!(env.get("CACHE").as_deref(), Some("file"));
    }

    #[test]
    fn get_prefers_local_over_process_then_default() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".env", "SHARED=from-file\n");
        let process = MapEnv::new()
            .with_var("SHARED", "from-process")
            .with_var("ONLY_PROCESS", "p");

        let env = builder(dir.path(), process).build().unwrap();
        assert_eq!(env.get_or("SHARED", "d"), "from-file");
        assert_eq!(env.get_or("ONLY_PROCESS", "d"), "p");
        assert_eq!(env.get_or("MISSING", "d"), "d");
    }

    #[test]
    fn set_reaches_the_process_layer() {
        let dir = tempfile::tempdir().unwrap();
        let process = Arc::new(MapEnv::new());
        let env = Environment::builder(dir.path())
            .process(Arc::clone(&process) as Arc<dyn ProcessEnv>)
            .build()
            .unwrap();

        env.set("FEATURE", "on");
        assert_eq!(env.get("FEATURE").as_deref(), Some("on"));
        assert_eq!(env.all()["FEATURE"], "on");
        assert_eq!(process.var("FEATURE").as_deref(), Some("on"));
    }

    #[test]
    fn debug_flag_is_lenient() {
        for (value, expected) in [("1", true), ("TRUE", true), (" yes ", true), ("On", true), ("0", false), ("off", false), ("", false)] {
            let dir = tempfile::tempdir().unwrap();
            let env = builder(dir.path(), MapEnv::new().with_var("APP_DEBUG", value))
                .build()
                .unwrap();
            assert_eq!(env.is_debug(), expected, "APP_DEBUG={value:?}");
        }
    }

    #[test]
    fn custom_file_name_and_default() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app.env", "NAME=shop\n");
        let env = builder(dir.path(), MapEnv::new())
            .file_name("app.env")
            .default_environment("development")
            .build()
            .unwrap();
        assert!(env.is_development());
        assert_eq!(env.get("NAME").as_deref(), Some("shop"));
    }
}
