//! Environment resolution against real files.

use std::{fs, path::Path, sync::Arc};
use tessera::{
    Environment,
    env::{MapEnv, ProcessEnv},
};

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        ".env",
        "# shared settings\nAPP_ENV=development\nAPP_NAME=\"Corner Shop\"\nAPP_URL=https://shop.test\n",
    );
    write(
        dir.path(),
        ".env.staging",
        "APP_URL=https://staging.shop.test\nASSET_URL=${APP_URL}/assets\n",
    );
    write(
        dir.path(),
        ".env.development",
        "export APP_DEBUG=on\nMAIL_FROM='${APP_NAME} <noreply@${HOST}>'\n",
    );
    dir
}

#[test]
fn command_line_flag_wins_in_console_mode() {
    let dir = project();
    let env = Environment::builder(dir.path())
        .console(true)
        .args(["shop", "serve", "--env=staging"])
        .process(Arc::new(MapEnv::new().with_var("APP_ENV", "production")))
        .build()
        .unwrap();

    assert!(env.is_staging());
    assert!(env.is_console());
    assert_eq!(env.get("APP_URL").as_deref(), Some("https://staging.shop.test"));
    assert_eq!(
        env.get("ASSET_URL").as_deref(),
        Some("https://staging.shop.test/assets")
    );
    assert!(!env.is_debug());
}

#[test]
fn process_variable_beats_the_env_file() {
    let dir = project();
    let env = Environment::builder(dir.path())
        .args(["shop"])
        .process(Arc::new(MapEnv::new().with_var("APP_ENV", "production")))
        .build()
        .unwrap();

    assert!(env.is_production());
    assert_eq!(env.get("APP_URL").as_deref(), Some("https://shop.test"));
}

#[test]
fn env_file_names_the_environment_when_nothing_else_does() {
    let dir = project();
    let env = Environment::builder(dir.path())
        .args(["shop"])
        .process(Arc::new(MapEnv::new().with_var("HOST", "mail.shop.test")))
        .build()
        .unwrap();

    assert!(env.is_development());
    assert!(env.is_debug());
    assert_eq!(env.get("APP_NAME").as_deref(), Some("Corner Shop"));
    assert_eq!(
        env.get("MAIL_FROM").as_deref(),
        Some("Corner Shop <noreply@mail.shop.test>")
    );
}

#[test]
fn set_writes_both_layers() {
    let dir = project();
    let process = Arc::new(MapEnv::new());
    let env = Environment::builder(dir.path())
        .args(["shop"])
        .process(Arc::clone(&process) as Arc<dyn ProcessEnv>)
        .build()
        .unwrap();

    env.set("QUEUE", "redis");

    assert_eq!(env.get("QUEUE").as_deref(), Some("redis"));
    assert_eq!(process.var("QUEUE").as_deref(), Some("redis"));
    assert_eq!(env.get_or("MISSING", "fallback"), "fallback");
    assert!(env.all().contains_key("QUEUE"));
}
