//! Configuration loading and root folder resolution tests
//!
//! Tests touching SCENEPACK_* environment variables are `#[serial]` so they
//! never race each other.

use scenepack_common::config::{
    database_path, load_toml_config, resolve_config, resolve_root_folder, write_toml_config,
    TomlConfig, CONFIG_ENV_VAR, DATABASE_FILE_NAME, ROOT_ENV_VAR, WORKER_ARG,
};
use scenepack_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_defaults_match_documented_values() {
    let config = TomlConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.scan.container_extension, "blend");
    assert_eq!(config.scan.min_container_bytes, 1024);
    assert_eq!(config.scan.large_file_threshold_bytes(), 500 * 1024 * 1024);
    assert_eq!(config.scan.transient_retries, 2);
    assert_eq!(config.scan.retry_pause().as_millis(), 1000);
    assert_eq!(config.timeouts.quick_scan_secs, 60);
    assert_eq!(config.timeouts.full_file_secs, 120);
    assert_eq!(config.timeouts.single_group_secs, 300);
    assert_eq!(config.timeouts.standalone_secs, 180);
    assert!(config.scan.skip_dirs.iter().any(|d| d == "backup"));
    assert_eq!(config.host.args, vec!["--background", "--python", WORKER_ARG]);
    assert!(config.host.worker_script.is_none());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scenepack.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/scenepack"

[scan]
max_workers = 6

[host]
executable = "/opt/blender/blender"
args = ["--background", "--python", "/opt/scenepack/worker.py"]
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/scenepack")));
    assert_eq!(config.scan.max_workers, 6);
    assert_eq!(config.scan.container_extension, "blend");
    assert_eq!(config.host.args.len(), 3);
    assert_eq!(config.host.args[2], "/opt/scenepack/worker.py");
    assert_eq!(config.timeouts.single_group_secs, 300);
}

#[test]
fn test_malformed_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[scan\nmax_workers = ").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_explicit_missing_config_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let result = resolve_config(Some(Path::new("/nonexistent/scenepack.toml")));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_config_from_environment() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("env.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let config = resolve_config(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn test_root_folder_priority_order() {
    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/from/toml"));

    env::set_var(ROOT_ENV_VAR, "/from/env");

    // CLI beats everything
    assert_eq!(
        resolve_root_folder(Some(Path::new("/from/cli")), &config),
        PathBuf::from("/from/cli")
    );

    // Environment beats TOML
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/env"));

    env::remove_var(ROOT_ENV_VAR);
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));

    // OS default is never empty
    let fallback = resolve_root_folder(None, &TomlConfig::default());
    assert!(!fallback.as_os_str().is_empty());
}

#[test]
fn test_database_path_defaults_into_root() {
    let mut config = TomlConfig::default();
    let root = Path::new("/data/scenepack");
    assert_eq!(database_path(root, &config), root.join(DATABASE_FILE_NAME));

    config.database_path = Some(PathBuf::from("/elsewhere/index.db"));
    assert_eq!(database_path(root, &config), PathBuf::from("/elsewhere/index.db"));
}

#[test]
fn test_write_then_load_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf").join("scenepack.toml");

    let mut config = TomlConfig::default();
    config.scan.max_workers = 4;
    config.logging.level = "warn".to_string();

    write_toml_config(&config, &path).unwrap();
    assert!(!path.with_extension("toml.tmp").exists());

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.scan.max_workers, 4);
    assert_eq!(loaded.logging.level, "warn");
}
