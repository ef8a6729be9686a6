//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a small TOML file. Every field has a
//! built-in default so a missing file is not an error.
//!
//! # Resolution order
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "SCENEPACK_CONFIG";

/// Environment variable naming the data root folder
pub const ROOT_ENV_VAR: &str = "SCENEPACK_ROOT";

/// Store file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "scenepack.db";

/// Host argument replaced by the worker script path at launch
pub const WORKER_ARG: &str = "{worker}";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data root folder (store file lives here unless `database_path` is set)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit store file path
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Headless host application used to run extraction workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host executable
    #[serde(default = "default_host_executable")]
    pub executable: PathBuf,

    /// Fixed arguments placed before `--` (batch flag, worker entry point)
    ///
    /// A `{worker}` argument is replaced with the worker script path.
    #[serde(default = "default_host_args")]
    pub args: Vec<String>,

    /// Worker script to run instead of the bundled one
    #[serde(default)]
    pub worker_script: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            executable: default_host_executable(),
            args: default_host_args(),
            worker_script: None,
        }
    }
}

/// Scan tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Container file extension, without the dot
    #[serde(default = "default_container_extension")]
    pub container_extension: String,

    /// Files smaller than this are ignored during discovery
    #[serde(default = "default_min_container_bytes")]
    pub min_container_bytes: u64,

    /// Files above this size use incremental per-group extraction
    #[serde(default = "default_large_file_threshold_mb")]
    pub large_file_threshold_mb: u64,

    /// Worker pool size
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Extra attempts for a group after a transient error
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    /// Pause between transient retries
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,

    /// Failed attempts allowed per queued file before it is permanently failed
    #[serde(default = "default_max_file_retries")]
    pub max_file_retries: i64,

    /// Liveness window for `processing` queue items
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Directory names skipped during discovery (case-insensitive)
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,

    /// Maximum wait on a locked store before giving up
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            container_extension: default_container_extension(),
            min_container_bytes: default_min_container_bytes(),
            large_file_threshold_mb: default_large_file_threshold_mb(),
            max_workers: default_max_workers(),
            transient_retries: default_transient_retries(),
            retry_pause_ms: default_retry_pause_ms(),
            max_file_retries: default_max_file_retries(),
            stale_after_secs: default_stale_after_secs(),
            skip_dirs: default_skip_dirs(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

impl ScanConfig {
    pub fn large_file_threshold_bytes(&self) -> u64 {
        self.large_file_threshold_mb * 1024 * 1024
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Per-mode worker timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_quick_scan_secs")]
    pub quick_scan_secs: u64,
    #[serde(default = "default_full_file_secs")]
    pub full_file_secs: u64,
    #[serde(default = "default_single_group_secs")]
    pub single_group_secs: u64,
    #[serde(default = "default_standalone_secs")]
    pub standalone_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            quick_scan_secs: default_quick_scan_secs(),
            full_file_secs: default_full_file_secs(),
            single_group_secs: default_single_group_secs(),
            standalone_secs: default_standalone_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host_executable() -> PathBuf {
    PathBuf::from("blender")
}

fn default_host_args() -> Vec<String> {
    ["--background", "--python", WORKER_ARG]
        .iter()
        .map(|a| a.to_string())
        .collect()
}

fn default_container_extension() -> String {
    "blend".to_string()
}

fn default_min_container_bytes() -> u64 {
    1024
}

fn default_large_file_threshold_mb() -> u64 {
    500
}

fn default_max_workers() -> usize {
    2
}

fn default_transient_retries() -> u32 {
    2
}

fn default_retry_pause_ms() -> u64 {
    1000
}

fn default_max_file_retries() -> i64 {
    3
}

fn default_stale_after_secs() -> u64 {
    30 * 60
}

fn default_skip_dirs() -> Vec<String> {
    ["backup", "temp", "cache", "__pycache__"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_quick_scan_secs() -> u64 {
    60
}

fn default_full_file_secs() -> u64 {
    120
}

fn default_single_group_secs() -> u64 {
    300
}

fn default_standalone_secs() -> u64 {
    180
}

/// Load a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve and load the bootstrap config
///
/// An explicitly named file (CLI or environment) must exist; the
/// per-user default file is optional.
pub fn resolve_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = cli_arg {
        return load_toml_config(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return load_toml_config(Path::new(&path));
    }

    if let Some(path) = default_config_path() {
        if path.exists() {
            return load_toml_config(&path);
        }
    }

    Ok(TomlConfig::default())
}

/// Per-user config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("scenepack").join("scenepack.toml"))
}

/// Root folder resolution: CLI → environment → TOML → OS default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Store file path for a resolved root folder
pub fn database_path(root_folder: &Path, config: &TomlConfig) -> PathBuf {
    config
        .database_path
        .clone()
        .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("scenepack"))
        .unwrap_or_else(|| PathBuf::from("./scenepack_data"))
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;

    Ok(())
}
