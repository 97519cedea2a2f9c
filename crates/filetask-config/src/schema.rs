//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

/// Base directory for filetask state (`~/.filetask`).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".filetask"))
        .unwrap_or_else(|| PathBuf::from(".filetask"))
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    default_data_dir().join("filetask.db")
}

/// Cron scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Arm cron timers on startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Zone cron expressions are evaluated in.
    #[serde(default)]
    pub timezone: CronTimezone,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: CronTimezone::default(),
        }
    }
}

/// Clock used to evaluate cron expressions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CronTimezone {
    /// The host's local time zone.
    #[default]
    Local,
    Utc,
}

/// Execution queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How long shutdown waits for in-flight jobs to observe cancellation.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// File worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Extensions that get a `.strm` pointer file.
    #[serde(default = "default_media_suffixes")]
    pub media_suffixes: Vec<String>,

    /// Extensions copied verbatim (subtitles, artwork, metadata).
    #[serde(default = "default_copy_suffixes")]
    pub copy_suffixes: Vec<String>,

    /// Prefix joined with the relative path to form the `.strm` body.
    /// When unset the absolute source path is written instead.
    #[serde(default)]
    pub url_prefix: Option<String>,

    /// Minimum percentage delta between progress reports.
    #[serde(default = "default_progress_step")]
    pub progress_step: u8,

    /// Validate a task's `.strm` files after each completed run.
    #[serde(default)]
    pub check_after_run: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            media_suffixes: default_media_suffixes(),
            copy_suffixes: default_copy_suffixes(),
            url_prefix: None,
            progress_step: default_progress_step(),
            check_after_run: false,
        }
    }
}

fn default_media_suffixes() -> Vec<String> {
    ["mp4", "mkv", "avi", "ts", "iso", "rmvb", "mov", "flv", "wmv", "m2ts"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_copy_suffixes() -> Vec<String> {
    ["nfo", "jpg", "png", "srt", "ass", "ssa"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_progress_step() -> u8 {
    1
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Number of daily log files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Colored console output.
    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            max_files: default_max_files(),
            ansi: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    default_data_dir().join("logs")
}

fn default_max_files() -> usize {
    14
}

/// Local control endpoint served by the process hosting the engine.
///
/// Only one process can bind the address, so it doubles as the lock that
/// keeps a second engine off the same database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl ApiConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr())
    }
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    7979
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
