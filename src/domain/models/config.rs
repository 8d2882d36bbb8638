use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Server settings for an Umpire instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Root of the on-disk layout (resources, conf, parameters, ...)
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Process supervision timing
    #[serde(default)]
    pub supervision: SupervisionConfig,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/var/db/factory/umpire")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            logging: LoggingConfig::default(),
            supervision: SupervisionConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Write rotated log files here in addition to stdout
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation of log files (daily, hourly, never)
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Timing limits of supervised service processes, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupervisionConfig {
    /// A process alive this long after spawn counts as started
    #[serde(default = "default_start_time_limit_ms")]
    pub start_time_limit_ms: u64,

    /// Maximum wait for a process to exit after SIGTERM
    #[serde(default = "default_stop_time_limit_ms")]
    pub stop_time_limit_ms: u64,

    /// Restarts closer together than this are considered abnormal
    #[serde(default = "default_min_restart_interval_ms")]
    pub min_restart_interval_ms: u64,

    /// Consecutive abnormal restarts before giving up
    #[serde(default = "default_max_restart_count")]
    pub max_restart_count: usize,

    /// Output lines kept per process for failure reports
    #[serde(default = "default_message_lines")]
    pub message_lines: usize,
}

const fn default_start_time_limit_ms() -> u64 {
    1200
}

const fn default_stop_time_limit_ms() -> u64 {
    20_000
}

const fn default_min_restart_interval_ms() -> u64 {
    1200
}

const fn default_max_restart_count() -> usize {
    3
}

const fn default_message_lines() -> usize {
    10
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            start_time_limit_ms: default_start_time_limit_ms(),
            stop_time_limit_ms: default_stop_time_limit_ms(),
            min_restart_interval_ms: default_min_restart_interval_ms(),
            max_restart_count: default_max_restart_count(),
            message_lines: default_message_lines(),
        }
    }
}
