use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::ServerConfig;

/// Settings file looked up inside the base directory.
pub const SETTINGS_FILE: &str = "umpire.yaml";

const ENV_PREFIX: &str = "UMPIRE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Base directory cannot be empty")]
    EmptyBaseDir,

    #[error("Invalid {0}: must be greater than 0")]
    ZeroTiming(&'static str),

    #[error("Invalid max_restart_count: 0. Must be at least 1")]
    InvalidMaxRestartCount,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load server settings with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `<base_dir>/umpire.yaml` (optional)
    /// 3. `file`, when given (must exist)
    /// 4. Environment variables (`UMPIRE_*`, `__` separates nested keys)
    /// 5. `base_dir`, when given (command line)
    pub fn load(base_dir: Option<&Path>, file: Option<&Path>) -> Result<ServerConfig> {
        let env = || Env::prefixed(ENV_PREFIX).split("__");
        let mut figment = Figment::new().merge(Serialized::defaults(ServerConfig::default()));

        let settings_dir: PathBuf = match base_dir {
            Some(dir) => dir.to_path_buf(),
            None => figment
                .clone()
                .merge(env())
                .extract_inner("base_dir")
                .context("Failed to resolve base_dir")?,
        };
        figment = figment.merge(Yaml::file(settings_dir.join(SETTINGS_FILE)));

        if let Some(file) = file {
            if !file.is_file() {
                bail!("Config file not found: {}", file.display());
            }
            figment = figment.merge(Yaml::file(file));
        }
        figment = figment.merge(env());
        if let Some(dir) = base_dir {
            figment = figment.merge(Serialized::default("base_dir", dir));
        }

        let config: ServerConfig = figment
            .extract()
            .context("Failed to extract configuration from figment")?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
        if config.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyBaseDir);
        }

        let supervision = &config.supervision;
        for (name, value) in [
            ("start_time_limit_ms", supervision.start_time_limit_ms),
            ("stop_time_limit_ms", supervision.stop_time_limit_ms),
            ("min_restart_interval_ms", supervision.min_restart_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTiming(name));
            }
        }
        if supervision.max_restart_count == 0 {
            return Err(ConfigError::InvalidMaxRestartCount);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.base_dir, PathBuf::from("/var/db/factory/umpire"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.supervision.max_restart_count, 3);
        assert_eq!(config.supervision.stop_time_limit_ms, 20_000);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
base_dir: /srv/umpire
logging:
  level: debug
  format: json
supervision:
  stop_time_limit_ms: 500
";
        let config: ServerConfig = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.base_dir, PathBuf::from("/srv/umpire"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.supervision.stop_time_limit_ms, 500);
        assert_eq!(config.supervision.start_time_limit_ms, 1200);
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_empty_base_dir() {
        let config = ServerConfig {
            base_dir: PathBuf::new(),
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyBaseDir)
        ));
    }

    #[test]
    fn test_validate_zero_timings() {
        let mut config = ServerConfig::default();
        config.supervision.stop_time_limit_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroTiming("stop_time_limit_ms"))
        ));

        let mut config = ServerConfig::default();
        config.supervision.min_restart_interval_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroTiming("min_restart_interval_ms"))
        ));
    }

    #[test]
    fn test_validate_zero_restart_count() {
        let mut config = ServerConfig::default();
        config.supervision.max_restart_count = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxRestartCount)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = ServerConfig::default();
        config.logging.level = "invalid".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = ServerConfig::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_load_merges_base_dir_file_and_env() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            "logging:\n  level: warn\nsupervision:\n  max_restart_count: 5\n",
        )
        .unwrap();

        temp_env::with_vars(
            [
                ("UMPIRE_SUPERVISION__MAX_RESTART_COUNT", Some("7")),
                ("UMPIRE_BASE_DIR", Some("/ignored/by/cli")),
            ],
            || {
                let config = ConfigLoader::load(Some(dir.path()), None).unwrap();
                assert_eq!(config.base_dir, dir.path());
                assert_eq!(config.logging.level, "warn");
                assert_eq!(config.supervision.max_restart_count, 7);
            },
        );
    }

    #[test]
    fn test_load_env_base_dir_locates_settings_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "logging:\n  format: json\n").unwrap();
        let base = dir.path().to_string_lossy().into_owned();

        temp_env::with_var("UMPIRE_BASE_DIR", Some(base.as_str()), || {
            let config = ConfigLoader::load(None, None).unwrap();
            assert_eq!(config.base_dir, dir.path());
            assert_eq!(config.logging.format, "json");
        });
    }

    #[test]
    fn test_load_explicit_file_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(ConfigLoader::load(Some(dir.path()), Some(&missing)).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("custom.yaml");
        fs::write(&file, "supervision:\n  start_time_limit_ms: 0\n").unwrap();
        let err = ConfigLoader::load(Some(dir.path()), Some(&file)).unwrap_err();
        assert!(err.to_string().contains("start_time_limit_ms"));
    }
}
