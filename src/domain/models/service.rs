//! Service process configuration and run state.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::errors::ProcessError;

const REQUIRED_KEYS: &[&str] = &["executable", "name", "args", "path"];
const ALL_KEYS: &[&str] = &["executable", "name", "args", "path", "restart"];

/// Configuration of one OS process belonging to a service.
///
/// Built only through [`ServiceProcessConfig::from_value`] (or serde, which
/// delegates to it), so a config that exists is a valid one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct ServiceProcessConfig {
    /// Pathname of the executable
    pub executable: PathBuf,
    /// Printable name for logging
    pub name: String,
    /// Command line arguments, without the executable
    pub args: Vec<String>,
    /// Process working directory
    pub path: PathBuf,
    /// Respawn when the process ends unexpectedly
    pub restart: bool,
}

impl ServiceProcessConfig {
    pub fn new(
        executable: impl Into<PathBuf>,
        name: impl Into<String>,
        args: Vec<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            name: name.into(),
            args,
            path: path.into(),
            restart: false,
        }
    }

    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    /// Validate a loosely-typed config object.
    ///
    /// Required keys: `executable`, `name`, `args`, `path`. Optional: `restart`.
    /// Unknown keys and type mismatches are rejected.
    pub fn from_value(value: &Value) -> Result<Self, ProcessError> {
        let object = value
            .as_object()
            .ok_or_else(|| ProcessError::InvalidConfig("config should be an object".to_string()))?;

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| !object.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(ProcessError::InvalidConfig(format!(
                "Required config keys not found: {}",
                missing.join(",")
            )));
        }

        let unknown: Vec<&str> = object
            .keys()
            .map(String::as_str)
            .filter(|k| !ALL_KEYS.contains(k))
            .collect();
        if !unknown.is_empty() {
            return Err(ProcessError::InvalidConfig(format!(
                "Found unknown config keys: {}",
                unknown.join(",")
            )));
        }

        let args = match &object["args"] {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(ToString::to_string).ok_or_else(|| {
                        ProcessError::InvalidConfig("Config args should be a list of strings".to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                return Err(ProcessError::InvalidConfig(
                    "Config args should be a list".to_string(),
                ))
            }
        };

        let restart = match object.get("restart") {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(ProcessError::InvalidConfig(
                    "Config restart should be a boolean".to_string(),
                ))
            }
        };

        Ok(Self {
            executable: PathBuf::from(string_field(object, "executable")?),
            name: string_field(object, "name")?,
            args,
            path: PathBuf::from(string_field(object, "path")?),
            restart,
        })
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Result<String, ProcessError> {
    object[key]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| ProcessError::InvalidConfig(format!("Config {key} should be a string")))
}

impl TryFrom<Value> for ServiceProcessConfig {
    type Error = ProcessError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

/// Run state of one supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// States from which `start` is allowed.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Stopped | Self::Failed)
    }

    /// States in which a live OS process exists.
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_valid() {
        let config = ServiceProcessConfig::from_value(&json!({
            "executable": "/bin/sleep",
            "name": "sleeper",
            "args": ["10"],
            "path": "/tmp",
            "restart": true
        }))
        .unwrap();
        assert_eq!(config.executable, PathBuf::from("/bin/sleep"));
        assert_eq!(config.args, vec!["10".to_string()]);
        assert!(config.restart);
    }

    #[test]
    fn test_restart_defaults_to_false() {
        let config: ServiceProcessConfig = serde_json::from_value(json!({
            "executable": "/bin/true", "name": "t", "args": [], "path": "/"
        }))
        .unwrap();
        assert!(!config.restart);
    }

    #[test]
    fn test_missing_required_key() {
        let err = ServiceProcessConfig::from_value(&json!({
            "executable": "/bin/true", "name": "t", "args": []
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Required config keys not found: path"));
    }

    #[test]
    fn test_unknown_key() {
        let err = ServiceProcessConfig::from_value(&json!({
            "executable": "/bin/true", "name": "t", "args": [], "path": "/", "uid": 0
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown config keys: uid"));
    }

    #[test]
    fn test_type_mismatch() {
        let err = ServiceProcessConfig::from_value(&json!({
            "executable": "/bin/true", "name": "t", "args": "-v", "path": "/"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("should be a list"));

        let err = ServiceProcessConfig::from_value(&json!({
            "executable": "/bin/true", "name": "t", "args": [], "path": "/", "restart": "yes"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("should be a boolean"));
    }

    #[test]
    fn test_structural_equality_drives_dedup() {
        let a = ServiceProcessConfig::new("/bin/sleep", "s", vec!["1".into()], "/");
        let b = ServiceProcessConfig::new("/bin/sleep", "s", vec!["1".into()], "/");
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_restart(true));
    }

    #[test]
    fn test_state_predicates() {
        assert!(ProcessState::Failed.can_start());
        assert!(!ProcessState::Running.can_start());
        assert!(ProcessState::Stopping.is_alive());
        assert_eq!(ProcessState::NotStarted.to_string(), "not_started");
    }
}
