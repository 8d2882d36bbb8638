//! On-disk layout of an Umpire instance.
//!
//! ```text
//! <base_dir>/
//!   resources/          content-addressed resource files
//!   conf/  log/  run/  temp/
//!   parameters/         content-addressed parameter files
//!   parameters.json     parameter tree document
//!   active_umpire.json  symlink to the active config resource
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::{ParameterError, UmpireConfigError};
use crate::domain::models::UmpireConfig;
use crate::domain::ports::ResourceStore;
use crate::infrastructure::storage::{self, InstallOutcome, StorageError};
use crate::services::ParameterStore;

const RESOURCES_DIR: &str = "resources";
const CONFIG_DIR: &str = "conf";
const LOG_DIR: &str = "log";
const PID_DIR: &str = "run";
const TEMP_DIR: &str = "temp";
const PARAMETERS_DIR: &str = "parameters";
const PARAMETER_JSON: &str = "parameters.json";
const ACTIVE_CONFIG: &str = "active_umpire.json";

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Config(#[from] UmpireConfigError),

    #[error("Unable to activate missing config: {0}")]
    MissingConfig(PathBuf),

    #[error("No active config at {0}")]
    NoActiveConfig(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> EnvError + '_ {
    move |source| EnvError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The injected environment: directory layout, resource store, active
/// config marker and the parameter store.
pub struct UmpireEnv {
    base_dir: PathBuf,
    parameters: Mutex<ParameterStore>,
}

impl UmpireEnv {
    /// Create the directory layout (idempotent) and open the environment.
    pub fn init(base_dir: impl Into<PathBuf>) -> Result<Self, EnvError> {
        let base_dir = base_dir.into();
        for dir in [
            RESOURCES_DIR,
            CONFIG_DIR,
            LOG_DIR,
            PID_DIR,
            TEMP_DIR,
            PARAMETERS_DIR,
        ] {
            let path = base_dir.join(dir);
            fs::create_dir_all(&path).map_err(io_error(&path))?;
        }
        let parameter_json = base_dir.join(PARAMETER_JSON);
        if !parameter_json.exists() {
            storage::atomic_write(&parameter_json, br#"{"files": [], "dirs": []}"#)?;
        }
        info!(base_dir = %base_dir.display(), "umpire environment initialized");
        Self::open(base_dir)
    }

    /// Open an existing layout.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, EnvError> {
        let base_dir = base_dir.into();
        let parameters = ParameterStore::open(
            base_dir.join(PARAMETER_JSON),
            base_dir.join(PARAMETERS_DIR),
        )?;
        Ok(Self {
            base_dir,
            parameters: Mutex::new(parameters),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.base_dir.join(RESOURCES_DIR)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.join(CONFIG_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join(LOG_DIR)
    }

    pub fn pid_dir(&self) -> PathBuf {
        self.base_dir.join(PID_DIR)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.base_dir.join(TEMP_DIR)
    }

    pub fn parameters_dir(&self) -> PathBuf {
        self.base_dir.join(PARAMETERS_DIR)
    }

    pub fn active_config_file(&self) -> PathBuf {
        self.base_dir.join(ACTIVE_CONFIG)
    }

    /// The parameter store. Holding the lock serializes writers of the
    /// parameter document.
    pub fn parameters(&self) -> &Mutex<ParameterStore> {
        &self.parameters
    }

    /// Copy `src` into the resources directory as `<name>.<md5>` and return
    /// the resource name.
    pub fn add_resource(&self, src: &Path) -> Result<String, EnvError> {
        let name = storage::content_addressed_name(src)?;
        let dst = self.resources_dir().join(&name);
        if storage::install_file(src, &dst)? == InstallOutcome::Copied {
            info!(resource = %name, "resource added");
        }
        Ok(name)
    }

    /// Load and validate a config file, including its resources.
    pub fn load_config(&self, path: &Path) -> Result<UmpireConfig, EnvError> {
        let config = UmpireConfig::load(path)?;
        config.validate_resources(self)?;
        Ok(config)
    }

    pub fn has_active_config(&self) -> bool {
        self.active_config_file().is_file()
    }

    /// Raw bytes of the active config document.
    pub fn read_active_config(&self) -> Result<Vec<u8>, EnvError> {
        let path = self.active_config_file();
        if !path.is_file() {
            return Err(EnvError::NoActiveConfig(path));
        }
        fs::read(&path).map_err(io_error(&path))
    }

    /// File the active marker points to.
    pub fn active_config_target(&self) -> Result<PathBuf, EnvError> {
        let path = self.active_config_file();
        if !path.is_file() {
            return Err(EnvError::NoActiveConfig(path));
        }
        fs::canonicalize(&path).map_err(io_error(&path))
    }

    /// Repoint the active marker at `config_path`.
    ///
    /// A new symlink is created next to the marker and renamed over it, so
    /// readers always find either the old or the new target.
    pub fn activate_config(&self, config_path: &Path) -> Result<(), EnvError> {
        if !config_path.is_file() {
            return Err(EnvError::MissingConfig(config_path.to_path_buf()));
        }
        let target = fs::canonicalize(config_path).map_err(io_error(config_path))?;
        let base = fs::canonicalize(&self.base_dir).map_err(io_error(&self.base_dir))?;
        let link_target = target
            .strip_prefix(&base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| target.clone());

        let active = self.active_config_file();
        let staging = self
            .base_dir
            .join(format!(".{ACTIVE_CONFIG}.{}", Uuid::new_v4().simple()));
        std::os::unix::fs::symlink(&link_target, &staging).map_err(io_error(&staging))?;
        if let Err(source) = fs::rename(&staging, &active) {
            let _ = fs::remove_file(&staging);
            return Err(EnvError::Io {
                path: active,
                source,
            });
        }
        info!(config = %target.display(), "config activated");
        Ok(())
    }
}

impl ResourceStore for UmpireEnv {
    fn resource_path(&self, name: &str) -> PathBuf {
        self.resources_dir().join(name)
    }
}
