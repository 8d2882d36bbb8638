//! Operator command surface.
//!
//! Every request a factory operator (or the CLI) can make of a running
//! Umpire goes through [`UmpireCommands`]. Results are plain data so they
//! can be rendered as text or JSON by the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::deployment::{
    DeployFailure, DeployState, DeploySummary, DeploymentCoordinator,
};
use crate::domain::errors::{DeployError, MatchError, ParameterError, UmpireConfigError};
use crate::domain::models::{Bundle, Component, Directory, ParameterDocument, RulesetDiff, UmpireConfig};
use crate::infrastructure::env::{EnvError, UmpireEnv};
use crate::services::{select_bundle_for_header, ComponentUpdate};

/// Failure of an operator command, wrapping the component error verbatim.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Config(#[from] UmpireConfigError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("No active configuration")]
    NoActiveConfig,
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Operator entry point over a [`DeploymentCoordinator`] and its environment.
pub struct UmpireCommands {
    coordinator: Arc<DeploymentCoordinator>,
}

impl UmpireCommands {
    pub fn new(coordinator: Arc<DeploymentCoordinator>) -> Self {
        Self { coordinator }
    }

    fn env(&self) -> &UmpireEnv {
        self.coordinator.env()
    }

    /// Create, rename, roll back or add a version to a parameter component.
    pub async fn update_parameter_component(
        &self,
        update: ComponentUpdate,
    ) -> CommandResult<Component> {
        let mut store = self.env().parameters().lock().await;
        Ok(store.update_component(update)?)
    }

    /// Create or rename a parameter directory.
    pub async fn update_parameter_directory(
        &self,
        dir_id: Option<usize>,
        parent_id: Option<usize>,
        name: &str,
    ) -> CommandResult<Directory> {
        let mut store = self.env().parameters().lock().await;
        Ok(store.update_directory(dir_id, parent_id, name)?)
    }

    /// Snapshot of the whole parameter tree.
    pub async fn get_parameter_info(&self) -> ParameterDocument {
        self.env().parameters().lock().await.info().clone()
    }

    /// `(name, path)` of the selected revision of each component in
    /// `namespace`, optionally only the one called `name`.
    pub async fn query_parameters(
        &self,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Vec<(String, PathBuf)> {
        self.env()
            .parameters()
            .lock()
            .await
            .query_parameters(namespace, name)
    }

    /// Deploy the config stored as resource `config_res`.
    pub async fn deploy(&self, config_res: &str, restart_all: bool) -> CommandResult<DeploySummary> {
        info!(config_res, restart_all, "deploy requested");
        Ok(self.coordinator.deploy(config_res, restart_all).await?)
    }

    /// Start the named services from the active config.
    pub async fn start_services(&self, names: &[String]) -> CommandResult<()> {
        Ok(self.coordinator.start_services(names).await?)
    }

    /// Stop the named services.
    pub async fn stop_services(&self, names: &[String]) -> CommandResult<()> {
        Ok(self.coordinator.stop_services(names).await?)
    }

    /// Parse and fully validate a config file without deploying it.
    pub fn validate_config(&self, path: &Path) -> CommandResult<UmpireConfig> {
        Ok(self.env().load_config(path)?)
    }

    /// Active rules added and removed by `path` relative to the active config.
    /// With nothing active every active rule of `path` counts as added.
    pub fn diff_config(&self, path: &Path) -> CommandResult<RulesetDiff> {
        let candidate = UmpireConfig::load(path)?;
        if !self.env().has_active_config() {
            let empty = UmpireConfig {
                rulesets: Vec::new(),
                services: Default::default(),
                bundles: Vec::new(),
            };
            return Ok(RulesetDiff::between(&empty, &candidate));
        }
        let current = UmpireConfig::load(&self.env().active_config_file())?;
        Ok(RulesetDiff::between(&current, &candidate))
    }

    /// Raw text of the active config document.
    pub fn get_active_config(&self) -> CommandResult<String> {
        if !self.env().has_active_config() {
            return Err(CommandError::NoActiveConfig);
        }
        let bytes = self.env().read_active_config()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn is_deploying(&self) -> bool {
        self.coordinator.is_deploying()
    }

    pub async fn deploy_state(&self) -> DeployState {
        self.coordinator.deploy_state().await
    }

    /// Why the last deploy failed, until a deploy succeeds.
    pub async fn last_deploy_error(&self) -> Option<DeployFailure> {
        self.coordinator.last_deploy_error().await
    }

    /// Bundle for the DUT described by `header` under the active config.
    ///
    /// Uses the deployed config, or the one the active marker points to when
    /// nothing was deployed by this process.
    pub async fn select_bundle(&self, header: &str) -> CommandResult<Option<Bundle>> {
        let config = match self.coordinator.active_config().await {
            Some(config) => config,
            None if self.env().has_active_config() => {
                Arc::new(UmpireConfig::load(&self.env().active_config_file())?)
            }
            None => return Err(CommandError::NoActiveConfig),
        };
        Ok(select_bundle_for_header(&config, header)?.cloned())
    }
}
