//! CLI command implementations.

pub mod init;
pub mod param;
pub mod resource;
pub mod select;
pub mod serve;
pub mod validate;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::{DeploymentCoordinator, UmpireCommands};
use crate::domain::models::ServerConfig;
use crate::infrastructure::env::UmpireEnv;
use crate::services::supervisor::ProcessTiming;
use crate::services::ServiceRegistry;

/// Loaded settings plus output mode, shared by every command.
pub struct CommandContext {
    pub settings: ServerConfig,
    pub json: bool,
}

impl CommandContext {
    pub fn new(settings: ServerConfig, json: bool) -> Self {
        Self { settings, json }
    }

    /// Open the environment under the configured base directory.
    pub fn open_env(&self) -> Result<UmpireEnv> {
        UmpireEnv::open(&self.settings.base_dir).with_context(|| {
            format!(
                "Failed to open Umpire environment at {} (run `umpire init` first?)",
                self.settings.base_dir.display()
            )
        })
    }

    /// Wire the coordinator and command facade over a fresh environment handle.
    pub fn open_commands(&self) -> Result<(Arc<DeploymentCoordinator>, UmpireCommands)> {
        let env = Arc::new(self.open_env()?);
        let registry = Arc::new(ServiceRegistry::new(ProcessTiming::from(
            &self.settings.supervision,
        )));
        let coordinator = Arc::new(DeploymentCoordinator::new(env, registry));
        let commands = UmpireCommands::new(Arc::clone(&coordinator));
        Ok((coordinator, commands))
    }
}
