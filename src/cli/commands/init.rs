//! Implementation of the `umpire init` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::CommandContext;
use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::env::UmpireEnv;

#[derive(Args, Debug)]
pub struct InitArgs {}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub base_dir: PathBuf,
    pub directories: Vec<PathBuf>,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Umpire environment initialized at {}",
            self.base_dir.display()
        )];
        for dir in &self.directories {
            lines.push(format!("  - {}", dir.display()));
        }
        lines.join("\n")
    }
}

pub fn execute(_args: InitArgs, ctx: &CommandContext) -> Result<()> {
    let base_dir = &ctx.settings.base_dir;
    let env = UmpireEnv::init(base_dir)
        .with_context(|| format!("Failed to initialize {}", base_dir.display()))?;

    let data = InitOutput {
        success: true,
        base_dir: base_dir.clone(),
        directories: vec![
            env.resources_dir(),
            env.config_dir(),
            env.log_dir(),
            env.pid_dir(),
            env.temp_dir(),
            env.parameters_dir(),
        ],
    };
    output(&data, ctx.json);
    Ok(())
}
