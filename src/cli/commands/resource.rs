//! `umpire resource` subcommands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use super::CommandContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::ports::ResourceStore;

#[derive(Subcommand, Debug)]
pub enum ResourceCommands {
    /// Copy a file into the resource store under its content-addressed name
    Add {
        /// File to add
        file: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct ResourceOutput {
    pub name: String,
    pub path: PathBuf,
}

impl CommandOutput for ResourceOutput {
    fn to_human(&self) -> String {
        format!("{}\n  stored at {}", self.name, self.path.display())
    }
}

pub fn execute(command: ResourceCommands, ctx: &CommandContext) -> Result<()> {
    let env = ctx.open_env()?;
    match command {
        ResourceCommands::Add { file } => {
            let name = env
                .add_resource(&file)
                .with_context(|| format!("Failed to add resource {}", file.display()))?;
            let path = env.resource_path(&name);
            output(&ResourceOutput { name, path }, ctx.json);
        }
    }
    Ok(())
}
