//! `umpire validate` and `umpire diff`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::CommandContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::RulesetDiff;

#[derive(Args, Debug)]
pub struct ConfigFileArgs {
    /// Umpire config file (JSON, or YAML by extension)
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    pub valid: bool,
    pub path: PathBuf,
    pub bundles: Vec<String>,
    pub services: Vec<String>,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        format!(
            "{} is valid\n  active bundles: {}\n  active services: {}",
            self.path.display(),
            self.bundles.join(", "),
            self.services.join(", ")
        )
    }
}

#[derive(Debug, Serialize)]
pub struct DiffOutput {
    pub path: PathBuf,
    #[serde(flatten)]
    pub diff: RulesetDiff,
}

impl CommandOutput for DiffOutput {
    fn to_human(&self) -> String {
        if self.diff.is_empty() {
            return "No ruleset changes".to_string();
        }
        self.diff.to_lines().join("\n")
    }
}

pub fn validate(args: ConfigFileArgs, ctx: &CommandContext) -> Result<()> {
    let (_, commands) = ctx.open_commands()?;
    let config = commands
        .validate_config(&args.path)
        .with_context(|| format!("{} is invalid", args.path.display()))?;
    let data = ValidateOutput {
        valid: true,
        bundles: config
            .active_bundles()
            .iter()
            .map(|b| b.id.clone())
            .collect(),
        services: config.active_service_names(),
        path: args.path,
    };
    output(&data, ctx.json);
    Ok(())
}

pub fn diff(args: ConfigFileArgs, ctx: &CommandContext) -> Result<()> {
    let (_, commands) = ctx.open_commands()?;
    let diff = commands
        .diff_config(&args.path)
        .with_context(|| format!("Failed to diff {}", args.path.display()))?;
    output(
        &DiffOutput {
            path: args.path,
            diff,
        },
        ctx.json,
    );
    Ok(())
}
