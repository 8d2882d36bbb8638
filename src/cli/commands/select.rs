//! Implementation of the `umpire select` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::CommandContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Bundle;

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// DUT info header, e.g. "sn=SN001; mac.eth0=aa:bb:cc:dd:ee:ff; stage=SMT"
    #[arg(long)]
    pub header: String,
}

#[derive(Debug, Serialize)]
pub struct SelectOutput {
    pub header: String,
    pub bundle: Option<Bundle>,
}

impl CommandOutput for SelectOutput {
    fn to_human(&self) -> String {
        match &self.bundle {
            Some(bundle) if bundle.note.is_empty() => {
                format!("{} (payloads: {})", bundle.id, bundle.payloads)
            }
            Some(bundle) => format!(
                "{} (payloads: {}): {}",
                bundle.id, bundle.payloads, bundle.note
            ),
            None => "No matching bundle".to_string(),
        }
    }
}

pub async fn execute(args: SelectArgs, ctx: &CommandContext) -> Result<()> {
    let (_, commands) = ctx.open_commands()?;
    let bundle = commands
        .select_bundle(&args.header)
        .await
        .context("Failed to select bundle")?;
    output(
        &SelectOutput {
            header: args.header,
            bundle,
        },
        ctx.json,
    );
    Ok(())
}
