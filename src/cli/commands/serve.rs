//! Implementation of the `umpire serve` command.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use super::CommandContext;
use crate::application::DeploySummary;
use crate::cli::output::{or_dash, output, table, CommandOutput};
use crate::services::ProcessStatus;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Deploy this config resource instead of the active config
    #[arg(long, value_name = "RESOURCE")]
    pub deploy: Option<String>,

    /// Stop every running service before starting
    #[arg(long, requires = "deploy")]
    pub restart_all: bool,
}

#[derive(Debug, Serialize)]
pub struct ServeOutput {
    pub deployed: Option<DeploySummary>,
    pub services: BTreeMap<String, Vec<ProcessStatus>>,
}

impl CommandOutput for ServeOutput {
    fn to_human(&self) -> String {
        let header = match &self.deployed {
            Some(summary) => format!(
                "Deployed {} at {}",
                summary.config.display(),
                summary.deployed_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => "No active config; waiting without services".to_string(),
        };
        let rows = self.services.iter().flat_map(|(service, processes)| {
            processes.iter().map(move |p| {
                vec![
                    service.clone(),
                    p.process.clone(),
                    p.state.to_string(),
                    or_dash(p.pid),
                    or_dash(p.last_error.as_deref()),
                ]
            })
        });
        format!(
            "{header}\n{}",
            table(&["Service", "Process", "State", "PID", "Error"], rows)
        )
    }
}

pub async fn execute(args: ServeArgs, ctx: &CommandContext) -> Result<()> {
    let (coordinator, commands) = ctx.open_commands()?;

    let deployed = match args.deploy {
        Some(resource) => Some(
            commands
                .deploy(&resource, args.restart_all)
                .await
                .with_context(|| format!("Failed to deploy {resource}"))?,
        ),
        None => coordinator
            .resume()
            .await
            .context("Failed to deploy the active config")?,
    };

    output(
        &ServeOutput {
            deployed,
            services: coordinator.registry().status().await,
        },
        ctx.json,
    );

    wait_for_shutdown().await?;
    info!("shutting down");
    if let Err(err) = coordinator.shutdown().await {
        warn!(error = %err, "services did not stop cleanly");
        return Err(err).context("Failed to stop services");
    }
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
