//! Umpire CLI entry point.

use anyhow::Result;
use clap::Parser;

use umpire::cli::commands::{self, CommandContext};
use umpire::cli::{handle_error, Cli, Commands};
use umpire::infrastructure::logging::{LogConfig, LoggerImpl};
use umpire::infrastructure::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli).await {
        handle_error(&err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = ConfigLoader::load(cli.base_dir.as_deref(), cli.config.as_deref())?;

    let mut log_config = LogConfig::try_from(&settings.logging)?;
    if matches!(cli.command, Commands::Serve(_)) && log_config.log_dir.is_none() {
        log_config.log_dir = Some(settings.base_dir.join("log"));
    }
    let _logger = LoggerImpl::init(&log_config)?;

    let ctx = CommandContext::new(settings, cli.json);
    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &ctx),
        Commands::Serve(args) => commands::serve::execute(args, &ctx).await,
        Commands::Select(args) => commands::select::execute(args, &ctx).await,
        Commands::Validate(args) => commands::validate::validate(args, &ctx),
        Commands::Diff(args) => commands::validate::diff(args, &ctx),
        Commands::Resource(command) => commands::resource::execute(command, &ctx),
        Commands::Param(command) => commands::param::execute(command, &ctx).await,
    }
}
