//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::{
    init::InitArgs, param::ParamCommands, resource::ResourceCommands, select::SelectArgs,
    serve::ServeArgs, validate::ConfigFileArgs,
};

#[derive(Parser)]
#[command(name = "umpire")]
#[command(about = "Umpire - factory deployment server", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Umpire base directory (overrides UMPIRE_BASE_DIR and settings files)
    #[arg(short, long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Additional YAML settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the base directory layout
    Init(InitArgs),

    /// Deploy the active config and supervise its services until interrupted
    Serve(ServeArgs),

    /// Show which bundle a DUT would receive
    Select(SelectArgs),

    /// Validate an Umpire config file and the resources it references
    Validate(ConfigFileArgs),

    /// Show rules a config would add or delete relative to the active one
    Diff(ConfigFileArgs),

    /// Resource management commands
    #[command(subcommand)]
    Resource(ResourceCommands),

    /// Parameter tree commands
    #[command(subcommand)]
    Param(ParamCommands),
}
