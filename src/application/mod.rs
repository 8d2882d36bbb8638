//! Use cases: deploying configs and answering operator commands.

pub mod commands;
pub mod deployment;

pub use commands::{CommandError, CommandResult, UmpireCommands};
pub use deployment::{DeployFailure, DeployState, DeploySummary, DeploymentCoordinator};
