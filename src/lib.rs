//! Umpire - factory deployment server
//!
//! Umpire decides which bundle of software and resources a device under
//! test (DUT) receives, keeps a versioned tree of parameter files, and
//! supervises the OS processes that serve bundles to the factory line.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and ports
//! - **Service Layer** (`services`): Bundle selection, parameter store,
//!   process supervision and the service registry
//! - **Application Layer** (`application`): Deployment coordination and
//!   the operator command facade
//! - **Infrastructure Layer** (`infrastructure`): On-disk layout, settings
//!   and logging
//! - **CLI Layer** (`cli`): Command-line interface

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::{
    DeployFailure, DeployState, DeploySummary, DeploymentCoordinator, UmpireCommands,
};
pub use domain::errors::{
    DeployError, GroupOperationError, MatchError, ParameterError, ProcessError, UmpireConfigError,
};
pub use domain::models::{DutIdentity, Rule, ServerConfig, ServiceProcessConfig, UmpireConfig};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::env::UmpireEnv;
pub use services::{select_bundle, ParameterStore, ServiceRegistry, ServiceSupervisor};
