//! Server settings
//!
//! Hierarchical configuration using figment:
//! - Programmatic defaults
//! - `<base_dir>/umpire.yaml` and an optional explicit YAML file
//! - `UMPIRE_*` environment variable overrides
//! - Validation of the merged result

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
