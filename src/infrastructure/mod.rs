//! Infrastructure layer module
//!
//! Adapters between the domain and the host system:
//! - On-disk layout and resource store (`env`)
//! - Atomic file writes and content addressing (`storage`)
//! - Server settings (`config`)
//! - Logging setup (`logging`)

pub mod config;
pub mod env;
pub mod logging;
pub mod storage;

pub use config::{ConfigError, ConfigLoader};
pub use env::{EnvError, UmpireEnv};
