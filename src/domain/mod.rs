//! Domain layer for the Umpire deployment server
//!
//! Pure models, error families and the port traits implemented by the
//! infrastructure layer.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    DeployError, DeployResult, GroupOperation, GroupOperationError, MatchError, MemberFailure,
    ParameterError, ParameterResult, ProcessError, UmpireConfigError,
};
