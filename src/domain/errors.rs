//! Domain errors for the Umpire server.
//!
//! Each component owns one error family. Lower layers never swallow an error:
//! process failures are aggregated into [`GroupOperationError`] by the owning
//! service, and service failures are surfaced by the deployment coordinator.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Malformed DUT identity input. Never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("Malformed DUT info segment {0:?}: expected key=value")]
    MalformedSegment(String),

    #[error("Unknown DUT info key: {0}")]
    UnknownKey(String),

    #[error("Duplicate DUT info key: {0}")]
    DuplicateKey(String),
}

/// Structural violations in the parameter tree.
///
/// These are raised before any mutation is applied.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("Intend to do multiple operations at the same time")]
    MultipleOperations,

    #[error("Parameter component not found: {0}")]
    ComponentNotFound(usize),

    #[error("Parameter directory not found: {0}")]
    DirectoryNotFound(usize),

    #[error("Intend to rename to existing component {name:?} in directory {dir_id:?}")]
    DuplicateComponentName { name: String, dir_id: Option<usize> },

    #[error("Intend to rename to existing directory {name:?} under {parent_id:?}")]
    DuplicateDirectoryName {
        name: String,
        parent_id: Option<usize>,
    },

    #[error(
        "Intend to use invalid version {using_ver} of parameter {comp_id} ({revisions} revisions)"
    )]
    InvalidVersion {
        comp_id: usize,
        using_ver: usize,
        revisions: usize,
    },

    #[error("Intend to create component but assigned using_ver")]
    UsingVersionOnCreate,

    #[error("Intend to create component {0:?} without a source file")]
    MissingSource(String),

    #[error("Intend to create {0} without a name")]
    MissingName(&'static str),

    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    #[error("Parameter I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parameter document error: {0}")]
    Document(#[from] serde_json::Error),
}

pub type ParameterResult<T> = Result<T, ParameterError>;

/// Failure of a single supervised OS process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Invalid service process config: {0}")]
    InvalidConfig(String),

    #[error("Executable does not exist: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("Can not {action} process {process} in state {state}")]
    InvalidState {
        process: String,
        action: &'static str,
        state: String,
    },

    #[error("Failed to spawn {process}: {source}")]
    Spawn {
        process: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{process} ended unexpectedly ({}). messages:\n{}", format_exit(.code, .signal), .messages.join("\n"))]
    Exit {
        process: String,
        code: Option<i32>,
        signal: Option<i32>,
        messages: Vec<String>,
    },

    #[error("{process} respawning too fast ({attempts} starts within {window:?})")]
    RespawnTooFast {
        process: String,
        attempts: usize,
        window: Duration,
    },

    #[error("{process} (pid {pid}) did not stop in time ({limit:?})")]
    StopTimeout {
        process: String,
        pid: u32,
        limit: Duration,
    },

    #[error("Failed to signal {process}: {source}")]
    Signal {
        process: String,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("Supervisor task for {0} ended without a result")]
    SupervisorGone(String),
}

fn format_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (*code, *signal) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(signal)) => format!("killed by signal {signal}"),
        (None, None) => "unknown status".to_string(),
    }
}

/// Which group-level operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOperation {
    Start,
    Stop,
}

impl fmt::Display for GroupOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

/// One failed member of a service group.
#[derive(Debug)]
pub struct MemberFailure {
    pub process: String,
    pub error: ProcessError,
}

/// Aggregated failure of a service group operation, naming every failed member.
#[derive(Debug, Error)]
#[error("Service {service} failed to {operation}: {}", format_failures(.failures))]
pub struct GroupOperationError {
    pub service: String,
    pub operation: GroupOperation,
    pub failures: Vec<MemberFailure>,
}

impl GroupOperationError {
    /// Names of the processes that failed.
    pub fn failed_processes(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.process.as_str()).collect()
    }
}

fn format_failures(failures: &[MemberFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.process, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Umpire configuration document errors (schema and semantics).
#[derive(Debug, Error)]
pub enum UmpireConfigError {
    #[error("Failed to parse Umpire config: {0}")]
    Parse(String),

    #[error("Invalid Umpire config: {0}")]
    Schema(String),

    #[error("Missing default bundle")]
    MissingDefaultBundle,

    #[error("Duplicate bundle id: {0}")]
    DuplicateBundle(String),

    #[error("Resources missing:\n{}", .0.join("\n"))]
    ResourceMissing(Vec<String>),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Deployment coordinator errors.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Another deployment in progress")]
    AlreadyDeploying,

    #[error("Config validation failed: {0}")]
    Validation(#[from] UmpireConfigError),

    #[error("Failed to create processes for service {service}: {reason}")]
    ProcessCreation { service: String, reason: String },

    #[error("Service convergence failed: {}", format_groups(.0))]
    Services(Vec<GroupOperationError>),

    #[error("Failed to activate config {path}: {reason}")]
    Activate { path: PathBuf, reason: String },

    #[error("No configuration deployed yet")]
    NotDeployed,
}

impl DeployError {
    /// Every group error carried by a convergence failure.
    pub fn group_errors(&self) -> &[GroupOperationError] {
        match self {
            Self::Services(groups) => groups,
            _ => &[],
        }
    }
}

fn format_groups(groups: &[GroupOperationError]) -> String {
    groups
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type DeployResult<T> = Result<T, DeployError>;
