//! A named service: a group of processes started and stopped as one unit.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::process::ServiceProcess;
use super::ProcessTiming;
use crate::domain::errors::{GroupOperation, GroupOperationError, MemberFailure, ProcessError};
use crate::domain::models::{ProcessState, ServiceProcessConfig};

/// Snapshot of one member process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    pub process: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    /// Why the process failed, while it is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Supervises the member processes of one service as a unit.
pub struct ServiceSupervisor {
    name: String,
    timing: ProcessTiming,
    /// Held for the whole of a group operation.
    members: Mutex<Vec<Arc<ServiceProcess>>>,
}

impl ServiceSupervisor {
    pub fn new(name: impl Into<String>, timing: ProcessTiming) -> Self {
        Self {
            name: name.into(),
            timing,
            members: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn processes(&self) -> Vec<Arc<ServiceProcess>> {
        self.members.lock().await.clone()
    }

    /// True when any member has a live OS process.
    pub async fn is_running(&self) -> bool {
        self.members
            .lock()
            .await
            .iter()
            .any(|p| p.state().is_alive())
    }

    /// State, pid and failure reason of every member, failed ones included.
    pub async fn status(&self) -> Vec<ProcessStatus> {
        self.members
            .lock()
            .await
            .iter()
            .map(|p| ProcessStatus {
                process: p.label().to_string(),
                state: p.state(),
                pid: p.pid(),
                last_error: p.last_error(),
            })
            .collect()
    }

    /// Converge the group onto `configs`.
    ///
    /// Members not in `configs` are stopped first, then every wanted process
    /// that is not alive is started. Identical configs collapse into one
    /// process. Members that started are left running on failure.
    pub async fn start(&self, configs: Vec<ServiceProcessConfig>) -> Result<(), GroupOperationError> {
        let wanted = dedup(configs);
        let mut members = self.members.lock().await;
        let mut failures = retire_members(&mut members, &wanted).await;

        for config in wanted {
            if !members.iter().any(|p| *p.config() == config) {
                members.push(Arc::new(ServiceProcess::new(&self.name, config, self.timing)));
            }
        }

        let starting: Vec<Arc<ServiceProcess>> = members
            .iter()
            .filter(|p| p.state().can_start())
            .cloned()
            .collect();
        debug!(
            service = %self.name,
            starting = ?starting.iter().map(|p| p.label()).collect::<Vec<_>>(),
            "starting service processes"
        );
        let results = join_all(starting.iter().map(|p| p.start())).await;
        failures.extend(
            starting
                .iter()
                .zip(results)
                .filter_map(|(process, result)| member_failure(process, result)),
        );

        self.outcome(GroupOperation::Start, failures, members.len())
    }

    /// Stop only the members whose config is not in `configs`.
    pub async fn retire(&self, configs: &[ServiceProcessConfig]) -> Result<(), GroupOperationError> {
        let mut members = self.members.lock().await;
        let failures = retire_members(&mut members, configs).await;
        self.outcome(GroupOperation::Stop, failures, members.len())
    }

    /// Stop every member concurrently.
    ///
    /// Each member is bounded by its own stop-time limit, so the whole call
    /// takes at most the slowest member's limit.
    pub async fn stop(&self) -> Result<(), GroupOperationError> {
        let mut members = self.members.lock().await;
        let failures = retire_members(&mut members, &[]).await;
        self.outcome(GroupOperation::Stop, failures, 0)
    }

    fn outcome(
        &self,
        operation: GroupOperation,
        failures: Vec<MemberFailure>,
        remaining: usize,
    ) -> Result<(), GroupOperationError> {
        if failures.is_empty() {
            info!(service = %self.name, %operation, processes = remaining, "service operation done");
            return Ok(());
        }
        let err = GroupOperationError {
            service: self.name.clone(),
            operation,
            failures,
        };
        error!(service = %self.name, error = %err, "service operation failed");
        Err(err)
    }
}

/// Remove the members not in `wanted` and stop them.
async fn retire_members(
    members: &mut Vec<Arc<ServiceProcess>>,
    wanted: &[ServiceProcessConfig],
) -> Vec<MemberFailure> {
    let (keep, retired): (Vec<_>, Vec<_>) = members
        .drain(..)
        .partition(|p| wanted.contains(p.config()));
    *members = keep;
    if !retired.is_empty() {
        debug!(
            retiring = ?retired.iter().map(|p| p.label()).collect::<Vec<_>>(),
            "stopping service processes"
        );
    }
    stop_all(&retired).await
}

fn dedup(configs: Vec<ServiceProcessConfig>) -> Vec<ServiceProcessConfig> {
    let mut unique: Vec<ServiceProcessConfig> = Vec::with_capacity(configs.len());
    for config in configs {
        if unique.contains(&config) {
            debug!(process = %config.name, "ignoring duplicate process config");
        } else {
            unique.push(config);
        }
    }
    unique
}

async fn stop_all(processes: &[Arc<ServiceProcess>]) -> Vec<MemberFailure> {
    let results = join_all(processes.iter().map(|p| stop_member(p))).await;
    processes
        .iter()
        .zip(results)
        .filter_map(|(process, result)| member_failure(process, result))
        .collect()
}

/// Stop one member, force-killing it when it outlives the stop-time limit.
/// The timeout is still reported.
async fn stop_member(process: &ServiceProcess) -> Result<(), ProcessError> {
    if process.state() == ProcessState::Failed {
        warn!(
            process = %process.label(),
            error = process.last_error().as_deref().unwrap_or("unknown"),
            "removing failed process"
        );
    }
    match process.stop().await {
        Err(err @ (ProcessError::StopTimeout { .. } | ProcessError::Signal { .. })) => {
            if let Err(kill_err) = process.kill().await {
                warn!(process = %process.label(), error = %kill_err, "force kill failed");
            }
            Err(err)
        }
        other => other,
    }
}

fn member_failure(
    process: &ServiceProcess,
    result: Result<(), ProcessError>,
) -> Option<MemberFailure> {
    result.err().map(|error| MemberFailure {
        process: process.label().to_string(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_of_identical_configs() {
        let a = ServiceProcessConfig::new("/bin/sleep", "a", vec!["1".into()], "/");
        let b = ServiceProcessConfig::new("/bin/sleep", "b", vec!["1".into()], "/");
        let unique = dedup(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(unique, vec![a, b]);
    }
}
