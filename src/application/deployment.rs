//! Deployment of Umpire configs onto the running services.
//!
//! A deploy validates the candidate config, stops what is no longer wanted,
//! starts what is, and only then repoints the active config marker. Any
//! failure leaves the marker on the previous config and restores the
//! previous services as far as possible.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::domain::errors::{DeployError, DeployResult, GroupOperationError};
use crate::domain::models::{ServiceProcessConfig, UmpireConfig};
use crate::domain::ports::ResourceStore;
use crate::infrastructure::env::UmpireEnv;
use crate::services::ServiceRegistry;

/// Node-level deployment state.
///
/// A failed deploy settles back to `Active` (previous config still served)
/// or `Idle`; [`DeploymentCoordinator::last_deploy_error`] tells why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Idle,
    Validating,
    Deploying,
    Active,
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Deploying => "deploying",
            Self::Active => "active",
        };
        f.write_str(s)
    }
}

/// What a successful deploy did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploySummary {
    pub config: PathBuf,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub deployed_at: DateTime<Utc>,
}

/// Last finished deploy attempt that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployFailure {
    pub config: PathBuf,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Services to run (with their processes) and services to stop.
#[derive(Debug, Default)]
struct ServicePlan {
    run: BTreeMap<String, Vec<ServiceProcessConfig>>,
    stop: Vec<String>,
}

/// Clears the in-flight flag when the deploy ends, however it ends.
struct DeployGuard<'a>(&'a AtomicBool);

impl<'a> DeployGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> DeployResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DeployError::AlreadyDeploying)?;
        Ok(Self(flag))
    }
}

impl Drop for DeployGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the deploy lifecycle of one Umpire node.
///
/// At most one deploy runs at a time; a second request is rejected with
/// [`DeployError::AlreadyDeploying`] instead of being queued.
pub struct DeploymentCoordinator {
    env: Arc<UmpireEnv>,
    registry: Arc<ServiceRegistry>,
    deploying: AtomicBool,
    state: RwLock<DeployState>,
    active: RwLock<Option<Arc<UmpireConfig>>>,
    last_failure: RwLock<Option<DeployFailure>>,
}

impl DeploymentCoordinator {
    pub fn new(env: Arc<UmpireEnv>, registry: Arc<ServiceRegistry>) -> Self {
        Self {
            env,
            registry,
            deploying: AtomicBool::new(false),
            state: RwLock::new(DeployState::Idle),
            active: RwLock::new(None),
            last_failure: RwLock::new(None),
        }
    }

    /// Environment the coordinator deploys into.
    pub fn env(&self) -> &Arc<UmpireEnv> {
        &self.env
    }

    /// Services and their supervisors.
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// True while a deploy holds the single-flight guard.
    pub fn is_deploying(&self) -> bool {
        self.deploying.load(Ordering::Acquire)
    }

    /// Current node state.
    pub async fn deploy_state(&self) -> DeployState {
        *self.state.read().await
    }

    /// The config the services currently run, if any deploy succeeded.
    pub async fn active_config(&self) -> Option<Arc<UmpireConfig>> {
        self.active.read().await.clone()
    }

    /// Why the most recent deploy failed. Cleared by the next successful
    /// deploy; rejected concurrent requests do not touch it.
    pub async fn last_deploy_error(&self) -> Option<DeployFailure> {
        self.last_failure.read().await.clone()
    }

    /// Deploy the config stored as resource `config_res`.
    pub async fn deploy(&self, config_res: &str, restart_all: bool) -> DeployResult<DeploySummary> {
        let path = self.env.resource_path(config_res);
        self.deploy_file(&path, restart_all).await
    }

    /// Deploy whatever the active marker points to, e.g. on server start.
    pub async fn resume(&self) -> DeployResult<Option<DeploySummary>> {
        if !self.env.has_active_config() {
            info!("no active config to resume");
            return Ok(None);
        }
        let target = self
            .env
            .active_config_target()
            .map_err(|e| DeployError::Activate {
                path: self.env.active_config_file(),
                reason: e.to_string(),
            })?;
        self.deploy_file(&target, false).await.map(Some)
    }

    /// Deploy a config file. Rejected at once while another deploy runs.
    ///
    /// With `restart_all` every running service is stopped before starting.
    #[instrument(skip(self), fields(config = %config_path.display()))]
    pub async fn deploy_file(
        &self,
        config_path: &Path,
        restart_all: bool,
    ) -> DeployResult<DeploySummary> {
        let _guard = DeployGuard::acquire(&self.deploying).inspect_err(|_| {
            warn!("deploy rejected, another deployment in progress");
        })?;

        *self.state.write().await = DeployState::Validating;
        let result = self.run_deploy(config_path, restart_all).await;
        let settled = if self.active.read().await.is_some() {
            DeployState::Active
        } else {
            DeployState::Idle
        };
        *self.state.write().await = settled;

        let failure = match &result {
            Ok(summary) => {
                info!(?summary, "deploy succeeded");
                None
            }
            Err(err) => {
                error!(error = %err, "deploy failed");
                Some(DeployFailure {
                    config: config_path.to_path_buf(),
                    error: err.to_string(),
                    failed_at: Utc::now(),
                })
            }
        };
        *self.last_failure.write().await = failure;
        result
    }

    async fn run_deploy(&self, config_path: &Path, restart_all: bool) -> DeployResult<DeploySummary> {
        let config = UmpireConfig::load(config_path)?;
        config.validate_resources(self.env.as_ref())?;

        *self.state.write().await = DeployState::Deploying;
        let plan = self.plan(&config, restart_all).await?;
        info!(run = ?plan.run.keys().collect::<Vec<_>>(), stop = ?plan.stop, "service plan");

        if let Err(err) = self.converge(&plan).await {
            self.rollback().await;
            return Err(err);
        }
        if let Err(err) = self.env.activate_config(config_path) {
            self.rollback().await;
            return Err(DeployError::Activate {
                path: config_path.to_path_buf(),
                reason: err.to_string(),
            });
        }

        *self.active.write().await = Some(Arc::new(config));
        Ok(DeploySummary {
            config: config_path.to_path_buf(),
            started: plan.run.into_keys().collect(),
            stopped: plan.stop,
            deployed_at: Utc::now(),
        })
    }

    async fn plan(&self, config: &UmpireConfig, restart_all: bool) -> DeployResult<ServicePlan> {
        let mut run = BTreeMap::new();
        for name in config.active_service_names() {
            let processes = self.create_processes(&name, config).await?;
            run.insert(name, processes);
        }
        let stop = self
            .registry
            .running_services()
            .await
            .into_iter()
            .filter(|name| restart_all || !run.contains_key(name))
            .collect();
        Ok(ServicePlan { run, stop })
    }

    async fn create_processes(
        &self,
        name: &str,
        config: &UmpireConfig,
    ) -> DeployResult<Vec<ServiceProcessConfig>> {
        self.registry
            .create_processes(name, config, self.env.as_ref())
            .await
            .map_err(|e| DeployError::ProcessCreation {
                service: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// Stop phase across all services, then start phase.
    async fn converge(&self, plan: &ServicePlan) -> DeployResult<()> {
        let stopped = join_all(plan.stop.iter().map(|name| async move {
            self.registry.supervisor(name).await.stop().await
        }));
        let retired = join_all(plan.run.iter().map(|(name, processes)| async move {
            self.registry.supervisor(name).await.retire(processes).await
        }));
        let (stopped, retired) = tokio::join!(stopped, retired);
        collect_failures(stopped.into_iter().chain(retired))?;

        let started = join_all(plan.run.iter().map(|(name, processes)| async move {
            self.registry
                .supervisor(name)
                .await
                .start(processes.clone())
                .await
        }))
        .await;
        collect_failures(started)
    }

    /// Put the services back the way the active config wants them. Failures
    /// are logged; the caller reports the original error.
    async fn rollback(&self) {
        let previous = self.active.read().await.clone();
        let plan = match previous {
            Some(config) => match self.plan(&config, false).await {
                Ok(plan) => plan,
                Err(err) => {
                    error!(error = %err, "rollback failed to plan previous services");
                    return;
                }
            },
            None => ServicePlan {
                run: BTreeMap::new(),
                stop: self.registry.running_services().await,
            },
        };
        warn!(run = ?plan.run.keys().collect::<Vec<_>>(), stop = ?plan.stop, "rolling back services");
        if let Err(err) = self.converge(&plan).await {
            error!(error = %err, "rollback failed");
        }
    }

    /// Start services of the active config.
    ///
    /// Fails with [`DeployError::NotDeployed`] before the first deploy.
    pub async fn start_services(&self, names: &[String]) -> DeployResult<()> {
        let config = self.active_config().await.ok_or(DeployError::NotDeployed)?;
        let mut planned = Vec::with_capacity(names.len());
        for name in names {
            planned.push((name, self.create_processes(name, &config).await?));
        }
        let results = join_all(planned.into_iter().map(|(name, processes)| async move {
            self.registry.supervisor(name).await.start(processes).await
        }))
        .await;
        collect_failures(results)
    }

    /// Stop the named services. Every failing service is reported.
    pub async fn stop_services(&self, names: &[String]) -> DeployResult<()> {
        let results = join_all(
            names
                .iter()
                .map(|name| async move { self.registry.supervisor(name).await.stop().await }),
        )
        .await;
        collect_failures(results)
    }

    /// Stop every service.
    pub async fn shutdown(&self) -> DeployResult<()> {
        info!("stopping all services");
        let supervisors = self.registry.supervisors().await;
        let results = join_all(supervisors.iter().map(|s| s.stop())).await;
        collect_failures(results)
    }
}

fn collect_failures(
    results: impl IntoIterator<Item = Result<(), GroupOperationError>>,
) -> DeployResult<()> {
    let failures: Vec<GroupOperationError> = results.into_iter().filter_map(Result::err).collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(DeployError::Services(failures))
    }
}
