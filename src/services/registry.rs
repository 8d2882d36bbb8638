//! Service definitions and the supervisors that run them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::errors::ProcessError;
use crate::domain::models::{ServiceProcessConfig, UmpireConfig};
use crate::domain::ports::{ResourceStore, ServiceDefinition};
use crate::services::supervisor::{ProcessStatus, ProcessTiming, ServiceSupervisor};

/// A service whose processes are listed verbatim in
/// `services.<name>.processes` of the Umpire config.
#[derive(Debug, Clone)]
pub struct ConfiguredService {
    name: String,
}

impl ConfiguredService {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ServiceDefinition for ConfiguredService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_processes(
        &self,
        config: &UmpireConfig,
        _resources: &dyn ResourceStore,
    ) -> Result<Vec<ServiceProcessConfig>, ProcessError> {
        Ok(config
            .services
            .get(&self.name)
            .map(|section| section.processes.clone())
            .unwrap_or_default())
    }
}

/// Name -> definition and name -> supervisor maps.
///
/// Unknown names fall back to [`ConfiguredService`]; supervisors are
/// created on first use and live as long as the registry.
pub struct ServiceRegistry {
    timing: ProcessTiming,
    definitions: RwLock<BTreeMap<String, Arc<dyn ServiceDefinition>>>,
    supervisors: RwLock<BTreeMap<String, Arc<ServiceSupervisor>>>,
}

impl ServiceRegistry {
    pub fn new(timing: ProcessTiming) -> Self {
        Self {
            timing,
            definitions: RwLock::new(BTreeMap::new()),
            supervisors: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add or replace the definition used for `definition.name()`.
    pub async fn register(&self, definition: Arc<dyn ServiceDefinition>) {
        let name = definition.name().to_string();
        debug!(service = %name, "service definition registered");
        self.definitions.write().await.insert(name, definition);
    }

    pub async fn definition(&self, name: &str) -> Arc<dyn ServiceDefinition> {
        if let Some(definition) = self.definitions.read().await.get(name) {
            return Arc::clone(definition);
        }
        Arc::clone(
            self.definitions
                .write()
                .await
                .entry(name.to_string())
                .or_insert_with(|| {
                    Arc::new(ConfiguredService::new(name)) as Arc<dyn ServiceDefinition>
                }),
        )
    }

    pub async fn supervisor(&self, name: &str) -> Arc<ServiceSupervisor> {
        if let Some(supervisor) = self.supervisors.read().await.get(name) {
            return Arc::clone(supervisor);
        }
        Arc::clone(
            self.supervisors
                .write()
                .await
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ServiceSupervisor::new(name, self.timing))),
        )
    }

    /// Process configs of service `name` under `config`.
    pub async fn create_processes(
        &self,
        name: &str,
        config: &UmpireConfig,
        resources: &dyn ResourceStore,
    ) -> Result<Vec<ServiceProcessConfig>, ProcessError> {
        self.definition(name)
            .await
            .create_processes(config, resources)
            .await
    }

    /// Names of services with at least one live process.
    pub async fn running_services(&self) -> Vec<String> {
        let supervisors: Vec<Arc<ServiceSupervisor>> =
            self.supervisors.read().await.values().cloned().collect();
        let mut running = Vec::new();
        for supervisor in supervisors {
            if supervisor.is_running().await {
                running.push(supervisor.name().to_string());
            }
        }
        running
    }

    pub async fn supervisors(&self) -> Vec<Arc<ServiceSupervisor>> {
        self.supervisors.read().await.values().cloned().collect()
    }

    pub async fn status(&self) -> BTreeMap<String, Vec<ProcessStatus>> {
        let mut status = BTreeMap::new();
        for supervisor in self.supervisors().await {
            status.insert(supervisor.name().to_string(), supervisor.status().await);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct NoResources;

    impl ResourceStore for NoResources {
        fn resource_path(&self, name: &str) -> PathBuf {
            PathBuf::from("/nonexistent").join(name)
        }
    }

    struct PerInterface;

    #[async_trait]
    impl ServiceDefinition for PerInterface {
        fn name(&self) -> &str {
            "dhcp"
        }

        async fn create_processes(
            &self,
            _config: &UmpireConfig,
            _resources: &dyn ResourceStore,
        ) -> Result<Vec<ServiceProcessConfig>, ProcessError> {
            Ok(["eth0", "eth1"]
                .iter()
                .map(|iface| {
                    ServiceProcessConfig::new("/bin/sleep", *iface, vec!["60".into()], "/")
                })
                .collect())
        }
    }

    fn config() -> UmpireConfig {
        UmpireConfig::from_json(
            r#"{"rulesets": [{"bundle_id": "d", "active": true}],
                "bundles": [{"id": "d", "payloads": "p"}],
                "services": {"http": {"processes": [
                    {"executable": "/bin/sleep", "name": "web", "args": ["60"], "path": "/"}
                ]}}}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_service_uses_config_processes() {
        let registry = ServiceRegistry::new(ProcessTiming::default());
        let processes = registry
            .create_processes("http", &config(), &NoResources)
            .await
            .unwrap();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].name, "web");

        let none = registry
            .create_processes("rsync", &config(), &NoResources)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_registered_definition_wins() {
        let registry = ServiceRegistry::new(ProcessTiming::default());
        registry.register(Arc::new(PerInterface)).await;
        let processes = registry
            .create_processes("dhcp", &config(), &NoResources)
            .await
            .unwrap();
        assert_eq!(processes.len(), 2);
    }

    #[tokio::test]
    async fn test_supervisor_is_created_once() {
        let registry = ServiceRegistry::new(ProcessTiming::default());
        let a = registry.supervisor("http").await;
        let b = registry.supervisor("http").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.running_services().await.is_empty());
    }
}
