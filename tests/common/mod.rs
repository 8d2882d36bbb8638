//! Common test utilities for integration tests
//!
//! Provides a throwaway Umpire environment, `/bin/sh` process configs with
//! short supervision timings, and polling helpers.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use umpire::services::ProcessTiming;
use umpire::{DeploymentCoordinator, ServiceProcessConfig, ServiceRegistry, UmpireEnv};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Supervision timings short enough for tests.
pub fn fast_timing() -> ProcessTiming {
    ProcessTiming {
        start_time_limit: Duration::from_millis(200),
        stop_time_limit: Duration::from_millis(500),
        min_restart_interval: Duration::from_millis(200),
        max_restart_count: 3,
        message_lines: 10,
    }
}

/// A process running `script` under `/bin/sh -c`.
pub fn sh(name: &str, script: &str) -> ServiceProcessConfig {
    ServiceProcessConfig::new("/bin/sh", name, vec!["-c".into(), script.into()], "/")
}

/// JSON form of [`sh`], for embedding in Umpire configs.
pub fn sh_json(name: &str, script: &str) -> Value {
    json!({"executable": "/bin/sh", "name": name, "args": ["-c", script], "path": "/"})
}

/// A long-running process.
pub fn sleeper(name: &str) -> Value {
    sh_json(name, "exec sleep 30")
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 20ms until it returns true or `timeout_ms`
/// elapsed.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    predicate()
}

/// An initialized Umpire base directory wired to a coordinator.
pub struct TestUmpire {
    pub dir: TempDir,
    pub env: Arc<UmpireEnv>,
    pub registry: Arc<ServiceRegistry>,
    pub coordinator: Arc<DeploymentCoordinator>,
}

impl TestUmpire {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let env = Arc::new(UmpireEnv::init(dir.path().join("umpire")).expect("init env"));
        let registry = Arc::new(ServiceRegistry::new(fast_timing()));
        let coordinator = Arc::new(DeploymentCoordinator::new(
            Arc::clone(&env),
            Arc::clone(&registry),
        ));
        Self {
            dir,
            env,
            registry,
            coordinator,
        }
    }

    /// Add `content` as a resource named after `file_name`.
    pub fn add_resource(&self, file_name: &str, content: &[u8]) -> String {
        let src = self.dir.path().join(file_name);
        std::fs::write(&src, content).expect("write resource source");
        self.env.add_resource(&src).expect("add resource")
    }

    /// A payload config whose toolkit resource exists.
    pub fn payloads(&self) -> String {
        let toolkit = self.add_resource("toolkit.run", b"#!/bin/sh\necho toolkit\n");
        let payloads = json!({"toolkit": {"version": "1.0", "file": toolkit}});
        self.add_resource("payload.json", payloads.to_string().as_bytes())
    }

    /// Store an Umpire config running `services` and return its resource name.
    pub fn config(&self, services: Value) -> String {
        let document = json!({
            "rulesets": [
                {"bundle_id": "smt", "active": true, "match": {"stage": ["SMT"]}},
                {"bundle_id": "default", "active": true, "note": "Default bundle"}
            ],
            "bundles": [
                {"id": "default", "payloads": self.payloads()},
                {"id": "smt", "note": "SMT line", "payloads": self.payloads()}
            ],
            "services": services,
        });
        self.add_resource("umpire.json", document.to_string().as_bytes())
    }

    pub fn resource_path(&self, name: &str) -> std::path::PathBuf {
        self.env.resources_dir().join(name)
    }

    pub fn base_dir(&self) -> &Path {
        self.env.base_dir()
    }
}
