//! Deploying configs: convergence, atomic activation and rollback.

mod common;

use std::sync::Arc;

use common::{setup_test_logging, sh_json, sleeper, wait_for, TestUmpire};
use serde_json::json;
use umpire::application::{DeployState, UmpireCommands};
use umpire::domain::models::ProcessState;
use umpire::{DeployError, UmpireConfigError};

async fn pid_of(umpire: &TestUmpire, service: &str, process: &str) -> Option<u32> {
    let label = format!("{service}:{process}");
    umpire
        .registry
        .supervisor(service)
        .await
        .status()
        .await
        .into_iter()
        .find(|s| s.process == label && s.state == ProcessState::Running)
        .and_then(|s| s.pid)
}

#[tokio::test]
async fn test_deploy_starts_services_and_activates_config() {
    setup_test_logging();
    let umpire = TestUmpire::new();
    let config = umpire.config(json!({
        "http": {"processes": [sleeper("web")]},
        "rsync": {"active": false, "processes": [sleeper("daemon")]}
    }));

    assert_eq!(umpire.coordinator.deploy_state().await, DeployState::Idle);
    let summary = umpire.coordinator.deploy(&config, false).await.unwrap();
    assert_eq!(summary.started, vec!["http".to_string()]);

    assert_eq!(umpire.coordinator.deploy_state().await, DeployState::Active);
    assert!(umpire.coordinator.active_config().await.is_some());
    assert_eq!(umpire.registry.running_services().await, vec!["http".to_string()]);
    assert!(pid_of(&umpire, "http", "web").await.is_some());

    let active = umpire.env.read_active_config().unwrap();
    assert_eq!(active, std::fs::read(umpire.resource_path(&config)).unwrap());

    umpire.coordinator.shutdown().await.unwrap();
    assert!(umpire.registry.running_services().await.is_empty());
}

#[tokio::test]
async fn test_redeploy_converges_processes() {
    let umpire = TestUmpire::new();
    let first = umpire.config(json!({
        "http": {"processes": [sleeper("web")]},
        "rsync": {"processes": [sleeper("daemon")]}
    }));
    umpire.coordinator.deploy(&first, false).await.unwrap();
    let web_pid = pid_of(&umpire, "http", "web").await.unwrap();

    let second = umpire.config(json!({
        "http": {"processes": [sleeper("web"), sleeper("api")]}
    }));
    let summary = umpire.coordinator.deploy(&second, false).await.unwrap();
    assert_eq!(summary.stopped, vec!["rsync".to_string()]);

    // Unchanged process keeps running, the new one is added, rsync is gone.
    assert_eq!(pid_of(&umpire, "http", "web").await, Some(web_pid));
    assert!(pid_of(&umpire, "http", "api").await.is_some());
    assert_eq!(umpire.registry.running_services().await, vec!["http".to_string()]);

    umpire.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_all_restarts_unchanged_processes() {
    let umpire = TestUmpire::new();
    let config = umpire.config(json!({"http": {"processes": [sleeper("web")]}}));
    umpire.coordinator.deploy(&config, false).await.unwrap();
    let before = pid_of(&umpire, "http", "web").await.unwrap();

    let summary = umpire.coordinator.deploy(&config, true).await.unwrap();
    assert_eq!(summary.stopped, vec!["http".to_string()]);
    let after = pid_of(&umpire, "http", "web").await.unwrap();
    assert_ne!(before, after);

    umpire.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_deploy_keeps_previous_config() {
    let umpire = TestUmpire::new();
    let good = umpire.config(json!({"http": {"processes": [sleeper("web")]}}));
    umpire.coordinator.deploy(&good, false).await.unwrap();
    let active_before = umpire.env.read_active_config().unwrap();

    let bad = umpire.config(json!({
        "http": {"processes": [sleeper("web2")]},
        "dhcp": {"processes": [sh_json("broken", "echo no interfaces >&2; exit 1")]}
    }));
    let err = umpire.coordinator.deploy(&bad, false).await.unwrap_err();

    let groups = err.group_errors();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].service, "dhcp");
    assert_eq!(groups[0].failed_processes(), vec!["dhcp:broken"]);

    // Marker untouched and the previous services restored.
    assert_eq!(umpire.env.read_active_config().unwrap(), active_before);
    assert_eq!(umpire.coordinator.deploy_state().await, DeployState::Active);
    assert!(pid_of(&umpire, "http", "web").await.is_some());
    assert!(pid_of(&umpire, "http", "web2").await.is_none());

    umpire.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_deploy_is_recorded_until_next_success() {
    let umpire = TestUmpire::new();
    assert_eq!(umpire.coordinator.last_deploy_error().await, None);

    let bad = umpire.config(json!({
        "dhcp": {"processes": [sh_json("broken", "echo no interfaces >&2; exit 1")]}
    }));
    umpire.coordinator.deploy(&bad, false).await.unwrap_err();
    assert_eq!(umpire.coordinator.deploy_state().await, DeployState::Idle);

    let failure = umpire.coordinator.last_deploy_error().await.unwrap();
    assert_eq!(failure.config, umpire.resource_path(&bad));
    assert!(failure.error.contains("dhcp:broken"), "{}", failure.error);
    assert!(failure.error.contains("no interfaces"), "{}", failure.error);

    let good = umpire.config(json!({"http": {"processes": [sleeper("web")]}}));
    umpire.coordinator.deploy(&good, false).await.unwrap();
    assert_eq!(umpire.coordinator.last_deploy_error().await, None);

    umpire.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_first_deploy_failure_stops_started_services() {
    let umpire = TestUmpire::new();
    let bad = umpire.config(json!({
        "http": {"processes": [sleeper("web")]},
        "dhcp": {"processes": [sh_json("broken", "exit 1")]}
    }));

    let err = umpire.coordinator.deploy(&bad, false).await.unwrap_err();
    assert!(matches!(err, DeployError::Services(_)));
    assert!(!umpire.env.has_active_config());
    assert_eq!(umpire.coordinator.deploy_state().await, DeployState::Idle);
    assert!(umpire.registry.running_services().await.is_empty());
}

#[tokio::test]
async fn test_missing_resources_reject_deploy_before_any_change() {
    let umpire = TestUmpire::new();
    let document = json!({
        "rulesets": [{"bundle_id": "default", "active": true}],
        "bundles": [{"id": "default", "payloads": "payload.missing.json"}],
        "services": {"http": {"processes": [sleeper("web")]}}
    });
    let config = umpire.add_resource("umpire.json", document.to_string().as_bytes());

    let err = umpire.coordinator.deploy(&config, false).await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::Validation(UmpireConfigError::ResourceMissing(_))
    ));
    assert!(!umpire.env.has_active_config());
    assert!(umpire.registry.running_services().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_deploy_is_rejected() {
    let umpire = TestUmpire::new();
    let config = umpire.config(json!({"http": {"processes": [sleeper("web")]}}));

    let (first, second) = tokio::join!(
        umpire.coordinator.deploy(&config, false),
        umpire.coordinator.deploy(&config, false)
    );
    assert!(first.is_ok());
    assert!(matches!(second, Err(DeployError::AlreadyDeploying)));
    assert!(!umpire.coordinator.is_deploying());

    umpire.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_is_deploying_while_in_flight() {
    let umpire = TestUmpire::new();
    let config = umpire.config(json!({"http": {"processes": [sleeper("web")]}}));

    let coordinator = Arc::clone(&umpire.coordinator);
    let task = tokio::spawn(async move { coordinator.deploy(&config, false).await });
    assert!(wait_for(|| umpire.coordinator.is_deploying(), 2000).await);
    task.await.unwrap().unwrap();
    assert!(!umpire.coordinator.is_deploying());

    umpire.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_and_stop_services() {
    let umpire = TestUmpire::new();
    let names = vec!["http".to_string()];
    assert!(matches!(
        umpire.coordinator.start_services(&names).await,
        Err(DeployError::NotDeployed)
    ));

    let config = umpire.config(json!({"http": {"processes": [sleeper("web")]}}));
    umpire.coordinator.deploy(&config, false).await.unwrap();

    umpire.coordinator.stop_services(&names).await.unwrap();
    assert!(umpire.registry.running_services().await.is_empty());
    umpire.coordinator.start_services(&names).await.unwrap();
    assert_eq!(umpire.registry.running_services().await, names);

    umpire.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_resume_deploys_active_marker() {
    let umpire = TestUmpire::new();
    assert!(umpire.coordinator.resume().await.unwrap().is_none());

    let config = umpire.config(json!({"http": {"processes": [sleeper("web")]}}));
    umpire.env.activate_config(&umpire.resource_path(&config)).unwrap();

    let summary = umpire.coordinator.resume().await.unwrap().unwrap();
    assert_eq!(summary.started, vec!["http".to_string()]);
    assert!(pid_of(&umpire, "http", "web").await.is_some());

    umpire.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_commands_select_bundle_and_active_config() {
    let umpire = TestUmpire::new();
    let commands = UmpireCommands::new(Arc::clone(&umpire.coordinator));
    assert!(commands.get_active_config().is_err());

    let config = umpire.config(json!({}));
    commands.deploy(&config, false).await.unwrap();

    let smt = commands.select_bundle("sn=SN001; stage=SMT").await.unwrap();
    assert_eq!(smt.unwrap().id, "smt");
    let other = commands.select_bundle("sn=SN001; stage=FATP").await.unwrap();
    assert_eq!(other.unwrap().id, "default");
    assert!(commands.select_bundle("sn SN001").await.is_err());

    let text = commands.get_active_config().unwrap();
    assert!(text.contains("\"smt\""));
    assert!(!commands.is_deploying());
}

#[tokio::test]
async fn test_commands_diff_against_active() {
    let umpire = TestUmpire::new();
    let commands = UmpireCommands::new(Arc::clone(&umpire.coordinator));
    let first = umpire.config(json!({}));

    let diff = commands.diff_config(&umpire.resource_path(&first)).unwrap();
    assert_eq!(diff.added.len(), 2);
    commands.deploy(&first, false).await.unwrap();
    assert!(commands
        .diff_config(&umpire.resource_path(&first))
        .unwrap()
        .is_empty());

    let validated = commands
        .validate_config(&umpire.resource_path(&first))
        .unwrap();
    assert_eq!(validated.default_bundle().unwrap().id, "smt");
}
