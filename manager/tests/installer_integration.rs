//! Integration tests for the installation manager
//!
//! Package managers are replaced by `sh -c` scripts so every outcome
//! (success, failure, timeout, cancellation) is deterministic.

mod common;

use common::fixtures::*;
use common::fixtures::harness::scripted_installer;
use mcp_manager::config::{InstallerConfig, ToolCommand};
use mcp_manager::installer::PackageManager;
use mcp_manager::{HealthStatus, InstallRequest, InstallationStatus};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(15);

fn npm_request(service_id: i64, package: &str) -> InstallRequest {
    InstallRequest {
        service_id,
        package_name: package.to_string(),
        package_manager: PackageManager::Npm,
        version: None,
        env_vars: BTreeMap::new(),
    }
}

async fn package_row(harness: &TestHarness, id: i64, package: &str) -> i64 {
    harness
        .insert_package_service(&service_config(id, package, echo_server_transport()), package)
        .await
}

#[tokio::test]
async fn test_successful_install_registers_and_probes_service() {
    let harness = TestHarness::new().await;
    let id = package_row(&harness, 42, "left-pad").await;
    assert_eq!(id, 42);

    let task = harness.installer.submit_task(npm_request(42, "left-pad")).await.unwrap();
    assert_eq!(task.status, InstallationStatus::Pending);

    let task = harness.wait_for_task(42, WAIT).await;
    assert_eq!(task.status, InstallationStatus::Completed, "error: {:?}", task.error);
    assert!(task.start_time.is_some());
    assert!(task.end_time.is_some());
    assert!(task.error.is_none());

    let service = harness.registry.get_service(42).await.expect("service registered");
    let health = service.health().await;
    assert!(health.last_checked.is_some());
    assert_eq!(health.status, HealthStatus::Healthy);

    let row = harness.database.get_service(42).await.unwrap().unwrap();
    assert_eq!(row.installed_version.as_deref(), Some("latest"));
    assert!(row.enabled);
    assert_eq!(row.health_status, "healthy");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_version_and_env_reach_the_install_command() {
    let script = r#"test "{spec}" = "left-pad@1.3.0" && test "$INSTALL_MARKER" = "yes""#;
    let harness = TestHarness::with_installer(scripted_installer(script, 30)).await;
    package_row(&harness, 7, "left-pad").await;

    let mut request = npm_request(7, "left-pad");
    request.version = Some("1.3.0".to_string());
    request.env_vars.insert("INSTALL_MARKER".to_string(), "yes".to_string());
    harness.installer.submit_task(request).await.unwrap();

    let task = harness.wait_for_task(7, WAIT).await;
    assert_eq!(task.status, InstallationStatus::Completed, "error: {:?}", task.error);

    let row = harness.database.get_service(7).await.unwrap().unwrap();
    assert_eq!(row.installed_version.as_deref(), Some("1.3.0"));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_second_submission_rejected_while_active() {
    let harness = TestHarness::with_installer(scripted_installer("sleep 1", 30)).await;
    package_row(&harness, 9, "left-pad").await;

    harness.installer.submit_task(npm_request(9, "left-pad")).await.unwrap();
    let err = harness
        .installer
        .submit_task(npm_request(9, "left-pad"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "task_already_active");
    assert_eq!(harness.installer.active_tasks().await.len(), 1);

    let first = harness.wait_for_task(9, WAIT).await;
    assert_eq!(first.status, InstallationStatus::Completed);

    // A finished task is replaced by a new submission
    let second = harness.installer.submit_task(npm_request(9, "left-pad")).await.unwrap();
    assert_ne!(second.task_id, first.task_id);
    harness.wait_for_task(9, WAIT).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_missing_tool_fails_task_and_disables_row() {
    let mut tools = HashMap::new();
    tools.insert(
        "npm".to_string(),
        ToolCommand {
            program: "no-such-package-manager".to_string(),
            args: vec!["install".to_string(), "{spec}".to_string()],
        },
    );
    let config = InstallerConfig {
        tools,
        ..InstallerConfig::default()
    };
    let harness = TestHarness::with_installer(config).await;
    package_row(&harness, 11, "left-pad").await;

    harness.installer.submit_task(npm_request(11, "left-pad")).await.unwrap();
    let task = harness.wait_for_task(11, WAIT).await;

    assert_eq!(task.status, InstallationStatus::Failed);
    assert_eq!(task.error_kind.as_deref(), Some("install_tool_missing"));
    assert!(harness.registry.get_service(11).await.is_err());

    let row = harness.database.get_service(11).await.unwrap().unwrap();
    assert!(row.installed_version.is_none());
    assert!(!row.enabled);
}

#[tokio::test]
async fn test_non_zero_exit_keeps_stderr() {
    let harness =
        TestHarness::with_installer(scripted_installer("echo 'E404 not found' >&2; exit 3", 30)).await;
    package_row(&harness, 12, "left-pad").await;

    harness.installer.submit_task(npm_request(12, "left-pad")).await.unwrap();
    let task = harness.wait_for_task(12, WAIT).await;

    assert_eq!(task.status, InstallationStatus::Failed);
    assert_eq!(task.error_kind.as_deref(), Some("install_exec_failure"));
    let error = task.error.unwrap();
    assert!(error.contains("code 3"), "{}", error);
    assert!(error.contains("E404"), "{}", error);
    assert!(task.output.unwrap_or_default().contains("E404"));
}

#[tokio::test]
async fn test_install_timeout_kills_the_tool() {
    let harness = TestHarness::with_installer(scripted_installer("exec sleep 30", 1)).await;
    package_row(&harness, 13, "left-pad").await;

    harness.installer.submit_task(npm_request(13, "left-pad")).await.unwrap();
    let task = harness.wait_for_task(13, WAIT).await;

    assert_eq!(task.status, InstallationStatus::Failed);
    assert_eq!(task.error_kind.as_deref(), Some("install_timeout"));
}

#[tokio::test]
async fn test_cancel_active_installation() {
    let harness = TestHarness::with_installer(scripted_installer("exec sleep 30", 60)).await;
    package_row(&harness, 14, "left-pad").await;

    let missing = harness.installer.cancel_task(14).await.unwrap_err();
    assert!(missing.is_not_found());

    harness.installer.submit_task(npm_request(14, "left-pad")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    harness.installer.cancel_task(14).await.unwrap();

    let task = harness.wait_for_task(14, WAIT).await;
    assert_eq!(task.status, InstallationStatus::Failed);
    assert_eq!(task.error_kind.as_deref(), Some("install_cancelled"));

    let again = harness.installer.cancel_task(14).await.unwrap_err();
    assert_eq!(again.kind(), "invalid_request");
}

#[tokio::test]
async fn test_cancel_during_activation_unregisters_service() {
    let harness = TestHarness::new().await;
    let server = MockMcpServer::start().await;
    server.mock_streamable_slow(Duration::from_secs(2)).await;
    harness
        .insert_package_service(
            &service_config(42, "slow-remote", streamable_transport(&server.mcp_url())),
            "slow-remote",
        )
        .await;

    harness.installer.submit_task(npm_request(42, "slow-remote")).await.unwrap();

    // Registration is immediate; the first health check is held up by the backend
    let started = std::time::Instant::now();
    while !harness.registry.contains(42).await {
        assert!(started.elapsed() < WAIT, "service was never registered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    harness.installer.cancel_task(42).await.unwrap();
    harness.database.soft_delete_service(42).await.unwrap();

    let task = harness.wait_for_task(42, WAIT).await;
    assert_eq!(task.status, InstallationStatus::Failed);
    assert_eq!(task.error_kind.as_deref(), Some("install_cancelled"));
    assert!(!harness.registry.contains(42).await);
    assert!(harness.cache.get_service_health(42).await.is_none());

    let again = harness.installer.cancel_task(42).await.unwrap_err();
    assert_eq!(again.kind(), "invalid_request");
}

#[tokio::test]
async fn test_blank_package_name_rejected() {
    let harness = TestHarness::new().await;
    let err = harness
        .installer
        .submit_task(npm_request(1, "   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    assert!(harness.installer.get_task_status(1).await.is_none());
}

#[tokio::test]
async fn test_cleanup_drops_only_finished_tasks() {
    let harness = TestHarness::with_installer(scripted_installer("exit 1", 30)).await;
    package_row(&harness, 15, "left-pad").await;

    harness.installer.submit_task(npm_request(15, "left-pad")).await.unwrap();
    harness.wait_for_task(15, WAIT).await;

    assert_eq!(harness.installer.cleanup_finished_tasks(24).await, 0);
    assert_eq!(harness.installer.cleanup_finished_tasks(0).await, 1);
    assert!(harness.installer.get_task_status(15).await.is_none());
}
