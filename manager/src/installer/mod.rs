//! Asynchronous installation of MCP backends from package registries
//!
//! Tasks are keyed by service id. At most one non-terminal task exists per
//! service; a second submission is rejected rather than coalesced. Workers are
//! spawned per task and gated by a semaphore, so installs for different
//! services run in parallel up to the configured limit.
//!
//! Tasks live in memory only. The durable outcome is the service row:
//! `installed_version` holds `installing` while a worker runs, and the
//! installed version once it succeeds.

mod task;
mod tools;

pub use task::{InstallRequest, InstallationStatus, InstallationTask, PackageManager};
pub use tools::{expand_args, package_spec, runtime_transport, InstallOutput, InstallTools};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, Semaphore};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::InstallerConfig;
use crate::constants::installer::{INSTALLING_MARKER, LATEST_VERSION};
use crate::database::Database;
use crate::errors::{ManagerError, ManagerResult};
use crate::registry::ServiceRegistry;
use crate::ServiceId;
use tools::{cancelled, run_install};

struct TaskEntry {
    task: InstallationTask,
    cancel: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct InstallationManager {
    tasks: Arc<RwLock<HashMap<ServiceId, TaskEntry>>>,
    permits: Arc<Semaphore>,
    tools: Arc<InstallTools>,
    install_timeout: Duration,
    registry: Arc<ServiceRegistry>,
    database: Arc<Database>,
}

impl InstallationManager {
    pub fn new(config: &InstallerConfig, registry: Arc<ServiceRegistry>, database: Arc<Database>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(config.max_concurrent_installs.max(1))),
            tools: Arc::new(InstallTools::new(config.tools.clone())),
            install_timeout: config.install_timeout(),
            registry,
            database,
        }
    }

    /// Accepts a task for asynchronous execution and returns it in `pending`.
    /// Fails with `TaskAlreadyActive` while another task for the same service
    /// has not finished. A finished task is replaced.
    #[instrument(skip(self, request), fields(service_id = request.service_id, package = %request.package_name))]
    pub async fn submit_task(&self, request: InstallRequest) -> ManagerResult<InstallationTask> {
        if request.package_name.trim().is_empty() {
            return Err(ManagerError::InvalidRequest("package name is required".to_string()));
        }

        let service_id = request.service_id;
        let task = InstallationTask::new(request);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        {
            let mut tasks = self.tasks.write().await;
            if let Some(existing) = tasks.get(&service_id) {
                if !existing.task.status.is_terminal() {
                    warn!(
                        "Rejecting installation for service {}: task {} is still {}",
                        service_id, existing.task.task_id, existing.task.status
                    );
                    return Err(ManagerError::TaskAlreadyActive {
                        service_id,
                        status: existing.task.status.to_string(),
                    });
                }
            }
            tasks.insert(
                service_id,
                TaskEntry {
                    task: task.clone(),
                    cancel: cancel_tx,
                },
            );
        }

        info!(
            "Submitted installation of {} via {} for service {} (task {})",
            task.package_name, task.package_manager, service_id, task.task_id
        );

        let manager = self.clone();
        let task_id = task.task_id;
        tokio::spawn(async move { manager.run_task(service_id, task_id, cancel_rx).await });

        Ok(task)
    }

    pub async fn get_task_status(&self, service_id: ServiceId) -> Option<InstallationTask> {
        self.tasks
            .read()
            .await
            .get(&service_id)
            .map(|entry| entry.task.clone())
    }

    /// Signals an active task to stop. The worker kills the package manager
    /// and marks the task failed with `install_cancelled`.
    pub async fn cancel_task(&self, service_id: ServiceId) -> ManagerResult<()> {
        let tasks = self.tasks.read().await;
        let entry = tasks.get(&service_id).ok_or(ManagerError::TaskNotFound(service_id))?;
        if entry.task.status.is_terminal() {
            return Err(ManagerError::InvalidRequest(format!(
                "installation for service {} already {}",
                service_id, entry.task.status
            )));
        }
        // The worker may finish between the check and the send; that is fine
        let _ = entry.cancel.send(true);
        info!("Cancellation requested for installation of service {}", service_id);
        Ok(())
    }

    pub async fn active_tasks(&self) -> Vec<InstallationTask> {
        let mut active: Vec<_> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|entry| !entry.task.status.is_terminal())
            .map(|entry| entry.task.clone())
            .collect();
        active.sort_by_key(|task| task.service_id);
        active
    }

    /// Drops terminal tasks that ended more than `max_age_hours` ago.
    pub async fn cleanup_finished_tasks(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();

        tasks.retain(|_, entry| {
            !entry.task.status.is_terminal() || entry.task.end_time.is_some_and(|end| end > cutoff)
        });

        let removed = before - tasks.len();
        if removed > 0 {
            info!("Cleaned up {} finished installation tasks older than {}h", removed, max_age_hours);
        }
        removed
    }

    async fn update_task<F>(&self, service_id: ServiceId, task_id: Uuid, apply: F) -> Option<InstallationTask>
    where
        F: FnOnce(&mut InstallationTask),
    {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(&service_id)
            .filter(|entry| entry.task.task_id == task_id)?;
        apply(&mut entry.task);
        Some(entry.task.clone())
    }

    /// Marks the task completed unless a cancel has been requested. Runs under
    /// the task map write lock, so a concurrent `cancel_task` either lands
    /// first and is honoured here or finds the task already terminal.
    async fn complete_task(
        &self,
        service_id: ServiceId,
        task_id: Uuid,
        cancel_rx: &watch::Receiver<bool>,
        output: Option<String>,
    ) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(entry) = tasks
            .get_mut(&service_id)
            .filter(|entry| entry.task.task_id == task_id)
        else {
            return true;
        };
        if *cancel_rx.borrow() {
            return false;
        }
        entry.task.mark_completed(output);
        true
    }

    async fn fail_task(&self, service_id: ServiceId, task_id: Uuid, err: ManagerError, output: Option<String>) {
        error!("Installation for service {} failed: {}", service_id, err);

        // The row stays, disabled and without a version, for inspection
        if let Err(e) = self.database.set_installed_version(service_id, None).await {
            warn!("Failed to clear install marker for service {}: {}", service_id, e);
        }
        if let Err(e) = self.database.set_service_enabled(service_id, false).await {
            warn!("Failed to disable service {} after failed install: {}", service_id, e);
        }

        self.update_task(service_id, task_id, |task| task.mark_failed(&err, output))
            .await;
    }

    async fn run_task(&self, service_id: ServiceId, task_id: Uuid, mut cancel_rx: watch::Receiver<bool>) {
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit,
            _ = cancelled(&mut cancel_rx) => {
                self.fail_task(service_id, task_id, ManagerError::InstallCancelled, None).await;
                return;
            }
        };
        let Ok(permit) = permit else {
            self.fail_task(
                service_id,
                task_id,
                ManagerError::Config("installer worker pool closed".to_string()),
                None,
            )
            .await;
            return;
        };

        let Some(task) = self
            .update_task(service_id, task_id, |task| task.mark_installing())
            .await
        else {
            return;
        };

        match self.database.set_installed_version(service_id, Some(INSTALLING_MARKER)).await {
            Ok(true) => {}
            Ok(false) => warn!("No service row {} to mark as installing", service_id),
            Err(e) => warn!("Failed to mark service {} as installing: {}", service_id, e),
        }

        let command = self.tools.command_for(task.package_manager);
        let spec = package_spec(task.package_manager, &task.package_name, task.version.as_deref());
        let args = expand_args(&command.args, &task.package_name, task.version.as_deref(), &spec);

        info!(
            "Installing {} for service {} with {}",
            spec, service_id, command.program
        );

        let (result, output) = run_install(
            &command,
            args,
            &task.env_vars,
            self.install_timeout,
            &mut cancel_rx,
        )
        .await;
        drop(permit);

        match result {
            Ok(()) if *cancel_rx.borrow() => {
                self.fail_task(service_id, task_id, ManagerError::InstallCancelled, output.summary())
                    .await;
            }
            Ok(()) => {
                self.activate_installed_service(&task).await;
                if self.complete_task(service_id, task_id, &cancel_rx, output.summary()).await {
                    info!("Installation of {} for service {} completed", spec, service_id);
                } else {
                    info!("Installation of service {} cancelled during activation", service_id);
                    match self.registry.unregister_service(service_id).await {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {}
                        Err(e) => warn!("Failed to unregister cancelled service {}: {}", service_id, e),
                    }
                    self.fail_task(service_id, task_id, ManagerError::InstallCancelled, output.summary())
                        .await;
                }
            }
            Err(err) => {
                self.fail_task(service_id, task_id, err, output.summary()).await;
            }
        }
    }

    /// Records the version, registers the service, and runs its first probe.
    /// Failures here are logged; the install itself already succeeded.
    async fn activate_installed_service(&self, task: &InstallationTask) {
        let service_id = task.service_id;
        let version = task.version.as_deref().unwrap_or(LATEST_VERSION);

        if let Err(e) = self.database.set_installed_version(service_id, Some(version)).await {
            warn!("Failed to record installed version for service {}: {}", service_id, e);
        }
        if let Err(e) = self.database.set_service_enabled(service_id, true).await {
            warn!("Failed to enable service {}: {}", service_id, e);
        }

        if let Err(e) = self.registry.register_from_database(service_id).await {
            error!(
                "Installed {} but failed to register service {}: {}",
                task.package_name, service_id, e
            );
            return;
        }

        match self.registry.force_check_service_health(service_id).await {
            Ok(snapshot) => info!("Initial health of service {}: {}", service_id, snapshot.status),
            Err(e) => warn!("Initial health check of service {} failed: {}", service_id, e),
        }

        if let Err(e) = self.registry.update_mcp_service_health(service_id).await {
            warn!("Failed to persist health of service {}: {}", service_id, e);
        }
    }
}
