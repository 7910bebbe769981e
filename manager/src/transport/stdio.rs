// File: manager/src/transport/stdio.rs
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::framing::{find_response, JsonRpcNotification, JsonRpcRequest};
use super::{McpTransport, TransportKind};
use crate::errors::{ManagerError, ManagerResult};

/// Resolves a command the way a shell would: paths containing a separator are
/// checked directly, bare names are searched on `PATH`.
pub fn find_executable(command: &str) -> Option<PathBuf> {
    if command.is_empty() {
        return None;
    }

    if command.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(command);
        return is_executable(&path).then_some(path);
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

struct StdioProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: JoinHandle<()>,
    initialized: bool,
    next_request_id: u64,
}

impl StdioProcess {
    fn next_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    async fn write_message(&mut self, payload: String) -> ManagerResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ManagerError::ProbeFailure("stdin already closed".to_string()))?;

        let mut line = payload;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ManagerError::ProbeFailure(format!("write to stdin failed: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| ManagerError::ProbeFailure(format!("flush of stdin failed: {}", e)))
    }

    async fn request(&mut self, request: JsonRpcRequest) -> ManagerResult<()> {
        let id = request.id;
        let payload = serde_json::to_string(&request)?;
        self.write_message(payload).await?;

        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| ManagerError::ProbeFailure(format!("read from stdout failed: {}", e)))?
                .ok_or_else(|| ManagerError::ProbeFailure("process closed stdout".to_string()))?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            // Servers may log to stdout; anything that is not JSON is skipped
            let Ok(message) = serde_json::from_str::<serde_json::Value>(trimmed) else {
                debug!("Ignoring non-JSON stdout line: {}", trimmed);
                continue;
            };

            if let Some(response) = find_response(message, id) {
                return response.into_result().map(|_| ());
            }
        }
    }
}

pub struct StdioTransport {
    service_name: String,
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    process: Option<StdioProcess>,
}

impl StdioTransport {
    pub fn new(
        service_name: &str,
        command: &str,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> ManagerResult<Self> {
        let program = find_executable(command).ok_or_else(|| {
            ManagerError::AdapterInit(format!("executable '{}' not found", command))
        })?;

        Ok(Self {
            service_name: service_name.to_string(),
            program,
            args,
            env,
            process: None,
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn start(&mut self) -> ManagerResult<()> {
        if self.process.is_some() {
            return Ok(());
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            ManagerError::AdapterInit(format!("failed to spawn {}: {}", self.program.display(), e))
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill().await;
            return Err(ManagerError::AdapterInit("child process streams unavailable".to_string()));
        };

        // Drain stderr so a chatty server never blocks on a full pipe
        let name = self.service_name.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("{} stderr: {}", name, line.trim_end());
            }
        });

        info!(
            "Started stdio backend {} (pid {:?}): {}",
            self.service_name,
            child.id(),
            self.program.display()
        );

        self.process = Some(StdioProcess {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            stderr_task,
            initialized: false,
            next_request_id: 0,
        });
        Ok(())
    }

    async fn stop(&mut self, grace: Duration) -> ManagerResult<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        // Closing stdin is the protocol's shutdown signal
        drop(process.stdin.take());

        let half = grace / 2;
        if timeout(half, process.child.wait()).await.is_err() {
            #[cfg(unix)]
            {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;
                if let Some(pid) = process.child.id() {
                    debug!("Sending SIGTERM to {} (pid {})", self.service_name, pid);
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                }
            }

            if timeout(grace - half, process.child.wait()).await.is_err() {
                warn!(
                    "Stdio backend {} did not exit within {:?}, killing it",
                    self.service_name, grace
                );
                if let Err(e) = process.child.kill().await {
                    warn!("Failed to kill {}: {}", self.service_name, e);
                }
            }
        }

        process.stderr_task.abort();
        info!("Stopped stdio backend {}", self.service_name);
        Ok(())
    }

    async fn probe(&mut self) -> ManagerResult<()> {
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| ManagerError::ProbeFailure("process not started".to_string()))?;

        match process.child.try_wait() {
            Ok(Some(status)) => {
                return Err(ManagerError::ProbeFailure(format!("process exited with {}", status)));
            }
            Ok(None) => {}
            Err(e) => {
                return Err(ManagerError::ProbeFailure(format!("cannot query process state: {}", e)));
            }
        }

        if process.initialized {
            let id = process.next_id();
            return process.request(JsonRpcRequest::ping(id)).await;
        }

        let id = process.next_id();
        process.request(JsonRpcRequest::initialize(id)).await?;
        let notification = serde_json::to_string(&JsonRpcNotification::initialized())?;
        process.write_message(notification).await?;
        process.initialized = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.process.is_some()
    }
}
