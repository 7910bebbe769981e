// File: manager/src/installer/tools.rs
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::task::PackageManager;
use crate::config::ToolCommand;
use crate::constants::installer::{OUTPUT_DRAIN_TIMEOUT, OUTPUT_TAIL_BYTES};
use crate::errors::{ManagerError, ManagerResult};
use crate::transport::{find_executable, TransportConfig};

/// Resolves the install command for each package manager, applying
/// configured overrides over the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct InstallTools {
    overrides: HashMap<String, ToolCommand>,
}

impl InstallTools {
    pub fn new(overrides: HashMap<String, ToolCommand>) -> Self {
        Self { overrides }
    }

    pub fn command_for(&self, manager: PackageManager) -> ToolCommand {
        self.overrides
            .get(manager.as_str())
            .cloned()
            .unwrap_or_else(|| default_command(manager))
    }
}

fn default_command(manager: PackageManager) -> ToolCommand {
    let (program, args): (&str, &[&str]) = match manager {
        PackageManager::Npm => ("npm", &["install", "-g", "{spec}"]),
        PackageManager::Pypi | PackageManager::Uv => ("uv", &["tool", "install", "{spec}"]),
        PackageManager::Pip => ("pip", &["install", "{spec}"]),
    };
    ToolCommand {
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
    }
}

/// `pkg@ver` for npm, `pkg==ver` for the Python managers, bare `pkg` when no
/// version was requested.
pub fn package_spec(manager: PackageManager, package: &str, version: Option<&str>) -> String {
    match version {
        Some(version) if manager.is_python() => format!("{}=={}", package, version),
        Some(version) => format!("{}@{}", package, version),
        None => package.to_string(),
    }
}

pub fn expand_args(args: &[String], package: &str, version: Option<&str>, spec: &str) -> Vec<String> {
    args.iter()
        .map(|arg| {
            arg.replace("{package}", package)
                .replace("{version}", version.unwrap_or(""))
                .replace("{spec}", spec)
        })
        .collect()
}

/// How an installed package is launched as a stdio backend.
pub fn runtime_transport(
    manager: PackageManager,
    package: &str,
    env: BTreeMap<String, String>,
) -> TransportConfig {
    let (command, args) = match manager {
        PackageManager::Npm => ("npx", vec!["-y".to_string(), package.to_string()]),
        _ => (
            "uvx",
            vec!["--from".to_string(), package.to_string(), package.to_string()],
        ),
    };
    TransportConfig::Stdio {
        command: command.to_string(),
        args,
        env,
    }
}

/// Tails of the package manager's output streams.
#[derive(Debug, Clone, Default)]
pub struct InstallOutput {
    pub stdout: String,
    pub stderr: String,
}

impl InstallOutput {
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if !self.stdout.trim().is_empty() {
            parts.push(format!("stdout:\n{}", self.stdout.trim_end()));
        }
        if !self.stderr.trim().is_empty() {
            parts.push(format!("stderr:\n{}", self.stderr.trim_end()));
        }
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

enum Finish {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Resolves once `true` is sent. A dropped sender never resolves.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|flag| *flag).await.map(|_| ()).is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

async fn read_tail<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > OUTPUT_TAIL_BYTES {
                    let excess = tail.len() - OUTPUT_TAIL_BYTES;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

async fn kill_child(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill install process: {}", e);
    }
}

/// Runs one package-manager invocation to completion, timeout, or
/// cancellation. The process is killed in the latter two cases.
pub async fn run_install(
    command: &ToolCommand,
    args: Vec<String>,
    env: &BTreeMap<String, String>,
    deadline: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> (ManagerResult<()>, InstallOutput) {
    let Some(program) = find_executable(&command.program) else {
        return (
            Err(ManagerError::InstallToolMissing(command.program.clone())),
            InstallOutput::default(),
        );
    };

    info!("Executing: {} {}", program.display(), args.join(" "));

    let spawned = Command::new(&program)
        .args(&args)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return (
                Err(ManagerError::InstallToolMissing(command.program.clone())),
                InstallOutput::default(),
            );
        }
        Err(e) => {
            return (
                Err(ManagerError::InstallExecFailure {
                    exit_code: None,
                    stderr: format!("failed to spawn {}: {}", program.display(), e),
                }),
                InstallOutput::default(),
            );
        }
    };

    let stdout_task = child.stdout.take().map(|s| tokio::spawn(read_tail(s)));
    let stderr_task = child.stderr.take().map(|s| tokio::spawn(read_tail(s)));

    let finish = tokio::select! {
        status = child.wait() => Finish::Exited(status),
        _ = tokio::time::sleep(deadline) => Finish::TimedOut,
        _ = cancelled(cancel) => Finish::Cancelled,
    };

    let result = match finish {
        Finish::Exited(Ok(status)) if status.success() => Ok(()),
        Finish::Exited(Ok(status)) => Err(status.code()),
        Finish::Exited(Err(e)) => {
            warn!("Waiting on install process failed: {}", e);
            Err(None)
        }
        Finish::TimedOut => {
            warn!("Install process exceeded {:?}, killing it", deadline);
            kill_child(&mut child).await;
            return (Err(ManagerError::InstallTimeout(deadline)), collect(stdout_task, stderr_task).await);
        }
        Finish::Cancelled => {
            info!("Install process cancelled, killing it");
            kill_child(&mut child).await;
            return (Err(ManagerError::InstallCancelled), collect(stdout_task, stderr_task).await);
        }
    };

    let output = collect(stdout_task, stderr_task).await;
    match result {
        Ok(()) => {
            debug!("Install process exited successfully");
            (Ok(()), output)
        }
        Err(exit_code) => {
            let stderr = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            (Err(ManagerError::InstallExecFailure { exit_code, stderr }), output)
        }
    }
}

async fn collect(
    stdout_task: Option<tokio::task::JoinHandle<String>>,
    stderr_task: Option<tokio::task::JoinHandle<String>>,
) -> InstallOutput {
    async fn join(task: Option<tokio::task::JoinHandle<String>>) -> String {
        let Some(task) = task else {
            return String::new();
        };
        match timeout(OUTPUT_DRAIN_TIMEOUT, task).await {
            Ok(Ok(text)) => text,
            _ => String::new(),
        }
    }

    InstallOutput {
        stdout: join(stdout_task).await,
        stderr: join(stderr_task).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sh(script: &str) -> (ToolCommand, Vec<String>) {
        (
            ToolCommand {
                program: "sh".to_string(),
                args: vec![],
            },
            vec!["-c".to_string(), script.to_string()],
        )
    }

    #[rstest]
    #[case(PackageManager::Npm, Some("1.3.0"), "left-pad@1.3.0")]
    #[case(PackageManager::Npm, None, "left-pad")]
    #[case(PackageManager::Uv, Some("0.6.0"), "left-pad==0.6.0")]
    #[case(PackageManager::Pip, Some("2.0"), "left-pad==2.0")]
    fn test_package_spec(#[case] manager: PackageManager, #[case] version: Option<&str>, #[case] expected: &str) {
        assert_eq!(package_spec(manager, "left-pad", version), expected);
    }

    #[test]
    fn test_default_commands_and_overrides() {
        let tools = InstallTools::default();
        let npm = tools.command_for(PackageManager::Npm);
        assert_eq!(npm.program, "npm");
        assert_eq!(npm.args, vec!["install", "-g", "{spec}"]);
        assert_eq!(tools.command_for(PackageManager::Pypi).program, "uv");

        let mut overrides = HashMap::new();
        overrides.insert(
            "npm".to_string(),
            ToolCommand {
                program: "pnpm".to_string(),
                args: vec!["add".to_string(), "-g".to_string(), "{package}@{version}".to_string()],
            },
        );
        let tools = InstallTools::new(overrides);
        let npm = tools.command_for(PackageManager::Npm);
        assert_eq!(
            expand_args(&npm.args, "left-pad", Some("1.3.0"), "left-pad@1.3.0"),
            vec!["add", "-g", "left-pad@1.3.0"]
        );
        assert_eq!(tools.command_for(PackageManager::Pip).program, "pip");
    }

    #[test]
    fn test_runtime_transport_derivation() {
        match runtime_transport(PackageManager::Npm, "left-pad", BTreeMap::new()) {
            TransportConfig::Stdio { command, args, .. } => {
                assert_eq!(command, "npx");
                assert_eq!(args, vec!["-y", "left-pad"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        match runtime_transport(PackageManager::Pip, "mcp-server-time", BTreeMap::new()) {
            TransportConfig::Stdio { command, args, .. } => {
                assert_eq!(command, "uvx");
                assert_eq!(args, vec!["--from", "mcp-server-time", "mcp-server-time"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_tool_spawns_nothing() {
        let (_tx, mut rx) = watch::channel(false);
        let command = ToolCommand {
            program: "no-such-package-manager-xyz".to_string(),
            args: vec![],
        };
        let (result, output) =
            run_install(&command, vec![], &BTreeMap::new(), Duration::from_secs(5), &mut rx).await;
        assert_eq!(result.unwrap_err().kind(), "install_tool_missing");
        assert!(output.summary().is_none());
    }

    #[tokio::test]
    async fn test_nonzero_exit_captures_stderr() {
        let (_tx, mut rx) = watch::channel(false);
        let (command, args) = sh("echo fetching; echo 'E404 not found' >&2; exit 3");
        let (result, output) = run_install(&command, args, &BTreeMap::new(), Duration::from_secs(10), &mut rx).await;

        match result.unwrap_err() {
            ManagerError::InstallExecFailure { exit_code, stderr } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "E404 not found");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(output.stdout.contains("fetching"));
    }

    #[tokio::test]
    async fn test_env_vars_reach_the_process() {
        let (_tx, mut rx) = watch::channel(false);
        let (command, args) = sh("test \"$REGISTRY_TOKEN\" = abc");
        let mut env = BTreeMap::new();
        env.insert("REGISTRY_TOKEN".to_string(), "abc".to_string());
        let (result, _) = run_install(&command, args, &env, Duration::from_secs(10), &mut rx).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let (_tx, mut rx) = watch::channel(false);
        let (command, args) = sh("exec sleep 30");
        let started = std::time::Instant::now();
        let (result, _) = run_install(&command, args, &BTreeMap::new(), Duration::from_millis(300), &mut rx).await;
        assert_eq!(result.unwrap_err().kind(), "install_timeout");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let (tx, mut rx) = watch::channel(false);
        let (command, args) = sh("exec sleep 30");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });
        let (result, _) = run_install(&command, args, &BTreeMap::new(), Duration::from_secs(30), &mut rx).await;
        assert_eq!(result.unwrap_err().kind(), "install_cancelled");
    }

    #[tokio::test]
    async fn test_output_tail_is_bounded() {
        let (_tx, mut rx) = watch::channel(false);
        let (command, args) = sh("i=0; while [ $i -lt 2000 ]; do echo 0123456789; i=$((i+1)); done");
        let (result, output) = run_install(&command, args, &BTreeMap::new(), Duration::from_secs(20), &mut rx).await;
        assert!(result.is_ok());
        assert_eq!(output.stdout.len(), OUTPUT_TAIL_BYTES);
    }
}
