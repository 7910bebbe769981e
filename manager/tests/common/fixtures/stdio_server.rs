//! Scripted stdio MCP server
//!
//! A POSIX shell loop that answers every JSON-RPC request line with an empty
//! result carrying the same id. Notifications get no reply.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mcp_manager::TransportConfig;

const ECHO_SCRIPT: &str = r#"while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  if [ -n "$id" ]; then
    printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
  fi
done"#;

/// Program and arguments that launch the echo server.
pub fn echo_server_command() -> (String, Vec<String>) {
    ("sh".to_string(), vec!["-c".to_string(), ECHO_SCRIPT.to_string()])
}

pub fn echo_server_transport() -> TransportConfig {
    let (command, args) = echo_server_command();
    TransportConfig::Stdio {
        command,
        args,
        env: BTreeMap::new(),
    }
}

/// A server that exits as soon as it starts.
pub fn exiting_server_transport() -> TransportConfig {
    TransportConfig::Stdio {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), "exit 0".to_string()],
        env: BTreeMap::new(),
    }
}

/// Echo server that first writes its pid to `$PID_FILE`.
pub fn pid_reporting_transport(pid_file: &Path) -> TransportConfig {
    let script = format!("echo $$ > \"$PID_FILE\"\n{}", ECHO_SCRIPT);
    let env = BTreeMap::from([("PID_FILE".to_string(), pid_file.display().to_string())]);
    TransportConfig::Stdio {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script],
        env,
    }
}

/// Writes the echo server as an executable script under `dir`.
#[cfg(unix)]
pub fn write_echo_script(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("echo-server.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", ECHO_SCRIPT)).expect("Failed to write echo script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to mark echo script executable");
    path
}

#[cfg(unix)]
pub fn script_transport(script: &Path) -> TransportConfig {
    TransportConfig::Stdio {
        command: script.display().to_string(),
        args: Vec::new(),
        env: BTreeMap::new(),
    }
}
