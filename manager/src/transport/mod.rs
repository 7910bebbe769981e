//! Transport adapters for managed MCP backends
//!
//! A backend is reached in one of three ways: as a child process speaking
//! newline-delimited JSON-RPC over its standard streams, as an SSE endpoint,
//! or as a streamable HTTP endpoint. Each adapter exclusively owns its process
//! or connection and exposes the same start/stop/probe capabilities.

pub mod framing;
mod sse;
mod stdio;
mod streamable_http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::errors::{ManagerError, ManagerResult};

pub use sse::SseTransport;
pub use stdio::{find_executable, StdioTransport};
pub use streamable_http::StreamableHttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportKind {
    Stdio,
    Sse,
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::StreamableHttp => "streamableHttp",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stdio" => Some(TransportKind::Stdio),
            "sse" => Some(TransportKind::Sse),
            "streamableHttp" | "streamable_http" | "http" => Some(TransportKind::StreamableHttp),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport configuration, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    StreamableHttp {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Stdio { .. } => TransportKind::Stdio,
            TransportConfig::Sse { .. } => TransportKind::Sse,
            TransportConfig::StreamableHttp { .. } => TransportKind::StreamableHttp,
        }
    }

    /// Short human-readable target, used in logs.
    pub fn target(&self) -> String {
        match self {
            TransportConfig::Stdio { command, args, .. } if args.is_empty() => command.clone(),
            TransportConfig::Stdio { command, args, .. } => format!("{} {}", command, args.join(" ")),
            TransportConfig::Sse { url, .. } | TransportConfig::StreamableHttp { url, .. } => url.clone(),
        }
    }
}

/// Capabilities every transport adapter provides.
#[async_trait]
pub trait McpTransport: Send {
    fn kind(&self) -> TransportKind;

    /// Spawns the process or prepares the connection. Idempotent.
    async fn start(&mut self) -> ManagerResult<()>;

    /// Releases the process or connection. A stdio backend gets `grace` to
    /// exit on its own before it is killed.
    async fn stop(&mut self, grace: Duration) -> ManagerResult<()>;

    /// One protocol-level liveness exchange. Callers bound it with a timeout.
    async fn probe(&mut self) -> ManagerResult<()>;

    fn is_running(&self) -> bool;
}

/// Builds the adapter for a transport configuration without starting it.
///
/// A stdio command that cannot be resolved fails here; URLs are not contacted
/// until the first probe.
pub fn build_adapter(service_name: &str, config: &TransportConfig) -> ManagerResult<Box<dyn McpTransport>> {
    match config {
        TransportConfig::Stdio { command, args, env } => {
            if command.trim().is_empty() {
                return Err(ManagerError::AdapterInit("stdio transport requires a command".to_string()));
            }
            let transport = StdioTransport::new(service_name, command, args.clone(), env.clone())?;
            Ok(Box::new(transport))
        }
        TransportConfig::Sse { url, headers } => {
            if url.trim().is_empty() {
                return Err(ManagerError::AdapterInit("sse transport requires a url".to_string()));
            }
            Ok(Box::new(SseTransport::new(service_name, url, headers.clone())))
        }
        TransportConfig::StreamableHttp { url, headers } => {
            if url.trim().is_empty() {
                return Err(ManagerError::AdapterInit("streamableHttp transport requires a url".to_string()));
            }
            Ok(Box::new(StreamableHttpTransport::new(service_name, url, headers.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_json_tagging() {
        let config: TransportConfig = serde_json::from_str(
            r#"{"kind":"streamableHttp","url":"http://localhost:3000/mcp","headers":{"Authorization":"Bearer x"}}"#,
        )
        .unwrap();
        assert_eq!(config.kind(), TransportKind::StreamableHttp);
        assert_eq!(config.target(), "http://localhost:3000/mcp");

        let stdio = TransportConfig::Stdio {
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "left-pad".to_string()],
            env: BTreeMap::new(),
        };
        let value = serde_json::to_value(&stdio).unwrap();
        assert_eq!(value["kind"], "stdio");
        assert_eq!(stdio.target(), "npx -y left-pad");
    }

    #[test]
    fn test_kind_parse_accepts_aliases() {
        assert_eq!(TransportKind::parse("sse"), Some(TransportKind::Sse));
        assert_eq!(TransportKind::parse("streamable_http"), Some(TransportKind::StreamableHttp));
        assert_eq!(TransportKind::parse("websocket"), None);
        assert_eq!(TransportKind::StreamableHttp.to_string(), "streamableHttp");
    }

    #[test]
    fn test_build_adapter_validates_eagerly_only_for_stdio() {
        let missing = TransportConfig::Stdio {
            command: "/no/such/mcp-server".to_string(),
            args: vec![],
            env: BTreeMap::new(),
        };
        assert_eq!(build_adapter("x", &missing).err().unwrap().kind(), "adapter_init_error");

        let unreachable = TransportConfig::Sse {
            url: "http://127.0.0.1:1/sse".to_string(),
            headers: BTreeMap::new(),
        };
        let adapter = build_adapter("y", &unreachable).unwrap();
        assert_eq!(adapter.kind(), TransportKind::Sse);
        assert!(!adapter.is_running());
    }
}
