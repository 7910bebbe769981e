//! Service configuration builders

use std::collections::BTreeMap;

use mcp_manager::{ServiceConfig, TransportConfig};

pub fn service_config(id: i64, name: &str, transport: TransportConfig) -> ServiceConfig {
    ServiceConfig {
        id,
        name: name.to_string(),
        display_name: None,
        enabled: true,
        transport,
    }
}

pub fn streamable_transport(url: &str) -> TransportConfig {
    TransportConfig::StreamableHttp {
        url: url.to_string(),
        headers: BTreeMap::new(),
    }
}

pub fn sse_transport(url: &str) -> TransportConfig {
    TransportConfig::Sse {
        url: url.to_string(),
        headers: BTreeMap::new(),
    }
}

pub fn missing_executable_transport() -> TransportConfig {
    TransportConfig::Stdio {
        command: "definitely-not-an-mcp-server-binary".to_string(),
        args: Vec::new(),
        env: BTreeMap::new(),
    }
}
