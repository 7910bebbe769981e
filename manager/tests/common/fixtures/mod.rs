//! This module provides reusable test utilities:
//! - Mock MCP backends over streamable HTTP and SSE
//! - A scripted stdio MCP server
//! - Service configuration builders
//! - An in-memory harness wiring database, cache, registry, and installer

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod harness;
pub mod mock_mcp_server;
pub mod stdio_server;
pub mod test_config;

// Re-export commonly used items
pub use harness::TestHarness;
pub use mock_mcp_server::MockMcpServer;
pub use stdio_server::{echo_server_command, echo_server_transport, exiting_server_transport, pid_reporting_transport};
pub use test_config::*;
