//! Mock MCP backends for testing the HTTP transports
//!
//! This simulates a streamable HTTP server and an SSE server without
//! requiring a real MCP implementation.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

pub const SESSION_ID: &str = "test-session-1";

/// Answers JSON-RPC requests with an empty result for the same id and
/// accepts notifications with 202, each after `delay`.
#[derive(Default)]
struct JsonRpcEcho {
    delay: Duration,
}

impl Respond for JsonRpcEcho {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };

        let response = match body.get("id") {
            Some(id) => ResponseTemplate::new(200)
                .insert_header("mcp-session-id", SESSION_ID)
                .set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {}
                })),
            None => ResponseTemplate::new(202),
        };
        response.set_delay(self.delay)
    }
}

/// Same as [`JsonRpcEcho`] but frames the answer as an event stream.
struct JsonRpcEventStreamEcho;

impl Respond for JsonRpcEventStreamEcho {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };

        match body.get("id") {
            Some(id) => {
                let message = json!({ "jsonrpc": "2.0", "id": id, "result": {} });
                ResponseTemplate::new(200)
                    .insert_header("mcp-session-id", SESSION_ID)
                    .set_body_raw(
                        format!("event: message\ndata: {}\n\n", message),
                        "text/event-stream",
                    )
            }
            None => ResponseTemplate::new(202),
        }
    }
}

/// Mock server hosting one MCP endpoint
pub struct MockMcpServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockMcpServer {
    /// Create a new mock server with nothing mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    pub fn mcp_url(&self) -> String {
        format!("{}/mcp", self.base_url)
    }

    pub fn sse_url(&self) -> String {
        format!("{}/sse", self.base_url)
    }

    /// Healthy streamable HTTP endpoint answering with JSON bodies
    pub async fn mock_streamable_healthy(&self) {
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(JsonRpcEcho::default())
            .mount(&self.server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Healthy streamable HTTP endpoint that holds every answer for `delay`
    pub async fn mock_streamable_slow(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(JsonRpcEcho { delay })
            .mount(&self.server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Healthy streamable HTTP endpoint answering with event streams
    pub async fn mock_streamable_event_stream(&self) {
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(JsonRpcEventStreamEcho)
            .mount(&self.server)
            .await;
    }

    /// Every request to the MCP endpoint fails with `status`
    pub async fn mock_streamable_failing(&self, status: u16) {
        Mock::given(path("/mcp"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Healthy SSE server: the stream announces `/messages`, which accepts posts
    pub async fn mock_sse_healthy(&self) {
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "event: endpoint\ndata: /messages?session_id=abc\n\n",
                "text/event-stream",
            ))
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&self.server)
            .await;
    }

    /// SSE stream that never announces an endpoint
    pub async fn mock_sse_without_endpoint(&self) {
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("event: message\ndata: {}\n\n", "text/event-stream"),
            )
            .mount(&self.server)
            .await;
    }

    /// Remove every mounted mock
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}
