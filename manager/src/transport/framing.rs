//! JSON-RPC 2.0 messages and server-sent-event decoding shared by the adapters.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::mcp;
use crate::errors::{ManagerError, ManagerResult};

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcRequest {
    pub fn initialize(id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: "initialize",
            params: Some(json!({
                "protocolVersion": mcp::PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": mcp::CLIENT_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            })),
        }
    }

    pub fn ping(id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: "ping",
            params: None,
        }
    }
}

impl JsonRpcNotification {
    pub fn initialized() -> Self {
        Self {
            jsonrpc: "2.0",
            method: "notifications/initialized",
        }
    }
}

impl JsonRpcResponse {
    fn answers(&self, request_id: u64) -> bool {
        match &self.id {
            Some(Value::Number(n)) => n.as_u64() == Some(request_id),
            Some(Value::String(s)) => s == &request_id.to_string(),
            _ => false,
        }
    }

    /// Turns the response into the `result` payload or a probe failure.
    pub fn into_result(self) -> ManagerResult<Value> {
        if let Some(error) = self.error {
            return Err(ManagerError::ProbeFailure(format!(
                "server returned error {}: {}",
                error.code, error.message
            )));
        }
        self.result
            .ok_or_else(|| ManagerError::ProbeFailure("response carried neither result nor error".to_string()))
    }
}

/// Picks the response to `request_id` out of a decoded message, which may be a
/// single object or a batch. Notifications, server-initiated requests and
/// stale responses are ignored.
pub fn find_response(message: Value, request_id: u64) -> Option<JsonRpcResponse> {
    let candidates = match message {
        Value::Array(items) => items,
        other => vec![other],
    };

    candidates.into_iter().find_map(|item| {
        if item.get("method").is_some() {
            return None;
        }
        serde_json::from_value::<JsonRpcResponse>(item)
            .ok()
            .filter(|response| response.answers(request_id))
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// Event name with the protocol default applied.
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental `text/event-stream` decoder. Chunks may split lines and
/// multi-byte characters anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing event when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            // A field line never dispatches on its own
            let _ = self.process_line(&line);
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let event = SseEvent {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.id.take(),
        };
        self.data.clear();
        Some(event)
    }
}

/// Decodes a complete event-stream body.
pub fn parse_sse_body(body: &str) -> Vec<SseEvent> {
    let mut decoder = SseDecoder::default();
    let mut events = decoder.push(body.as_bytes());
    events.extend(decoder.finish());
    events
}
