// File: manager/src/transport/sse.rs
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Url};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::framing::{JsonRpcRequest, SseDecoder};
use super::{McpTransport, TransportKind};
use crate::constants::mcp;
use crate::errors::{ManagerError, ManagerResult};

/// Client for a backend that exposes an event stream plus a message endpoint.
///
/// A probe opens the stream, waits for the `endpoint` event, and posts a ping
/// to the advertised endpoint. The stream is dropped once the ping is accepted.
pub struct SseTransport {
    service_name: String,
    url: String,
    headers: BTreeMap<String, String>,
    client: Option<Client>,
    next_request_id: u64,
}

impl SseTransport {
    pub fn new(service_name: &str, url: &str, headers: BTreeMap<String, String>) -> Self {
        Self {
            service_name: service_name.to_string(),
            url: url.to_string(),
            headers,
            client: None,
            next_request_id: 0,
        }
    }

    fn with_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        request
    }

    async fn discover_endpoint(&self, client: &Client) -> ManagerResult<Url> {
        let response = self
            .with_headers(client.get(&self.url).header(ACCEPT, "text/event-stream"))
            .send()
            .await
            .map_err(|e| ManagerError::ProbeFailure(format!("connect to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::ProbeFailure(format!("event stream returned HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(ManagerError::ProbeFailure(format!(
                "expected text/event-stream, got '{}'",
                content_type
            )));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let endpoint = 'read: loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    let found = decoder
                        .push(&chunk)
                        .into_iter()
                        .find(|event| event.name() == mcp::ENDPOINT_EVENT);
                    if let Some(event) = found {
                        break 'read event.data;
                    }
                }
                Some(Err(e)) => {
                    return Err(ManagerError::ProbeFailure(format!("event stream broke: {}", e)));
                }
                None => match decoder.finish() {
                    Some(event) if event.name() == mcp::ENDPOINT_EVENT => break 'read event.data,
                    _ => {
                        return Err(ManagerError::ProbeFailure(
                            "event stream ended before announcing an endpoint".to_string(),
                        ));
                    }
                },
            }
        };

        let base = Url::parse(&self.url)
            .map_err(|e| ManagerError::ProbeFailure(format!("invalid url {}: {}", self.url, e)))?;
        base.join(endpoint.trim())
            .map_err(|e| ManagerError::ProbeFailure(format!("invalid endpoint '{}': {}", endpoint, e)))
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn start(&mut self) -> ManagerResult<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = Client::builder()
            .build()
            .map_err(|e| ManagerError::AdapterInit(format!("failed to build HTTP client: {}", e)))?;
        self.client = Some(client);
        debug!("SSE client ready for {} at {}", self.service_name, self.url);
        Ok(())
    }

    async fn stop(&mut self, _grace: Duration) -> ManagerResult<()> {
        if self.client.take().is_some() {
            info!("Closed SSE client for {}", self.service_name);
        }
        Ok(())
    }

    async fn probe(&mut self) -> ManagerResult<()> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| ManagerError::ProbeFailure("transport not started".to_string()))?;

        let endpoint = self.discover_endpoint(&client).await?;

        self.next_request_id += 1;
        let response = self
            .with_headers(client.post(endpoint.clone()))
            .json(&JsonRpcRequest::ping(self.next_request_id))
            .send()
            .await
            .map_err(|e| ManagerError::ProbeFailure(format!("post to {} failed: {}", endpoint, e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ManagerError::ProbeFailure(format!("message endpoint returned HTTP {}", status)))
        }
    }

    fn is_running(&self) -> bool {
        self.client.is_some()
    }
}
