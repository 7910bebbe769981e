// File: manager/src/transport/streamable_http.rs
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::framing::{find_response, parse_sse_body, JsonRpcNotification, JsonRpcRequest};
use super::{McpTransport, TransportKind};
use crate::constants::mcp;
use crate::errors::{ManagerError, ManagerResult};

/// Client for a backend that takes JSON-RPC over plain POSTs and answers with
/// either a JSON body or a short event stream.
pub struct StreamableHttpTransport {
    service_name: String,
    url: String,
    headers: BTreeMap<String, String>,
    client: Option<Client>,
    session_id: Option<String>,
    initialized: bool,
    next_request_id: u64,
}

impl StreamableHttpTransport {
    pub fn new(service_name: &str, url: &str, headers: BTreeMap<String, String>) -> Self {
        Self {
            service_name: service_name.to_string(),
            url: url.to_string(),
            headers,
            client: None,
            session_id: None,
            initialized: false,
            next_request_id: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    fn build_post<T: Serialize>(&self, client: &Client, body: &T) -> RequestBuilder {
        let mut request = client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(session_id) = &self.session_id {
            request = request.header(mcp::SESSION_HEADER, session_id);
        }
        request
    }

    /// Sends a request and waits for its response. Returns the HTTP status
    /// separately so the caller can detect an expired session.
    async fn send_request(
        &mut self,
        client: &Client,
        request: JsonRpcRequest,
    ) -> ManagerResult<Result<(), StatusCode>> {
        let id = request.id;
        let response = self
            .build_post(client, &request)
            .send()
            .await
            .map_err(|e| ManagerError::ProbeFailure(format!("post to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(Err(status));
        }

        if let Some(session_id) = response
            .headers()
            .get(mcp::SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = response
            .text()
            .await
            .map_err(|e| ManagerError::ProbeFailure(format!("reading response body failed: {}", e)))?;

        let answer = if is_event_stream {
            parse_sse_body(&body)
                .into_iter()
                .filter_map(|event| serde_json::from_str(&event.data).ok())
                .find_map(|message| find_response(message, id))
        } else {
            serde_json::from_str(&body)
                .ok()
                .and_then(|message| find_response(message, id))
        };

        let answer = answer.ok_or_else(|| {
            ManagerError::ProbeFailure(format!("no response to request {} in body", id))
        })?;
        answer.into_result().map(|_| Ok(()))
    }

    async fn initialize(&mut self, client: &Client) -> ManagerResult<()> {
        self.session_id = None;
        let id = self.next_id();
        if let Err(status) = self.send_request(client, JsonRpcRequest::initialize(id)).await? {
            return Err(ManagerError::ProbeFailure(format!("initialize returned HTTP {}", status)));
        }

        let response = self
            .build_post(client, &JsonRpcNotification::initialized())
            .send()
            .await
            .map_err(|e| ManagerError::ProbeFailure(format!("post to {} failed: {}", self.url, e)))?;
        if !response.status().is_success() {
            return Err(ManagerError::ProbeFailure(format!(
                "initialized notification returned HTTP {}",
                response.status()
            )));
        }

        self.initialized = true;
        debug!(
            "Initialized streamable HTTP session for {} (session {:?})",
            self.service_name, self.session_id
        );
        Ok(())
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    async fn start(&mut self) -> ManagerResult<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = Client::builder()
            .build()
            .map_err(|e| ManagerError::AdapterInit(format!("failed to build HTTP client: {}", e)))?;
        self.client = Some(client);
        Ok(())
    }

    async fn stop(&mut self, _grace: Duration) -> ManagerResult<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };

        if let Some(session_id) = self.session_id.take() {
            let mut request = client.delete(&self.url).header(mcp::SESSION_HEADER, &session_id);
            for (name, value) in &self.headers {
                request = request.header(name, value);
            }
            match request.send().await {
                Ok(response) => debug!(
                    "Session {} for {} closed with HTTP {}",
                    session_id,
                    self.service_name,
                    response.status()
                ),
                Err(e) => warn!("Failed to close session for {}: {}", self.service_name, e),
            }
        }

        self.initialized = false;
        info!("Closed streamable HTTP client for {}", self.service_name);
        Ok(())
    }

    async fn probe(&mut self) -> ManagerResult<()> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| ManagerError::ProbeFailure("transport not started".to_string()))?;

        if !self.initialized {
            return self.initialize(&client).await;
        }

        let id = self.next_id();
        match self.send_request(&client, JsonRpcRequest::ping(id)).await? {
            Ok(()) => Ok(()),
            Err(StatusCode::NOT_FOUND) if self.session_id.is_some() => {
                // The server dropped our session; a fresh handshake is the probe
                debug!("Session for {} expired, re-initializing", self.service_name);
                self.initialized = false;
                self.initialize(&client).await
            }
            Err(status) => Err(ManagerError::ProbeFailure(format!("ping returned HTTP {}", status))),
        }
    }

    fn is_running(&self) -> bool {
        self.client.is_some()
    }
}
