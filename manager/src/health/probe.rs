// File: manager/src/health/probe.rs
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::errors::{ManagerError, ManagerResult};
use crate::transport::McpTransport;

#[derive(Debug)]
pub struct ProbeOutcome {
    pub result: ManagerResult<()>,
    pub response_time: Duration,
}

/// Runs one probe against an adapter, bounded by `deadline`. An expired
/// deadline is reported as `ProbeTimeout`.
pub async fn execute_probe(adapter: &mut dyn McpTransport, deadline: Duration) -> ProbeOutcome {
    let started = Instant::now();
    let result = match timeout(deadline, adapter.probe()).await {
        Ok(result) => result,
        Err(_) => Err(ManagerError::ProbeTimeout(deadline)),
    };
    ProbeOutcome {
        result,
        response_time: started.elapsed(),
    }
}
