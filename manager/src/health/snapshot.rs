// File: manager/src/health/snapshot.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::constants::probe::{HEALTHY_AFTER_SUCCESSES, UNHEALTHY_AFTER_FAILURES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time health of one managed service.
///
/// Counters only grow until the service is restarted. `status` is derived
/// from the streak counters after every probe and never set directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub response_time_ms: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub warning_level: u32,
    pub uptime_start: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl HealthSnapshot {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: HealthStatus::Unknown,
            last_checked: None,
            response_time_ms: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_successes: 0,
            consecutive_failures: 0,
            warning_level: 0,
            uptime_start: now,
            error_message: None,
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>, response_time: Duration) {
        self.success_count += 1;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
        self.error_message = None;
        self.touch(now, response_time);
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>, response_time: Duration, error: String) {
        self.failure_count += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
        self.error_message = Some(error);
        self.touch(now, response_time);
    }

    fn touch(&mut self, now: DateTime<Utc>, response_time: Duration) {
        self.last_checked = Some(now);
        self.response_time_ms = response_time.as_millis() as u64;
        self.warning_level = self.consecutive_failures.min(UNHEALTHY_AFTER_FAILURES);
        self.status = self.derive_status();
    }

    fn derive_status(&self) -> HealthStatus {
        if self.consecutive_failures >= UNHEALTHY_AFTER_FAILURES {
            HealthStatus::Unhealthy
        } else if self.consecutive_failures > 0 {
            HealthStatus::Degraded
        } else if self.consecutive_successes == 0 {
            HealthStatus::Unknown
        } else if self.failure_count == 0 || self.consecutive_successes >= HEALTHY_AFTER_SUCCESSES {
            HealthStatus::Healthy
        } else {
            // Recovering: one success after a failure is not enough
            HealthStatus::Degraded
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
