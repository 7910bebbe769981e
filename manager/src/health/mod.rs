//! Health monitoring module
//!
//! This module provides the per-service health snapshot with its hysteresis
//! state machine, bounded probe execution, and the periodic monitor.

pub mod monitor;
mod probe;
mod snapshot;

pub use monitor::HealthMonitor;
pub use probe::{execute_probe, ProbeOutcome};
pub use snapshot::{HealthSnapshot, HealthStatus};
