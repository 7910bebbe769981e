//! Central repository for timeouts, intervals, and limits
//!
//! Constants are grouped by the subsystem that consumes them. Configurable
//! values take their defaults from here.

use std::time::Duration;

/// Health probe constants
pub mod probe {
    use super::Duration;

    /// Timeout for scheduled background probes
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout for interactive probes (force check, post-restart, post-install)
    pub const FORCE_TIMEOUT: Duration = Duration::from_secs(20);

    /// Lower bound for any configured probe timeout
    pub const MIN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Upper bound for any configured probe timeout
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(20);

    /// Consecutive successes needed to return to healthy after a failure
    pub const HEALTHY_AFTER_SUCCESSES: u32 = 2;

    /// Consecutive failures after which a service is unhealthy
    pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;
}

/// Child process constants for stdio backends
pub mod process {
    use super::Duration;

    /// Time a stdio backend gets to exit after its input is closed and it is
    /// asked to terminate, before it is killed
    pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);
}

/// Health cache constants
pub mod cache {
    use super::Duration;

    /// Time-to-live of a cached health snapshot
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    /// Prefix of every health cache key
    pub const KEY_PREFIX: &str = "health:service:";
}

/// Installation pipeline constants
pub mod installer {
    use super::Duration;

    /// Number of installations that may run in parallel
    pub const DEFAULT_MAX_CONCURRENT: usize = 4;

    /// Time a package-manager process may run before it is killed
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// Bytes of stdout/stderr kept on a task for diagnostics
    pub const OUTPUT_TAIL_BYTES: usize = 4096;

    /// Time allowed for output pipes to drain after the process is gone
    pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

    /// Value of `installed_version` while an installation is running
    pub const INSTALLING_MARKER: &str = "installing";

    /// Version recorded when a task did not request a specific one
    pub const LATEST_VERSION: &str = "latest";
}

/// Cleanup constants
pub mod cleanup {
    /// Hours after which finished installation tasks are dropped
    pub const TASK_RETENTION_HOURS: i64 = 24;

    /// Cleanup interval in seconds
    pub const CLEANUP_INTERVAL_SECONDS: u64 = 3600; // 1 hour
}

/// Model-Context-Protocol constants
pub mod mcp {
    /// Protocol revision announced in the initialize handshake
    pub const PROTOCOL_VERSION: &str = "2025-03-26";

    /// Client name announced in the initialize handshake
    pub const CLIENT_NAME: &str = "mcp-manager";

    /// Header carrying the streamable-HTTP session id
    pub const SESSION_HEADER: &str = "mcp-session-id";

    /// SSE event naming the message endpoint
    pub const ENDPOINT_EVENT: &str = "endpoint";
}

/// Default configuration values
pub mod defaults {
    /// Default bind host for the HTTP API
    pub const HOST: &str = "0.0.0.0";

    /// Default port for the HTTP API
    pub const PORT: u16 = 8095;

    /// Default SQLite database location
    pub const DATABASE_PATH: &str = "data/mcp.db";

    /// Default health check interval in seconds
    pub const HEALTH_CHECK_INTERVAL_SECONDS: u64 = 60;
}
