pub mod cache;
pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod health;
pub mod installer;
pub mod registry;
pub mod transport;
pub mod web;

/// Identifier of a managed MCP service, as assigned by the `mcp_services` table.
pub type ServiceId = i64;

// Re-export commonly used types
pub use cache::{HealthCache, MemoryCacheStore, SqliteCacheStore};
pub use config::{Config, ConfigManager, ServiceConfig};
pub use database::Database;
pub use errors::{ManagerError, ManagerResult};
pub use health::{HealthMonitor, HealthSnapshot, HealthStatus};
pub use installer::{InstallRequest, InstallationManager, InstallationStatus, InstallationTask};
pub use registry::{HealthView, ManagedService, RegistrySettings, ServiceRegistry};
pub use transport::{McpTransport, TransportConfig, TransportKind};
