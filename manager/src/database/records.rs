//! Database record types (entities).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ServiceConfig;
use crate::errors::{ManagerError, ManagerResult};
use crate::transport::{TransportConfig, TransportKind};
use crate::ServiceId;

/// One row of `mcp_services`. Argument, environment, and header maps are
/// stored as JSON text and only decoded through [`ServiceRecord::to_service_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub name: String,
    pub display_name: Option<String>,
    pub transport: String,
    pub command: Option<String>,
    pub args_json: String,
    pub env_json: String,
    pub url: Option<String>,
    pub headers_json: String,
    pub enabled: bool,
    pub deleted: bool,
    pub package_manager: Option<String>,
    pub source_package_name: Option<String>,
    pub installed_version: Option<String>,
    pub health_status: String,
    pub last_health_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRecord {
    /// Builds a fresh row from a typed configuration. An `id` of zero or less
    /// lets the database assign one on insert.
    pub fn from_config(config: &ServiceConfig, now: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let empty = BTreeMap::<String, String>::new();
        let (command, args, env, url, headers) = match &config.transport {
            TransportConfig::Stdio { command, args, env } => {
                (Some(command.clone()), args.clone(), env, None, &empty)
            }
            TransportConfig::Sse { url, headers } | TransportConfig::StreamableHttp { url, headers } => {
                (None, Vec::new(), &empty, Some(url.clone()), headers)
            }
        };

        Ok(Self {
            id: config.id,
            name: config.name.clone(),
            display_name: config.display_name.clone(),
            transport: config.transport.kind().as_str().to_string(),
            command,
            args_json: serde_json::to_string(&args)?,
            env_json: serde_json::to_string(env)?,
            url,
            headers_json: serde_json::to_string(headers)?,
            enabled: config.enabled,
            deleted: false,
            package_manager: None,
            source_package_name: None,
            installed_version: None,
            health_status: "unknown".to_string(),
            last_health_check: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Decodes the persisted columns into a typed configuration. Malformed
    /// JSON or a missing command/url is an adapter configuration error.
    pub fn to_service_config(&self) -> ManagerResult<ServiceConfig> {
        let kind = TransportKind::parse(&self.transport).ok_or_else(|| {
            ManagerError::AdapterInit(format!(
                "service {} has unknown transport '{}'",
                self.id, self.transport
            ))
        })?;

        let transport = match kind {
            TransportKind::Stdio => TransportConfig::Stdio {
                command: self
                    .command
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        ManagerError::AdapterInit(format!("service {} has no command", self.id))
                    })?,
                args: decode_blob(self.id, "args", &self.args_json)?,
                env: decode_blob(self.id, "env", &self.env_json)?,
            },
            TransportKind::Sse | TransportKind::StreamableHttp => {
                let url = self
                    .url
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| ManagerError::AdapterInit(format!("service {} has no url", self.id)))?;
                let headers = decode_blob(self.id, "headers", &self.headers_json)?;
                if kind == TransportKind::Sse {
                    TransportConfig::Sse { url, headers }
                } else {
                    TransportConfig::StreamableHttp { url, headers }
                }
            }
        };

        Ok(ServiceConfig {
            id: self.id,
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            enabled: self.enabled,
            transport,
        })
    }

    pub fn is_installing(&self) -> bool {
        self.installed_version.as_deref() == Some(crate::constants::installer::INSTALLING_MARKER)
    }
}

fn decode_blob<T: DeserializeOwned + Default>(id: ServiceId, field: &str, raw: &str) -> ManagerResult<T> {
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(raw).map_err(|e| {
        ManagerError::AdapterInit(format!("service {} has malformed {} JSON: {}", id, field, e))
    })
}
