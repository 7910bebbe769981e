// Common types and utilities for API handlers

use axum::{http::StatusCode, response::Json};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, warn};

use crate::errors::ManagerError;

// Helper type for API responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub type ApiError = (StatusCode, Json<ApiResponse<()>>);

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error_kind: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error_kind: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            error_kind: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub fn status_for(err: &ManagerError) -> StatusCode {
    match err {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        ManagerError::TaskAlreadyActive { .. } => StatusCode::CONFLICT,
        ManagerError::AdapterInit(_)
        | ManagerError::InvalidRequest(_)
        | ManagerError::UnsupportedPackageManager(_) => StatusCode::BAD_REQUEST,
        ManagerError::ProbeTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps a manager error onto the JSON error envelope. Server-side faults are
/// logged at error level, caller mistakes at warn.
pub fn api_error(context: &str, err: ManagerError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("{}: {}", context, err);
    } else {
        warn!("{}: {}", context, err);
    }

    let mut body = ApiResponse::error(err.to_string());
    body.error_kind = Some(err.kind().to_string());
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&ManagerError::ServiceNotFound(7)), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&ManagerError::TaskNotFound(7)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&ManagerError::TaskAlreadyActive {
                service_id: 7,
                status: "installing".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ManagerError::UnsupportedPackageManager("cargo".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ManagerError::ProbeTimeout(Duration::from_secs(5))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&ManagerError::Config("broken".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_carries_kind() {
        let (status, Json(body)) = api_error("lookup", ManagerError::ServiceNotFound(3));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.success);
        assert_eq!(body.error_kind.as_deref(), Some("not_found"));
        assert_eq!(body.message.as_deref(), Some("service 3 not found"));
    }
}
