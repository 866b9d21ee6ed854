//! Error types for cu-manager

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Manager-level errors
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Controller API error: {0}")]
    Controller(#[from] ControllerApiError),

    #[error("Port allocation error: {0}")]
    Ports(#[from] PortError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("`docker {command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("`docker {command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Failed to spawn docker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Unexpected runtime output: {0}")]
    Parse(String),

    #[error("Container already exists: {0}")]
    Conflict(String),
}

/// State persistence errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog answered {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Catalog reported failure: {0}")]
    Unsuccessful(String),

    #[error("Malformed catalog response: {0}")]
    Decode(String),

    #[error("Endpoint `{item}` ({method}) not advertised by the catalog")]
    EndpointNotFound { item: String, method: String },
}

/// Errors talking to a controller's own HTTP API
#[derive(Debug, Error)]
pub enum ControllerApiError {
    #[error("Controller unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Controller answered {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Controller rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed controller response: {0}")]
    Decode(String),

    #[error("No reachable address for controller {0}")]
    NoAddress(String),
}

/// Port allocation errors
#[derive(Debug, Error)]
pub enum PortError {
    #[error("No free port in {base}..={last}")]
    Exhausted { base: u16, last: u16 },
}

/// Status API errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Service unavailable (reconcile loop gone)
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

pub type StateResult<T> = Result<T, StateError>;

pub type CatalogResult<T> = Result<T, CatalogError>;

pub type ControllerApiResult<T> = Result<T, ControllerApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::BadRequest("test".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unavailable("test".to_string())
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_port_error_message() {
        let e = PortError::Exhausted {
            base: 7090,
            last: 7099,
        };
        assert_eq!(e.to_string(), "No free port in 7090..=7099");
    }
}
