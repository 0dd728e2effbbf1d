//! Error types for cluster operations and their HTTP rendering.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failure of an operation against one cluster.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidInput(String),

    /// The cluster could not be reached (SSH transport down, API server unreachable).
    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    #[error("operation timed out after {0}s")]
    Timeout(u64),

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    /// Failures worth another attempt for a read-only call.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => true,
            Self::Kube(kube::Error::Api(status)) => {
                status.code >= 500 || status.code == 429
            }
            Self::Kube(kube::Error::HyperError(_)) | Self::Kube(kube::Error::Service(_)) => true,
            _ => false,
        }
    }

    /// Marks the connection as broken rather than the request as bad.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => true,
            Self::Kube(kube::Error::HyperError(_)) | Self::Kube(kube::Error::Service(_)) => true,
            _ => false,
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Error returned by HTTP handlers, rendered as `{"success": false, "error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Cluster not found")]
    ClusterNotFound,

    #[error("Cluster client not initialized")]
    ClientNotInitialized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ClusterNotFound => StatusCode::NOT_FOUND,
            Self::ClientNotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Backend(error) => match error {
                BackendError::NotFound(_) => StatusCode::NOT_FOUND,
                BackendError::AlreadyExists(_) => StatusCode::CONFLICT,
                BackendError::InvalidInput(_) | BackendError::Manifest(_) => {
                    StatusCode::BAD_REQUEST
                }
                BackendError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                BackendError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                BackendError::Kube(kube::Error::Api(status)) => match status.code {
                    404 => StatusCode::NOT_FOUND,
                    409 => StatusCode::CONFLICT,
                    400 | 422 => StatusCode::BAD_REQUEST,
                    401 | 403 => StatusCode::FORBIDDEN,
                    _ => StatusCode::BAD_GATEWAY,
                },
                BackendError::Kube(_) => StatusCode::BAD_GATEWAY,
                BackendError::Command { .. } | BackendError::Other(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, "request failed: {self}");
        }

        (
            status,
            Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}
