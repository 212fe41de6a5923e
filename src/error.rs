//! Error kinds raised by the core.
//!
//! Upstream transport and decode failures are converted to
//! [`CoreError::ProviderUnavailable`] at the fetcher boundary and recorded in
//! cache metadata; they never reach a reader, which continues to serve the
//! last good snapshot. Caller input errors map to 4xx, configuration problems
//! are fatal at startup only.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Domain error for the fusion core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Region id not present in the registry.
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// District name not present in the current region.
    #[error("unknown district: {0}")]
    UnknownDistrict(String),

    /// Upstream fetch failed after its retry budget. Recorded in cache
    /// metadata; readers keep serving the previous snapshot.
    #[error("provider unavailable: {source_name}: {detail}")]
    ProviderUnavailable { source_name: String, detail: String },

    /// A fetcher whose API key is absent. The scheduler skips it.
    #[error("source disabled: {0} (missing credentials)")]
    SourceDisabled(String),

    /// Malformed region or district document.
    #[error("config error: {0}")]
    Config(String),

    /// Rejected API input (bad bounding box, unknown tier, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Bug or broken invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand used by fetchers when converting transport errors.
    pub fn provider(source_name: &str, err: impl std::fmt::Display) -> Self {
        CoreError::ProviderUnavailable {
            source_name: source_name.to_string(),
            detail: err.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            CoreError::UnknownRegion(_) | CoreError::UnknownDistrict(_) => StatusCode::NOT_FOUND,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::SourceDisabled(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::ProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,
            CoreError::Config(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured error body returned by the API. Never carries a backtrace.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: u16,
    detail: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            status: status.as_u16(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CoreError::UnknownRegion("mars".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoreError::Validation("bad bbox".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::SourceDisabled("marine".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            CoreError::provider("traffic", "timeout").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_provider_error_message() {
        let err = CoreError::provider("navy_rivers", "connection refused");
        assert!(err.to_string().contains("navy_rivers"));
        assert!(err.to_string().contains("connection refused"));
    }
}
