//! Control-plane error kinds and their HTTP mapping
//!
//! Every terminal error carries a machine-distinguishable kind plus a
//! human-readable message. Terminal kinds are reported verbatim to the
//! caller and never retried internally.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Missing or malformed required input; always client-fixable
    #[error("{0}")]
    Validation(String),

    /// Referenced entity absent
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Caller lacks required ownership or membership
    #[error("Unauthorized")]
    Unauthorized,

    /// Uniqueness violated by a different owner
    #[error("Subdomain already taken")]
    Conflict,

    /// DNS challenge not yet satisfied; terminal per attempt but retry-safe.
    /// Names the exact expected record so the operator can self-correct.
    #[error("TXT record verification failed. Expected \"{expected_value}\" at \"{record_name}\"")]
    Verification {
        record_name: String,
        expected_value: String,
    },

    /// DNS or control-channel I/O failure
    #[error("Transient network error: {0}")]
    Transient(#[source] anyhow::Error),

    /// Registry store failure
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ControlError {
    /// Machine-distinguishable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::Validation(_) => "validation",
            ControlError::NotFound(_) => "not_found",
            ControlError::Unauthorized => "unauthorized",
            ControlError::Conflict => "conflict",
            ControlError::Verification { .. } => "verification",
            ControlError::Transient(_) => "transient",
            ControlError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ControlError::Validation(_) => StatusCode::BAD_REQUEST,
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Unauthorized => StatusCode::FORBIDDEN,
            ControlError::Conflict => StatusCode::CONFLICT,
            ControlError::Verification { .. } => StatusCode::BAD_REQUEST,
            ControlError::Transient(_) => StatusCode::BAD_GATEWAY,
            ControlError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        match &self {
            ControlError::Internal(e) => tracing::error!("Internal error: {:#}", e),
            ControlError::Transient(e) => tracing::warn!("Transient network error: {:#}", e),
            _ => {}
        }

        let body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinguishable() {
        assert_eq!(
            ControlError::Validation("Missing required fields".into()).kind(),
            "validation"
        );
        assert_eq!(ControlError::NotFound("Tunnel").kind(), "not_found");
        assert_eq!(ControlError::Unauthorized.kind(), "unauthorized");
        assert_eq!(ControlError::Conflict.kind(), "conflict");
    }

    #[test]
    fn test_verification_error_names_expected_record() {
        let err = ControlError::Verification {
            record_name: "_outray-challenge.example.com".to_string(),
            expected_value: "domain_abc123".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("_outray-challenge.example.com"));
        assert!(msg.contains("domain_abc123"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ControlError::NotFound("Domain").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ControlError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ControlError::Unauthorized.status(), StatusCode::FORBIDDEN);
    }
}
