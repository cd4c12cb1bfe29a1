//! Provisioner error types.
//!
//! Every variant maps to one of the error classes callers act on:
//! invalid argument, conflict, not found, or backend/internal failure.
//! The enum implements [`axum::response::IntoResponse`] so handlers can
//! simply return `Err(ProvisionError::BucketConflict { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::storage::BackendError;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors returned by the provisioning core.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A request argument is invalid or missing.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// A class parameter carried a value outside its vocabulary.
    #[error("invalid value {value:?} for parameter {field}: {reason}")]
    InvalidParameter {
        field: String,
        value: String,
        reason: String,
    },

    /// A bucket ID that this service did not produce.
    #[error("malformed bucket id: {reason}")]
    MalformedBucketId { reason: String },

    /// The bucket name is already provisioned with different parameters.
    #[error("bucket {bucket} exists with different parameters")]
    BucketConflict { bucket: String },

    /// The backend resource does not exist.
    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    /// A backend call failed.
    #[error("{operation} failed for {resource}: {source}")]
    Backend {
        operation: &'static str,
        resource: String,
        #[source]
        source: BackendError,
    },

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ProvisionError {
    /// Shorthand for [`ProvisionError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ProvisionError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Shorthand for [`ProvisionError::InvalidParameter`].
    pub fn invalid_parameter(field: &str, value: &str, reason: impl Into<String>) -> Self {
        ProvisionError::InvalidParameter {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Wrap a backend failure with the operation and resource it concerned.
    ///
    /// `NotFound` is lifted to [`ProvisionError::NotFound`] so callers can
    /// tell a missing resource apart from a failed call.
    pub fn backend(operation: &'static str, resource: impl Into<String>, err: BackendError) -> Self {
        let resource = resource.into();
        match err {
            BackendError::NotFound { .. } => ProvisionError::NotFound { resource },
            source => ProvisionError::Backend {
                operation,
                resource,
                source,
            },
        }
    }

    /// Return the stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ProvisionError::InvalidArgument { .. } => "InvalidArgument",
            ProvisionError::InvalidParameter { .. } => "InvalidArgument",
            ProvisionError::MalformedBucketId { .. } => "InvalidArgument",
            ProvisionError::BucketConflict { .. } => "AlreadyExists",
            ProvisionError::NotFound { .. } => "NotFound",
            ProvisionError::Backend { .. } => "BackendError",
            ProvisionError::Internal(_) => "Internal",
        }
    }

    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProvisionError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            ProvisionError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            ProvisionError::MalformedBucketId { .. } => StatusCode::BAD_REQUEST,
            ProvisionError::BucketConflict { .. } => StatusCode::CONFLICT,
            ProvisionError::NotFound { .. } => StatusCode::NOT_FOUND,
            ProvisionError::Backend { .. } => StatusCode::BAD_GATEWAY,
            ProvisionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error belongs to the invalid-argument class.
    pub fn is_invalid_argument(&self) -> bool {
        self.code() == "InvalidArgument"
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    request_id: &'a str,
}

impl IntoResponse for ProvisionError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(request_id = %request_id, error = %self, "request failed");
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            request_id: &request_id,
        };
        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = request_id.parse() {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_invalid_parameter_names_field() {
        let err = ProvisionError::invalid_parameter("accesstier", "ultra", "unsupported access tier");
        let msg = err.to_string();
        assert!(msg.contains("accesstier"));
        assert!(msg.contains("ultra"));
        assert!(err.is_invalid_argument());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_backend_not_found_is_lifted() {
        let err = ProvisionError::backend(
            "delete container",
            "acct/cont",
            BackendError::NotFound {
                resource: "cont".to_string(),
            },
        );
        assert!(matches!(err, ProvisionError::NotFound { .. }));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_backend_error_keeps_context() {
        let err = ProvisionError::backend(
            "ensure storage account",
            "myaccount",
            BackendError::Transport(anyhow::anyhow!("connection reset")),
        );
        let msg = err.to_string();
        assert!(msg.contains("ensure storage account"));
        assert!(msg.contains("myaccount"));
        assert_eq!(err.code(), "BackendError");
    }

    #[test]
    fn test_conflict_status() {
        let err = ProvisionError::BucketConflict {
            bucket: "b".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "AlreadyExists");
    }
}
