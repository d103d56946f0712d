//! Maps `BgpError` onto the HTTP status/body contract every handler
//! shares: a `detail` message, a correlation id present in structured
//! logs, and — for conflicts — the full structured conflict list.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bgp_common::BgpError;
use serde::Serialize;

/// Wraps a [`BgpError`] with the correlation id that ties the response
/// to the log line that recorded it.
pub struct ApiError {
    error: BgpError,
    correlation_id: uuid::Uuid,
}

impl From<BgpError> for ApiError {
    fn from(error: BgpError) -> Self {
        let correlation_id = uuid::Uuid::new_v4();
        tracing::error!(%correlation_id, error = %error, "request failed");
        Self { error, correlation_id }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicts: Option<Vec<bgp_common::Conflict>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, conflicts) = match &self.error {
            BgpError::Validation(_) => (StatusCode::BAD_REQUEST, None),
            BgpError::Conflict(conflicts) => (StatusCode::CONFLICT, Some(conflicts.clone())),
            BgpError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            BgpError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            BgpError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let detail = match &self.error {
            BgpError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody { detail, correlation_id: self.correlation_id.to_string(), conflicts };
        (status, Json(body)).into_response()
    }
}
