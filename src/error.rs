use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Error taxonomy for the donation core.
///
/// Variants map one-to-one onto HTTP responses; see the `IntoResponse` impl.
/// `StoreUnavailable` is the only variant a webhook caller should retry —
/// everything else is either the client's fault or a permanent condition.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Client-fixable input problem. No side effects were performed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Webhook payload failed signature verification.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Persistence layer unreachable or failing. Safe to retry the whole operation.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Payment-provider API call failed. Retrying creates a fresh provider
    /// session, which is acceptable.
    #[error("payment provider error: {0}")]
    Provider(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidSignature => {
                (StatusCode::BAD_REQUEST, "Invalid signature".to_string())
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database Error".to_string(),
                )
            }
            AppError::Provider(msg) => {
                tracing::error!("Provider error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment provider error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Errors surfaced by the `db` layer.
///
/// `Conflict` is the idempotency signal: a uniqueness constraint fired,
/// meaning another request already wrote the row. Callers convert it to a
/// benign "already processed" outcome rather than an error response.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("uniqueness conflict")]
    Conflict,

    #[error("query failed: {0}")]
    Query(String),
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(inner, _) = &e {
            if inner.code == rusqlite::ErrorCode::ConstraintViolation {
                return StoreError::Conflict;
            }
        }
        StoreError::Query(e.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => AppError::StoreUnavailable(msg),
            StoreError::Conflict => {
                AppError::StoreUnavailable("unexpected uniqueness conflict".to_string())
            }
            StoreError::Query(msg) => AppError::StoreUnavailable(msg),
        }
    }
}
