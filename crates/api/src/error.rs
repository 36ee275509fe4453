use atelier_core::error::CoreError;
use atelier_studio::StudioError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`StudioError`] and [`CoreError`] for domain errors and adds
/// the caller-side quota gate. Implements [`IntoResponse`] to produce consistent
/// JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A session view model error from `atelier_studio`.
    #[error(transparent)]
    Studio(#[from] StudioError),

    /// A domain-level error from `atelier_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The session has no quota left for the requested action.
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- StudioError variants ---
            AppError::Studio(studio) => classify_studio_error(studio),

            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Caller-side gates ---
            AppError::QuotaExhausted(msg) => {
                (StatusCode::CONFLICT, "QUOTA_EXHAUSTED", msg.clone())
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a studio error into an HTTP status, error code, and message.
///
/// - A missing session maps to 404.
/// - Actions the current view state does not allow map to 409.
/// - Upstream failures (PostgREST reads, every job table rejecting a
///   submission) map to 502 with the upstream message.
/// - Counter storage failures map to 500 with a sanitized message.
fn classify_studio_error(err: &StudioError) -> (StatusCode, &'static str, String) {
    match err {
        StudioError::SessionNotFound(_) => {
            (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", err.to_string())
        }
        StudioError::InvalidAction(msg) => (StatusCode::CONFLICT, "INVALID_ACTION", msg.clone()),
        StudioError::SessionFetchFailed(_) => {
            (StatusCode::BAD_GATEWAY, "SESSION_FETCH_FAILED", err.to_string())
        }
        StudioError::VariationFetchFailed(_) => (
            StatusCode::BAD_GATEWAY,
            "VARIATION_FETCH_FAILED",
            err.to_string(),
        ),
        StudioError::EnqueueFailed { .. } => {
            tracing::warn!(error = %err, "Job submission rejected by every path");
            (StatusCode::BAD_GATEWAY, "ENQUEUE_FAILED", err.to_string())
        }
        StudioError::Storage(storage) => {
            tracing::error!(error = %storage, "Quota counter storage error");
            internal()
        }
        StudioError::Internal(msg) => {
            tracing::error!(error = %msg, "Studio internal error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
