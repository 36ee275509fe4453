//! Handlers for the `/sessions` resource.
//!
//! Every handler resolves the session's view model through the
//! [`SessionRegistry`](crate::registry::SessionRegistry), so a session is
//! loaded from PostgREST on first access and served from memory afterwards.
//!
//! The view model never checks quota itself. The regenerate and upscale
//! handlers are the callers that gate on it, holding the session's
//! submission permit from the check until the job is queued.

use atelier_core::error::CoreError;
use atelier_core::job::validate_regeneration_count;
use atelier_core::quota::QuotaSnapshot;
use atelier_core::types::RecordId;
use atelier_studio::enqueue::SubmissionReceipt;
use atelier_studio::{SessionView, ViewPhase};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

fn default_count() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    #[serde(default = "default_count")]
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub variation_id: RecordId,
}

/// Result of an accepted job submission.
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    /// Job table that accepted the row.
    pub strategy: &'static str,
    pub used_fallback: bool,
    pub view: SessionView,
}

impl EnqueueResponse {
    fn new(receipt: SubmissionReceipt, view: SessionView) -> Self {
        Self {
            strategy: receipt.strategy,
            used_fallback: receipt.used_fallback(),
            view,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProceedResponse {
    pub path: String,
}

// ---------------------------------------------------------------------------
// Snapshot and loading
// ---------------------------------------------------------------------------

/// GET /api/v1/sessions/{id}
///
/// Current view snapshot. A session that failed to load is returned with
/// `phase: "error"` rather than as an HTTP error.
pub async fn get_view(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> AppResult<impl IntoResponse> {
    let view_model = state.sessions.get_or_load(&id).await;
    Ok(Json(DataResponse {
        data: view_model.view(),
    }))
}

/// POST /api/v1/sessions/{id}/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> AppResult<impl IntoResponse> {
    let view_model = state.sessions.get_or_load(&id).await;
    view_model.refresh().await?;
    Ok(Json(DataResponse {
        data: view_model.view(),
    }))
}

/// POST /api/v1/sessions/{id}/retry
///
/// Only valid while the view is in its `Error` phase (409 otherwise).
pub async fn retry(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> AppResult<impl IntoResponse> {
    let view_model = state.sessions.get_or_load(&id).await;
    view_model.retry().await?;
    Ok(Json(DataResponse {
        data: view_model.view(),
    }))
}

// ---------------------------------------------------------------------------
// Job submission
// ---------------------------------------------------------------------------

/// POST /api/v1/sessions/{id}/regenerate
///
/// Queue `count` new variations (default `1`). Returns 202 with the
/// accepting job table and the view, which shows placeholders until the
/// worker's rows arrive.
pub async fn regenerate(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(input): Json<RegenerateRequest>,
) -> AppResult<impl IntoResponse> {
    validate_regeneration_count(input.count)?;

    let view_model = state.sessions.get_or_load(&id).await;
    let _permit = view_model.submission_permit().await;
    let view = view_model.view();
    if let Some(quota) = ready_quota(&view) {
        let remaining = quota.regenerations.remaining;
        if input.count > remaining {
            return Err(AppError::QuotaExhausted(format!(
                "Requested {} regenerations but only {remaining} remain",
                input.count
            )));
        }
    }

    let receipt = view_model.request_regeneration(input.count).await?;

    tracing::info!(
        session_id = %id,
        count = input.count,
        strategy = receipt.strategy,
        "Regeneration queued",
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: EnqueueResponse::new(receipt, view_model.view()),
        }),
    ))
}

/// POST /api/v1/sessions/{id}/variations/{variation_id}/upscale
///
/// The target must be a ready, not yet upscaled variation of this session
/// and the session must have upscale quota left.
pub async fn upscale(
    State(state): State<AppState>,
    Path((id, variation_id)): Path<(RecordId, RecordId)>,
) -> AppResult<impl IntoResponse> {
    let view_model = state.sessions.get_or_load(&id).await;
    let _permit = view_model.submission_permit().await;
    let view = view_model.view();
    if let Some(quota) = ready_quota(&view) {
        let variation = view
            .variations
            .iter()
            .find(|v| v.id == variation_id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "Variation",
                id: variation_id.clone(),
            })?;
        if !variation.is_upscalable() {
            return Err(CoreError::Conflict(format!(
                "Variation {variation_id} cannot be upscaled"
            ))
            .into());
        }
        if !quota.upscales.available {
            return Err(AppError::QuotaExhausted(
                "No upscales remain for this session".into(),
            ));
        }
    }

    let receipt = view_model.request_upscale(&variation_id).await?;

    tracing::info!(
        session_id = %id,
        variation_id = %variation_id,
        strategy = receipt.strategy,
        "Upscale queued",
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: EnqueueResponse::new(receipt, view_model.view()),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Selection and navigation
// ---------------------------------------------------------------------------

/// POST /api/v1/sessions/{id}/select
pub async fn select(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(input): Json<SelectRequest>,
) -> AppResult<impl IntoResponse> {
    let view_model = state.sessions.get_or_load(&id).await;
    view_model.select(&input.variation_id)?;
    Ok(Json(DataResponse {
        data: view_model.view(),
    }))
}

/// GET /api/v1/sessions/{id}/proceed
///
/// Path of the product selection step, carrying the selected variation
/// when there is one.
pub async fn proceed(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> AppResult<impl IntoResponse> {
    let view_model = state.sessions.get_or_load(&id).await;
    let path = view_model.proceed_path()?;
    Ok(Json(DataResponse {
        data: ProceedResponse { path },
    }))
}

/// DELETE /api/v1/sessions/{id}/notifications/{notification_id}
pub async fn dismiss_notification(
    State(state): State<AppState>,
    Path((id, notification_id)): Path<(RecordId, String)>,
) -> AppResult<StatusCode> {
    let view_model = state.sessions.get_or_load(&id).await;
    if !view_model.dismiss_notification(&notification_id) {
        return Err(CoreError::NotFound {
            entity: "Notification",
            id: notification_id,
        }
        .into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The quota of a ready view. Views that are not ready are left for the
/// view model to reject.
fn ready_quota(view: &SessionView) -> Option<QuotaSnapshot> {
    if view.phase != ViewPhase::Ready {
        return None;
    }
    view.quota
}
