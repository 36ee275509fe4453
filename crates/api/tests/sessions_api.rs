//! Integration tests for the `/api/v1/sessions` routes.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use atelier_core::job::JobType;
use atelier_core::variation::VariationStatus;
use axum::http::StatusCode;
use common::{
    build_slow_test_app, build_test_app, delete, expect_json, get, post, session, variation,
    FakeSource, TestApp,
};
use serde_json::json;

fn default_app(primary_ok: bool, fallback_ok: bool) -> TestApp {
    let source = FakeSource::with(
        session("S1"),
        vec![
            variation("v-1", 1, VariationStatus::Ready),
            variation("v-2", 2, VariationStatus::Pending),
        ],
    );
    build_test_app(source, primary_ok, fallback_ok)
}

// ---------------------------------------------------------------------------
// Snapshot and loading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_view_returns_ready_snapshot() {
    let app = default_app(true, true);

    let json = expect_json(get(&app.router, "/api/v1/sessions/S1").await, StatusCode::OK).await;
    let view = &json["data"];

    assert_eq!(view["session_id"], "S1");
    assert_eq!(view["phase"], "ready");
    assert_eq!(view["variations"].as_array().unwrap().len(), 2);
    assert_eq!(view["variations"][0]["id"], "v-2");
    assert_eq!(view["quota"]["regenerations"]["max"], 3);
    assert_eq!(view["quota"]["upscales"]["remaining"], 2);
    assert_eq!(view["actions"]["upscalable"], json!(["v-1"]));
    assert_eq!(view["actions"]["can_retry"], false);
}

#[tokio::test]
async fn unknown_session_renders_error_phase_until_retry_succeeds() {
    let app = default_app(true, true);

    let json = expect_json(get(&app.router, "/api/v1/sessions/S2").await, StatusCode::OK).await;
    assert_eq!(json["data"]["phase"], "error");
    assert_eq!(json["data"]["error"]["code"], "SESSION_NOT_FOUND");
    assert_eq!(json["data"]["actions"]["can_retry"], true);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S2/retry", None).await,
        StatusCode::NOT_FOUND,
    )
    .await;
    assert_eq!(json["code"], "SESSION_NOT_FOUND");

    app.source
        .sessions
        .lock()
        .unwrap()
        .insert("S2".into(), session("S2"));

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S2/retry", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["phase"], "ready");
    assert!(json["data"]["error"].is_null());
}

#[tokio::test]
async fn retry_on_ready_view_is_conflict() {
    let app = default_app(true, true);
    get(&app.router, "/api/v1/sessions/S1").await;

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/retry", None).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "INVALID_ACTION");
}

#[tokio::test]
async fn refresh_picks_up_new_rows() {
    let app = default_app(true, true);
    get(&app.router, "/api/v1/sessions/S1").await;

    app.source.set_variations(vec![
        variation("v-1", 1, VariationStatus::Ready),
        variation("v-2", 2, VariationStatus::Ready),
        variation("v-3", 3, VariationStatus::Queued),
    ]);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/refresh", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["variations"].as_array().unwrap().len(), 3);
    assert_eq!(json["data"]["actions"]["upscalable"], json!(["v-2", "v-1"]));
}

#[tokio::test]
async fn failed_refresh_keeps_view_ready_with_notification() {
    let app = default_app(true, true);
    get(&app.router, "/api/v1/sessions/S1").await;
    app.source.fail_variations.store(true, Ordering::SeqCst);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/refresh", None).await,
        StatusCode::BAD_GATEWAY,
    )
    .await;
    assert_eq!(json["code"], "VARIATION_FETCH_FAILED");

    let json = expect_json(get(&app.router, "/api/v1/sessions/S1").await, StatusCode::OK).await;
    assert_eq!(json["data"]["phase"], "ready");
    assert_eq!(json["data"]["variations"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["notifications"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Regenerate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn regenerate_queues_on_primary_table() {
    let app = default_app(true, true);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/regenerate", Some(json!({"count": 2}))).await,
        StatusCode::ACCEPTED,
    )
    .await;
    let data = &json["data"];

    assert_eq!(data["strategy"], "generation_jobs");
    assert_eq!(data["used_fallback"], false);
    assert_eq!(data["view"]["quota"]["regenerations"]["used"], 2);
    assert_eq!(data["view"]["quota"]["regenerations"]["remaining"], 1);

    let variations = data["view"]["variations"].as_array().unwrap();
    assert_eq!(variations.len(), 4);
    let queued = variations
        .iter()
        .filter(|v| v["id"].as_str().unwrap().starts_with("local-"))
        .count();
    assert_eq!(queued, 2);

    let submitted = app.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].1.job_type, JobType::Regenerate);
    assert_eq!(submitted[0].1.count, Some(2));
}

#[tokio::test]
async fn regenerate_falls_back_when_primary_table_is_missing() {
    let app = default_app(false, true);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/regenerate", Some(json!({"count": 2}))).await,
        StatusCode::ACCEPTED,
    )
    .await;

    assert_eq!(json["data"]["strategy"], "design_jobs");
    assert_eq!(json["data"]["used_fallback"], true);
    assert_eq!(json["data"]["view"]["quota"]["regenerations"]["used"], 2);

    let names: Vec<&str> = app.submitted.lock().unwrap().iter().map(|(n, _)| *n).collect();
    assert_eq!(names, vec!["generation_jobs", "design_jobs"]);
}

#[tokio::test]
async fn regenerate_defaults_to_one_variation() {
    let app = default_app(true, true);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/regenerate", Some(json!({}))).await,
        StatusCode::ACCEPTED,
    )
    .await;
    assert_eq!(json["data"]["view"]["quota"]["regenerations"]["used"], 1);
}

#[tokio::test]
async fn regenerate_beyond_remaining_quota_is_rejected() {
    let mut s = session("S1");
    s.regeneration_count = Some(2);
    let app = build_test_app(FakeSource::with(s, vec![]), true, true);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/regenerate", Some(json!({"count": 2}))).await,
        StatusCode::CONFLICT,
    )
    .await;

    assert_eq!(json["code"], "QUOTA_EXHAUSTED");
    assert!(app.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_regenerations_cannot_overspend_quota() {
    let source = FakeSource::with(session("S1"), vec![]);
    let app = build_slow_test_app(source, Duration::from_millis(20));
    expect_json(get(&app.router, "/api/v1/sessions/S1").await, StatusCode::OK).await;

    let uri = "/api/v1/sessions/S1/regenerate";
    let (first, second) = tokio::join!(
        post(&app.router, uri, Some(json!({"count": 2}))),
        post(&app.router, uri, Some(json!({"count": 2}))),
    );
    let mut statuses = vec![first.status().as_u16(), second.status().as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, vec![202, 409]);

    let json = expect_json(get(&app.router, "/api/v1/sessions/S1").await, StatusCode::OK).await;
    assert_eq!(json["data"]["quota"]["regenerations"]["used"], 2);
    assert_eq!(json["data"]["quota"]["regenerations"]["max"], 3);
    assert_eq!(app.submitted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn regenerate_count_out_of_range_is_validation_error() {
    let app = default_app(true, true);

    for count in [0, 5] {
        let json = expect_json(
            post(
                &app.router,
                "/api/v1/sessions/S1/regenerate",
                Some(json!({ "count": count })),
            )
            .await,
            StatusCode::BAD_REQUEST,
        )
        .await;
        assert_eq!(json["code"], "VALIDATION_ERROR");
    }
    assert!(app.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_enqueue_rolls_back_and_leaves_dismissible_notification() {
    let app = default_app(false, false);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/regenerate", Some(json!({"count": 1}))).await,
        StatusCode::BAD_GATEWAY,
    )
    .await;
    assert_eq!(json["code"], "ENQUEUE_FAILED");

    let json = expect_json(get(&app.router, "/api/v1/sessions/S1").await, StatusCode::OK).await;
    let view = &json["data"];
    assert_eq!(view["variations"].as_array().unwrap().len(), 2);
    assert_eq!(view["quota"]["regenerations"]["used"], 0);

    let notifications = view["notifications"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["level"], "error");
    let id = notifications[0]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/v1/sessions/S1/notifications/{id}");
    assert_eq!(delete(&app.router, &uri).await.status(), StatusCode::NO_CONTENT);

    let json = expect_json(delete(&app.router, &uri).await, StatusCode::NOT_FOUND).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Upscale
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upscale_ready_variation() {
    let app = default_app(true, true);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/variations/v-1/upscale", None).await,
        StatusCode::ACCEPTED,
    )
    .await;
    assert_eq!(json["data"]["strategy"], "generation_jobs");
    assert_eq!(json["data"]["view"]["quota"]["upscales"]["used"], 1);

    let submitted = app.submitted.lock().unwrap();
    assert_eq!(submitted[0].1.job_type, JobType::Upscale);
    assert_eq!(submitted[0].1.variation_id.as_deref(), Some("v-1"));
}

#[tokio::test]
async fn upscale_of_pending_variation_is_conflict() {
    let app = default_app(true, true);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/variations/v-2/upscale", None).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "CONFLICT");
    assert!(app.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upscale_of_unknown_variation_is_not_found() {
    let app = default_app(true, true);

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/variations/v-9/upscale", None).await,
        StatusCode::NOT_FOUND,
    )
    .await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn upscale_without_quota_is_rejected() {
    let mut s = session("S1");
    s.upscale_count = Some(2);
    let app = build_test_app(
        FakeSource::with(s, vec![variation("v-1", 1, VariationStatus::Ready)]),
        true,
        true,
    );

    let json = expect_json(
        post(&app.router, "/api/v1/sessions/S1/variations/v-1/upscale", None).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "QUOTA_EXHAUSTED");
    assert!(app.submitted.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Selection and navigation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn select_then_proceed_carries_variation() {
    let app = default_app(true, true);

    let json = expect_json(
        post(
            &app.router,
            "/api/v1/sessions/S1/select",
            Some(json!({"variation_id": "v-1"})),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["selected_variation_id"], "v-1");

    let json = expect_json(
        get(&app.router, "/api/v1/sessions/S1/proceed").await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["path"], "/ko/design/S1/products?variation=v-1");
}

#[tokio::test]
async fn proceed_without_selection() {
    let app = default_app(true, true);

    let json = expect_json(
        get(&app.router, "/api/v1/sessions/S1/proceed").await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["path"], "/ko/design/S1/products");
}

#[tokio::test]
async fn selecting_pending_variation_is_conflict() {
    let app = default_app(true, true);

    let json = expect_json(
        post(
            &app.router,
            "/api/v1/sessions/S1/select",
            Some(json!({"variation_id": "v-2"})),
        )
        .await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "INVALID_ACTION");
}

#[tokio::test]
async fn proceed_for_missing_session_is_conflict() {
    let app = default_app(true, true);

    let json = expect_json(
        get(&app.router, "/api/v1/sessions/S2/proceed").await,
        StatusCode::CONFLICT,
    )
    .await;
    assert_eq!(json["code"], "INVALID_ACTION");
}
