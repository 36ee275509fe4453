//! Shared harness for the API integration tests.
//!
//! The studio's backend seams are replaced with in-memory fakes; the router
//! is built with [`build_app_router`] so the production middleware stack is
//! exercised.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use atelier_api::config::ServerConfig;
use atelier_api::registry::SessionRegistry;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_api::ws::WsManager;
use atelier_core::job::JobRequest;
use atelier_core::session::DesignSession;
use atelier_core::variation::{DesignVariation, VariationQuality, VariationStatus};
use atelier_db::{DbConfig, DbError, PostgrestClient, TableNames};
use atelier_events::EventBus;
use atelier_studio::backend::SessionSource;
use atelier_studio::counters::UsageCounters;
use atelier_studio::enqueue::{JobEnqueuer, SubmissionStrategy};
use atelier_studio::sync::{ChangeFeed, FeedGuard, FeedSubscription, SyncChange};
use atelier_studio::StudioContext;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn session(id: &str) -> DesignSession {
    DesignSession {
        id: id.to_string(),
        prompt: "hand-drawn tiger in hanbok".to_string(),
        language: Some("ko".to_string()),
        user_id: Some("u-1".to_string()),
        regeneration_count: None,
        upscale_count: None,
        max_regenerations: None,
        max_upscales: None,
        status: Some("ready".to_string()),
        created_at: Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap(),
    }
}

pub fn variation(id: &str, minute: u32, status: VariationStatus) -> DesignVariation {
    let ready = status == VariationStatus::Ready;
    DesignVariation {
        id: id.to_string(),
        session_id: "S1".to_string(),
        image_url: ready.then(|| format!("https://cdn.example/{id}.png")),
        thumbnail_url: None,
        status,
        quality: ready.then_some(VariationQuality::Base),
        seed: None,
        created_at: Utc.with_ymd_and_hms(2024, 5, 2, 10, minute, 0).unwrap(),
    }
}

fn api_error(status: u16, code: &str) -> DbError {
    DbError::Api {
        status,
        code: Some(code.to_string()),
        message: format!("rejected with {code}"),
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSource {
    pub sessions: Mutex<HashMap<String, DesignSession>>,
    pub variations: Mutex<Vec<DesignVariation>>,
    pub fail_variations: AtomicBool,
}

impl FakeSource {
    pub fn with(session: DesignSession, variations: Vec<DesignVariation>) -> Arc<Self> {
        let source = Self::default();
        source
            .sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
        *source.variations.lock().unwrap() = variations;
        Arc::new(source)
    }

    pub fn set_variations(&self, rows: Vec<DesignVariation>) {
        *self.variations.lock().unwrap() = rows;
    }

    pub fn update_session(&self, id: &str, f: impl FnOnce(&mut DesignSession)) {
        if let Some(s) = self.sessions.lock().unwrap().get_mut(id) {
            f(s);
        }
    }
}

#[async_trait]
impl SessionSource for FakeSource {
    async fn fetch_session(&self, session_id: &str) -> Result<Option<DesignSession>, DbError> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn list_variations(&self, session_id: &str) -> Result<Vec<DesignVariation>, DbError> {
        if self.fail_variations.load(Ordering::SeqCst) {
            return Err(api_error(500, "XX000"));
        }
        Ok(self
            .variations
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.session_id == session_id)
            .cloned()
            .collect())
    }
}

pub type Submitted = Arc<Mutex<Vec<(&'static str, JobRequest)>>>;

pub struct FixedStrategy {
    name: &'static str,
    accept: bool,
    submitted: Submitted,
    /// Time every submission takes.
    latency: Duration,
}

#[async_trait]
impl SubmissionStrategy for FixedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn submit(&self, request: &JobRequest) -> Result<(), DbError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.submitted
            .lock()
            .unwrap()
            .push((self.name, request.clone()));
        if self.accept {
            Ok(())
        } else if self.name == "generation_jobs" {
            Err(api_error(404, "42P01"))
        } else {
            Err(api_error(403, "42501"))
        }
    }
}

#[derive(Default)]
pub struct FakeFeed {
    senders: Mutex<Vec<mpsc::UnboundedSender<SyncChange>>>,
    open: Arc<Mutex<usize>>,
}

struct OpenGuard(Arc<Mutex<usize>>);

impl FeedGuard for OpenGuard {
    fn close(&self) {
        *self.0.lock().unwrap() -= 1;
    }
}

impl FakeFeed {
    pub fn push(&self, change: SyncChange) {
        for tx in self.senders.lock().unwrap().iter() {
            let _ = tx.send(change.clone());
        }
    }

    pub fn open_channels(&self) -> usize {
        *self.open.lock().unwrap()
    }
}

impl ChangeFeed for FakeFeed {
    fn subscribe(&self, _session_id: &str) -> FeedSubscription {
        let (tx, changes) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        *self.open.lock().unwrap() += 1;
        FeedSubscription {
            changes,
            guard: Box::new(OpenGuard(Arc::clone(&self.open))),
        }
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        session_idle_secs: 900,
    }
}

/// A PostgREST client for `base_url`. Nothing but the health check uses it.
pub fn postgrest_client(base_url: &str) -> PostgrestClient {
    PostgrestClient::new(&DbConfig {
        supabase_url: base_url.to_string(),
        api_key: "anon-key".to_string(),
        access_token: None,
        request_timeout_secs: 2,
        tables: TableNames::default(),
    })
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub source: Arc<FakeSource>,
    pub feed: Arc<FakeFeed>,
    pub counters: UsageCounters,
    pub submitted: Submitted,
}

/// App over `source`, with the primary and fallback job tables accepting or
/// rejecting every job. PostgREST itself is unreachable.
pub fn build_test_app(source: Arc<FakeSource>, primary_ok: bool, fallback_ok: bool) -> TestApp {
    build_test_app_with_db(source, primary_ok, fallback_ok, "http://127.0.0.1:9")
}

pub fn build_test_app_with_db(
    source: Arc<FakeSource>,
    primary_ok: bool,
    fallback_ok: bool,
    db_url: &str,
) -> TestApp {
    build(source, primary_ok, fallback_ok, db_url, Duration::ZERO)
}

/// App whose primary job table accepts every job after `latency`.
pub fn build_slow_test_app(source: Arc<FakeSource>, latency: Duration) -> TestApp {
    build(source, true, true, "http://127.0.0.1:9", latency)
}

fn build(
    source: Arc<FakeSource>,
    primary_ok: bool,
    fallback_ok: bool,
    db_url: &str,
    latency: Duration,
) -> TestApp {
    let config = test_config();
    let submitted: Submitted = Arc::default();
    let strategies: Vec<Box<dyn SubmissionStrategy>> = vec![
        Box::new(FixedStrategy {
            name: "generation_jobs",
            accept: primary_ok,
            submitted: Arc::clone(&submitted),
            latency,
        }),
        Box::new(FixedStrategy {
            name: "design_jobs",
            accept: fallback_ok,
            submitted: Arc::clone(&submitted),
            latency,
        }),
    ];

    let counters = UsageCounters::in_memory();
    let feed = Arc::new(FakeFeed::default());
    let event_bus = Arc::new(EventBus::default());
    let studio = StudioContext::new(
        source.clone(),
        Arc::new(JobEnqueuer::new(strategies)),
        counters.clone(),
        Arc::clone(&event_bus),
    )
    .with_feed(feed.clone());

    let state = AppState {
        db: postgrest_client(db_url),
        config: Arc::new(config.clone()),
        sessions: Arc::new(SessionRegistry::new(
            studio,
            Duration::from_secs(config.session_idle_secs),
        )),
        ws_manager: Arc::new(WsManager::new()),
        event_bus,
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        source,
        feed,
        counters,
        submitted,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Option<serde_json::Value>) -> Response {
    send(app, Method::POST, uri, body).await
}

pub async fn delete(app: &Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri, None).await
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the status and return the parsed body.
pub async fn expect_json(response: Response, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
