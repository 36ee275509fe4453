//! In-memory fakes for the studio's backend seams.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atelier_core::job::JobRequest;
use atelier_core::session::DesignSession;
use atelier_core::variation::{DesignVariation, VariationQuality, VariationStatus};
use atelier_db::DbError;
use atelier_events::EventBus;
use atelier_studio::backend::SessionSource;
use atelier_studio::counters::UsageCounters;
use atelier_studio::enqueue::{JobEnqueuer, SubmissionStrategy};
use atelier_studio::sync::{ChangeFeed, FeedGuard, FeedSubscription, SyncChange};
use atelier_studio::StudioContext;
use chrono::{TimeZone, Utc};
use tokio::sync::{mpsc, oneshot, Notify};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn session(id: &str, max_regenerations: Option<u32>, max_upscales: Option<u32>) -> DesignSession {
    DesignSession {
        id: id.to_string(),
        prompt: "retro sunset over seoul".to_string(),
        language: Some("ko".to_string()),
        user_id: Some("u-1".to_string()),
        regeneration_count: None,
        upscale_count: None,
        max_regenerations,
        max_upscales,
        status: Some("ready".to_string()),
        created_at: Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap(),
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
        created_at: Utc.with_ymd_and_hms(2024, 4, 1, 9, minute, 0).unwrap(),
    }
}

pub fn api_error(status: u16, code: &str) -> DbError {
    DbError::Api {
        status,
        code: Some(code.to_string()),
        message: format!("rejected with {code}"),
    }
}

// ---------------------------------------------------------------------------
// FakeSource
// ---------------------------------------------------------------------------

/// Gate that parks the next `list_variations` call after it has read its rows.
/// A failure flag set while parked still fails the call on release.
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: oneshot::Sender<()>,
}

#[derive(Default)]
pub struct FakeSource {
    pub sessions: Mutex<HashMap<String, DesignSession>>,
    pub variations: Mutex<Vec<DesignVariation>>,
    pub fail_sessions: AtomicBool,
    pub fail_variations: AtomicBool,
    gate: Mutex<Option<(Arc<Notify>, oneshot::Receiver<()>)>>,
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

    pub fn update_session(&self, f: impl FnOnce(&mut DesignSession)) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(s) = sessions.values_mut().next() {
            f(s);
        }
    }

    pub fn install_gate(&self) -> Gate {
        let entered = Arc::new(Notify::new());
        let (release, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some((Arc::clone(&entered), rx));
        Gate { entered, release }
    }
}

#[async_trait]
impl SessionSource for FakeSource {
    async fn fetch_session(&self, session_id: &str) -> Result<Option<DesignSession>, DbError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(api_error(503, "PGRST000"));
        }
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn list_variations(&self, _session_id: &str) -> Result<Vec<DesignVariation>, DbError> {
        if self.fail_variations.load(Ordering::SeqCst) {
            return Err(api_error(500, "XX000"));
        }
        let rows = self.variations.lock().unwrap().clone();
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            let _ = release.await;
            if self.fail_variations.load(Ordering::SeqCst) {
                return Err(api_error(500, "XX000"));
            }
        }
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Submission strategies
// ---------------------------------------------------------------------------

pub type Submitted = Arc<Mutex<Vec<(&'static str, JobRequest)>>>;

/// Accepts or rejects every job, recording what it saw.
pub struct ScriptedStrategy {
    pub name: &'static str,
    pub accept: bool,
    pub submitted: Submitted,
    gate: Mutex<Option<(Arc<Notify>, oneshot::Receiver<()>)>>,
}

impl ScriptedStrategy {
    pub fn new(name: &'static str, accept: bool, submitted: &Submitted) -> Self {
        Self {
            name,
            accept,
            submitted: Arc::clone(submitted),
            gate: Mutex::new(None),
        }
    }

    /// Park the next submission until released.
    pub fn gated(mut self) -> (Self, Gate) {
        let entered = Arc::new(Notify::new());
        let (release, rx) = oneshot::channel();
        self.gate = Mutex::new(Some((Arc::clone(&entered), rx)));
        (self, Gate { entered, release })
    }
}

#[async_trait]
impl SubmissionStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn submit(&self, request: &JobRequest) -> Result<(), DbError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            let _ = release.await;
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

// ---------------------------------------------------------------------------
// FakeFeed
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeFeed {
    pub senders: Mutex<Vec<mpsc::UnboundedSender<SyncChange>>>,
    pub open: Arc<Mutex<usize>>,
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
// Context
// ---------------------------------------------------------------------------

pub struct Harness {
    pub ctx: StudioContext,
    pub source: Arc<FakeSource>,
    pub counters: UsageCounters,
    pub feed: Arc<FakeFeed>,
    pub submitted: Submitted,
}

pub fn harness(source: Arc<FakeSource>, strategies: Vec<Box<dyn SubmissionStrategy>>, submitted: Submitted) -> Harness {
    let counters = UsageCounters::in_memory();
    let feed = Arc::new(FakeFeed::default());
    let ctx = StudioContext::new(
        source.clone(),
        Arc::new(JobEnqueuer::new(strategies)),
        counters.clone(),
        Arc::new(EventBus::default()),
    )
    .with_feed(feed.clone());
    Harness {
        ctx,
        source,
        counters,
        feed,
        submitted,
    }
}

/// Primary and fallback strategies with fixed outcomes.
pub fn harness_with(source: Arc<FakeSource>, primary_accepts: bool, fallback_accepts: bool) -> Harness {
    let submitted: Submitted = Arc::default();
    let strategies: Vec<Box<dyn SubmissionStrategy>> = vec![
        Box::new(ScriptedStrategy::new("generation_jobs", primary_accepts, &submitted)),
        Box::new(ScriptedStrategy::new("design_jobs", fallback_accepts, &submitted)),
    ];
    harness(source, strategies, submitted)
}
