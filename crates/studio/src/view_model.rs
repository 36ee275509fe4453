//! Session View Model.
//!
//! One [`SessionViewModel`] per open design session. It owns the session
//! row, the [`VariationStore`] and the [`QuotaTracker`], and republishes a
//! complete [`SessionView`] through a `watch` channel after every change.
//!
//! Phases: `Loading -> Ready | Error`. `Error` is left only through
//! [`retry`](SessionViewModel::retry) (or a refresh), which re-enters
//! `Loading`. Inside `Ready`, which actions are offered is recomputed from
//! quota and variation status on every change.
//!
//! Every fetch is stamped with a sequence number taken before the request
//! is sent. A response is applied only if nothing newer has been applied
//! for the same part of the state (session row or variation list), so a
//! slow reload can never overwrite a fresher one. Only a fresh session row
//! moves the view into `Ready`.
//!
//! Submissions that depend on a quota check are serialized per session
//! through [`SubmissionPermit`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use atelier_core::job::{validate_regeneration_count, JobRequest};
use atelier_core::navigation::select_product_path;
use atelier_core::quota::{QuotaSnapshot, QuotaTracker, QuotaUsage};
use atelier_core::session::DesignSession;
use atelier_core::types::RecordId;
use atelier_core::variation::DesignVariation;
use atelier_events::{event_types, Notification, StudioEvent};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};

use crate::context::StudioContext;
use crate::enqueue::SubmissionReceipt;
use crate::error::StudioError;
use crate::store::VariationStore;
use crate::sync::{ChangeHandler, SyncChange, SyncHandle};

const ENQUEUE_FAILED_MESSAGE: &str = "We couldn't start that request. Please try again.";
const REFRESH_FAILED_MESSAGE: &str = "We couldn't refresh your designs. Please try again.";

// ---------------------------------------------------------------------------
// View snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewPhase {
    Loading,
    Ready,
    Error,
}

/// Why the view is in the `Error` phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewError {
    /// Internal classification for logs; the browser renders every code
    /// the same way.
    pub code: &'static str,
    pub message: String,
}

impl ViewError {
    fn from_error(err: &StudioError) -> Self {
        let code = match err {
            StudioError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            StudioError::SessionFetchFailed(_) => "SESSION_FETCH_FAILED",
            StudioError::VariationFetchFailed(_) => "VARIATION_FETCH_FAILED",
            _ => "LOAD_FAILED",
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllowedActions {
    pub can_regenerate: bool,
    pub can_upscale: bool,
    pub can_proceed: bool,
    pub can_retry: bool,
    /// Variations an upscale could target right now.
    pub upscalable: Vec<RecordId>,
}

/// Everything the browser renders for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: RecordId,
    pub phase: ViewPhase,
    pub session: Option<DesignSession>,
    pub variations: Vec<DesignVariation>,
    pub quota: Option<QuotaSnapshot>,
    pub actions: AllowedActions,
    pub selected_variation_id: Option<RecordId>,
    pub notifications: Vec<Notification>,
    pub error: Option<ViewError>,
    /// Bumped on every republish.
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct State {
    phase: ViewPhase,
    session: Option<DesignSession>,
    store: VariationStore,
    quota: QuotaTracker,
    selected: Option<RecordId>,
    notifications: Vec<Notification>,
    error: Option<ViewError>,
    /// Sequence of the newest applied session row.
    session_seq: u64,
    /// Sequence of the newest applied variation list.
    variations_seq: u64,
    version: u64,
}

impl State {
    fn new() -> Self {
        Self {
            phase: ViewPhase::Loading,
            session: None,
            store: VariationStore::new(),
            quota: QuotaTracker::default(),
            selected: None,
            notifications: Vec::new(),
            error: None,
            session_seq: 0,
            variations_seq: 0,
            version: 0,
        }
    }

    fn to_view(&self, session_id: &str) -> SessionView {
        let variations = self.store.list();
        let ready = self.phase == ViewPhase::Ready;
        let loaded = ready && self.session.is_some();

        let upscalable: Vec<RecordId> = if loaded {
            variations
                .iter()
                .filter(|v| v.is_upscalable())
                .map(|v| v.id.clone())
                .collect()
        } else {
            Vec::new()
        };

        let actions = AllowedActions {
            can_regenerate: loaded && self.quota.can_regenerate(),
            can_upscale: loaded && self.quota.can_upscale() && !upscalable.is_empty(),
            can_proceed: loaded,
            can_retry: self.phase == ViewPhase::Error,
            upscalable,
        };

        SessionView {
            session_id: session_id.to_string(),
            phase: self.phase,
            session: self.session.clone(),
            variations,
            quota: self.session.as_ref().map(|_| self.quota.snapshot()),
            actions,
            selected_variation_id: self.selected.clone(),
            notifications: self.notifications.clone(),
            error: self.error.clone(),
            version: self.version,
        }
    }

    /// Adopt a session row. The first row seeds the tracker from local
    /// counters; later rows only reconcile it.
    fn adopt_session(&mut self, session: DesignSession, local: QuotaUsage) {
        if self.session.is_none() {
            self.quota = QuotaTracker::for_session(&session, local);
        } else {
            self.quota.reconcile(&session);
        }
        self.session = Some(session);
    }

    fn adopt_variations(&mut self, records: Vec<DesignVariation>) {
        self.store.replace_server(records);
        let still_selectable = self
            .selected
            .as_deref()
            .and_then(|id| self.store.find(id))
            .is_some_and(DesignVariation::is_selectable);
        if !still_selectable {
            self.selected = None;
        }
    }
}

/// What a full fetch should do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    /// Page-level load: failure moves the view to `Error`.
    Blocking,
    /// Reload of a ready view: failure becomes a notification.
    Background,
}

// ---------------------------------------------------------------------------
// SessionViewModel
// ---------------------------------------------------------------------------

/// Exclusive right to check quota and submit a job for one session.
///
/// Held from reading the quota until the submission returns, so two
/// requests can never both spend the same remaining quota.
pub struct SubmissionPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Cheaply cloneable handle to one session's view state.
#[derive(Clone)]
pub struct SessionViewModel {
    inner: Arc<Inner>,
}

struct Inner {
    session_id: RecordId,
    ctx: StudioContext,
    state: Mutex<State>,
    view_tx: watch::Sender<SessionView>,
    seq: AtomicU64,
    submissions: Arc<AsyncMutex<()>>,
}

impl SessionViewModel {
    pub(crate) fn new(session_id: &str, ctx: StudioContext) -> Self {
        let state = State::new();
        let (view_tx, _) = watch::channel(state.to_view(session_id));
        Self {
            inner: Arc::new(Inner {
                session_id: session_id.to_string(),
                ctx,
                state: Mutex::new(state),
                view_tx,
                seq: AtomicU64::new(0),
                submissions: Arc::new(AsyncMutex::new(())),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Current snapshot.
    pub fn view(&self) -> SessionView {
        self.inner.view_tx.borrow().clone()
    }

    /// Receive every republished snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.inner.view_tx.subscribe()
    }

    /// Enter `Loading` and fetch the session and its variations.
    pub async fn load(&self) -> Result<(), StudioError> {
        // Stamped under the state lock so a pushed row cannot slip between
        // the stamp and the phase change.
        let seq = self.inner.update(|s| {
            s.phase = ViewPhase::Loading;
            s.error = None;
            self.inner.next_seq()
        });
        self.inner.fetch_all(seq, LoadMode::Blocking).await
    }

    /// Leave the `Error` phase by loading again.
    pub async fn retry(&self) -> Result<(), StudioError> {
        if self.inner.phase() != ViewPhase::Error {
            return Err(StudioError::InvalidAction(
                "Retry is only available after a failed load".into(),
            ));
        }
        self.load().await
    }

    /// Manual refresh: a background reload when ready, a full load otherwise.
    pub async fn refresh(&self) -> Result<(), StudioError> {
        if self.inner.phase() != ViewPhase::Ready {
            return self.load().await;
        }
        let seq = self.inner.next_seq();
        self.inner.fetch_all(seq, LoadMode::Background).await
    }

    /// Wait for exclusive use of this session's submission path.
    pub async fn submission_permit(&self) -> SubmissionPermit {
        SubmissionPermit {
            _guard: Arc::clone(&self.inner.submissions).lock_owned().await,
        }
    }

    /// Queue `count` new variations.
    ///
    /// Quota is the caller's responsibility and is not checked here. Callers
    /// that check it hold a [`SubmissionPermit`] across the check and this
    /// call.
    pub async fn request_regeneration(&self, count: u32) -> Result<SubmissionReceipt, StudioError> {
        self.inner.require_ready()?;
        validate_regeneration_count(count)?;
        self.inner
            .enqueue(JobRequest::regenerate(self.inner.session_id.as_str(), count))
            .await
    }

    /// Queue an upscale of an existing variation.
    ///
    /// Quota is the caller's responsibility, as for
    /// [`request_regeneration`](Self::request_regeneration).
    pub async fn request_upscale(&self, variation_id: &str) -> Result<SubmissionReceipt, StudioError> {
        self.inner.require_ready()?;
        {
            let state = self.inner.lock();
            match state.store.find(variation_id) {
                None => {
                    return Err(StudioError::InvalidAction(format!(
                        "Variation {variation_id} is not part of this session"
                    )))
                }
                Some(v) if v.is_placeholder() => {
                    return Err(StudioError::InvalidAction(format!(
                        "Variation {variation_id} has not been created yet"
                    )))
                }
                Some(_) => {}
            }
        }
        self.inner
            .enqueue(JobRequest::upscale(self.inner.session_id.as_str(), variation_id))
            .await
    }

    /// Mark a ready variation as the one to carry into product selection.
    pub fn select(&self, variation_id: &str) -> Result<(), StudioError> {
        self.inner.require_ready()?;
        let selectable = self
            .inner
            .lock()
            .store
            .find(variation_id)
            .is_some_and(DesignVariation::is_selectable);
        if !selectable {
            return Err(StudioError::InvalidAction(format!(
                "Variation {variation_id} cannot be selected"
            )));
        }
        let id = variation_id.to_string();
        self.inner.update(move |s| s.selected = Some(id));
        Ok(())
    }

    /// Path of the product selection step for the current selection.
    pub fn proceed_path(&self) -> Result<String, StudioError> {
        let state = self.inner.lock();
        let session = state.session.as_ref().ok_or_else(|| {
            StudioError::InvalidAction("The session has not been loaded".into())
        })?;
        Ok(select_product_path(
            session.language(),
            &self.inner.session_id,
            state.selected.as_deref(),
        )?)
    }

    /// Remove a notification. Returns whether it existed.
    pub fn dismiss_notification(&self, notification_id: &str) -> bool {
        self.inner.update(|s| {
            let before = s.notifications.len();
            s.notifications
                .retain(|n| !(n.id == notification_id && n.dismissible));
            s.notifications.len() != before
        })
    }

    /// Start applying realtime changes. Dropping the handle stops them.
    ///
    /// Returns `None` when realtime is disabled for this studio.
    pub fn attach_realtime(&self) -> Option<SyncHandle> {
        let sync = self.inner.ctx.sync.as_ref()?;
        let handler: Arc<dyn ChangeHandler> = self.inner.clone();
        Some(sync.subscribe(&self.inner.session_id, handler))
    }
}

// ---------------------------------------------------------------------------
// Inner
// ---------------------------------------------------------------------------

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn phase(&self) -> ViewPhase {
        self.lock().phase
    }

    fn require_ready(&self) -> Result<(), StudioError> {
        match self.phase() {
            ViewPhase::Ready => Ok(()),
            phase => Err(StudioError::InvalidAction(format!(
                "The session view is not ready ({phase:?})"
            ))),
        }
    }

    /// Mutate the state and republish the snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        state.version += 1;
        let view = state.to_view(&self.session_id);
        drop(state);
        self.view_tx.send_replace(view);
        result
    }

    fn publish(&self, event_type: &str, payload: serde_json::Value) {
        self.ctx
            .events
            .publish(StudioEvent::new(event_type, self.session_id.as_str()).with_payload(payload));
    }

    fn local_usage(&self) -> QuotaUsage {
        self.ctx
            .counters
            .load(&self.session_id)
            .unwrap_or_else(|e| {
                tracing::warn!(session_id = %self.session_id, error = %e, "Failed to read usage counters");
                QuotaUsage::default()
            })
    }

    fn persist_usage(&self, usage: QuotaUsage) {
        if let Err(e) = self.ctx.counters.store_usage(&self.session_id, usage) {
            tracing::warn!(session_id = %self.session_id, error = %e, "Failed to persist usage counters");
        }
    }

    // ---- loading ----

    async fn fetch_all(&self, seq: u64, mode: LoadMode) -> Result<(), StudioError> {
        let sid = self.session_id.as_str();

        let session = match self.ctx.source.fetch_session(sid).await {
            Ok(Some(session)) => session,
            Ok(None) => return self.fail_fetch(seq, mode, StudioError::SessionNotFound(sid.into())),
            Err(e) => {
                return self.fail_fetch(seq, mode, StudioError::SessionFetchFailed(e.to_string()))
            }
        };

        let variations = match self.ctx.source.list_variations(sid).await {
            Ok(rows) => rows,
            Err(e) => {
                return self.fail_fetch(seq, mode, StudioError::VariationFetchFailed(e.to_string()))
            }
        };
        let count = variations.len();
        let local = self.local_usage();

        let outcome = self.update(|s| {
            let session_fresh = seq > s.session_seq;
            // With a stale session row the phase belongs to the newer
            // attempt; outside `Ready` the whole response is dropped.
            let variations_fresh =
                seq > s.variations_seq && (session_fresh || s.phase == ViewPhase::Ready);
            if session_fresh {
                s.session_seq = seq;
                s.adopt_session(session, local);
                s.phase = ViewPhase::Ready;
                s.error = None;
            }
            if variations_fresh {
                s.variations_seq = seq;
                s.adopt_variations(variations);
            }
            (session_fresh, variations_fresh, s.quota.usage())
        });

        match outcome {
            (false, false, _) => {
                tracing::debug!(session_id = %sid, seq, "Discarded stale session load");
            }
            (session_fresh, variations_fresh, usage) => {
                if session_fresh {
                    self.persist_usage(usage);
                }
                if variations_fresh {
                    tracing::debug!(session_id = %sid, seq, count, "Variations reloaded");
                    self.publish(event_types::VARIATIONS_RELOADED, json!({"count": count, "seq": seq}));
                }
            }
        }
        Ok(())
    }

    fn fail_fetch(&self, seq: u64, mode: LoadMode, err: StudioError) -> Result<(), StudioError> {
        tracing::error!(session_id = %self.session_id, seq, error = %err, "Session load failed");

        let applied = match mode {
            LoadMode::Blocking => self.update(|s| {
                if seq <= s.session_seq {
                    return false;
                }
                s.session_seq = seq;
                s.phase = ViewPhase::Error;
                s.error = Some(ViewError::from_error(&err));
                true
            }),
            // A failed refresh is always reported, whatever landed since.
            LoadMode::Background => {
                self.update(|s| s.notifications.push(Notification::error(REFRESH_FAILED_MESSAGE)));
                true
            }
        };

        if !applied {
            return Ok(());
        }
        self.publish(
            event_types::SESSION_LOAD_FAILED,
            json!({"code": ViewError::from_error(&err).code, "message": err.to_string()}),
        );
        Err(err)
    }

    /// Variation-only reload triggered by the realtime feed.
    async fn reload_variations(&self) {
        if self.phase() != ViewPhase::Ready {
            return;
        }
        let seq = self.next_seq();
        let sid = self.session_id.as_str();

        match self.ctx.source.list_variations(sid).await {
            Ok(rows) => {
                let count = rows.len();
                let applied = self.update(|s| {
                    if seq <= s.variations_seq {
                        return false;
                    }
                    s.variations_seq = seq;
                    s.adopt_variations(rows);
                    true
                });
                if applied {
                    self.publish(event_types::VARIATIONS_RELOADED, json!({"count": count, "seq": seq}));
                } else {
                    tracing::debug!(session_id = %sid, seq, "Discarded stale variation reload");
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %sid, error = %e, "Realtime variation reload failed");
                self.update(|s| s.notifications.push(Notification::error(REFRESH_FAILED_MESSAGE)));
            }
        }
    }

    /// Apply a session row pushed by the realtime feed.
    fn apply_pushed_session(&self, session: DesignSession) {
        if session.id != self.session_id {
            tracing::warn!(session_id = %self.session_id, pushed = %session.id, "Ignoring row of another session");
            return;
        }
        let local = self.local_usage();
        let payload = json!({
            "regeneration_count": session.regeneration_count,
            "upscale_count": session.upscale_count,
            "status": session.status,
        });

        let usage = self.update(|s| {
            // Outside `Ready` the load in flight fetches a newer row anyway.
            if s.phase != ViewPhase::Ready || s.session.is_none() {
                return None;
            }
            // Anything fetched before this push is older than it.
            s.session_seq = s.session_seq.max(self.seq.load(Ordering::Acquire));
            s.adopt_session(session, local);
            Some(s.quota.usage())
        });

        if let Some(usage) = usage {
            self.persist_usage(usage);
            self.publish(event_types::SESSION_UPDATED, payload);
        }
    }

    // ---- enqueue ----

    async fn enqueue(&self, request: JobRequest) -> Result<SubmissionReceipt, StudioError> {
        let now = Utc::now();
        let placeholders: Vec<DesignVariation> = (0..request.placeholder_count())
            .map(|_| DesignVariation::placeholder(&request.session_id, now))
            .collect();
        let ids: Vec<RecordId> = placeholders.iter().map(|p| p.id.clone()).collect();

        // Visible before the network call is made.
        self.update(|s| s.store.push_placeholders(placeholders));

        match self.ctx.enqueuer.submit(&request).await {
            Ok(receipt) => {
                let kind = request.job_type.quota_kind();
                let cost = request.quota_cost();
                let usage = self.update(|s| {
                    s.quota.record_usage(kind, cost);
                    s.quota.usage()
                });
                if let Err(e) = self.ctx.counters.set(kind, &self.session_id, usage.get(kind)) {
                    tracing::warn!(session_id = %self.session_id, error = %e, "Failed to persist usage counter");
                }
                self.publish(
                    event_types::VARIATION_ENQUEUED,
                    json!({
                        "job_type": request.job_type.as_str(),
                        "count": request.count,
                        "variation_id": request.variation_id,
                        "strategy": receipt.strategy,
                    }),
                );
                Ok(receipt)
            }
            Err(err) => {
                self.update(|s| {
                    s.store.rollback(&ids);
                    s.notifications.push(Notification::error(ENQUEUE_FAILED_MESSAGE));
                });
                self.publish(
                    event_types::VARIATION_ENQUEUE_FAILED,
                    json!({
                        "job_type": request.job_type.as_str(),
                        "error": err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ChangeHandler for Inner {
    async fn on_change(&self, change: SyncChange) {
        match change {
            SyncChange::VariationsChanged => self.reload_variations().await,
            SyncChange::SessionUpdated(session) => self.apply_pushed_session(session),
        }
    }
}
