//! Realtime Sync: one change subscription per open design session.
//!
//! A session listens to two streams filtered to its id: variation rows
//! (any change triggers a full variation reload) and its own session row
//! (updates are applied as pushed). Reconnects are the transport's job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atelier_core::session::DesignSession;
use atelier_db::TableNames;
use atelier_realtime::{ChangeEvent, ChangeFilter, PostgresChange, RealtimeManager, Subscription};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A change relevant to one design session.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncChange {
    /// Some variation row of the session was inserted, updated or deleted.
    VariationsChanged,
    /// The session row was updated; carries the full new row.
    SessionUpdated(DesignSession),
}

// ---------------------------------------------------------------------------
// Feed seam
// ---------------------------------------------------------------------------

/// Keeps a feed subscription open until closed or dropped.
pub trait FeedGuard: Send + Sync {
    fn close(&self);
}

impl FeedGuard for Subscription {
    fn close(&self) {
        self.unsubscribe();
    }
}

pub struct FeedSubscription {
    pub changes: mpsc::UnboundedReceiver<SyncChange>,
    pub guard: Box<dyn FeedGuard>,
}

/// Source of per-session change notifications.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, session_id: &str) -> FeedSubscription;
}

/// [`ChangeFeed`] over a Supabase Realtime channel.
pub struct RealtimeFeed {
    manager: Arc<RealtimeManager>,
    tables: TableNames,
}

impl RealtimeFeed {
    pub fn new(manager: Arc<RealtimeManager>, tables: TableNames) -> Self {
        Self { manager, tables }
    }

    pub fn filters(&self, session_id: &str) -> Vec<ChangeFilter> {
        vec![
            ChangeFilter::table(self.tables.variations.as_str()).eq("session_id", session_id),
            ChangeFilter::table(self.tables.sessions.as_str())
                .on(ChangeEvent::Update)
                .eq("id", session_id),
        ]
    }
}

impl ChangeFeed for RealtimeFeed {
    fn subscribe(&self, session_id: &str) -> FeedSubscription {
        let (subscription, mut raw) = self
            .manager
            .subscribe(&format!("design-session-{session_id}"), self.filters(session_id));
        let (tx, changes) = mpsc::unbounded_channel();
        let tables = self.tables.clone();

        // Ends when the channel is unregistered and its sender dropped.
        tokio::spawn(async move {
            while let Some(change) = raw.recv().await {
                if let Some(change) = classify(change, &tables) {
                    if tx.send(change).is_err() {
                        break;
                    }
                }
            }
        });

        FeedSubscription {
            changes,
            guard: Box::new(subscription),
        }
    }
}

/// Map a raw row change onto the session-level change it implies.
pub fn classify(change: PostgresChange, tables: &TableNames) -> Option<SyncChange> {
    if change.table == tables.variations {
        return Some(SyncChange::VariationsChanged);
    }
    if change.table == tables.sessions && change.event_type == ChangeEvent::Update {
        return match serde_json::from_value::<DesignSession>(change.record) {
            Ok(session) => Some(SyncChange::SessionUpdated(session)),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable session row in realtime update");
                None
            }
        };
    }
    None
}

// ---------------------------------------------------------------------------
// RealtimeSync
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChangeHandler: Send + Sync + 'static {
    async fn on_change(&self, change: SyncChange);
}

#[derive(Clone)]
pub struct RealtimeSync {
    feed: Arc<dyn ChangeFeed>,
}

impl RealtimeSync {
    pub fn new(feed: Arc<dyn ChangeFeed>) -> Self {
        Self { feed }
    }

    /// Deliver changes for `session_id` to `handler` until the returned
    /// handle is unsubscribed or dropped.
    ///
    /// Changes are handled one at a time. A burst of variation changes that
    /// queued up while the handler was busy is delivered as one.
    pub fn subscribe(&self, session_id: &str, handler: Arc<dyn ChangeHandler>) -> SyncHandle {
        let FeedSubscription { mut changes, guard } = self.feed.subscribe(session_id);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let sid = session_id.to_string();

        tokio::spawn(async move {
            loop {
                let first = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    change = changes.recv() => match change {
                        Some(change) => change,
                        None => break,
                    },
                };

                let mut batch = vec![first];
                while let Ok(next) = changes.try_recv() {
                    batch.push(next);
                }

                for change in coalesce(batch) {
                    if task_cancel.is_cancelled() {
                        break;
                    }
                    handler.on_change(change).await;
                }
            }
            tracing::debug!(session_id = %sid, "Realtime sync stopped");
        });

        tracing::debug!(session_id = %session_id, "Realtime sync started");

        SyncHandle {
            session_id: session_id.to_string(),
            cancel,
            guard: Mutex::new(Some(guard)),
            active: AtomicBool::new(true),
        }
    }
}

/// Session updates in order, then at most one variation reload.
fn coalesce(batch: Vec<SyncChange>) -> Vec<SyncChange> {
    let mut reload = false;
    let mut out: Vec<SyncChange> = batch
        .into_iter()
        .filter(|c| {
            let is_reload = matches!(c, SyncChange::VariationsChanged);
            reload |= is_reload;
            !is_reload
        })
        .collect();
    if reload {
        out.push(SyncChange::VariationsChanged);
    }
    out
}

/// Scoped realtime subscription of one session.
pub struct SyncHandle {
    session_id: String,
    cancel: CancellationToken,
    guard: Mutex<Option<Box<dyn FeedGuard>>>,
    active: AtomicBool,
}

impl SyncHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Tear down both streams. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let guard = self
            .guard
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(guard) = guard {
            guard.close();
        }
        tracing::debug!(session_id = %self.session_id, "Realtime sync released");
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
