//! Lease-counted cache of open session view models.
//!
//! HTTP handlers borrow a view model with [`SessionRegistry::get_or_load`].
//! WebSocket connections hold a [`SessionLease`]; the realtime feed of a
//! session is attached while at least one lease exists and released with
//! the last one. Idle entries are pruned by [`start_idle_sweeper`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use atelier_core::types::RecordId;
use atelier_studio::sync::SyncHandle;
use atelier_studio::{SessionViewModel, StudioContext};

/// Interval between idle sweeps (in seconds).
const SWEEP_INTERVAL_SECS: u64 = 60;

struct Entry {
    view_model: SessionViewModel,
    leases: usize,
    sync: Option<SyncHandle>,
    idle_since: Instant,
}

pub struct SessionRegistry {
    ctx: StudioContext,
    idle_ttl: Duration,
    entries: Mutex<HashMap<RecordId, Entry>>,
}

impl SessionRegistry {
    pub fn new(ctx: StudioContext, idle_ttl: Duration) -> Self {
        Self {
            ctx,
            idle_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &StudioContext {
        &self.ctx
    }

    /// The cached view model of a session, opening and loading it first if
    /// this is the first request for it.
    ///
    /// A failed first load is not an error here: the view is left in its
    /// `Error` phase for the caller to render.
    pub async fn get_or_load(&self, session_id: &str) -> SessionViewModel {
        let (view_model, created) = self.get_or_open(session_id, false);
        if created {
            load_logged(&view_model).await;
        }
        view_model
    }

    /// Take a lease on a session. The first lease attaches the realtime feed.
    pub async fn acquire(self: &Arc<Self>, session_id: &str) -> SessionLease {
        let (view_model, created) = self.get_or_open(session_id, true);
        let lease = SessionLease {
            registry: Arc::clone(self),
            session_id: session_id.to_string(),
            view_model: view_model.clone(),
        };
        if created {
            load_logged(&view_model).await;
        }
        lease
    }

    /// Number of cached sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn lease_count(&self, session_id: &str) -> usize {
        self.lock().get(session_id).map_or(0, |e| e.leases)
    }

    /// Whether the session currently receives realtime changes.
    pub fn is_live(&self, session_id: &str) -> bool {
        self.lock()
            .get(session_id)
            .and_then(|e| e.sync.as_ref())
            .is_some_and(SyncHandle::is_active)
    }

    /// Drop entries without leases that have been idle for at least the
    /// configured TTL. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let ttl = self.idle_ttl;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.leases > 0 || e.idle_since.elapsed() < ttl);
        before - entries.len()
    }

    // ---- private helpers ----

    fn lock(&self) -> MutexGuard<'_, HashMap<RecordId, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get_or_open(&self, session_id: &str, lease: bool) -> (SessionViewModel, bool) {
        let mut entries = self.lock();
        let mut created = false;
        let entry = entries.entry(session_id.to_string()).or_insert_with(|| {
            created = true;
            tracing::debug!(session_id = %session_id, "Opening session view");
            Entry {
                view_model: self.ctx.open(session_id),
                leases: 0,
                sync: None,
                idle_since: Instant::now(),
            }
        });

        if lease {
            entry.leases += 1;
            if entry.sync.is_none() {
                entry.sync = entry.view_model.attach_realtime();
            }
        } else {
            entry.idle_since = Instant::now();
        }

        (entry.view_model.clone(), created)
    }

    fn release(&self, session_id: &str) {
        let released = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(session_id) else {
                return;
            };
            entry.leases = entry.leases.saturating_sub(1);
            if entry.leases == 0 {
                entry.idle_since = Instant::now();
                entry.sync.take()
            } else {
                None
            }
        };
        // Unsubscribe outside the map lock.
        if let Some(handle) = released {
            handle.unsubscribe();
            tracing::debug!(session_id = %session_id, "Last lease released");
        }
    }
}

async fn load_logged(view_model: &SessionViewModel) {
    if let Err(e) = view_model.load().await {
        tracing::info!(
            session_id = %view_model.session_id(),
            error = %e,
            "Initial session load failed",
        );
    }
}

/// Holds a session open. Dropping it releases the lease.
pub struct SessionLease {
    registry: Arc<SessionRegistry>,
    session_id: RecordId,
    view_model: SessionViewModel,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn view_model(&self) -> &SessionViewModel {
        &self.view_model
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.release(&self.session_id);
    }
}

/// Spawn a background task that prunes idle sessions once a minute.
pub fn start_idle_sweeper(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));

        loop {
            interval.tick().await;
            let removed = registry.prune_idle();
            if removed > 0 {
                tracing::debug!(removed, remaining = registry.len(), "Pruned idle sessions");
            }
        }
    })
}
