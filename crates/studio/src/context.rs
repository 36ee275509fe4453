use std::sync::Arc;

use atelier_events::EventBus;

use crate::backend::SessionSource;
use crate::counters::UsageCounters;
use crate::enqueue::JobEnqueuer;
use crate::sync::{ChangeFeed, RealtimeSync};
use crate::view_model::SessionViewModel;

/// Dependencies shared by every open session view.
#[derive(Clone)]
pub struct StudioContext {
    pub(crate) source: Arc<dyn SessionSource>,
    pub(crate) enqueuer: Arc<JobEnqueuer>,
    pub(crate) counters: UsageCounters,
    pub(crate) sync: Option<RealtimeSync>,
    pub(crate) events: Arc<EventBus>,
}

impl StudioContext {
    pub fn new(
        source: Arc<dyn SessionSource>,
        enqueuer: Arc<JobEnqueuer>,
        counters: UsageCounters,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            source,
            enqueuer,
            counters,
            sync: None,
            events,
        }
    }

    /// Enable realtime updates for views opened from this context.
    pub fn with_feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.sync = Some(RealtimeSync::new(feed));
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn realtime_enabled(&self) -> bool {
        self.sync.is_some()
    }

    /// A fresh view model in the `Loading` phase. Call
    /// [`SessionViewModel::load`] to populate it.
    pub fn open(&self, session_id: &str) -> SessionViewModel {
        SessionViewModel::new(session_id, self.clone())
    }
}
