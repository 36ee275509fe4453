//! Regeneration / upscale quota tracking (client-side soft gate).
//!
//! The generation worker enforces quotas authoritatively. The tracker only
//! decides which actions the view offers. Sessions whose maxima have not been
//! populated yet fall back to [`DEFAULT_MAX_REGENERATIONS`] and
//! [`DEFAULT_MAX_UPSCALES`] so they still get a bounded, non-zero quota.

use serde::{Deserialize, Serialize};

use crate::session::DesignSession;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Regenerations allowed when the session row leaves `max_regenerations` null.
pub const DEFAULT_MAX_REGENERATIONS: u32 = 3;

/// Upscales allowed when the session row leaves `max_upscales` null.
pub const DEFAULT_MAX_UPSCALES: u32 = 2;

// ---------------------------------------------------------------------------
// QuotaKind
// ---------------------------------------------------------------------------

/// The two metered actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    Regenerate,
    Upscale,
}

impl QuotaKind {
    pub const ALL: [QuotaKind; 2] = [QuotaKind::Regenerate, QuotaKind::Upscale];

    /// Key prefix of the durable usage counter (`regenUsed:<sessionId>`).
    pub fn counter_prefix(self) -> &'static str {
        match self {
            QuotaKind::Regenerate => "regenUsed",
            QuotaKind::Upscale => "upscaleUsed",
        }
    }
}

// ---------------------------------------------------------------------------
// Limits / usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaLimits {
    pub max_regenerations: u32,
    pub max_upscales: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            max_regenerations: DEFAULT_MAX_REGENERATIONS,
            max_upscales: DEFAULT_MAX_UPSCALES,
        }
    }
}

impl QuotaLimits {
    /// Session maxima, with the fixed defaults for unset fields.
    pub fn for_session(session: &DesignSession) -> Self {
        Self {
            max_regenerations: session
                .max_regenerations
                .unwrap_or(DEFAULT_MAX_REGENERATIONS),
            max_upscales: session.max_upscales.unwrap_or(DEFAULT_MAX_UPSCALES),
        }
    }

    pub fn max(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Regenerate => self.max_regenerations,
            QuotaKind::Upscale => self.max_upscales,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub regenerations: u32,
    pub upscales: u32,
}

impl QuotaUsage {
    pub fn get(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Regenerate => self.regenerations,
            QuotaKind::Upscale => self.upscales,
        }
    }

    fn slot(&mut self, kind: QuotaKind) -> &mut u32 {
        match kind {
            QuotaKind::Regenerate => &mut self.regenerations,
            QuotaKind::Upscale => &mut self.upscales,
        }
    }
}

/// Serializable per-kind view of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaLine {
    pub used: u32,
    pub max: u32,
    pub remaining: u32,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub regenerations: QuotaLine,
    pub upscales: QuotaLine,
}

// ---------------------------------------------------------------------------
// QuotaTracker
// ---------------------------------------------------------------------------

/// Usage counts checked against per-session maxima.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaTracker {
    limits: QuotaLimits,
    usage: QuotaUsage,
}

impl QuotaTracker {
    pub fn new(limits: QuotaLimits, usage: QuotaUsage) -> Self {
        Self { limits, usage }
    }

    /// Build a tracker from locally persisted usage, then let the session's
    /// server-side counters override it.
    pub fn for_session(session: &DesignSession, local: QuotaUsage) -> Self {
        let mut tracker = Self::new(QuotaLimits::for_session(session), local);
        tracker.reconcile(session);
        tracker
    }

    pub fn can_regenerate(&self) -> bool {
        self.can_use(QuotaKind::Regenerate)
    }

    pub fn can_upscale(&self) -> bool {
        self.can_use(QuotaKind::Upscale)
    }

    /// `used < max`.
    pub fn can_use(&self, kind: QuotaKind) -> bool {
        self.used(kind) < self.max(kind)
    }

    pub fn used(&self, kind: QuotaKind) -> u32 {
        self.usage.get(kind)
    }

    pub fn max(&self, kind: QuotaKind) -> u32 {
        self.limits.max(kind)
    }

    pub fn remaining(&self, kind: QuotaKind) -> u32 {
        self.max(kind).saturating_sub(self.used(kind))
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    pub fn usage(&self) -> QuotaUsage {
        self.usage
    }

    /// Add `delta` to the local usage of `kind` and return the new count.
    ///
    /// Usage only ever grows here; it saturates instead of wrapping.
    pub fn record_usage(&mut self, kind: QuotaKind, delta: u32) -> u32 {
        let slot = self.usage.slot(kind);
        *slot = slot.saturating_add(delta);
        *slot
    }

    /// Adopt the session's maxima and every non-null server counter.
    ///
    /// The server value wins over local tracking, in either direction.
    pub fn reconcile(&mut self, session: &DesignSession) {
        self.limits = QuotaLimits::for_session(session);
        if let Some(count) = session.regeneration_count {
            self.usage.regenerations = count;
        }
        if let Some(count) = session.upscale_count {
            self.usage.upscales = count;
        }
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            regenerations: self.line(QuotaKind::Regenerate),
            upscales: self.line(QuotaKind::Upscale),
        }
    }

    fn line(&self, kind: QuotaKind) -> QuotaLine {
        QuotaLine {
            used: self.used(kind),
            max: self.max(kind),
            remaining: self.remaining(kind),
            available: self.can_use(kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
