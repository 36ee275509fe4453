//! Design variation rows, status lattice, and client-side placeholders.
//!
//! A variation moves `queued -> pending -> ready | failed` while it is being
//! generated, and independently `ready -> upscaling -> ready | failed` when an
//! upscale is requested. Placeholders are never persisted: they carry a
//! [`PLACEHOLDER_ID_PREFIX`] id so they can never collide with a server row.

use serde::{Deserialize, Serialize};

use crate::types::{RecordId, Timestamp};

/// Prefix of every locally synthesized variation id.
pub const PLACEHOLDER_ID_PREFIX: &str = "local-";

// ---------------------------------------------------------------------------
// Status / quality
// ---------------------------------------------------------------------------

/// Generation status of a variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationStatus {
    Queued,
    Pending,
    Upscaling,
    Ready,
    Failed,
}

impl VariationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VariationStatus::Queued => "queued",
            VariationStatus::Pending => "pending",
            VariationStatus::Upscaling => "upscaling",
            VariationStatus::Ready => "ready",
            VariationStatus::Failed => "failed",
        }
    }

    /// Whether a worker is still expected to touch this variation.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            VariationStatus::Queued | VariationStatus::Pending | VariationStatus::Upscaling
        )
    }
}

/// Render quality of a variation's image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationQuality {
    Base,
    Upscaled,
}

/// Whether `from -> to` is a legal status move.
///
/// Re-delivery of the same status is allowed (realtime feeds may repeat an
/// update). Everything else must move forward along one of the two chains.
pub fn can_transition(from: VariationStatus, to: VariationStatus) -> bool {
    use VariationStatus::*;

    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Queued, Pending)
            | (Queued, Ready)
            | (Queued, Failed)
            | (Pending, Ready)
            | (Pending, Failed)
            | (Ready, Upscaling)
            | (Upscaling, Ready)
            | (Upscaling, Failed)
    )
}

/// Whether an id was synthesized locally.
pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_ID_PREFIX)
}

// ---------------------------------------------------------------------------
// DesignVariation
// ---------------------------------------------------------------------------

/// A row from the design variations table, or a local placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignVariation {
    pub id: RecordId,
    pub session_id: RecordId,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub status: VariationStatus,
    pub quality: Option<VariationQuality>,
    pub seed: Option<i64>,
    pub created_at: Timestamp,
}

impl DesignVariation {
    /// Build a queued placeholder for a job that has not been confirmed yet.
    pub fn placeholder(session_id: &str, created_at: Timestamp) -> Self {
        Self {
            id: format!("{PLACEHOLDER_ID_PREFIX}{}", uuid::Uuid::new_v4()),
            session_id: session_id.to_string(),
            image_url: None,
            thumbnail_url: None,
            status: VariationStatus::Queued,
            quality: None,
            seed: None,
            created_at,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        is_placeholder_id(&self.id)
    }

    /// `image_url` is set exactly when the variation is ready.
    pub fn has_consistent_image(&self) -> bool {
        (self.status == VariationStatus::Ready) == self.image_url.is_some()
    }

    /// Ready, persisted, and not already upscaled.
    pub fn is_upscalable(&self) -> bool {
        self.status == VariationStatus::Ready
            && !self.is_placeholder()
            && self.quality != Some(VariationQuality::Upscaled)
    }

    /// Ready and persisted, so it can be carried into product selection.
    pub fn is_selectable(&self) -> bool {
        self.status == VariationStatus::Ready && !self.is_placeholder()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
