//! Generation job requests (regenerate / upscale).
//!
//! A [`JobRequest`] is what the studio hands to a submission strategy. The
//! worker that consumes the job lives outside this system; the client only
//! learns about completion through the realtime feed.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::quota::QuotaKind;
use crate::types::RecordId;

/// Largest number of variations a single regeneration may ask for.
pub const MAX_REGENERATION_BATCH: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Regenerate,
    Upscale,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Regenerate => "regenerate",
            JobType::Upscale => "upscale",
        }
    }

    /// The quota this job type consumes.
    pub fn quota_kind(self) -> QuotaKind {
        match self {
            JobType::Regenerate => QuotaKind::Regenerate,
            JobType::Upscale => QuotaKind::Upscale,
        }
    }
}

/// A request to produce new variations or upscale an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    pub session_id: RecordId,
    pub variation_id: Option<RecordId>,
    pub job_type: JobType,
    /// Requested number of variations (regenerate only).
    pub count: Option<u32>,
}

impl JobRequest {
    pub fn regenerate(session_id: impl Into<RecordId>, count: u32) -> Self {
        Self {
            session_id: session_id.into(),
            variation_id: None,
            job_type: JobType::Regenerate,
            count: Some(count),
        }
    }

    pub fn upscale(session_id: impl Into<RecordId>, variation_id: impl Into<RecordId>) -> Self {
        Self {
            session_id: session_id.into(),
            variation_id: Some(variation_id.into()),
            job_type: JobType::Upscale,
            count: None,
        }
    }

    /// How many placeholder rows the view shows while the job is in flight.
    pub fn placeholder_count(&self) -> u32 {
        match self.job_type {
            JobType::Regenerate => self.count.unwrap_or(1),
            JobType::Upscale => 1,
        }
    }

    /// Quota units consumed once the job has been accepted.
    pub fn quota_cost(&self) -> u32 {
        self.placeholder_count()
    }
}

/// Validate the number of variations requested by a regeneration.
pub fn validate_regeneration_count(count: u32) -> Result<(), CoreError> {
    if count == 0 || count > MAX_REGENERATION_BATCH {
        return Err(CoreError::Validation(format!(
            "Regeneration count must be between 1 and {MAX_REGENERATION_BATCH}, got {count}"
        )));
    }
    Ok(())
}
