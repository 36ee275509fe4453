//! Row shapes for the two job tables.
//!
//! Both tables accept the same requests under different field names: the
//! primary table uses `type`, the fallback table uses `action`.

use atelier_core::job::{JobRequest, JobType};
use atelier_core::types::RecordId;
use serde::Serialize;

/// Insert DTO for the primary generation jobs table.
///
/// `{ session_id, type: "regenerate", count }` or
/// `{ variation_id, session_id, type: "upscale" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewGenerationJob {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<RecordId>,
    pub session_id: RecordId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl From<&JobRequest> for NewGenerationJob {
    fn from(request: &JobRequest) -> Self {
        Self {
            variation_id: request.variation_id.clone(),
            session_id: request.session_id.clone(),
            job_type: request.job_type,
            count: request.count,
        }
    }
}

/// Insert DTO for the fallback jobs table: `{ session_id, action, count? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDesignJob {
    pub session_id: RecordId,
    pub action: JobType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<RecordId>,
}

impl From<&JobRequest> for NewDesignJob {
    fn from(request: &JobRequest) -> Self {
        Self {
            session_id: request.session_id.clone(),
            action: request.job_type,
            count: request.count,
            variation_id: request.variation_id.clone(),
        }
    }
}
