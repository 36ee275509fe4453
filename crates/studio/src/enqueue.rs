//! Job Enqueuer: ordered submission strategies.
//!
//! The job table's name is not the same on every deployment, so a job is
//! offered to each [`SubmissionStrategy`] in order until one accepts it.
//! Exactly one accepted insert is made per call and nothing is retried
//! internally; a user who sees the failure can trigger the action again.

use async_trait::async_trait;
use atelier_core::job::JobRequest;
use atelier_db::models::job::{NewDesignJob, NewGenerationJob};
use atelier_db::repositories::{DesignJobRepo, GenerationJobRepo};
use atelier_db::{DbError, PostgrestClient};

use crate::error::{StrategyFailure, StudioError};

/// One way of persisting a job row.
#[async_trait]
pub trait SubmissionStrategy: Send + Sync {
    /// Short name used in logs and failure reports.
    fn name(&self) -> &'static str;

    async fn submit(&self, request: &JobRequest) -> Result<(), DbError>;
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// `{session_id, type, count}` / `{variation_id, session_id, type}` into the
/// generation jobs table.
pub struct PrimaryJobTable {
    client: PostgrestClient,
}

impl PrimaryJobTable {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SubmissionStrategy for PrimaryJobTable {
    fn name(&self) -> &'static str {
        "generation_jobs"
    }

    async fn submit(&self, request: &JobRequest) -> Result<(), DbError> {
        GenerationJobRepo::create(&self.client, &NewGenerationJob::from(request)).await
    }
}

/// `{session_id, action, count?}` into the alternate jobs table.
pub struct FallbackJobTable {
    client: PostgrestClient,
}

impl FallbackJobTable {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SubmissionStrategy for FallbackJobTable {
    fn name(&self) -> &'static str {
        "design_jobs"
    }

    async fn submit(&self, request: &JobRequest) -> Result<(), DbError> {
        DesignJobRepo::create(&self.client, &NewDesignJob::from(request)).await
    }
}

// ---------------------------------------------------------------------------
// JobEnqueuer
// ---------------------------------------------------------------------------

/// Which strategy accepted a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub strategy: &'static str,
    /// Position in the strategy list; `0` is the primary path.
    pub attempt: usize,
}

impl SubmissionReceipt {
    pub fn used_fallback(&self) -> bool {
        self.attempt > 0
    }
}

pub struct JobEnqueuer {
    strategies: Vec<Box<dyn SubmissionStrategy>>,
}

impl JobEnqueuer {
    pub fn new(strategies: Vec<Box<dyn SubmissionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Primary job table first, then the fallback table.
    pub fn postgrest(client: PostgrestClient) -> Self {
        Self::new(vec![
            Box::new(PrimaryJobTable::new(client.clone())),
            Box::new(FallbackJobTable::new(client)),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Offer `request` to each strategy in order.
    ///
    /// Any rejection moves on to the next strategy, whether or not it looks
    /// like a schema mismatch. Quota is not checked here.
    pub async fn submit(&self, request: &JobRequest) -> Result<SubmissionReceipt, StudioError> {
        let mut failures = Vec::new();

        for (attempt, strategy) in self.strategies.iter().enumerate() {
            match strategy.submit(request).await {
                Ok(()) => {
                    tracing::info!(
                        session_id = %request.session_id,
                        job_type = request.job_type.as_str(),
                        strategy = strategy.name(),
                        attempt,
                        "Job queued",
                    );
                    return Ok(SubmissionReceipt {
                        strategy: strategy.name(),
                        attempt,
                    });
                }
                Err(e) => {
                    let schema_mismatch = e.is_schema_mismatch();
                    tracing::warn!(
                        session_id = %request.session_id,
                        strategy = strategy.name(),
                        schema_mismatch,
                        error = %e,
                        "Job submission rejected",
                    );
                    failures.push(StrategyFailure {
                        strategy: strategy.name(),
                        message: e.to_string(),
                        schema_mismatch,
                    });
                }
            }
        }

        tracing::error!(
            session_id = %request.session_id,
            job_type = request.job_type.as_str(),
            attempts = failures.len(),
            "Every job submission path failed",
        );
        Err(StudioError::EnqueueFailed { failures })
    }
}
