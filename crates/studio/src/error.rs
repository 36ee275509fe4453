use std::fmt;

use atelier_core::error::CoreError;
use atelier_core::types::RecordId;

use crate::counters::CounterError;

/// One submission path's rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub message: String,
    /// The target table or one of its columns does not exist.
    pub schema_mismatch: bool,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.message)
    }
}

fn join_failures(failures: &[StrategyFailure]) -> String {
    if failures.is_empty() {
        return "no submission strategy configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// The session fetch returned no row.
    #[error("Design session {0} not found")]
    SessionNotFound(RecordId),

    /// The session fetch itself failed.
    #[error("Failed to load design session: {0}")]
    SessionFetchFailed(String),

    #[error("Failed to load variations: {0}")]
    VariationFetchFailed(String),

    /// Every submission path rejected the job.
    #[error("Failed to queue job ({})", join_failures(.failures))]
    EnqueueFailed { failures: Vec<StrategyFailure> },

    /// The action is not available in the current view state.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error(transparent)]
    Storage(#[from] CounterError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for StudioError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => {
                StudioError::InvalidAction(format!("{entity} {id} not found"))
            }
            CoreError::Validation(msg) | CoreError::Conflict(msg) => StudioError::InvalidAction(msg),
            CoreError::Internal(msg) => StudioError::Internal(msg),
        }
    }
}
