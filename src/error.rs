//! Error types for the radorch CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for orchestrator operations.
///
/// Each variant maps to a specific exit code. Worker failures are normally
/// captured as [`crate::agent::WorkerResult`] values; `WorkerError` only
/// surfaces when a failure ends the whole run.
#[derive(Error, Debug)]
pub enum RadorchError {
    /// User provided invalid arguments or the environment is unusable.
    #[error("{0}")]
    UserError(String),

    /// The plan record could not be fetched, parsed, or updated.
    #[error("Plan operation failed: {0}")]
    PlanError(String),

    /// Git operation failed.
    #[error("Git operation failed: {0}")]
    GitError(String),

    /// An isolated workspace could not be created or removed.
    #[error("Workspace operation failed: {0}")]
    WorkspaceError(String),

    /// A worker failure stopped the orchestration.
    #[error("Worker failed: {0}")]
    WorkerError(String),

    /// Folding a task's work into the integration branch failed.
    #[error("Merge failed on task {task}: {reason}")]
    MergeError { task: String, reason: String },
}

impl RadorchError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            RadorchError::UserError(_) => exit_codes::USER_ERROR,
            RadorchError::PlanError(_) => exit_codes::PLAN_FAILURE,
            RadorchError::GitError(_) => exit_codes::GIT_FAILURE,
            RadorchError::WorkspaceError(_) => exit_codes::GIT_FAILURE,
            RadorchError::WorkerError(_) => exit_codes::WORKER_FAILURE,
            RadorchError::MergeError { .. } => exit_codes::MERGE_FAILURE,
        }
    }

    /// Build a merge error for a task.
    pub fn merge(task: impl Into<String>, reason: impl Into<String>) -> Self {
        RadorchError::MergeError {
            task: task.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, RadorchError>;
