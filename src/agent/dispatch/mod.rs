//! Worker subprocess dispatch.
//!
//! - [`stream`]: incremental decoder for the worker's JSON event stream
//! - [`executor`]: one worker process per task, with cooperative cancellation
//! - [`pool`]: bounded parallel dispatch over a batch
//!
//! Worker failures are values ([`WorkerResult`] with `success == false`),
//! never errors thrown past the dispatcher.

mod cancel;
mod executor;
mod pool;
mod stream;

use crate::error::Result;
use crate::plan::PlanTask;
use std::path::{Path, PathBuf};

pub use cancel::{CancelToken, install_interrupt_handler, interrupt_requested};
pub use executor::{WorkerCommand, WorktreeExecutor, run_worker};
pub use pool::dispatch;
pub use stream::{ProgressUpdate, StreamDecoder, truncate_chars};

/// Outcome of one worker run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    pub task_id: String,
    pub task_subject: String,
    /// Exit code 0 and not cancelled.
    pub success: bool,
    /// `None` if the process could not be spawned or was killed by a signal.
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub workspace: PathBuf,
    pub turns: u32,
    pub cost: f64,
    /// Workspace HEAD after a successful run.
    pub commit: Option<String>,
}

impl WorkerResult {
    /// First non-empty stderr line, for one-line summaries.
    pub fn first_error_line(&self) -> Option<&str> {
        self.stderr.lines().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Creates workspaces and runs workers for tasks.
///
/// Shared across pool threads, hence `Sync`.
pub trait TaskExecutor: Sync {
    /// Create a fresh workspace for `task`.
    fn prepare(&self, task: &PlanTask) -> Result<PathBuf>;

    /// Remove the workspace and the task branch. Best-effort.
    fn teardown(&self, task: &PlanTask, workspace: &Path);

    /// Run one worker to completion.
    fn run(
        &self,
        task: &PlanTask,
        workspace: &Path,
        on_progress: &mut dyn FnMut(ProgressUpdate),
    ) -> WorkerResult;
}
