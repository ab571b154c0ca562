//! Failure logs and task re-runs.
//!
//! Every failed worker leaves a log at
//! `<failure_log_root>/<plan7>/<task7>.log`, overwritten on each attempt so
//! the file always describes the latest failure. A retry tears the old
//! workspace down completely before creating a fresh one at the same path,
//! then runs the driver directly, outside the pool.

use crate::agent::{ProgressUpdate, TaskExecutor, WorkerResult};
use crate::error::Result;
use crate::fs::atomic_write_file;
use crate::plan::{PlanTask, short_id};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Location of a task's failure log.
pub fn failure_log_path(root: &Path, plan_id: &str, task_id: &str) -> PathBuf {
    root.join(short_id(plan_id))
        .join(format!("{}.log", short_id(task_id)))
}

/// Render the failure log body.
pub fn format_failure_log(result: &WorkerResult, at: DateTime<Utc>) -> String {
    let exit_code = result
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "Task: {}", result.task_id);
    let _ = writeln!(out, "Subject: {}", result.task_subject);
    let _ = writeln!(out, "Exit code: {}", exit_code);
    let _ = writeln!(out, "Turns: {}", result.turns);
    let _ = writeln!(out, "Cost: ${:.4}", result.cost);
    let _ = writeln!(out, "Worktree: {}", result.workspace.display());
    let _ = writeln!(out, "Timestamp: {}", at.to_rfc3339());
    out.push('\n');
    out.push_str("--- stderr ---\n");
    if result.stderr.trim().is_empty() {
        out.push_str("(empty)\n");
    } else {
        out.push_str(&result.stderr);
        if !result.stderr.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Persist the failure log for `result`, replacing any earlier one.
pub fn write_failure_log(root: &Path, plan_id: &str, result: &WorkerResult) -> Result<PathBuf> {
    let path = failure_log_path(root, plan_id, &result.task_id);
    atomic_write_file(&path, &format_failure_log(result, Utc::now()))?;
    tracing::debug!(task = %result.task_id, log = %path.display(), "failure log written");
    Ok(path)
}

/// Tear down the failed workspace, recreate it, and run the worker again.
///
/// A workspace that cannot be recreated is returned as an error; the task is
/// then not re-run this round.
pub fn rerun_task(
    executor: &dyn TaskExecutor,
    task: &PlanTask,
    old_workspace: &Path,
    on_progress: &mut dyn FnMut(ProgressUpdate),
) -> Result<WorkerResult> {
    executor.teardown(task, old_workspace);
    let workspace = executor.prepare(task)?;
    Ok(executor.run(task, &workspace, on_progress))
}
