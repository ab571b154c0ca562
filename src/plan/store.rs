//! Plan CLI boundary.
//!
//! The plan record lives in an external collaboration backend. It is read and
//! mutated only through the plan CLI (`rad-plan` by default).

use super::model::{Plan, PlanStatus};
use crate::error::{RadorchError, Result};
use crate::exec::run_command;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Query and mutation operations on a plan record.
pub trait PlanStore {
    /// Fetch and parse the current plan snapshot.
    ///
    /// Returns `PlanError` if the CLI exits non-zero or prints invalid JSON.
    fn show(&self, plan_id: &str) -> Result<Plan>;

    fn set_status(&self, plan_id: &str, status: PlanStatus) -> Result<()>;

    /// Link a published change set to the plan.
    fn link_patch(&self, plan_id: &str, patch_id: &str) -> Result<()>;

    /// Record the durable commit for a task.
    fn link_commit(&self, plan_id: &str, task_id: &str, commit: &str) -> Result<()>;

    /// Post a comment to the plan's discussion thread.
    fn comment(&self, plan_id: &str, body: &str) -> Result<()>;
}

/// [`PlanStore`] backed by the plan CLI.
#[derive(Debug, Clone)]
pub struct RadPlanCli {
    program: String,
    cwd: PathBuf,
    timeout: Duration,
}

impl RadPlanCli {
    pub fn new(program: impl Into<String>, cwd: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            cwd: cwd.as_ref().to_path_buf(),
            timeout,
        }
    }

    /// Run the CLI and return its stdout, mapping any failure to `PlanError`.
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = run_command(&self.program, &self.cwd, args, self.timeout).map_err(|e| {
            RadorchError::PlanError(format!("failed to execute {}: {}", self.program, e))
        })?;

        if output.timed_out {
            return Err(RadorchError::PlanError(format!(
                "{} {} timed out after {}s",
                self.program,
                args.first().unwrap_or(&""),
                self.timeout.as_secs()
            )));
        }

        if !output.success() {
            return Err(RadorchError::PlanError(format!(
                "{} {} failed (exit code {}): {}",
                self.program,
                args.first().unwrap_or(&""),
                output.code.unwrap_or(-1),
                output.diagnostic()
            )));
        }

        Ok(output.stdout)
    }
}

impl PlanStore for RadPlanCli {
    fn show(&self, plan_id: &str) -> Result<Plan> {
        let json = self.run(&["show", plan_id, "--json"])?;
        Plan::from_json(&json).map_err(|e| {
            RadorchError::PlanError(format!("invalid plan JSON for {}: {}", plan_id, e))
        })
    }

    fn set_status(&self, plan_id: &str, status: PlanStatus) -> Result<()> {
        self.run(&["status", plan_id, status.as_str()]).map(|_| ())
    }

    fn link_patch(&self, plan_id: &str, patch_id: &str) -> Result<()> {
        self.run(&["link", plan_id, "--patch", patch_id]).map(|_| ())
    }

    fn link_commit(&self, plan_id: &str, task_id: &str, commit: &str) -> Result<()> {
        self.run(&["task", "link-commit", plan_id, task_id, "--commit", commit])
            .map(|_| ())
    }

    fn comment(&self, plan_id: &str, body: &str) -> Result<()> {
        self.run(&["comment", plan_id, body]).map(|_| ())
    }
}
