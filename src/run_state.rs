//! Per-plan run state.
//!
//! What a later invocation needs to complete the plan the same way: the base
//! commit captured at first dispatch, the commits captured from worker
//! workspaces, and the workspaces created so far. Stored as JSON at
//! `<git_dir>/radorch/<plan7>/run.json`.

use crate::context::RepoContext;
use crate::error::{RadorchError, Result};
use crate::fs::atomic_write_file;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const RUN_STATE_FILE: &str = "run.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    pub base_commit: Option<String>,
    /// Task id to the workspace HEAD after a successful run.
    pub worker_commits: HashMap<String, String>,
    pub workspaces: Vec<PathBuf>,
}

impl RunState {
    pub fn path(ctx: &RepoContext, plan_id: &str) -> PathBuf {
        ctx.plan_state_dir(plan_id).join(RUN_STATE_FILE)
    }

    /// Load the state, or an empty one if none was saved.
    ///
    /// An unreadable file is logged and treated as empty; completion then
    /// falls back to `DONE` signals.
    pub fn load(ctx: &RepoContext, plan_id: &str) -> Self {
        let path = Self::path(ctx, plan_id);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable run state");
            Self::default()
        })
    }

    pub fn save(&self, ctx: &RepoContext, plan_id: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            RadorchError::UserError(format!("failed to serialize run state: {}", e))
        })?;
        atomic_write_file(Self::path(ctx, plan_id), &json)
    }

    /// Forget the run after the plan completed.
    pub fn clear(ctx: &RepoContext, plan_id: &str) {
        let path = Self::path(ctx, plan_id);
        if path.exists()
            && let Err(e) = std::fs::remove_file(&path)
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove run state");
        }
    }

    pub fn record_workspace(&mut self, workspace: &Path) {
        if !self.workspaces.iter().any(|w| w == workspace) {
            self.workspaces.push(workspace.to_path_buf());
        }
    }

    pub fn record_commit(&mut self, task_id: &str, commit: &str) {
        self.worker_commits
            .insert(task_id.to_string(), commit.to_string());
    }
}
