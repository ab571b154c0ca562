//! Cleanup operations for workspaces and branches.

use crate::error::{RadorchError, Result};
use crate::git::run_git;
use std::path::{Path, PathBuf};

use super::branch::{branch_exists, delete_branch};
use super::naming::task_branch_name;

/// Force-remove a worktree, discarding uncommitted changes.
pub fn remove_worktree<P: AsRef<Path>>(repo_root: P, worktree_path: &Path) -> Result<()> {
    let worktree_str = worktree_path.to_string_lossy();

    run_git(repo_root, &["worktree", "remove", "--force", &worktree_str]).map_err(|e| {
        RadorchError::WorkspaceError(format!(
            "failed to remove worktree '{}': {}",
            worktree_str, e
        ))
    })?;

    Ok(())
}

/// Remove a task's workspace and delete its branch.
///
/// Used before a retry so the fresh workspace can reuse the same path and
/// branch name. Errors are logged, not returned; afterwards neither the path
/// nor the branch exist unless git refused to remove them.
pub fn teardown_task_workspace<P: AsRef<Path>>(repo_root: P, task_id: &str, path: &Path) {
    let repo_root = repo_root.as_ref();

    if path.exists()
        && let Err(e) = remove_worktree(repo_root, path)
    {
        tracing::warn!(task = task_id, error = %e, "workspace removal failed");
    }

    // Clear stale administrative entries for worktrees deleted behind git's back.
    if let Err(e) = run_git(repo_root, &["worktree", "prune"]) {
        tracing::debug!(error = %e, "worktree prune failed");
    }

    let branch = task_branch_name(task_id);
    if branch_exists(repo_root, &branch)
        && let Err(e) = delete_branch(repo_root, &branch, true)
    {
        tracing::warn!(task = task_id, error = %e, "branch deletion failed");
    }
}

/// Best-effort removal of every listed workspace.
///
/// Returns the paths that could not be removed.
pub fn release_workspaces<P: AsRef<Path>>(repo_root: P, paths: &[PathBuf]) -> Vec<PathBuf> {
    let repo_root = repo_root.as_ref();
    let mut failed = Vec::new();

    for path in paths {
        if !path.exists() {
            continue;
        }
        if let Err(e) = remove_worktree(repo_root, path) {
            tracing::warn!(path = %path.display(), error = %e, "workspace release failed");
            failed.push(path.clone());
        }
    }

    failed
}
