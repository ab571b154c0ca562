//! Worktree creation.

use crate::context::RepoContext;
use crate::error::{RadorchError, Result};
use crate::git::run_git;
use std::path::{Path, PathBuf};

use super::branch::branch_exists;
use super::naming::{task_branch_name, task_workspace_path};

/// Create a worktree at `path` on a new branch starting at `base`.
///
/// Fails with `WorkspaceError` if the path already exists, the branch already
/// exists, or git refuses; the error carries git's diagnostic.
pub fn create_worktree<P: AsRef<Path>>(
    repo_root: P,
    path: &Path,
    branch: &str,
    base: &str,
) -> Result<()> {
    let repo_root = repo_root.as_ref();

    if path.exists() {
        return Err(RadorchError::WorkspaceError(format!(
            "path '{}' already exists.\n\n\
             Remove the stale workspace first: git worktree remove --force {}",
            path.display(),
            path.display()
        )));
    }

    if branch_exists(repo_root, branch) {
        return Err(RadorchError::WorkspaceError(format!(
            "branch '{}' already exists.\n\n\
             Delete it first if it is left over from an earlier run: git branch -D {}",
            branch, branch
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            RadorchError::WorkspaceError(format!(
                "failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let path_str = path.to_string_lossy();
    run_git(repo_root, &["worktree", "add", "-b", branch, &path_str, base]).map_err(|e| {
        RadorchError::WorkspaceError(format!(
            "failed to create worktree at '{}' for branch '{}': {}",
            path_str, branch, e
        ))
    })?;

    Ok(())
}

/// Create the isolated workspace for a task and return its path.
pub fn create_task_workspace(
    ctx: &RepoContext,
    task_id: &str,
    subject: &str,
    base: &str,
) -> Result<PathBuf> {
    let path = task_workspace_path(ctx, task_id, subject);
    let branch = task_branch_name(task_id);
    create_worktree(&ctx.repo_root, &path, &branch, base)?;
    tracing::debug!(task = task_id, path = %path.display(), "workspace created");
    Ok(path)
}
