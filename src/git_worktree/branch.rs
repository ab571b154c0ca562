//! Branch operations.

use crate::error::{RadorchError, Result};
use crate::git::run_git;
use std::path::Path;

/// Check if a branch exists locally.
pub fn branch_exists<P: AsRef<Path>>(repo_root: P, branch: &str) -> bool {
    run_git(
        repo_root,
        &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", branch)],
    )
    .is_ok()
}

/// Delete a branch.
///
/// Task branches are consumed by commit id, so callers force-delete them once
/// the commit has been captured.
pub fn delete_branch<P: AsRef<Path>>(repo_root: P, branch: &str, force: bool) -> Result<()> {
    let delete_flag = if force { "-D" } else { "-d" };

    run_git(repo_root, &["branch", delete_flag, branch]).map_err(|e| {
        RadorchError::GitError(format!("failed to delete branch '{}': {}", branch, e))
    })?;

    Ok(())
}
