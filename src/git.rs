//! Git command runner for radorch.
//!
//! Provides a safe wrapper around git commands with captured stdout/stderr
//! and structured error handling. All git operations should go through this module.

use crate::error::{RadorchError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Result of a successful git command execution.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Standard output from the command (trimmed).
    pub stdout: String,
    /// Standard error from the command (trimmed).
    pub stderr: String,
}

impl GitOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Run a git command with the specified working directory.
///
/// # Returns
///
/// * `Ok(GitOutput)` - On successful execution (exit code 0)
/// * `Err(RadorchError::GitError)` - On spawn failure or non-zero exit code
pub fn run_git<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitOutput> {
    let cwd = cwd.as_ref();

    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .map_err(|e| {
            RadorchError::GitError(format!(
                "failed to execute git {}: {}",
                args.first().unwrap_or(&""),
                e
            ))
        })?;

    let git_output = GitOutput::from_output(&output);

    if output.status.success() {
        Ok(git_output)
    } else {
        let exit_code = output.status.code().unwrap_or(-1);
        let error_msg = if git_output.stderr.is_empty() {
            git_output.stdout.clone()
        } else {
            git_output.stderr.clone()
        };

        Err(RadorchError::GitError(format!(
            "git {} failed (exit code {}): {}",
            args.first().unwrap_or(&""),
            exit_code,
            error_msg
        )))
    }
}

/// Get the repository root directory using `git rev-parse --show-toplevel`.
///
/// Returns a `UserError` (not a `GitError`) when `cwd` is outside a repository.
pub fn get_repo_root<P: AsRef<Path>>(cwd: P) -> Result<PathBuf> {
    let output = run_git(cwd.as_ref(), &["rev-parse", "--show-toplevel"]).map_err(|_| {
        RadorchError::UserError(
            "not inside a git repository. Run this command from within a git repository."
                .to_string(),
        )
    })?;
    Ok(PathBuf::from(&output.stdout))
}

/// Get the path to the main worktree (the original clone location).
///
/// When run from within a linked worktree, this returns the path to the
/// main worktree. When run from the main worktree, it returns that path.
pub fn get_main_worktree<P: AsRef<Path>>(cwd: P) -> Result<PathBuf> {
    let cwd = cwd.as_ref();
    // The main worktree is always listed first.
    let output = run_git(cwd, &["worktree", "list", "--porcelain"])?;

    for line in output.stdout.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            return Ok(PathBuf::from(path));
        }
    }

    get_repo_root(cwd)
}

/// Resolve the commit `HEAD` points at in `cwd`.
pub fn head_sha<P: AsRef<Path>>(cwd: P) -> Result<String> {
    Ok(run_git(cwd, &["rev-parse", "HEAD"])?.stdout)
}

/// Returns true if `ancestor` is reachable from `descendant`.
pub fn is_ancestor<P: AsRef<Path>>(cwd: P, ancestor: &str, descendant: &str) -> bool {
    run_git(
        cwd,
        &["merge-base", "--is-ancestor", ancestor, descendant],
    )
    .is_ok()
}

/// Replay `revision` (a single commit or an `a..b` range) onto the current branch.
///
/// On failure the in-progress cherry-pick is aborted so the working tree is
/// restored to its prior state, and the original git diagnostic is returned.
pub fn cherry_pick<P: AsRef<Path>>(cwd: P, revision: &str) -> Result<()> {
    let cwd = cwd.as_ref();
    match run_git(cwd, &["cherry-pick", "--allow-empty", revision]) {
        Ok(_) => Ok(()),
        Err(e) => {
            if let Err(abort_err) = run_git(cwd, &["cherry-pick", "--abort"]) {
                tracing::debug!(error = %abort_err, "cherry-pick --abort failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_file, create_test_repo};
    use tempfile::TempDir;

    #[test]
    fn test_run_git_failure_returns_git_error() {
        let temp_dir = create_test_repo();
        let result = run_git(temp_dir.path(), &["checkout", "nonexistent-branch"]);
        assert!(matches!(result, Err(RadorchError::GitError(_))));
    }

    #[test]
    fn test_get_repo_root_outside_repo_returns_user_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = get_repo_root(temp_dir.path()).unwrap_err();
        assert!(matches!(err, RadorchError::UserError(_)));
        assert!(err.to_string().contains("not inside a git repository"));
    }

    #[test]
    fn test_get_main_worktree_from_root() {
        let temp_dir = create_test_repo();
        let main = get_main_worktree(temp_dir.path()).unwrap();
        assert_eq!(
            main.canonicalize().unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_head_sha_is_full_length() {
        let temp_dir = create_test_repo();
        let sha = head_sha(temp_dir.path()).unwrap();
        assert_eq!(sha.len(), 40);
    }

    #[test]
    fn test_is_ancestor() {
        let temp_dir = create_test_repo();
        let base = head_sha(temp_dir.path()).unwrap();
        let next = commit_file(temp_dir.path(), "a.txt", "a\n", "add a");
        assert!(is_ancestor(temp_dir.path(), &base, &next));
        assert!(!is_ancestor(temp_dir.path(), &next, &base));
    }

    #[test]
    fn test_cherry_pick_conflict_aborts_cleanly() {
        let temp_dir = create_test_repo();
        let path = temp_dir.path();
        let base = head_sha(path).unwrap();

        run_git(path, &["checkout", "-b", "side"]).unwrap();
        let side = commit_file(path, "README.md", "side\n", "side change");

        run_git(path, &["checkout", "main"]).unwrap();
        commit_file(path, "README.md", "main\n", "main change");
        let before = head_sha(path).unwrap();
        assert_ne!(before, base);

        let result = cherry_pick(path, &side);
        assert!(matches!(result, Err(RadorchError::GitError(_))));

        // Aborted: HEAD unchanged and no conflict markers left behind.
        assert_eq!(head_sha(path).unwrap(), before);
        let status = run_git(path, &["status", "--porcelain"]).unwrap();
        assert!(status.stdout.is_empty());
    }
}
