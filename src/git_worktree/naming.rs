//! Branch naming and path utilities for task workspaces.

use crate::context::RepoContext;
use crate::plan::short_id;
use std::path::PathBuf;

/// Maximum length of a workspace slug.
const MAX_SLUG_LEN: usize = 30;

/// Branch holding a task's work: `task/<task7>`.
pub fn task_branch_name(task_id: &str) -> String {
    format!("task/{}", short_id(task_id))
}

/// Workspace path for a task: `<worktrees_dir>/worktree-<task7>-<slug>`.
///
/// The slug is derived from the task subject and may be empty, in which case
/// the trailing hyphen is dropped.
pub fn task_workspace_path(ctx: &RepoContext, task_id: &str, subject: &str) -> PathBuf {
    let slug = slugify(subject);
    let name = if slug.is_empty() {
        format!("worktree-{}", short_id(task_id))
    } else {
        format!("worktree-{}-{}", short_id(task_id), slug)
    };
    ctx.worktrees_dir.join(name)
}

/// Integration branch for a plan: `plan/<plan7>`.
pub fn integration_branch_name(plan_id: &str) -> String {
    format!("plan/{}", short_id(plan_id))
}

/// Workspace used while folding worker commits together.
pub fn integration_workspace_path(ctx: &RepoContext, plan_id: &str) -> PathBuf {
    ctx.worktrees_dir
        .join(format!("worktree-plan-{}", short_id(plan_id)))
}

/// Lowercase, collapse every run of non-alphanumerics into one hyphen, trim
/// hyphens at both ends, and cut to 30 characters.
pub fn slugify(text: &str) -> String {
    let mut result = String::new();
    let mut last_was_hyphen = true;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            result.push('-');
            last_was_hyphen = true;
        }
    }

    while result.ends_with('-') {
        result.pop();
    }

    // ASCII only, so byte truncation is safe.
    result.truncate(MAX_SLUG_LEN);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn ctx() -> RepoContext {
        RepoContext {
            repo_root: PathBuf::from("/work/repo"),
            git_dir: PathBuf::from("/work/repo/.git"),
            state_dir: PathBuf::from("/work/repo/.git/radorch"),
            worktrees_dir: PathBuf::from("/work"),
        }
    }

    #[test]
    fn test_task_branch_name() {
        assert_eq!(task_branch_name("abcdef1234567890"), "task/abcdef1");
        assert_eq!(task_branch_name("abc"), "task/abc");
    }

    #[test]
    fn test_task_workspace_path() {
        assert_eq!(
            task_workspace_path(&ctx(), "abcdef1234567890", "Add login form"),
            Path::new("/work/worktree-abcdef1-add-login-form")
        );
        assert_eq!(
            task_workspace_path(&ctx(), "abcdef1234567890", "!!!"),
            Path::new("/work/worktree-abcdef1")
        );
    }

    #[test]
    fn test_integration_names() {
        assert_eq!(integration_branch_name("1234567890"), "plan/1234567");
        assert_eq!(
            integration_workspace_path(&ctx(), "1234567890"),
            Path::new("/work/worktree-plan-1234567")
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Player Jump"), "player-jump");
        assert_eq!(slugify("Feature: New Thing!"), "feature-new-thing");
        assert_eq!(slugify("  spaces  "), "spaces");
        assert_eq!(slugify("with_underscores"), "with-underscores");
        assert_eq!(slugify("Ünïcode stays out"), "n-code-stays-out");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_slugify_truncates_to_thirty() {
        let slug = slugify("Refactor the authentication middleware into its own crate");
        assert_eq!(slug.len(), 30);
        assert_eq!(slug, "refactor-the-authentication-mi");
    }
}
