//! Workspace manager: per-task git worktrees and branches.
//!
//! Every dispatched task gets its own linked worktree on its own branch,
//! created from the base commit captured at first dispatch:
//!
//! - Branch `task/<task7>`
//! - Worktree `<worktrees_dir>/worktree-<task7>-<slug>`
//!
//! Completion uses one more worktree on `plan/<plan7>`. Creation failures are
//! `WorkspaceError`s carrying git's diagnostic; removal is best-effort.

mod branch;
mod cleanup;
mod naming;
mod worktree;

pub use branch::{branch_exists, delete_branch};
pub use cleanup::{release_workspaces, remove_worktree, teardown_task_workspace};
pub use naming::{
    integration_branch_name, integration_workspace_path, slugify, task_branch_name,
    task_workspace_path,
};
pub use worktree::{create_task_workspace, create_worktree};
