//! Repository context and capability detection for radorch.
//!
//! [`RepoContext`] resolves every path the orchestrator touches from any
//! directory inside the repository, including linked worktrees. Task
//! workspaces are placed next to the main worktree, so a worker's checkout is
//! never nested inside another checkout.
//!
//! [`Capabilities`] records what the environment supports. It is detected
//! once at command start and passed down explicitly.

use crate::config::Config;
use crate::error::{RadorchError, Result};
use crate::exec::{program_installed, run_command};
use crate::git;
use crate::plan::short_id;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the git dir holding orchestrator state.
pub const STATE_DIR_NAME: &str = "radorch";

/// Name of the optional configuration file at the repository root.
pub const CONFIG_FILE_NAME: &str = ".radorch.yaml";

/// Resolved paths for an orchestration run. All paths are absolute.
#[derive(Debug, Clone)]
pub struct RepoContext {
    /// Main worktree (original clone location).
    pub repo_root: PathBuf,

    /// Common git directory shared by all worktrees.
    pub git_dir: PathBuf,

    /// Orchestrator state (`<git_dir>/radorch/`).
    pub state_dir: PathBuf,

    /// Parent directory for task and integration workspaces.
    pub worktrees_dir: PathBuf,
}

impl RepoContext {
    /// Resolve the context from the current working directory.
    pub fn resolve() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            RadorchError::UserError(format!("failed to get current working directory: {}", e))
        })?;

        Self::resolve_from(&cwd)
    }

    /// Resolve the context from a specific directory.
    pub fn resolve_from<P: AsRef<Path>>(cwd: P) -> Result<Self> {
        let cwd = cwd.as_ref();

        let current_toplevel = git::get_repo_root(cwd)?;
        let repo_root = match git::get_main_worktree(cwd) {
            Ok(main) if main.exists() => main,
            _ => current_toplevel,
        };

        let common = git::run_git(&repo_root, &["rev-parse", "--git-common-dir"])?.stdout;
        let git_dir = {
            let path = PathBuf::from(common);
            if path.is_absolute() {
                path
            } else {
                repo_root.join(path)
            }
        };

        let worktrees_dir = repo_root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo_root.clone());

        Ok(Self {
            state_dir: git_dir.join(STATE_DIR_NAME),
            repo_root,
            git_dir,
            worktrees_dir,
        })
    }

    /// Path to the optional configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.repo_root.join(CONFIG_FILE_NAME)
    }

    /// Path to the audit event log.
    pub fn events_file(&self) -> PathBuf {
        self.state_dir.join("events.ndjson")
    }

    /// Per-plan state directory, keyed by the plan's short id.
    pub fn plan_state_dir(&self, plan_id: &str) -> PathBuf {
        self.state_dir.join(short_id(plan_id))
    }
}

/// What the environment supports, detected once per command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Repository id reported by `rad .`, if this is a Radicle repository.
    pub repo_id: Option<String>,

    /// Whether the plan CLI resolves on PATH.
    pub plan_cli: bool,

    /// Whether the context CLI resolves on PATH.
    pub context_cli: bool,
}

impl Capabilities {
    /// Probe the collaborator CLIs named in `config`.
    pub fn detect(ctx: &RepoContext, config: &Config) -> Self {
        let timeout = Duration::from_secs(5);
        let repo_id = run_command(&config.rad_command, &ctx.repo_root, &["."], timeout)
            .ok()
            .filter(|out| out.success() && !out.stdout.is_empty())
            .map(|out| out.stdout);

        // Plan and context CLIs only matter inside a Radicle repository.
        let (plan_cli, context_cli) = if repo_id.is_some() {
            (
                program_installed(&config.plan_command),
                program_installed(&config.context_command),
            )
        } else {
            (false, false)
        };

        let caps = Self {
            repo_id,
            plan_cli,
            context_cli,
        };
        tracing::debug!(?caps, "capabilities detected");
        caps
    }

    pub fn is_radicle_repo(&self) -> bool {
        self.repo_id.is_some()
    }

    /// Fail with a user error unless orchestration can run.
    pub fn require_orchestration(&self, config: &Config) -> Result<()> {
        if !self.is_radicle_repo() {
            return Err(RadorchError::UserError(format!(
                "not a Radicle repository (`{} .` failed).\n\n\
                 Run this command from a repository initialized with `{} init`.",
                config.rad_command, config.rad_command
            )));
        }

        if !self.plan_cli {
            return Err(RadorchError::UserError(format!(
                "`{}` is not installed or not on PATH.",
                config.plan_command
            )));
        }

        Ok(())
    }
}
