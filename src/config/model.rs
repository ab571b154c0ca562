//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for an orchestration run.
///
/// This struct represents the contents of `.radorch.yaml` at the repository
/// root. Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Dispatch settings
    // =========================================================================
    /// Maximum number of workers running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Poll interval for `--wait` when nothing is ready.
    #[serde(default = "default_wait_poll_seconds")]
    pub wait_poll_seconds: u64,

    /// Dashboard refresh interval while a batch runs.
    #[serde(default = "default_dashboard_interval_ms")]
    pub dashboard_interval_ms: u64,

    /// Whether to post `DONE` for successful workers that did not announce one.
    #[serde(default = "default_true")]
    pub announce_done_signals: bool,

    // =========================================================================
    // Collaborator commands
    // =========================================================================
    /// Plan CLI (`show`, `status`, `link`, `task link-commit`, `comment`).
    #[serde(default = "default_plan_command")]
    pub plan_command: String,

    /// Radicle CLI (`.`, `patch show`, `issue state`, `sync`).
    #[serde(default = "default_rad_command")]
    pub rad_command: String,

    /// Context CLI (`list`, `show --json`).
    #[serde(default = "default_context_command")]
    pub context_command: String,

    /// Timeout for every collaborator command.
    #[serde(default = "default_command_timeout_seconds")]
    pub command_timeout_seconds: u64,

    // =========================================================================
    // Worker settings
    // =========================================================================
    /// Worker program, split with shell quoting rules (may carry arguments).
    #[serde(default = "default_worker_command")]
    pub worker_command: String,

    /// Arguments selecting JSON output, print mode and no persistent session.
    #[serde(default = "default_worker_args")]
    pub worker_args: Vec<String>,

    /// Agent definition file, relative to the repository root.
    #[serde(default = "default_agent_file")]
    pub agent_file: String,

    /// Seconds between the graceful terminate and the forced kill.
    #[serde(default = "default_terminate_grace_seconds")]
    pub terminate_grace_seconds: u64,

    /// Maximum characters of a worker activity preview.
    #[serde(default = "default_activity_preview_chars")]
    pub activity_preview_chars: usize,

    /// Directory for failure logs (default: `<tmp>/rad-orchestrator`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_log_dir: Option<String>,

    // =========================================================================
    // Completion settings
    // =========================================================================
    /// Remote receiving the integration branch.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Refspec that publishes the integration branch as a patch.
    #[serde(default = "default_patch_refspec")]
    pub patch_refspec: String,

    /// Maximum characters of a `REJECTED` reason.
    #[serde(default = "default_reject_reason_max_chars")]
    pub reject_reason_max_chars: usize,

    /// Whether to close the plan's related issues on completion.
    #[serde(default = "default_true")]
    pub close_related_issues: bool,

    /// Whether to announce the update to the network on completion.
    #[serde(default = "default_true")]
    pub announce_on_complete: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            wait_poll_seconds: default_wait_poll_seconds(),
            dashboard_interval_ms: default_dashboard_interval_ms(),
            announce_done_signals: default_true(),
            plan_command: default_plan_command(),
            rad_command: default_rad_command(),
            context_command: default_context_command(),
            command_timeout_seconds: default_command_timeout_seconds(),
            worker_command: default_worker_command(),
            worker_args: default_worker_args(),
            agent_file: default_agent_file(),
            terminate_grace_seconds: default_terminate_grace_seconds(),
            activity_preview_chars: default_activity_preview_chars(),
            failure_log_dir: None,
            remote: default_remote(),
            patch_refspec: default_patch_refspec(),
            reject_reason_max_chars: default_reject_reason_max_chars(),
            close_related_issues: default_true(),
            announce_on_complete: default_true(),
        }
    }
}
