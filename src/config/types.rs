//! Default values for config fields.

pub(super) fn default_max_concurrency() -> usize {
    4
}

pub(super) fn default_plan_command() -> String {
    "rad-plan".to_string()
}

pub(super) fn default_rad_command() -> String {
    "rad".to_string()
}

pub(super) fn default_context_command() -> String {
    "rad-context".to_string()
}

pub(super) fn default_worker_command() -> String {
    "pi".to_string()
}

pub(super) fn default_worker_args() -> Vec<String> {
    ["--mode", "json", "-p", "--no-session"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub(super) fn default_agent_file() -> String {
    ".pi/agents/rad-worker.md".to_string()
}

pub(super) fn default_remote() -> String {
    "rad".to_string()
}

pub(super) fn default_patch_refspec() -> String {
    "HEAD:refs/patches".to_string()
}

pub(super) fn default_terminate_grace_seconds() -> u64 {
    5
}

pub(super) fn default_dashboard_interval_ms() -> u64 {
    1000
}

pub(super) fn default_command_timeout_seconds() -> u64 {
    30
}

pub(super) fn default_activity_preview_chars() -> usize {
    60
}

pub(super) fn default_reject_reason_max_chars() -> usize {
    200
}

pub(super) fn default_wait_poll_seconds() -> u64 {
    30
}

pub(super) fn default_true() -> bool {
    true
}

/// Directory name for failure logs under the system temp dir.
pub(super) const FAILURE_LOG_DIR_NAME: &str = "rad-orchestrator";
