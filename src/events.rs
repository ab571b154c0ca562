//! Append-only audit log for orchestration runs.
//!
//! Events are stored as NDJSON (one JSON object per line) in
//! `<git-dir>/radorch/events.ndjson`. The file is shared by every run in the
//! repository; each record names its plan.
//!
//! # Event Format
//!
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (`dispatch`, `worker_failed`, `complete`, ...)
//! - `actor`: `user@HOST`
//! - `plan`: plan id
//! - `task`: optional task id
//! - `details`: freeform object
//!
//! Appending is best-effort from the control loop: [`record`] logs a warning
//! and carries on when the file cannot be written.

use crate::context::RepoContext;
use crate::error::{RadorchError, Result};
use crate::plan::short_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Worker started for a task.
    Dispatch,
    /// Worker exited successfully.
    WorkerComplete,
    /// Worker exited unsuccessfully or was cancelled.
    WorkerFailed,
    /// Operator chose to retry a failed task.
    Retry,
    /// Operator chose to skip a failed task.
    Skip,
    /// Orchestrator posted a coordination signal.
    SignalPosted,
    /// A worker commit failed to replay during completion.
    MergeRejected,
    /// Integration change set published and linked.
    Complete,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventAction::Dispatch => "dispatch",
            EventAction::WorkerComplete => "worker_complete",
            EventAction::WorkerFailed => "worker_failed",
            EventAction::Retry => "retry",
            EventAction::Skip => "skip",
            EventAction::SignalPosted => "signal_posted",
            EventAction::MergeRejected => "merge_rejected",
            EventAction::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub action: EventAction,
    pub actor: String,
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub details: Value,
}

impl Event {
    /// Create an event for `plan`, stamped now by the current actor.
    pub fn new(action: EventAction, plan: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: get_actor_string(),
            plan: plan.into(),
            task: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task = Some(task_id.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            RadorchError::UserError(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

/// `user@HOST` for event metadata.
fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append an event as one line, creating the state directory if needed.
pub fn append_event(ctx: &RepoContext, event: &Event) -> Result<()> {
    let events_file = ctx.events_file();
    let json_line = event.to_ndjson_line()?;

    if !ctx.state_dir.exists() {
        fs::create_dir_all(&ctx.state_dir).map_err(|e| {
            RadorchError::UserError(format!(
                "failed to create state directory '{}': {}",
                ctx.state_dir.display(),
                e
            ))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events_file)
        .map_err(|e| {
            RadorchError::UserError(format!(
                "failed to open events file '{}': {}",
                events_file.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        RadorchError::UserError(format!(
            "failed to write event to '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    Ok(())
}

/// Append an event, logging instead of failing.
pub fn record(ctx: &RepoContext, event: Event) {
    if let Err(e) = append_event(ctx, &event) {
        tracing::warn!(action = %event.action, error = %e, "failed to append event");
    }
}

/// Read every event in the log, skipping unparseable lines.
pub fn read_events(ctx: &RepoContext) -> Vec<Event> {
    let Ok(content) = fs::read_to_string(ctx.events_file()) else {
        return Vec::new();
    };
    content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// The last `limit` events for a plan, oldest first.
///
/// Matches the plan by full or short id, since runs may be started with either.
pub fn plan_events(ctx: &RepoContext, plan_id: &str, limit: usize) -> Vec<Event> {
    let wanted = short_id(plan_id);
    let mut events: Vec<Event> = read_events(ctx)
        .into_iter()
        .filter(|e| short_id(&e.plan) == wanted)
        .collect();
    let skip = events.len().saturating_sub(limit);
    events.drain(..skip);
    events
}
