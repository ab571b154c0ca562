//! Typed snapshot of a plan record.
//!
//! Field names follow the JSON emitted by `rad-plan show <id> --json`.
//! Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Length of the short form of an object id.
///
/// Short ids are not checked for ambiguity; two tasks sharing a 7-character
/// prefix are indistinguishable to every lookup.
pub const SHORT_ID_LEN: usize = 7;

/// Truncate an id to its short form.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Lifecycle status of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanStatus {
    Draft,
    Approved,
    InProgress,
    Completed,
    Archived,
    #[serde(other)]
    Unknown,
}

impl PlanStatus {
    /// Whether workers may be dispatched without asking for approval first.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, PlanStatus::Approved | PlanStatus::InProgress)
    }

    /// Status string as accepted by the plan CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Approved => "approved",
            PlanStatus::InProgress => "in-progress",
            PlanStatus::Completed => "completed",
            PlanStatus::Archived => "archived",
            PlanStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTask {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimate: String,
    #[serde(default)]
    pub affected_files: Vec<String>,
    /// Commit recorded once the task's work is durably merged.
    #[serde(default)]
    pub linked_commit: Option<String>,
    #[serde(default, rename = "blocked_by", skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Vec<String>>,
}

impl PlanTask {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    pub fn dependencies(&self) -> &[String] {
        self.blocked_by.as_deref().unwrap_or(&[])
    }

    pub fn is_merged(&self) -> bool {
        self.linked_commit.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// A single revision of a comment body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentEdit {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub edits: Vec<CommentEdit>,
}

impl Comment {
    /// The body as it currently reads: the last edit wins over the original.
    pub fn effective_body(&self) -> &str {
        self.edits
            .last()
            .map(|edit| edit.body.as_str())
            .unwrap_or(&self.body)
    }
}

/// Discussion thread attached to a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    #[serde(default)]
    pub comments: BTreeMap<String, Comment>,
}

/// A plan snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub title: String,
    pub status: PlanStatus,
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
    #[serde(default)]
    pub related_issues: Vec<String>,
    #[serde(default)]
    pub related_patches: Vec<String>,
    #[serde(default)]
    pub thread: Thread,
}

impl Plan {
    /// Parse the JSON document printed by the plan CLI.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json.trim())
    }

    /// Effective comment bodies in thread order.
    pub fn comment_bodies(&self) -> impl Iterator<Item = &str> {
        self.thread.comments.values().map(Comment::effective_body)
    }
}

/// Set of task ids that answers membership for either id form.
///
/// Every inserted id is stored both in full and truncated, and every lookup
/// probes both forms, so `abcdef1` and `abcdef1234…` find each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskIdSet {
    ids: HashSet<String>,
}

impl TaskIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str) {
        self.ids.insert(id.to_string());
        self.ids.insert(short_id(id).to_string());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id) || self.ids.contains(short_id(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_truncates_to_seven_chars() {
        assert_eq!(short_id("abcdef1234567890"), "abcdef1");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "");
    }

    #[test]
    fn effective_body_prefers_latest_edit() {
        let comment = Comment {
            body: "CLAIM task:aaa".to_string(),
            edits: vec![
                CommentEdit {
                    body: "first".to_string(),
                },
                CommentEdit {
                    body: "second".to_string(),
                },
            ],
        };
        assert_eq!(comment.effective_body(), "second");

        let plain = Comment {
            body: "original".to_string(),
            edits: Vec::new(),
        };
        assert_eq!(plain.effective_body(), "original");
    }

    #[test]
    fn parses_plan_json() {
        let json = r#"{
            "title": "Refactor auth",
            "status": "in-progress",
            "tasks": [
                {
                    "id": "abcdef1234567890",
                    "subject": "Extract middleware",
                    "description": "Move it",
                    "estimate": "2h",
                    "affectedFiles": ["src/auth.rs"],
                    "linkedCommit": null,
                    "blocked_by": ["1234567aaaa"]
                }
            ],
            "relatedIssues": ["issue1"],
            "relatedPatches": [],
            "thread": {
                "comments": {
                    "c1": { "body": "CLAIM task:abcdef1", "edits": [] }
                }
            },
            "labels": ["ignored"]
        }"#;

        let plan = Plan::from_json(json).unwrap();
        assert_eq!(plan.status, PlanStatus::InProgress);
        assert_eq!(plan.tasks.len(), 1);
        let task = &plan.tasks[0];
        assert_eq!(task.affected_files, vec!["src/auth.rs"]);
        assert_eq!(task.dependencies(), ["1234567aaaa".to_string()]);
        assert!(!task.is_merged());
        assert_eq!(plan.comment_bodies().collect::<Vec<_>>(), ["CLAIM task:abcdef1"]);
    }

    #[test]
    fn unknown_status_does_not_fail_parsing() {
        let json = r#"{"title": "x", "status": "someday", "tasks": []}"#;
        let plan = Plan::from_json(json).unwrap();
        assert_eq!(plan.status, PlanStatus::Unknown);
        assert!(!plan.status.is_dispatchable());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(Plan::from_json("not json").is_err());
    }

    #[test]
    fn task_id_set_matches_either_form() {
        let mut set = TaskIdSet::new();
        set.insert("abcdef1234567890");
        assert!(set.contains("abcdef1"));
        assert!(set.contains("abcdef1234567890"));
        assert!(set.contains("abcdef1999999999"));
        assert!(!set.contains("bcdef12"));

        let mut short = TaskIdSet::new();
        short.insert("abcdef1");
        assert!(short.contains("abcdef1234567890"));
    }
}
