//! Context feedback.
//!
//! Finished sessions can leave context records (via the context CLI) naming
//! the plans they relate to. Their constraints, friction and open items are
//! shown in the dispatch report, and constraints that look relevant to a
//! remaining task are surfaced as warnings after each batch.
//!
//! Everything here is best-effort: an unreachable CLI or a malformed record
//! just means less feedback.

use crate::exec::run_command;
use crate::plan::{PlanTask, short_id};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static CONTEXT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-f]{7,40})").expect("Invalid context id regex"));

/// Words of a constraint matched against task descriptions.
const CONSTRAINT_KEY_WORDS: usize = 3;

/// Feedback from one context record related to the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFeedback {
    pub context_id: String,
    pub task_id: Option<String>,
    pub constraints: Vec<String>,
    pub friction: Vec<String>,
    pub open_items: Vec<String>,
}

impl ContextFeedback {
    /// Where the feedback came from: `task <t7>` or the context's short id.
    pub fn source(&self) -> String {
        match &self.task_id {
            Some(task) => format!("task {}", short_id(task)),
            None => short_id(&self.context_id).to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextRecord {
    #[serde(default)]
    related_plans: Vec<String>,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    friction: Vec<String>,
    #[serde(default)]
    open_items: Vec<String>,
}

/// Context ids from `list` output: one per line, leading hex id.
pub fn parse_context_ids(list_output: &str) -> Vec<String> {
    list_output
        .lines()
        .filter_map(|line| CONTEXT_ID_REGEX.captures(line.trim()))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Whether a related-plan reference names `plan_id`, in either id form.
fn refers_to_plan(reference: &str, plan_id: &str) -> bool {
    reference.starts_with(plan_id) || plan_id.starts_with(short_id(reference))
}

/// Parse a record printed by `show <id> --json`, keeping it only if it
/// relates to `plan_id`.
pub fn parse_record(context_id: &str, json: &str, plan_id: &str) -> Option<ContextFeedback> {
    let record: ContextRecord = serde_json::from_str(json.trim()).ok()?;
    if !record
        .related_plans
        .iter()
        .any(|p| !p.is_empty() && refers_to_plan(p, plan_id))
    {
        return None;
    }

    Some(ContextFeedback {
        context_id: context_id.to_string(),
        task_id: record.task_id.filter(|t| !t.is_empty()),
        constraints: record.constraints,
        friction: record.friction,
        open_items: record.open_items,
    })
}

/// Reads context records through the context CLI.
#[derive(Debug, Clone)]
pub struct ContextCli {
    program: String,
    cwd: PathBuf,
    timeout: Duration,
}

impl ContextCli {
    pub fn new(program: impl Into<String>, cwd: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            cwd: cwd.as_ref().to_path_buf(),
            timeout,
        }
    }

    fn run(&self, args: &[&str]) -> Option<String> {
        match run_command(&self.program, &self.cwd, args, self.timeout) {
            Ok(out) if out.success() => Some(out.stdout),
            Ok(out) => {
                tracing::debug!(args = ?args, error = out.diagnostic(), "context CLI failed");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "context CLI not runnable");
                None
            }
        }
    }

    /// Feedback from every context related to `plan_id`.
    pub fn load(&self, plan_id: &str) -> Vec<ContextFeedback> {
        let Some(listing) = self.run(&["list"]) else {
            return Vec::new();
        };

        parse_context_ids(&listing)
            .into_iter()
            .filter_map(|id| {
                let json = self.run(&["show", &id, "--json"])?;
                parse_record(&id, &json, plan_id)
            })
            .collect()
    }
}

/// A constraint that may affect tasks still to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintWarning {
    pub source: String,
    pub constraint: String,
    /// Short ids of the possibly affected tasks.
    pub tasks: Vec<String>,
}

/// Match each constraint's leading words against remaining task descriptions.
pub fn constraint_warnings(
    feedback: &[ContextFeedback],
    remaining: &[&PlanTask],
) -> Vec<ConstraintWarning> {
    let mut warnings = Vec::new();

    for fb in feedback {
        for constraint in &fb.constraints {
            let key = constraint
                .to_lowercase()
                .split_whitespace()
                .take(CONSTRAINT_KEY_WORDS)
                .collect::<Vec<_>>()
                .join(" ");
            if key.is_empty() {
                continue;
            }

            let tasks: Vec<String> = remaining
                .iter()
                .filter(|t| t.description.to_lowercase().contains(&key))
                .map(|t| t.short_id().to_string())
                .collect();
            if !tasks.is_empty() {
                warnings.push(ConstraintWarning {
                    source: fb.source(),
                    constraint: constraint.clone(),
                    tasks,
                });
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_parse_context_ids() {
        let listing = "abc1234def  Refactor session\nnot an id\n0123456789abcdef0123456789abcdef01234567 x\nABCDEF1 upper\n";
        assert_eq!(
            parse_context_ids(listing),
            ["abc1234def", "0123456789abcdef0123456789abcdef01234567"]
        );
    }

    #[test]
    fn test_relevance_matches_either_id_form() {
        assert!(refers_to_plan("abcdef1234567890", "abcdef1"));
        assert!(refers_to_plan("abcdef1", "abcdef1234567890"));
        assert!(!refers_to_plan("1234567", "abcdef1234567890"));
    }

    #[test]
    fn test_parse_record() {
        let json = r#"{"relatedPlans":["abcdef1"],"taskId":"9999999aaa","constraints":["Keep the API stable"],"openItems":["docs"],"other":1}"#;
        let fb = parse_record("ctx0001", json, "abcdef1234567890").unwrap();
        assert_eq!(fb.task_id.as_deref(), Some("9999999aaa"));
        assert_eq!(fb.constraints, ["Keep the API stable"]);
        assert!(fb.friction.is_empty());
        assert_eq!(fb.open_items, ["docs"]);
        assert_eq!(fb.source(), "task 9999999");

        assert!(parse_record("ctx0001", r#"{"relatedPlans":["fffffff"]}"#, "abcdef1").is_none());
        assert!(parse_record("ctx0001", "not json", "abcdef1").is_none());
    }

    #[test]
    fn test_source_without_task_uses_context_id() {
        let fb = parse_record("ctx00012345", r#"{"relatedPlans":["p"]}"#, "p").unwrap();
        assert_eq!(fb.source(), "ctx0001");
    }

    #[test]
    fn test_constraint_warnings_match_leading_words() {
        let mut affected = task("aaaaaaa111", "A", &[], &[]);
        affected.description = "Make sure to NEVER use unwrap in the parser".to_string();
        let mut other = task("bbbbbbb222", "B", &[], &[]);
        other.description = "Write docs".to_string();

        let feedback = vec![ContextFeedback {
            context_id: "ctx0001".to_string(),
            task_id: None,
            constraints: vec![
                "Never use unwrap outside tests".to_string(),
                "   ".to_string(),
            ],
            friction: Vec::new(),
            open_items: Vec::new(),
        }];

        let warnings = constraint_warnings(&feedback, &[&affected, &other]);
        assert_eq!(
            warnings,
            [ConstraintWarning {
                source: "ctx0001".to_string(),
                constraint: "Never use unwrap outside tests".to_string(),
                tasks: vec!["aaaaaaa".to_string()],
            }]
        );
    }

    #[test]
    fn test_load_through_cli() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake-rad-context");
        std::fs::write(
            &script,
            r#"#!/bin/sh
case "$1" in
  list) printf 'aaaaaaa111 first\nbbbbbbb222 second\nccccccc333 broken\n' ;;
  show)
    case "$2" in
      aaaaaaa111) echo '{"relatedPlans":["plan123"],"friction":["slow tests"]}' ;;
      bbbbbbb222) echo '{"relatedPlans":["other99"]}' ;;
      *) exit 1 ;;
    esac ;;
esac
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = ContextCli::new(script.to_string_lossy(), dir.path(), Duration::from_secs(5));
        let feedback = cli.load("plan1234567");

        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].context_id, "aaaaaaa111");
        assert_eq!(feedback[0].friction, ["slow tests"]);
    }

    #[test]
    fn test_missing_cli_yields_nothing() {
        let cli = ContextCli::new("definitely-not-rad-context", ".", Duration::from_secs(1));
        assert!(cli.load("plan").is_empty());
    }
}
