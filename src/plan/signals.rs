//! Coordination signal protocol.
//!
//! Actors coordinate by posting plain-text lines in the plan's discussion
//! thread:
//!
//! ```text
//! CLAIM task:<id>
//! DONE task:<id> commit:<sha>
//! SIGNAL task:<id> files-added:<f1>,<f2>
//! REJECTED task:<id> reason:<text>
//! ```
//!
//! Every line of every effective comment body is parsed independently; lines
//! that do not match one of the four forms are ignored. There is no locking:
//! two actors can claim the same task and both claims are honored.

use super::model::{Plan, TaskIdSet, short_id};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

static SIGNAL_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(CLAIM|DONE|SIGNAL|REJECTED)\s+task:(\S+)(?:\s+(.*))?$")
        .expect("Invalid signal line regex")
});

/// A parsed coordination signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// An actor started work on the task.
    Claim { task: String },
    /// A worker finished the task in its own workspace; not merged yet.
    Done { task: String, commit: String },
    /// Files touched beyond the task's declared scope.
    FilesAdded { task: String, files: Vec<String> },
    /// Completion could not replay the task's commit.
    Rejected { task: String, reason: String },
}

impl Signal {
    /// Parse one line. Returns `None` for anything that is not a signal.
    pub fn parse_line(line: &str) -> Option<Signal> {
        let caps = SIGNAL_LINE_REGEX.captures(line.trim())?;
        let task = caps.get(2)?.as_str().to_string();
        let rest = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");

        match caps.get(1)?.as_str() {
            "CLAIM" => Some(Signal::Claim { task }),
            "DONE" => {
                let commit = rest
                    .split_whitespace()
                    .find_map(|token| token.strip_prefix("commit:"))
                    .filter(|c| !c.is_empty())?;
                Some(Signal::Done {
                    task,
                    commit: commit.to_string(),
                })
            }
            "SIGNAL" => {
                let list = rest.strip_prefix("files-added:")?;
                let files: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect();
                if files.is_empty() {
                    return None;
                }
                Some(Signal::FilesAdded { task, files })
            }
            "REJECTED" => {
                let reason = rest.strip_prefix("reason:")?.trim();
                Some(Signal::Rejected {
                    task,
                    reason: reason.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Parse every signal line in a comment body, in order.
    pub fn parse_body(body: &str) -> impl Iterator<Item = Signal> + '_ {
        body.lines().filter_map(Signal::parse_line)
    }

    /// The task id exactly as written in the signal.
    pub fn task(&self) -> &str {
        match self {
            Signal::Claim { task }
            | Signal::Done { task, .. }
            | Signal::FilesAdded { task, .. }
            | Signal::Rejected { task, .. } => task,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Claim { task } => write!(f, "CLAIM task:{}", task),
            Signal::Done { task, commit } => write!(f, "DONE task:{} commit:{}", task, commit),
            Signal::FilesAdded { task, files } => {
                write!(f, "SIGNAL task:{} files-added:{}", task, files.join(","))
            }
            Signal::Rejected { task, reason } => {
                // Reasons must stay on one line to remain parseable.
                let reason = reason.split_whitespace().collect::<Vec<_>>().join(" ");
                write!(f, "REJECTED task:{} reason:{}", task, reason)
            }
        }
    }
}

/// Signals from a plan thread, indexed by task.
///
/// Keys are stored in short form, so a lookup by either a full id or its
/// 7-character prefix lands on the same entry.
#[derive(Debug, Clone, Default)]
pub struct SignalIndex {
    claimed: TaskIdSet,
    done: HashMap<String, String>,
    files_added: HashMap<String, Vec<String>>,
    rejected: HashMap<String, String>,
}

impl SignalIndex {
    /// Index every signal in the plan's effective comment bodies.
    pub fn from_plan(plan: &Plan) -> Self {
        Self::from_signals(plan.comment_bodies().flat_map(Signal::parse_body))
    }

    /// Index an ordered sequence of signals. Later `DONE`/`REJECTED` entries
    /// for the same task replace earlier ones.
    pub fn from_signals<I: IntoIterator<Item = Signal>>(signals: I) -> Self {
        let mut index = SignalIndex::default();

        for signal in signals {
            let key = short_id(signal.task()).to_string();
            match signal {
                Signal::Claim { task } => index.claimed.insert(&task),
                Signal::Done { commit, .. } => {
                    index.done.insert(key, commit);
                }
                Signal::FilesAdded { files, .. } => {
                    let entry = index.files_added.entry(key).or_default();
                    for file in files {
                        if !entry.contains(&file) {
                            entry.push(file);
                        }
                    }
                }
                Signal::Rejected { reason, .. } => {
                    index.rejected.insert(key, reason);
                }
            }
        }

        index
    }

    pub fn is_claimed(&self, task_id: &str) -> bool {
        self.claimed.contains(task_id)
    }

    /// Commit announced by the latest `DONE` signal for the task.
    pub fn done_commit(&self, task_id: &str) -> Option<&str> {
        self.done.get(short_id(task_id)).map(String::as_str)
    }

    /// Files signaled as touched beyond the declared scope.
    pub fn added_files(&self, task_id: &str) -> &[String] {
        self.files_added
            .get(short_id(task_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rejection(&self, task_id: &str) -> Option<&str> {
        self.rejected.get(short_id(task_id)).map(String::as_str)
    }
}
