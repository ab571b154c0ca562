//! Plain-text reports for the operator.

use crate::agent::WorkerResult;
use crate::agent::dispatch::truncate_chars;
use crate::feedback::{ConstraintWarning, ContextFeedback};
use crate::plan::{ClassifiedTask, PlanState, TaskState, short_id};
use std::fmt::Write as _;

/// Characters of stderr shown per failed worker.
const ERROR_PREVIEW_CHARS: usize = 100;

fn task_line(out: &mut String, marker: char, t: &ClassifiedTask, suffix: &str) {
    let _ = writeln!(
        out,
        "  {} {}: \"{}\"{}",
        marker,
        t.task.short_id(),
        t.task.subject,
        suffix
    );
}

fn files_line(out: &mut String, t: &ClassifiedTask) {
    if !t.files.is_empty() {
        let _ = writeln!(out, "    Files: {}", t.files.join(", "));
    }
}

/// Full classification of a plan, with context feedback.
pub fn dispatch_report(state: &PlanState, feedback: &[ContextFeedback]) -> String {
    let mut out = String::new();
    let merged = state.merged();
    let done = state.worker_done();
    let in_progress = state.in_progress();
    let ready = state.ready();
    let blocked = state.blocked();

    let title = format!("Dispatch: \"{}\"", state.title());
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "=".repeat(title.chars().count().max(50)));
    let _ = writeln!(
        out,
        "Status: {}/{} completed | {} in progress | {} ready | {} blocked",
        merged.len() + done.len(),
        state.tasks.len(),
        in_progress.len(),
        ready.len(),
        blocked.len()
    );
    out.push('\n');

    if !merged.is_empty() || !done.is_empty() {
        out.push_str("-- Completed --\n");
        for t in &merged {
            if let TaskState::Merged { commit } = &t.state {
                task_line(&mut out, '+', t, &format!(" - {}", short_id(commit)));
            }
        }
        for t in &done {
            if let TaskState::WorkerDone { commit } = &t.state {
                task_line(
                    &mut out,
                    '+',
                    t,
                    &format!(" - {} (pending merge)", short_id(commit)),
                );
            }
        }
        out.push('\n');
    }

    if !in_progress.is_empty() {
        out.push_str("-- In Progress --\n");
        for t in &in_progress {
            task_line(&mut out, '*', t, "");
            files_line(&mut out, t);
        }
        out.push('\n');
    }

    if !ready.is_empty() {
        out.push_str("-- Ready for Dispatch --\n");
        for t in &ready {
            task_line(&mut out, 'o', t, "");
            files_line(&mut out, t);
        }
        out.push('\n');
    }

    if !blocked.is_empty() {
        out.push_str("-- Blocked --\n");
        for t in &blocked {
            let reason = match &t.state {
                TaskState::BlockedByDependency { waiting_on } => {
                    format!(" - waiting on: {}", waiting_on.join(", "))
                }
                TaskState::BlockedByFileConflict { conflicts_with } => format!(
                    " - file conflict with in-progress task {}",
                    conflicts_with.join(", ")
                ),
                _ => String::new(),
            };
            task_line(&mut out, 'x', t, &reason);
        }
        out.push('\n');
    }

    let rejected: Vec<(&ClassifiedTask, &str)> = state
        .tasks
        .iter()
        .filter_map(|t| state.signals.rejection(&t.task.id).map(|r| (t, r)))
        .collect();
    if !rejected.is_empty() {
        out.push_str("-- Rejected --\n");
        for (t, reason) in rejected {
            task_line(&mut out, '!', t, &format!(" - {}", reason));
        }
        out.push('\n');
    }

    if feedback.iter().any(|fb| {
        !fb.constraints.is_empty() || !fb.friction.is_empty() || !fb.open_items.is_empty()
    }) {
        out.push_str("-- Context Feedback --\n");
        for fb in feedback {
            let from = fb.source();
            for c in &fb.constraints {
                let _ = writeln!(out, "  ! Constraint ({}): {}", from, c);
            }
            for f in &fb.friction {
                let _ = writeln!(out, "  i Friction ({}): {}", from, f);
            }
            for o in &fb.open_items {
                let _ = writeln!(out, "  i Open item ({}): {}", from, o);
            }
        }
        out.push('\n');
    }

    out
}

/// One line per worker, plus the first stderr line of failures.
pub fn batch_summary(results: &[WorkerResult]) -> String {
    let succeeded = results.iter().filter(|r| r.success).count();
    let mut out = format!(
        "Batch complete: {} succeeded, {} failed\n",
        succeeded,
        results.len() - succeeded
    );

    for r in results {
        let cost = if r.cost > 0.0 {
            format!(" (${:.4})", r.cost)
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "  {} {}: \"{}\" - {} turns{}",
            if r.success { '+' } else { 'x' },
            short_id(&r.task_id),
            r.task_subject,
            r.turns,
            cost
        );
        if !r.success
            && let Some(line) = r.first_error_line()
        {
            let _ = writeln!(out, "    Error: {}", truncate_chars(line, ERROR_PREVIEW_CHARS));
        }
    }

    out
}

/// Post-batch warnings: constraints that may affect remaining tasks, and open items.
pub fn feedback_warnings(warnings: &[ConstraintWarning], feedback: &[ContextFeedback]) -> String {
    let mut out = String::new();
    for w in warnings {
        let _ = writeln!(
            out,
            "! Constraint from {}: \"{}\"\n  May affect: {}",
            w.source,
            w.constraint,
            w.tasks.join(", ")
        );
    }
    for fb in feedback {
        for item in &fb.open_items {
            let _ = writeln!(out, "i Open item ({}): {}", fb.source(), item);
        }
    }
    out
}
