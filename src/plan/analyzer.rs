//! Task readiness classification.
//!
//! Every pass classifies the snapshot from scratch; nothing here is persisted.

use super::model::{Plan, PlanTask, TaskIdSet, short_id};
use super::signals::SignalIndex;
use super::store::PlanStore;
use crate::error::Result;
use serde::Serialize;
use std::collections::HashSet;

/// Where a task stands in the current snapshot.
///
/// Checks run in the order merged, worker-done, claimed, dependency, file
/// conflict. The first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Durably merged: the task carries a linked commit.
    Merged { commit: String },
    /// A worker announced `DONE`; the commit awaits completion.
    WorkerDone { commit: String },
    /// Claimed by some actor.
    InProgress,
    /// Free to dispatch.
    Ready,
    /// At least one dependency is neither merged nor worker-done.
    BlockedByDependency { waiting_on: Vec<String> },
    /// Shares files with an in-progress task.
    BlockedByFileConflict { conflicts_with: Vec<String> },
}

impl TaskState {
    /// Short label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            TaskState::Merged { .. } => "merged",
            TaskState::WorkerDone { .. } => "worker-done",
            TaskState::InProgress => "in-progress",
            TaskState::Ready => "ready",
            TaskState::BlockedByDependency { .. } => "blocked-by-dependency",
            TaskState::BlockedByFileConflict { .. } => "blocked-by-file-conflict",
        }
    }

    /// Whether the task satisfies downstream dependencies.
    pub fn is_resolved(&self) -> bool {
        matches!(self, TaskState::Merged { .. } | TaskState::WorkerDone { .. })
    }
}

/// A task together with its classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedTask {
    pub task: PlanTask,
    /// Declared files plus files signaled via `SIGNAL ... files-added:`.
    pub files: Vec<String>,
    #[serde(flatten)]
    pub state: TaskState,
}

/// Classification of a whole plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanState {
    pub plan_id: String,
    #[serde(skip)]
    pub plan: Plan,
    #[serde(skip)]
    pub signals: SignalIndex,
    pub tasks: Vec<ClassifiedTask>,
}

impl PlanState {
    pub fn title(&self) -> &str {
        &self.plan.title
    }

    fn matching<'a>(
        &'a self,
        pred: impl Fn(&TaskState) -> bool + 'a,
    ) -> impl Iterator<Item = &'a ClassifiedTask> + 'a {
        self.tasks.iter().filter(move |t| pred(&t.state))
    }

    pub fn merged(&self) -> Vec<&ClassifiedTask> {
        self.matching(|s| matches!(s, TaskState::Merged { .. }))
            .collect()
    }

    pub fn worker_done(&self) -> Vec<&ClassifiedTask> {
        self.matching(|s| matches!(s, TaskState::WorkerDone { .. }))
            .collect()
    }

    pub fn in_progress(&self) -> Vec<&ClassifiedTask> {
        self.matching(|s| *s == TaskState::InProgress).collect()
    }

    pub fn ready(&self) -> Vec<&ClassifiedTask> {
        self.matching(|s| *s == TaskState::Ready).collect()
    }

    /// Tasks blocked by either a dependency or a file conflict.
    pub fn blocked(&self) -> Vec<&ClassifiedTask> {
        self.matching(|s| {
            matches!(
                s,
                TaskState::BlockedByDependency { .. } | TaskState::BlockedByFileConflict { .. }
            )
        })
        .collect()
    }

    /// Every task is merged or worker-done.
    pub fn fully_resolved(&self) -> bool {
        self.tasks.iter().all(|t| t.state.is_resolved())
    }

    /// Every task is merged; nothing is left to complete.
    pub fn all_merged(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| matches!(t.state, TaskState::Merged { .. }))
    }

    /// Commit announced for a worker-done task.
    pub fn done_commit(&self, task_id: &str) -> Option<&str> {
        self.tasks
            .iter()
            .find(|t| t.task.id == task_id || t.task.short_id() == short_id(task_id))
            .and_then(|t| match &t.state {
                TaskState::WorkerDone { commit } => Some(commit.as_str()),
                _ => None,
            })
    }

    /// Ready tasks whose effective file sets are pairwise disjoint.
    ///
    /// Picks greedily in plan order; a ready task overlapping an earlier pick
    /// waits for the next round. `excluded` tasks are skipped and do not hold
    /// their files against other candidates.
    pub fn dispatch_batch_excluding(&self, excluded: &TaskIdSet) -> Vec<&PlanTask> {
        let mut taken: HashSet<&str> = HashSet::new();
        let mut batch = Vec::new();

        for candidate in self.ready() {
            if excluded.contains(&candidate.task.id) {
                continue;
            }
            if candidate.files.iter().any(|f| taken.contains(f.as_str())) {
                continue;
            }
            taken.extend(candidate.files.iter().map(String::as_str));
            batch.push(&candidate.task);
        }

        batch
    }
}

/// Declared files plus signaled additions, without duplicates.
pub fn effective_files(task: &PlanTask, signals: &SignalIndex) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for file in task
        .affected_files
        .iter()
        .chain(signals.added_files(&task.id))
    {
        if !files.contains(file) {
            files.push(file.clone());
        }
    }
    files
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().any(|f| b.contains(f))
}

/// Classify a snapshot.
pub fn analyze_plan(plan_id: &str, plan: Plan) -> PlanState {
    let signals = SignalIndex::from_plan(&plan);

    // Merged and worker-done tasks both satisfy dependencies.
    let mut completed = TaskIdSet::new();
    for task in &plan.tasks {
        if task.is_merged() || signals.done_commit(&task.id).is_some() {
            completed.insert(&task.id);
        }
    }

    // Claims are collected up front so file conflicts are checked against
    // every in-progress task, not only the ones earlier in plan order.
    let in_progress: Vec<(&PlanTask, Vec<String>)> = plan
        .tasks
        .iter()
        .filter(|t| !completed.contains(&t.id) && signals.is_claimed(&t.id))
        .map(|t| (t, effective_files(t, &signals)))
        .collect();

    let tasks = plan
        .tasks
        .iter()
        .map(|task| {
            let files = effective_files(task, &signals);
            let state = classify(task, &files, &signals, &completed, &in_progress);
            ClassifiedTask {
                task: task.clone(),
                files,
                state,
            }
        })
        .collect();

    PlanState {
        plan_id: plan_id.to_string(),
        plan,
        signals,
        tasks,
    }
}

fn classify(
    task: &PlanTask,
    files: &[String],
    signals: &SignalIndex,
    completed: &TaskIdSet,
    in_progress: &[(&PlanTask, Vec<String>)],
) -> TaskState {
    if let Some(commit) = task.linked_commit.as_deref().filter(|c| !c.is_empty()) {
        return TaskState::Merged {
            commit: commit.to_string(),
        };
    }

    if let Some(commit) = signals.done_commit(&task.id) {
        return TaskState::WorkerDone {
            commit: commit.to_string(),
        };
    }

    if signals.is_claimed(&task.id) {
        return TaskState::InProgress;
    }

    let waiting_on: Vec<String> = task
        .dependencies()
        .iter()
        .filter(|dep| !completed.contains(dep))
        .map(|dep| short_id(dep).to_string())
        .collect();
    if !waiting_on.is_empty() {
        return TaskState::BlockedByDependency { waiting_on };
    }

    let conflicts_with: Vec<String> = in_progress
        .iter()
        .filter(|(other, other_files)| other.id != task.id && overlaps(files, other_files))
        .map(|(other, _)| other.short_id().to_string())
        .collect();
    if !conflicts_with.is_empty() {
        return TaskState::BlockedByFileConflict { conflicts_with };
    }

    TaskState::Ready
}

/// Load and classify a plan.
///
/// A load failure is returned as `PlanError`; callers treat it as retry or
/// abort, never as a crash.
pub fn analyze(store: &dyn PlanStore, plan_id: &str) -> Result<PlanState> {
    let plan = store.show(plan_id)?;
    let state = analyze_plan(plan_id, plan);
    tracing::debug!(
        plan = plan_id,
        ready = state.ready().len(),
        in_progress = state.in_progress().len(),
        worker_done = state.worker_done().len(),
        "plan analyzed"
    );
    Ok(state)
}
