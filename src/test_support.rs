use crate::agent::WorkerResult;
use crate::context::RepoContext;
use crate::error::{RadorchError, Result};
use crate::plan::{Comment, CommentEdit, Plan, PlanStatus, PlanStore, PlanTask, Thread};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub(crate) fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path();

    git(path, &["init"]);
    // Deterministic default branch name across environments.
    git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "user.name", "Test User"]);

    std::fs::write(path.join("README.md"), "# Test\n").unwrap();
    git(path, &["add", "."]);
    git(path, &["commit", "-m", "Initial commit"]);

    temp_dir
}

/// Write `content` to `file`, commit it, and return the new HEAD sha.
pub(crate) fn commit_file(repo: &Path, file: &str, content: &str, message: &str) -> String {
    let target = repo.join(file);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&target, content).unwrap();
    git(repo, &["add", file]);
    git(repo, &["commit", "-m", message]);
    let output = Command::new("git")
        .current_dir(repo)
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Context for `repo` with workspaces created under `worktrees` instead of
/// next to the repository.
pub(crate) fn test_context(repo: &Path, worktrees: &Path) -> RepoContext {
    let mut ctx = RepoContext::resolve_from(repo).unwrap();
    ctx.worktrees_dir = worktrees.to_path_buf();
    ctx
}

pub(crate) fn git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute git {}: {}", args.join(" "), e));

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "git {} failed (exit code {:?})\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status.code(),
            stdout,
            stderr
        );
    }
}

pub(crate) fn task(id: &str, subject: &str, files: &[&str], blocked_by: &[&str]) -> PlanTask {
    PlanTask {
        id: id.to_string(),
        subject: subject.to_string(),
        description: String::new(),
        estimate: String::new(),
        affected_files: files.iter().map(|f| f.to_string()).collect(),
        linked_commit: None,
        blocked_by: if blocked_by.is_empty() {
            None
        } else {
            Some(blocked_by.iter().map(|d| d.to_string()).collect())
        },
    }
}

pub(crate) fn plan_with(tasks: Vec<PlanTask>, comments: &[&str]) -> Plan {
    let mut thread = Thread::default();
    for (i, body) in comments.iter().enumerate() {
        thread.comments.insert(
            format!("c{:03}", i),
            Comment {
                body: body.to_string(),
                edits: Vec::new(),
            },
        );
    }
    Plan {
        title: "Test plan".to_string(),
        status: PlanStatus::Approved,
        tasks,
        related_issues: Vec::new(),
        related_patches: Vec::new(),
        thread,
    }
}

pub(crate) fn edited_comment(original: &str, edits: &[&str]) -> Comment {
    Comment {
        body: original.to_string(),
        edits: edits
            .iter()
            .map(|b| CommentEdit {
                body: b.to_string(),
            })
            .collect(),
    }
}

pub(crate) fn failed_result(task_id: &str, stderr: &str) -> WorkerResult {
    WorkerResult {
        task_id: task_id.to_string(),
        task_subject: "Failing task".to_string(),
        success: false,
        exit_code: Some(1),
        stderr: stderr.to_string(),
        workspace: PathBuf::from("/tmp/fake-worktree"),
        turns: 0,
        cost: 0.0,
        commit: None,
    }
}

/// Every mutation a [`FakePlanStore`] has received, in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StoreCall {
    Status(PlanStatus),
    LinkPatch(String),
    LinkCommit { task: String, commit: String },
    Comment(String),
}

/// In-memory plan store; comments posted through it show up on the next `show`.
pub(crate) struct FakePlanStore {
    pub plan: RefCell<Option<Plan>>,
    pub calls: RefCell<Vec<StoreCall>>,
}

impl FakePlanStore {
    pub(crate) fn new(plan: Plan) -> Self {
        Self {
            plan: RefCell::new(Some(plan)),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn missing() -> Self {
        Self {
            plan: RefCell::new(None),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn comments(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                StoreCall::Comment(body) => Some(body.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PlanStore for FakePlanStore {
    fn show(&self, plan_id: &str) -> Result<Plan> {
        self.plan
            .borrow()
            .clone()
            .ok_or_else(|| RadorchError::PlanError(format!("plan {} not found", plan_id)))
    }

    fn set_status(&self, _plan_id: &str, status: PlanStatus) -> Result<()> {
        if let Some(plan) = self.plan.borrow_mut().as_mut() {
            plan.status = status.clone();
        }
        self.calls.borrow_mut().push(StoreCall::Status(status));
        Ok(())
    }

    fn link_patch(&self, _plan_id: &str, patch_id: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(StoreCall::LinkPatch(patch_id.to_string()));
        Ok(())
    }

    fn link_commit(&self, _plan_id: &str, task_id: &str, commit: &str) -> Result<()> {
        self.calls.borrow_mut().push(StoreCall::LinkCommit {
            task: task_id.to_string(),
            commit: commit.to_string(),
        });
        Ok(())
    }

    fn comment(&self, _plan_id: &str, body: &str) -> Result<()> {
        if let Some(plan) = self.plan.borrow_mut().as_mut() {
            let id = format!("posted{:03}", plan.thread.comments.len());
            plan.thread.comments.insert(
                id,
                Comment {
                    body: body.to_string(),
                    edits: Vec::new(),
                },
            );
        }
        self.calls
            .borrow_mut()
            .push(StoreCall::Comment(body.to_string()));
        Ok(())
    }
}
