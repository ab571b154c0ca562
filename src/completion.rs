//! Completion: fold every worker commit into one published change set.
//!
//! Runs only once the plan is fully resolved. Work happens in a dedicated
//! integration worktree on `plan/<plan7>`, created from the base commit
//! captured at first dispatch so the result does not depend on where the main
//! line moved in the meantime.
//!
//! All or nothing: if any replay, the push, or the verification fails, the
//! integration worktree and branch are discarded, nothing is linked, the plan
//! stays open and task workspaces are left in place for diagnosis.

use crate::agent::dispatch::truncate_chars;
use crate::config::Config;
use crate::context::RepoContext;
use crate::error::{RadorchError, Result};
use crate::events::{self, Event, EventAction};
use crate::exec::run_command;
use crate::git;
use crate::git_worktree::{
    branch_exists, create_worktree, delete_branch, integration_branch_name,
    integration_workspace_path, release_workspaces, remove_worktree, task_branch_name,
};
use crate::plan::{PlanState, PlanStatus, PlanStore, PlanTask, Signal, TaskState, short_id};
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static PATCH_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9a-f]{40})\b").expect("Invalid patch id regex"));

/// Publishes the integration branch and talks to the collaboration network.
pub trait ChangeSetPublisher {
    /// Push the workspace HEAD as a reviewable change set.
    ///
    /// Returns the change-set id reported by the push, if any.
    fn publish(&self, workspace: &Path) -> Result<Option<String>>;

    /// Whether a change set with this id can be looked up.
    fn exists(&self, change_id: &str) -> bool;

    fn close_issue(&self, issue_id: &str) -> Result<()>;

    /// Announce local changes to the network.
    fn announce(&self) -> Result<()>;
}

/// [`ChangeSetPublisher`] for Radicle: patches are created by pushing to a
/// magic ref on the `rad` remote.
#[derive(Debug, Clone)]
pub struct RadPublisher {
    rad_command: String,
    remote: String,
    refspec: String,
    repo_root: PathBuf,
    timeout: Duration,
}

impl RadPublisher {
    pub fn from_config(config: &Config, repo_root: &Path) -> Self {
        Self {
            rad_command: config.rad_command.clone(),
            remote: config.remote.clone(),
            refspec: config.patch_refspec.clone(),
            repo_root: repo_root.to_path_buf(),
            timeout: config.command_timeout(),
        }
    }

    fn rad(&self, args: &[&str]) -> Result<()> {
        let output = run_command(&self.rad_command, &self.repo_root, args, self.timeout)
            .map_err(|e| {
                RadorchError::UserError(format!("failed to execute {}: {}", self.rad_command, e))
            })?;
        if !output.success() {
            return Err(RadorchError::GitError(format!(
                "{} {} failed: {}",
                self.rad_command,
                args.join(" "),
                output.diagnostic()
            )));
        }
        Ok(())
    }
}

/// First 40-hex id in push output.
pub fn parse_patch_id(output: &str) -> Option<String> {
    PATCH_ID_REGEX
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl ChangeSetPublisher for RadPublisher {
    fn publish(&self, workspace: &Path) -> Result<Option<String>> {
        let output = run_command(
            "git",
            workspace,
            &["push", &self.remote, &self.refspec],
            self.timeout,
        )
        .map_err(|e| RadorchError::GitError(format!("failed to execute git push: {}", e)))?;

        if !output.success() {
            return Err(RadorchError::GitError(format!(
                "git push {} {} failed: {}",
                self.remote,
                self.refspec,
                output.diagnostic()
            )));
        }

        // The patch id may be reported on either stream.
        Ok(parse_patch_id(&output.combined()))
    }

    fn exists(&self, change_id: &str) -> bool {
        self.rad(&["patch", "show", change_id]).is_ok()
    }

    fn close_issue(&self, issue_id: &str) -> Result<()> {
        self.rad(&["issue", "state", issue_id, "--closed"])
    }

    fn announce(&self) -> Result<()> {
        self.rad(&["sync", "--announce"])
    }
}

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub patch_id: String,
    /// `(task id, replayed commit)` in plan order.
    pub linked: Vec<(String, String)>,
    /// Workspaces that could not be removed.
    pub unreleased: Vec<PathBuf>,
}

/// Worker commit for a task, matching either id form.
fn recorded_commit<'a>(commits: &'a HashMap<String, String>, task: &PlanTask) -> Option<&'a str> {
    commits
        .get(&task.id)
        .or_else(|| {
            commits
                .iter()
                .find(|(id, _)| short_id(id) == task.short_id())
                .map(|(_, commit)| commit)
        })
        .map(String::as_str)
}

pub struct CompletionCoordinator<'a> {
    pub ctx: &'a RepoContext,
    pub config: &'a Config,
    pub store: &'a dyn PlanStore,
    pub publisher: &'a dyn ChangeSetPublisher,
}

impl CompletionCoordinator<'_> {
    /// Replay, publish, verify, link, close.
    ///
    /// `worker_commits` maps task ids to the commits captured by the driver;
    /// tasks missing there fall back to their `DONE` signal.
    pub fn complete(
        &self,
        state: &PlanState,
        worker_commits: &HashMap<String, String>,
        base_commit: &str,
        workspaces: &[PathBuf],
    ) -> Result<CompletionOutcome> {
        let plan_id = state.plan_id.as_str();

        if let Some(unresolved) = state.tasks.iter().find(|t| !t.state.is_resolved()) {
            return Err(RadorchError::merge(
                unresolved.task.short_id(),
                format!("task is {}, not resolved", unresolved.state.label()),
            ));
        }

        let branch = integration_branch_name(plan_id);
        let workspace = integration_workspace_path(self.ctx, plan_id);
        self.discard_integration(&workspace, &branch);
        create_worktree(&self.ctx.repo_root, &workspace, &branch, base_commit)?;
        tracing::debug!(branch = %branch, base = base_commit, "integration workspace created");

        let linked = match self.replay_all(state, worker_commits, base_commit, &workspace) {
            Ok(linked) => linked,
            Err(e) => {
                self.discard_integration(&workspace, &branch);
                return Err(e);
            }
        };

        let patch_id = match self.publish_verified(&workspace, &branch) {
            Ok(id) => id,
            Err(e) => {
                self.discard_integration(&workspace, &branch);
                return Err(e);
            }
        };

        for (task_id, commit) in &linked {
            self.store.link_commit(plan_id, task_id, commit)?;
        }
        self.store.link_patch(plan_id, &patch_id)?;
        self.store.set_status(plan_id, PlanStatus::Completed)?;

        if self.config.close_related_issues {
            for issue in &state.plan.related_issues {
                if let Err(e) = self.publisher.close_issue(issue) {
                    tracing::warn!(issue = %issue, error = %e, "failed to close related issue");
                }
            }
        }

        let mut to_release: Vec<PathBuf> = workspaces.to_vec();
        to_release.push(workspace);
        let unreleased = release_workspaces(&self.ctx.repo_root, &to_release);
        for (task_id, _) in &linked {
            let task_branch = task_branch_name(task_id);
            if branch_exists(&self.ctx.repo_root, &task_branch)
                && let Err(e) = delete_branch(&self.ctx.repo_root, &task_branch, true)
            {
                tracing::debug!(branch = %task_branch, error = %e, "task branch not pruned");
            }
        }

        if self.config.announce_on_complete
            && let Err(e) = self.publisher.announce()
        {
            tracing::warn!(error = %e, "announce failed");
        }

        events::record(
            self.ctx,
            Event::new(EventAction::Complete, plan_id).with_details(json!({
                "patch": patch_id,
                "branch": branch,
                "base": base_commit,
                "tasks": linked.len(),
            })),
        );

        Ok(CompletionOutcome {
            patch_id,
            linked,
            unreleased,
        })
    }

    /// Replay every worker-done task in plan order. Returns the commits to link.
    fn replay_all(
        &self,
        state: &PlanState,
        worker_commits: &HashMap<String, String>,
        base_commit: &str,
        workspace: &Path,
    ) -> Result<Vec<(String, String)>> {
        let mut linked = Vec::new();

        for classified in &state.tasks {
            let TaskState::WorkerDone { commit: signaled } = &classified.state else {
                continue;
            };
            let task = &classified.task;
            let commit = recorded_commit(worker_commits, task).unwrap_or(signaled.as_str());

            if let Err(e) = replay(workspace, base_commit, commit) {
                let reason = e.to_string();
                self.reject(&state.plan_id, task, &reason);
                return Err(RadorchError::merge(task.short_id(), reason));
            }

            let head = git::head_sha(workspace)?;
            tracing::debug!(task = %task.id, commit, replayed = %head, "task replayed");
            linked.push((task.id.clone(), head));
        }

        Ok(linked)
    }

    fn publish_verified(&self, workspace: &Path, branch: &str) -> Result<String> {
        let published = self
            .publisher
            .publish(workspace)
            .map_err(|e| RadorchError::merge(branch, e.to_string()))?;

        let Some(patch_id) = published else {
            return Err(RadorchError::merge(
                branch,
                "push reported no patch id; nothing was published",
            ));
        };

        if !self.publisher.exists(&patch_id) {
            return Err(RadorchError::merge(
                branch,
                format!("patch {} not found after push", short_id(&patch_id)),
            ));
        }

        Ok(patch_id)
    }

    /// Post `REJECTED` for a task whose commit failed to replay.
    fn reject(&self, plan_id: &str, task: &PlanTask, reason: &str) {
        let signal = Signal::Rejected {
            task: task.short_id().to_string(),
            reason: truncate_chars(reason, self.config.reject_reason_max_chars),
        };
        if let Err(e) = self.store.comment(plan_id, &signal.to_string()) {
            tracing::warn!(task = %task.id, error = %e, "failed to post rejection");
        }
        events::record(
            self.ctx,
            Event::new(EventAction::MergeRejected, plan_id)
                .with_task(&task.id)
                .with_details(json!({ "reason": reason })),
        );
    }

    /// Remove the integration worktree and branch, if present.
    fn discard_integration(&self, workspace: &Path, branch: &str) {
        let root = &self.ctx.repo_root;
        if workspace.exists()
            && let Err(e) = remove_worktree(root, workspace)
        {
            tracing::warn!(error = %e, "failed to remove integration workspace");
        }
        if let Err(e) = git::run_git(root, &["worktree", "prune"]) {
            tracing::warn!(error = %e, "failed to prune worktree records");
        }
        if branch_exists(root, branch)
            && let Err(e) = delete_branch(root, branch, true)
        {
            tracing::warn!(branch, error = %e, "failed to delete integration branch");
        }
    }
}

/// Replay a worker commit onto the integration HEAD.
///
/// A commit already contained in HEAD is skipped. A commit descending from
/// the base replays its whole `base..commit` range; any other commit replays
/// alone.
fn replay(workspace: &Path, base_commit: &str, commit: &str) -> Result<()> {
    if git::is_ancestor(workspace, commit, "HEAD") {
        return Ok(());
    }

    let revision = if git::is_ancestor(workspace, base_commit, commit) {
        format!("{}..{}", base_commit, commit)
    } else {
        commit.to_string()
    };
    git::cherry_pick(workspace, &revision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_worktree::create_task_workspace;
    use crate::plan::analyze_plan;
    use crate::test_support::{
        FakePlanStore, StoreCall, commit_file, create_test_repo, plan_with, task, test_context,
    };
    use std::cell::RefCell;
    use tempfile::TempDir;

    const PATCH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[derive(Default)]
    struct FakePublisher {
        patch_id: Option<String>,
        visible: bool,
        published: RefCell<Vec<PathBuf>>,
        closed: RefCell<Vec<String>>,
        announced: RefCell<bool>,
    }

    impl FakePublisher {
        fn working() -> Self {
            Self {
                patch_id: Some(PATCH.to_string()),
                visible: true,
                ..Default::default()
            }
        }
    }

    impl ChangeSetPublisher for FakePublisher {
        fn publish(&self, workspace: &Path) -> Result<Option<String>> {
            self.published.borrow_mut().push(workspace.to_path_buf());
            Ok(self.patch_id.clone())
        }

        fn exists(&self, _change_id: &str) -> bool {
            self.visible
        }

        fn close_issue(&self, issue_id: &str) -> Result<()> {
            self.closed.borrow_mut().push(issue_id.to_string());
            Ok(())
        }

        fn announce(&self) -> Result<()> {
            *self.announced.borrow_mut() = true;
            Ok(())
        }
    }

    struct Fixture {
        _repo: TempDir,
        _worktrees: TempDir,
        ctx: RepoContext,
        base: String,
    }

    impl Fixture {
        fn new() -> Self {
            let repo = create_test_repo();
            let worktrees = TempDir::new().unwrap();
            let ctx = test_context(repo.path(), worktrees.path());
            let base = git::head_sha(repo.path()).unwrap();
            Self {
                _repo: repo,
                _worktrees: worktrees,
                ctx,
                base,
            }
        }

        /// A worker workspace with one commit writing `file`.
        fn worker(&self, task_id: &str, file: &str, content: &str) -> (PathBuf, String) {
            let ws = create_task_workspace(&self.ctx, task_id, "work", &self.base).unwrap();
            let sha = commit_file(&ws, file, content, &format!("task {}", task_id));
            (ws, sha)
        }
    }

    /// Worker-done state for `(task id, file, commit)` triples.
    fn resolved_state(done: &[(&str, &str, &str)]) -> PlanState {
        let tasks = done
            .iter()
            .map(|(id, file, _)| task(id, &format!("Task {}", id), &[file], &[]))
            .collect();
        let comments: Vec<String> = done
            .iter()
            .map(|(id, _, commit)| format!("DONE task:{} commit:{}", short_id(id), commit))
            .collect();
        let refs: Vec<&str> = comments.iter().map(String::as_str).collect();
        let mut plan = plan_with(tasks, &refs);
        plan.related_issues = vec!["issue1".to_string()];
        analyze_plan("plan1234567", plan)
    }

    fn coordinator<'a>(
        fx: &'a Fixture,
        config: &'a Config,
        store: &'a FakePlanStore,
        publisher: &'a FakePublisher,
    ) -> CompletionCoordinator<'a> {
        CompletionCoordinator {
            ctx: &fx.ctx,
            config,
            store,
            publisher,
        }
    }

    #[test]
    fn test_parse_patch_id() {
        let output = format!("✓ Patch {} opened\nTo rad://z3abc", PATCH);
        assert_eq!(parse_patch_id(&output).as_deref(), Some(PATCH));
        assert_eq!(parse_patch_id("Everything up-to-date"), None);
        assert_eq!(parse_patch_id(&format!("{}ff", PATCH)), None);
    }

    #[test]
    fn test_successful_completion_links_and_releases() {
        let fx = Fixture::new();
        let (ws_a, sha_a) = fx.worker("aaaaaaa111", "a.txt", "a\n");
        let (ws_b, sha_b) = fx.worker("bbbbbbb222", "b.txt", "b\n");
        let state = resolved_state(&[("aaaaaaa111", "a.txt", &sha_a), ("bbbbbbb222", "b.txt", &sha_b)]);

        let store = FakePlanStore::new(state.plan.clone());
        let publisher = FakePublisher::working();
        let config = Config::default();
        // Only A's commit was captured by a driver; B falls back to its DONE signal.
        let commits = HashMap::from([("aaaaaaa111".to_string(), sha_a.clone())]);

        let outcome = coordinator(&fx, &config, &store, &publisher)
            .complete(&state, &commits, &fx.base, &[ws_a.clone(), ws_b.clone()])
            .unwrap();

        assert_eq!(outcome.patch_id, PATCH);
        assert_eq!(outcome.linked.len(), 2);
        assert!(outcome.unreleased.is_empty());

        let calls = store.calls.borrow().clone();
        assert_eq!(
            calls,
            vec![
                StoreCall::LinkCommit {
                    task: "aaaaaaa111".to_string(),
                    commit: outcome.linked[0].1.clone()
                },
                StoreCall::LinkCommit {
                    task: "bbbbbbb222".to_string(),
                    commit: outcome.linked[1].1.clone()
                },
                StoreCall::LinkPatch(PATCH.to_string()),
                StoreCall::Status(PlanStatus::Completed),
            ]
        );

        // Integration branch holds both files on top of the base.
        let branch = integration_branch_name("plan1234567");
        let tree = git::run_git(&fx.ctx.repo_root, &["ls-tree", "--name-only", &branch]).unwrap();
        assert!(tree.stdout.contains("a.txt") && tree.stdout.contains("b.txt"));
        assert!(git::is_ancestor(&fx.ctx.repo_root, &fx.base, &branch));

        assert!(!ws_a.exists() && !ws_b.exists());
        assert!(!integration_workspace_path(&fx.ctx, "plan1234567").exists());
        assert!(!branch_exists(&fx.ctx.repo_root, &task_branch_name("aaaaaaa111")));
        assert_eq!(*publisher.closed.borrow(), ["issue1"]);
        assert!(*publisher.announced.borrow());
    }

    #[test]
    fn test_replay_failure_is_all_or_nothing() {
        let fx = Fixture::new();
        let (ws1, s1) = fx.worker("1111111aaa", "one.txt", "one\n");
        let (ws2, s2) = fx.worker("2222222bbb", "two.txt", "two\n");
        // Same new file as task 1 with different content: add/add conflict.
        let (ws3, s3) = fx.worker("3333333ccc", "one.txt", "conflict\n");
        let (ws4, s4) = fx.worker("4444444ddd", "four.txt", "four\n");
        let (ws5, s5) = fx.worker("5555555eee", "five.txt", "five\n");
        let state = resolved_state(&[
            ("1111111aaa", "one.txt", &s1),
            ("2222222bbb", "two.txt", &s2),
            ("3333333ccc", "one.txt", &s3),
            ("4444444ddd", "four.txt", &s4),
            ("5555555eee", "five.txt", &s5),
        ]);

        let store = FakePlanStore::new(state.plan.clone());
        let publisher = FakePublisher::working();
        let config = Config {
            reject_reason_max_chars: 40,
            ..Config::default()
        };
        let workspaces = [ws1, ws2, ws3, ws4, ws5];

        let err = coordinator(&fx, &config, &store, &publisher)
            .complete(&state, &HashMap::new(), &fx.base, &workspaces)
            .unwrap_err();

        match err {
            RadorchError::MergeError { task, .. } => assert_eq!(task, "3333333"),
            other => panic!("expected merge error, got {:?}", other),
        }

        // Nothing linked or published; only the rejection was posted.
        let comments = store.comments();
        assert_eq!(store.calls.borrow().len(), 1);
        assert_eq!(comments.len(), 1);
        assert!(comments[0].starts_with("REJECTED task:3333333 reason:"));
        let reason = comments[0].trim_start_matches("REJECTED task:3333333 reason:");
        assert!(reason.chars().count() <= 41);
        assert!(publisher.published.borrow().is_empty());

        // Integration branch discarded, task workspaces kept.
        assert!(!branch_exists(&fx.ctx.repo_root, &integration_branch_name("plan1234567")));
        assert!(!integration_workspace_path(&fx.ctx, "plan1234567").exists());
        assert!(workspaces.iter().all(|ws| ws.exists()));
    }

    #[test]
    fn test_push_without_patch_id_fails() {
        let fx = Fixture::new();
        let (ws, sha) = fx.worker("aaaaaaa111", "a.txt", "a\n");
        let state = resolved_state(&[("aaaaaaa111", "a.txt", &sha)]);
        let store = FakePlanStore::new(state.plan.clone());
        let publisher = FakePublisher {
            patch_id: None,
            visible: true,
            ..Default::default()
        };
        let config = Config::default();

        let err = coordinator(&fx, &config, &store, &publisher)
            .complete(&state, &HashMap::new(), &fx.base, std::slice::from_ref(&ws))
            .unwrap_err();

        assert!(matches!(err, RadorchError::MergeError { .. }));
        assert!(err.to_string().contains("no patch id"));
        assert!(store.calls.borrow().is_empty());
        assert!(ws.exists());
    }

    #[test]
    fn test_unverifiable_patch_fails() {
        let fx = Fixture::new();
        let (ws, sha) = fx.worker("aaaaaaa111", "a.txt", "a\n");
        let state = resolved_state(&[("aaaaaaa111", "a.txt", &sha)]);
        let store = FakePlanStore::new(state.plan.clone());
        let publisher = FakePublisher {
            patch_id: Some(PATCH.to_string()),
            visible: false,
            ..Default::default()
        };
        let config = Config::default();

        let err = coordinator(&fx, &config, &store, &publisher)
            .complete(&state, &HashMap::new(), &fx.base, &[ws])
            .unwrap_err();

        assert!(err.to_string().contains("not found after push"));
        assert!(store.calls.borrow().is_empty());
        assert!(!branch_exists(&fx.ctx.repo_root, &integration_branch_name("plan1234567")));
    }

    #[test]
    fn test_unresolved_plan_is_refused() {
        let fx = Fixture::new();
        let state = analyze_plan("plan1234567", plan_with(vec![task("aaaaaaa111", "A", &[], &[])], &[]));
        let store = FakePlanStore::new(state.plan.clone());
        let publisher = FakePublisher::working();
        let config = Config::default();

        let err = coordinator(&fx, &config, &store, &publisher)
            .complete(&state, &HashMap::new(), &fx.base, &[])
            .unwrap_err();

        assert!(err.to_string().contains("aaaaaaa"));
        assert!(!branch_exists(&fx.ctx.repo_root, &integration_branch_name("plan1234567")));
    }

    #[test]
    fn test_retry_after_failure_starts_from_clean_branch() {
        let fx = Fixture::new();
        let (ws, sha) = fx.worker("aaaaaaa111", "a.txt", "a\n");
        let state = resolved_state(&[("aaaaaaa111", "a.txt", &sha)]);
        let store = FakePlanStore::new(state.plan.clone());
        let config = Config::default();

        let broken = FakePublisher::default();
        assert!(
            coordinator(&fx, &config, &store, &broken)
                .complete(&state, &HashMap::new(), &fx.base, std::slice::from_ref(&ws))
                .is_err()
        );

        let working = FakePublisher::working();
        let outcome = coordinator(&fx, &config, &store, &working)
            .complete(&state, &HashMap::new(), &fx.base, &[ws])
            .unwrap();
        assert_eq!(outcome.linked.len(), 1);
    }

    #[test]
    fn test_discard_clears_integration_left_without_its_directory() {
        let fx = Fixture::new();
        let state = resolved_state(&[]);
        let store = FakePlanStore::new(state.plan.clone());
        let config = Config::default();
        let publisher = FakePublisher::working();
        let coordinator = coordinator(&fx, &config, &store, &publisher);

        let branch = integration_branch_name(&state.plan_id);
        let workspace = integration_workspace_path(&fx.ctx, &state.plan_id);
        create_worktree(&fx.ctx.repo_root, &workspace, &branch, &fx.base).unwrap();
        std::fs::remove_dir_all(&workspace).unwrap();

        coordinator.discard_integration(&workspace, &branch);

        assert!(!branch_exists(&fx.ctx.repo_root, &branch));
        let listed = git::run_git(&fx.ctx.repo_root, &["worktree", "list", "--porcelain"])
            .unwrap()
            .stdout;
        assert!(!listed.contains(&format!("refs/heads/{}", branch)));
    }

    #[test]
    fn test_replay_skips_commit_already_in_head() {
        let fx = Fixture::new();
        let (ws, sha) = fx.worker("aaaaaaa111", "a.txt", "a\n");
        replay(&ws, &fx.base, &sha).unwrap();
        assert_eq!(git::head_sha(&ws).unwrap(), sha);
    }
}
