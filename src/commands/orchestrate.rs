//! Implementation of the `radorch orchestrate` command.
//!
//! The control loop: analyze the plan, print the dispatch report, ask the
//! operator what to run, run the batch in the bounded pool with a live
//! dashboard, settle every result (DONE signal, failure log, retry / skip /
//! stop), and go around again. Once every task is merged or worker-done, the
//! completion coordinator folds the work into one patch.
//!
//! Parallelism lives only inside [`dispatch`]; everything else, including all
//! plan mutations, happens on this thread.

use crate::agent::{
    AgentConfig, CancelToken, ProgressUpdate, TaskExecutor, WorkerCommand, WorkerResult,
    WorktreeExecutor, dispatch,
};
use crate::agent::dispatch::interrupt_requested;
use crate::cli::OrchestrateArgs;
use crate::completion::{ChangeSetPublisher, CompletionCoordinator, RadPublisher};
use crate::config::Config;
use crate::context::{Capabilities, RepoContext};
use crate::error::{RadorchError, Result};
use crate::events::{self, Event, EventAction};
use crate::feedback::{ContextCli, ContextFeedback, constraint_warnings};
use crate::git;
use crate::operator::{AutoOperator, BatchChoice, FailureChoice, Operator, TerminalOperator};
use crate::plan::{
    PlanState, PlanStatus, PlanStore, PlanTask, RadPlanCli, Signal, SignalIndex, TaskIdSet,
    analyze, short_id,
};
use crate::progress::{Dashboard, ProgressMessage};
use crate::report::{batch_summary, dispatch_report, feedback_warnings};
use crate::retry::{rerun_task, write_failure_log};
use crate::run_state::RunState;
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

/// Slice of a `--wait` pause between interrupt checks.
const WAIT_SLICE: Duration = Duration::from_millis(200);

/// Execute the `radorch orchestrate` command.
pub fn cmd_orchestrate(args: OrchestrateArgs) -> Result<()> {
    let ctx = RepoContext::resolve()?;
    let mut config = Config::load_or_default(ctx.config_path());
    if let Some(n) = args.concurrency {
        if n == 0 {
            return Err(RadorchError::UserError(
                "--concurrency must be greater than 0".to_string(),
            ));
        }
        config.max_concurrency = n;
    }

    let caps = Capabilities::detect(&ctx, &config);
    caps.require_orchestration(&config)?;

    let agent_path = args
        .agent
        .clone()
        .unwrap_or_else(|| ctx.repo_root.join(&config.agent_file));
    let agent = AgentConfig::load(&agent_path)?;

    let run_state = RunState::load(&ctx, &args.plan_id);
    let base_commit = match &run_state.base_commit {
        Some(commit) => commit.clone(),
        None => git::head_sha(&ctx.repo_root)?,
    };

    let store = RadPlanCli::new(&config.plan_command, &ctx.repo_root, config.command_timeout());
    let publisher = RadPublisher::from_config(&config, &ctx.repo_root);
    let feedback = caps.context_cli.then(|| {
        ContextCli::new(&config.context_command, &ctx.repo_root, config.command_timeout())
    });
    let executor = WorktreeExecutor {
        ctx: ctx.clone(),
        command: WorkerCommand::from_config(&config)?,
        agent,
        plan_id: args.plan_id.clone(),
        base_commit: base_commit.clone(),
        cancel: CancelToken::on_interrupt(),
    };

    let mut auto = AutoOperator;
    let mut terminal = TerminalOperator::stdio();
    let operator: &mut dyn Operator = if args.yes { &mut auto } else { &mut terminal };
    let mut stdout = io::stdout();
    let dashboard_out = || -> Box<dyn Write + Send> { Box::new(io::stderr()) };

    Orchestrator {
        ctx: &ctx,
        config: &config,
        plan_id: &args.plan_id,
        store: &store,
        executor: &executor,
        publisher: &publisher,
        operator,
        feedback: feedback.as_ref(),
        out: &mut stdout,
        base_commit,
        run_state,
        wait: args.wait,
        dashboard_out: &dashboard_out,
        settled: TaskIdSet::new(),
    }
    .run()
}

/// One orchestration run over a plan.
pub struct Orchestrator<'a> {
    pub ctx: &'a RepoContext,
    pub config: &'a Config,
    pub plan_id: &'a str,
    pub store: &'a dyn PlanStore,
    pub executor: &'a dyn TaskExecutor,
    pub publisher: &'a dyn ChangeSetPublisher,
    pub operator: &'a mut dyn Operator,
    /// Context CLI, when installed.
    pub feedback: Option<&'a ContextCli>,
    /// Operator-facing text.
    pub out: &'a mut dyn Write,
    /// Commit every workspace and the integration branch start from.
    pub base_commit: String,
    pub run_state: RunState,
    pub wait: bool,
    /// Where the live dashboard renders while workers run.
    pub dashboard_out: &'a dyn Fn() -> Box<dyn Write + Send>,
    /// Tasks this run already settled (succeeded or skipped). They are not
    /// dispatched again even if no `DONE` signal made them worker-done.
    pub settled: TaskIdSet,
}

impl Orchestrator<'_> {
    fn say(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        if !text.ends_with('\n') {
            let _ = self.out.write_all(b"\n");
        }
        let _ = self.out.flush();
    }

    pub fn run(mut self) -> Result<()> {
        let initial = analyze(self.store, self.plan_id)?;
        let status = initial.plan.status.clone();
        if matches!(status, PlanStatus::Completed | PlanStatus::Archived) {
            self.say(&format!(
                "Plan \"{}\" is {}; nothing to dispatch.",
                initial.title(),
                status
            ));
            return Ok(());
        }
        if !status.is_dispatchable() {
            if !self.operator.approve_plan(initial.title(), status.as_str()) {
                self.say("Plan not approved. Nothing dispatched.");
                return Ok(());
            }
            self.store.set_status(self.plan_id, PlanStatus::Approved)?;
        }

        loop {
            let state = analyze(self.store, self.plan_id)?;
            let feedback = self.load_feedback();
            self.say(&dispatch_report(&state, &feedback));

            if state.all_merged() {
                self.say("Every task is already merged. Nothing to do.");
                return Ok(());
            }

            if state.fully_resolved() {
                return self.complete(&state);
            }

            let batch: Vec<PlanTask> = state
                .dispatch_batch_excluding(&self.settled)
                .into_iter()
                .cloned()
                .collect();

            if batch.is_empty() {
                let waiting = state
                    .in_progress()
                    .iter()
                    .filter(|t| !self.settled.contains(&t.task.id))
                    .count();
                if waiting == 0 {
                    self.say("No tasks ready and none in progress. Plan may be stuck.");
                    tracing::warn!(plan = self.plan_id, "no dispatchable tasks");
                    return Ok(());
                }
                if self.wait && !interrupt_requested() {
                    self.say(&format!(
                        "Waiting for {} in-progress task(s); checking again in {}s.",
                        waiting, self.config.wait_poll_seconds
                    ));
                    self.pause(self.config.wait_poll());
                    if interrupt_requested() {
                        self.say("Interrupted.");
                        return Ok(());
                    }
                    continue;
                }
                self.say(&format!(
                    "Waiting for {} in-progress task(s) to complete.\n\
                     Re-run `radorch orchestrate {}` after they finish, or pass --wait.",
                    waiting, self.plan_id
                ));
                return Ok(());
            }

            let tasks = match self.operator.choose_batch(batch.len()) {
                BatchChoice::Stop => {
                    self.say("Orchestration stopped.");
                    return Ok(());
                }
                BatchChoice::One => &batch[..1],
                BatchChoice::All => &batch[..],
            };

            let succeeded = self.dispatch_round(tasks)?;
            if succeeded > 0 {
                self.surface_feedback();
            }

            if interrupt_requested() {
                self.say("Interrupted; stopping after this batch.");
                return Ok(());
            }
        }
    }

    fn pause(&self, total: Duration) {
        let until = Instant::now() + total;
        while Instant::now() < until && !interrupt_requested() {
            std::thread::sleep(WAIT_SLICE.min(until.saturating_duration_since(Instant::now())));
        }
    }

    fn load_feedback(&self) -> Vec<ContextFeedback> {
        self.feedback
            .map(|cli| cli.load(self.plan_id))
            .unwrap_or_default()
    }

    fn save_run_state(&self) {
        if let Err(e) = self.run_state.save(self.ctx, self.plan_id) {
            tracing::warn!(error = %e, "failed to save run state");
        }
    }

    /// Prepare, run and settle one batch. Returns how many tasks succeeded.
    fn dispatch_round(&mut self, tasks: &[PlanTask]) -> Result<usize> {
        self.say(&format!("Creating {} worktree(s)...", tasks.len()));

        let mut prepared: Vec<(PlanTask, PathBuf)> = Vec::new();
        for task in tasks {
            match self.executor.prepare(task) {
                Ok(workspace) => {
                    let name = workspace
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    self.say(&format!("  + {}: {}", task.short_id(), name));
                    self.run_state.record_workspace(&workspace);
                    prepared.push((task.clone(), workspace));
                }
                Err(e) => {
                    self.say(&format!("  x {}: {}", task.short_id(), e));
                    tracing::warn!(task = %task.id, error = %e, "workspace not created");
                }
            }
        }

        if prepared.is_empty() {
            return Err(RadorchError::WorkspaceError(
                "no worktree could be created for this round".to_string(),
            ));
        }

        if self.run_state.base_commit.is_none() {
            self.run_state.base_commit = Some(self.base_commit.clone());
        }
        self.save_run_state();

        for (task, workspace) in &prepared {
            events::record(
                self.ctx,
                Event::new(EventAction::Dispatch, self.plan_id)
                    .with_task(&task.id)
                    .with_details(json!({ "workspace": workspace.display().to_string() })),
            );
        }

        self.say(&format!("Dispatching {} worker(s)...", prepared.len()));
        let results = self.run_batch(&prepared);
        self.say(&batch_summary(&results));

        let mut succeeded = 0;
        for ((task, _), result) in prepared.iter().zip(results) {
            if self.settle(task, result)? {
                succeeded += 1;
            }
        }
        Ok(succeeded)
    }

    fn spawn_dashboard(&self) -> Dashboard {
        Dashboard::spawn(self.config.dashboard_interval(), (self.dashboard_out)())
    }

    fn run_batch(&self, prepared: &[(PlanTask, PathBuf)]) -> Vec<WorkerResult> {
        let dashboard = self.spawn_dashboard();
        let sender = dashboard.sender();
        let executor = self.executor;

        let results = dispatch(
            prepared,
            self.config.max_concurrency,
            |_, item: &(PlanTask, PathBuf)| {
                let (task, workspace) = item;
                let progress = ProgressForwarder::start(sender.clone(), task);
                let result = executor.run(task, workspace, &mut |update| progress.update(update));
                progress.finish(result.success);
                result
            },
        );

        drop(sender);
        let board = dashboard.finish();
        tracing::debug!(workers = board.len(), "batch finished");
        results
    }

    /// Handle one worker result, asking the operator about failures.
    ///
    /// Returns whether the task ended up succeeding.
    fn settle(&mut self, task: &PlanTask, mut result: WorkerResult) -> Result<bool> {
        loop {
            if result.success {
                self.on_success(task, &result);
                self.settled.insert(&task.id);
                return Ok(true);
            }

            events::record(
                self.ctx,
                Event::new(EventAction::WorkerFailed, self.plan_id)
                    .with_task(&task.id)
                    .with_details(json!({
                        "exit_code": result.exit_code,
                        "turns": result.turns,
                        "cost": result.cost,
                    })),
            );

            let log = match write_failure_log(&self.config.failure_log_root(), self.plan_id, &result)
            {
                Ok(path) => path.display().to_string(),
                Err(e) => {
                    tracing::warn!(task = %task.id, error = %e, "failure log not written");
                    "(not written)".to_string()
                }
            };

            match self.operator.on_failure(task.short_id(), &task.subject, &log) {
                FailureChoice::Retry => {
                    events::record(
                        self.ctx,
                        Event::new(EventAction::Retry, self.plan_id).with_task(&task.id),
                    );
                    self.say(&format!("Retrying {}...", task.short_id()));
                    let dashboard = self.spawn_dashboard();
                    let progress = ProgressForwarder::start(dashboard.sender(), task);
                    let rerun = rerun_task(self.executor, task, &result.workspace, &mut |update| {
                        progress.update(update)
                    });
                    progress.finish(rerun.as_ref().is_ok_and(|r| r.success));
                    dashboard.finish();
                    match rerun {
                        Ok(rerun) => {
                            self.run_state.record_workspace(&rerun.workspace);
                            self.say(&batch_summary(std::slice::from_ref(&rerun)));
                            result = rerun;
                        }
                        Err(e) => {
                            self.say(&format!("  x {}: {}", task.short_id(), e));
                            return Ok(false);
                        }
                    }
                }
                FailureChoice::Skip => {
                    events::record(
                        self.ctx,
                        Event::new(EventAction::Skip, self.plan_id).with_task(&task.id),
                    );
                    self.settled.insert(&task.id);
                    self.say(&format!("Skipping {}.", task.short_id()));
                    return Ok(false);
                }
                FailureChoice::Stop => {
                    return Err(RadorchError::WorkerError(format!(
                        "task {} failed; orchestration stopped (log: {})",
                        task.short_id(),
                        log
                    )));
                }
            }
        }
    }

    fn on_success(&mut self, task: &PlanTask, result: &WorkerResult) {
        events::record(
            self.ctx,
            Event::new(EventAction::WorkerComplete, self.plan_id)
                .with_task(&task.id)
                .with_details(json!({
                    "turns": result.turns,
                    "cost": result.cost,
                    "commit": result.commit,
                })),
        );

        let Some(commit) = result.commit.as_deref() else {
            return;
        };
        self.run_state.record_commit(&task.id, commit);
        self.save_run_state();

        if !self.config.announce_done_signals {
            return;
        }
        if commit == self.base_commit {
            tracing::debug!(task = %task.id, "worker left no commit; DONE not posted");
            return;
        }
        if self.done_already_signaled(task) {
            return;
        }

        let signal = Signal::Done {
            task: task.short_id().to_string(),
            commit: commit.to_string(),
        }
        .to_string();
        match self.store.comment(self.plan_id, &signal) {
            Ok(()) => events::record(
                self.ctx,
                Event::new(EventAction::SignalPosted, self.plan_id)
                    .with_task(&task.id)
                    .with_details(json!({ "signal": signal })),
            ),
            Err(e) => {
                self.say(&format!("  ! {}: could not post DONE: {}", task.short_id(), e));
            }
        }
    }

    /// Whether the worker (or anyone) already posted `DONE` for the task.
    ///
    /// An unreadable plan counts as not signaled; a duplicate `DONE` is harmless.
    fn done_already_signaled(&self, task: &PlanTask) -> bool {
        self.store
            .show(self.plan_id)
            .map(|plan| SignalIndex::from_plan(&plan).done_commit(&task.id).is_some())
            .unwrap_or(false)
    }

    /// After a batch, warn about constraints touching the remaining tasks.
    fn surface_feedback(&mut self) {
        let Some(cli) = self.feedback else {
            return;
        };
        let Ok(state) = analyze(self.store, self.plan_id) else {
            return;
        };
        let feedback = cli.load(self.plan_id);
        if feedback.is_empty() {
            return;
        }

        let remaining: Vec<&PlanTask> = state
            .ready()
            .into_iter()
            .chain(state.blocked())
            .map(|t| &t.task)
            .collect();
        let warnings = constraint_warnings(&feedback, &remaining);
        let text = feedback_warnings(&warnings, &feedback);
        if !text.is_empty() {
            self.say(&text);
        }
    }

    fn complete(&mut self, state: &PlanState) -> Result<()> {
        let pending = state.worker_done().len();
        if !self.operator.confirm_completion(pending) {
            self.say("Completion skipped. Re-run to complete the plan later.");
            return Ok(());
        }

        self.say(&format!(
            "Merging {} task commit(s) and creating patch...",
            pending
        ));
        let coordinator = CompletionCoordinator {
            ctx: self.ctx,
            config: self.config,
            store: self.store,
            publisher: self.publisher,
        };
        let outcome = coordinator.complete(
            state,
            &self.run_state.worker_commits,
            &self.base_commit,
            &self.run_state.workspaces,
        )?;

        self.say(&format!("Patch created: {}", short_id(&outcome.patch_id)));
        for path in &outcome.unreleased {
            self.say(&format!("  ! worktree left in place: {}", path.display()));
        }
        self.say("Plan completed and announced.");
        RunState::clear(self.ctx, self.plan_id);
        Ok(())
    }
}

/// Mirrors one worker attempt onto the dashboard channel.
struct ProgressForwarder<'t> {
    sender: Sender<ProgressMessage>,
    task: &'t PlanTask,
}

impl<'t> ProgressForwarder<'t> {
    fn start(sender: Sender<ProgressMessage>, task: &'t PlanTask) -> Self {
        let _ = sender.send(ProgressMessage::Started {
            task_id: task.id.clone(),
            subject: task.subject.clone(),
        });
        Self { sender, task }
    }

    fn update(&self, update: ProgressUpdate) {
        let _ = self.sender.send(ProgressMessage::Update {
            task_id: self.task.id.clone(),
            update,
        });
    }

    fn finish(self, success: bool) {
        let _ = self.sender.send(ProgressMessage::Finished {
            task_id: self.task.id.clone(),
            success,
        });
    }
}
