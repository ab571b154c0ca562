//! Worker process driver.
//!
//! Spawns one worker subprocess inside a task workspace, decodes its event
//! stream into progress updates, and folds the run into a [`WorkerResult`].
//! Every failure, including a spawn error, becomes an unsuccessful result;
//! nothing is thrown past the driver.

use super::cancel::CancelToken;
use super::stream::{ProgressUpdate, StreamDecoder};
use super::{TaskExecutor, WorkerResult};
use crate::agent::config::AgentConfig;
use crate::agent::prompt::{SystemPromptFile, task_prompt};
use crate::config::Config;
use crate::context::RepoContext;
use crate::error::Result;
use crate::git;
use crate::git_worktree::{create_task_workspace, teardown_task_workspace};
use crate::plan::PlanTask;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const READ_CHUNK: usize = 8192;

/// How to invoke the worker program.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    /// Leading arguments (output mode, non-interactive, no session).
    pub args: Vec<String>,
    /// Plan CLI named in the task prompt.
    pub plan_command: String,
    pub preview_chars: usize,
    /// Time between the graceful terminate and the forced kill.
    pub grace: Duration,
}

impl WorkerCommand {
    pub fn from_config(config: &Config) -> Result<Self> {
        let (program, args) = config.worker_invocation()?;
        Ok(Self {
            program,
            args,
            plan_command: config.plan_command.clone(),
            preview_chars: config.activity_preview_chars,
            grace: config.terminate_grace(),
        })
    }
}

/// Run one worker for `task` in `workspace`.
pub fn run_worker(
    command: &WorkerCommand,
    agent: &AgentConfig,
    workspace: &Path,
    plan_id: &str,
    task: &PlanTask,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(ProgressUpdate),
) -> WorkerResult {
    let mut result = WorkerResult {
        task_id: task.id.clone(),
        task_subject: task.subject.clone(),
        success: false,
        exit_code: None,
        stderr: String::new(),
        workspace: workspace.to_path_buf(),
        turns: 0,
        cost: 0.0,
        commit: None,
    };

    // Dropped on every return below, which removes the file.
    let prompt_file = if agent.system_prompt.trim().is_empty() {
        None
    } else {
        match SystemPromptFile::write(&agent.name, &agent.system_prompt) {
            Ok(file) => Some(file),
            Err(e) => {
                result.stderr = e.to_string();
                return result;
            }
        }
    };

    let mut args: Vec<String> = command.args.clone();
    args.extend(agent.selection_args());
    if let Some(file) = &prompt_file {
        args.push("--append-system-prompt".to_string());
        args.push(file.path().to_string_lossy().into_owned());
    }
    args.push(task_prompt(&command.plan_command, plan_id, &task.id));

    let mut cmd = Command::new(&command.program);
    cmd.args(&args)
        .current_dir(workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        // Own process group: a terminal Ctrl-C must not reach workers directly.
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            result.stderr = format!("failed to execute worker '{}': {}", command.program, e);
            return result;
        }
    };
    tracing::debug!(task = %task.id, pid = child.id(), "worker spawned");

    let chunks = child.stdout.take().map(spawn_stdout_reader);
    let stderr_text = child.stderr.take().map(spawn_stderr_reader);
    let child = Mutex::new(child);
    let finished = AtomicBool::new(false);
    let cancelled = AtomicBool::new(false);
    let mut decoder = StreamDecoder::new(command.preview_chars);
    let mut emit =
        |updates: Vec<ProgressUpdate>| updates.into_iter().for_each(&mut *on_progress);

    let status = thread::scope(|scope| {
        let watcher =
            scope.spawn(|| watch_for_cancel(&child, cancel, &finished, &cancelled, command.grace));
        let status =
            pump_until_exit(&child, chunks.as_ref(), |chunk| emit(decoder.feed(chunk)));
        finished.store(true, Ordering::SeqCst);
        let _ = watcher.join();
        status
    });

    // Helpers the worker left behind may still hold its pipes open.
    let mut stragglers = false;
    if let Some(chunks) = &chunks {
        let deadline = Instant::now() + command.grace;
        loop {
            match chunks.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(chunk) => emit(decoder.feed(&chunk)),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    stragglers = true;
                    break;
                }
            }
        }
    }
    if stragglers {
        tracing::debug!(
            task = %task.id,
            "worker exited with its output still open, killing leftovers"
        );
        force_kill(&mut child.lock().unwrap_or_else(|e| e.into_inner()));
    }
    emit(decoder.finish());
    let stderr_text = stderr_text
        .and_then(|rx| rx.recv_timeout(command.grace).ok())
        .unwrap_or_default();

    result.turns = decoder.turns();
    result.cost = decoder.cost();
    result.stderr = stderr_text;
    result.exit_code = status.as_ref().and_then(ExitStatus::code);

    let was_cancelled = cancelled.load(Ordering::SeqCst) || cancel.is_cancelled();
    result.success = result.exit_code == Some(0) && !was_cancelled;
    if was_cancelled && result.stderr.is_empty() {
        result.stderr = "worker cancelled".to_string();
    }

    if result.success {
        // The workspace may have been removed concurrently; a missing commit is tolerated.
        result.commit = git::head_sha(workspace).ok();
    }

    drop(prompt_file);
    result
}

/// Forward stdout chunks from a detached thread until EOF.
///
/// Detached so a pipe held open by a leftover helper never blocks the run.
fn spawn_stdout_reader(mut pipe: ChildStdout) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "worker stdout read failed");
                    break;
                }
            }
        }
    });
    rx
}

fn spawn_stderr_reader(mut pipe: ChildStderr) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Feed stdout chunks to `on_chunk` until the worker exits.
///
/// Returns `None` if its status cannot be read.
fn pump_until_exit(
    child: &Mutex<Child>,
    chunks: Option<&Receiver<Vec<u8>>>,
    mut on_chunk: impl FnMut(&[u8]),
) -> Option<ExitStatus> {
    let mut open = chunks.is_some();
    loop {
        match chunks.filter(|_| open).map(|rx| rx.recv_timeout(POLL_INTERVAL)) {
            Some(Ok(chunk)) => on_chunk(&chunk),
            Some(Err(RecvTimeoutError::Timeout)) => {}
            Some(Err(RecvTimeoutError::Disconnected)) => open = false,
            None => thread::sleep(POLL_INTERVAL),
        }

        let polled = {
            let mut guard = child.lock().unwrap_or_else(|e| e.into_inner());
            guard.try_wait()
        };
        match polled {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to read worker exit status");
                return None;
            }
        }
    }
}

/// Terminate the worker once `cancel` trips: SIGTERM first, SIGKILL after `grace`.
fn watch_for_cancel(
    child: &Mutex<Child>,
    cancel: &CancelToken,
    finished: &AtomicBool,
    cancelled: &AtomicBool,
    grace: Duration,
) {
    while !finished.load(Ordering::SeqCst) {
        if !cancel.is_cancelled() {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        cancelled.store(true, Ordering::SeqCst);
        {
            let mut guard = child.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(guard.try_wait(), Ok(Some(_))) {
                return;
            }
            terminate(&mut guard);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if finished.load(Ordering::SeqCst) {
                return;
            }
            let exited = {
                let mut guard = child.lock().unwrap_or_else(|e| e.into_inner());
                matches!(guard.try_wait(), Ok(Some(_)))
            };
            if exited {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }

        let mut guard = child.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(guard.try_wait(), Ok(Some(_))) {
            tracing::debug!(pid = guard.id(), "worker ignored SIGTERM, killing");
            force_kill(&mut guard);
        }
        return;
    }
}

/// Signal the worker's process group, which also reaches its children.
#[cfg(unix)]
fn signal_group(child: &Child, signal: nix::sys::signal::Signal) -> nix::Result<()> {
    use nix::unistd::Pid;

    nix::sys::signal::killpg(Pid::from_raw(child.id() as i32), signal)
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    if let Err(e) = signal_group(child, nix::sys::signal::Signal::SIGTERM) {
        tracing::debug!(error = %e, "SIGTERM failed, killing worker");
        force_kill(child);
    }
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    if signal_group(child, nix::sys::signal::Signal::SIGKILL).is_err() {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    let _ = child.kill();
}

/// [`TaskExecutor`] running real workers in git worktrees.
#[derive(Debug, Clone)]
pub struct WorktreeExecutor {
    pub ctx: RepoContext,
    pub command: WorkerCommand,
    pub agent: AgentConfig,
    pub plan_id: String,
    /// Commit every workspace starts from.
    pub base_commit: String,
    pub cancel: CancelToken,
}

impl TaskExecutor for WorktreeExecutor {
    fn prepare(&self, task: &PlanTask) -> Result<PathBuf> {
        create_task_workspace(&self.ctx, &task.id, &task.subject, &self.base_commit)
    }

    fn teardown(&self, task: &PlanTask, workspace: &Path) {
        teardown_task_workspace(&self.ctx.repo_root, &task.id, workspace);
    }

    fn run(
        &self,
        task: &PlanTask,
        workspace: &Path,
        on_progress: &mut dyn FnMut(ProgressUpdate),
    ) -> WorkerResult {
        run_worker(
            &self.command,
            &self.agent,
            workspace,
            &self.plan_id,
            task,
            &self.cancel,
            on_progress,
        )
    }
}
