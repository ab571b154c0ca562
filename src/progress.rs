//! Live worker progress.
//!
//! Drivers never touch shared state. Each one sends [`ProgressMessage`]s over
//! a channel; a single aggregator thread owns the [`ProgressBoard`] and
//! renders it every `dashboard_interval_ms` while anything changed.

use crate::agent::ProgressUpdate;
use crate::agent::dispatch::truncate_chars;
use crate::plan::short_id;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SUBJECT_WIDTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Starting,
    Running,
    Done,
    Failed,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Done => "done",
            WorkerStatus::Failed => "failed",
        }
    }
}

/// Live state of one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerProgress {
    pub subject: String,
    pub status: WorkerStatus,
    pub turns: u32,
    pub cost: f64,
    pub current_tool: Option<String>,
    pub last_activity: Option<String>,
    pub started: Instant,
}

impl WorkerProgress {
    fn new(subject: String) -> Self {
        Self {
            subject,
            status: WorkerStatus::Starting,
            turns: 0,
            cost: 0.0,
            current_tool: None,
            last_activity: None,
            started: Instant::now(),
        }
    }

    fn apply(&mut self, update: ProgressUpdate) {
        if self.status == WorkerStatus::Starting {
            self.status = WorkerStatus::Running;
        }
        match update {
            ProgressUpdate::ToolStarted { tool, activity } => {
                self.current_tool = Some(tool);
                if activity.is_some() {
                    self.last_activity = activity;
                }
            }
            ProgressUpdate::ToolFinished => self.current_tool = None,
            ProgressUpdate::TurnCompleted { turns, cost } => {
                self.turns = turns;
                self.cost = cost;
                self.status = WorkerStatus::Running;
            }
            ProgressUpdate::Activity(text) => self.last_activity = Some(text),
        }
    }
}

/// Message from a driver to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    Started { task_id: String, subject: String },
    Update { task_id: String, update: ProgressUpdate },
    Finished { task_id: String, success: bool },
}

/// Per-task progress, in dispatch order.
#[derive(Debug, Default)]
pub struct ProgressBoard {
    order: Vec<String>,
    workers: HashMap<String, WorkerProgress>,
}

impl ProgressBoard {
    pub fn apply(&mut self, message: ProgressMessage) {
        match message {
            ProgressMessage::Started { task_id, subject } => {
                if !self.workers.contains_key(&task_id) {
                    self.order.push(task_id.clone());
                }
                self.workers.insert(task_id, WorkerProgress::new(subject));
            }
            ProgressMessage::Update { task_id, update } => {
                if let Some(worker) = self.workers.get_mut(&task_id) {
                    worker.apply(update);
                }
            }
            ProgressMessage::Finished { task_id, success } => {
                if let Some(worker) = self.workers.get_mut(&task_id) {
                    worker.status = if success {
                        WorkerStatus::Done
                    } else {
                        WorkerStatus::Failed
                    };
                    worker.current_tool = None;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn count(&self, status: WorkerStatus) -> usize {
        self.workers.values().filter(|w| w.status == status).count()
    }

    /// Render a snapshot as of `now`.
    pub fn render(&self, now: Instant) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Workers: {} running, {} starting, {} done, {} failed",
            self.count(WorkerStatus::Running),
            self.count(WorkerStatus::Starting),
            self.count(WorkerStatus::Done),
            self.count(WorkerStatus::Failed),
        );

        for task_id in &self.order {
            let Some(w) = self.workers.get(task_id) else {
                continue;
            };
            let elapsed = now.saturating_duration_since(w.started);
            let _ = write!(
                out,
                "  {}  {:<8}  {:<width$}  {:>3} turns  ${:.4}  {}",
                short_id(task_id),
                w.status.as_str(),
                truncate_chars(&w.subject, SUBJECT_WIDTH),
                w.turns,
                w.cost,
                format_elapsed(elapsed),
                width = SUBJECT_WIDTH,
            );
            if let Some(tool) = &w.current_tool {
                let _ = write!(out, "  [{}]", tool);
            }
            if let Some(activity) = &w.last_activity {
                let _ = write!(out, "  {}", activity);
            }
            out.push('\n');
        }
        out
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// Running aggregator thread.
pub struct Dashboard {
    sender: Sender<ProgressMessage>,
    handle: JoinHandle<ProgressBoard>,
}

impl Dashboard {
    /// Start the aggregator, rendering to `out` every `interval`.
    pub fn spawn(interval: Duration, mut out: Box<dyn Write + Send>) -> Self {
        let (sender, receiver) = mpsc::channel::<ProgressMessage>();

        let handle = thread::spawn(move || {
            let mut board = ProgressBoard::default();
            let mut dirty = false;
            let mut next_render = Instant::now() + interval;

            loop {
                let wait = next_render.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(wait) {
                    Ok(message) => {
                        board.apply(message);
                        dirty = true;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if Instant::now() >= next_render {
                    if dirty {
                        let _ = out.write_all(board.render(Instant::now()).as_bytes());
                        let _ = out.flush();
                        dirty = false;
                    }
                    next_render = Instant::now() + interval;
                }
            }

            if dirty && !board.is_empty() {
                let _ = out.write_all(board.render(Instant::now()).as_bytes());
                let _ = out.flush();
            }
            board
        });

        Self { sender, handle }
    }

    /// A handle for one driver.
    pub fn sender(&self) -> Sender<ProgressMessage> {
        self.sender.clone()
    }

    /// Stop the aggregator once every driver sender is gone and return the final board.
    pub fn finish(self) -> ProgressBoard {
        drop(self.sender);
        self.handle.join().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn started(id: &str) -> ProgressMessage {
        ProgressMessage::Started {
            task_id: id.to_string(),
            subject: format!("Task {}", id),
        }
    }

    fn update(id: &str, update: ProgressUpdate) -> ProgressMessage {
        ProgressMessage::Update {
            task_id: id.to_string(),
            update,
        }
    }

    #[test]
    fn test_updates_drive_worker_state() {
        let mut board = ProgressBoard::default();
        board.apply(started("abcdef123"));
        assert_eq!(board.workers.get("abcdef123").unwrap().status, WorkerStatus::Starting);

        board.apply(update(
            "abcdef123",
            ProgressUpdate::ToolStarted {
                tool: "bash".to_string(),
                activity: Some("$ ls".to_string()),
            },
        ));
        board.apply(update(
            "abcdef123",
            ProgressUpdate::TurnCompleted { turns: 2, cost: 0.5 },
        ));
        let w = board.workers.get("abcdef123").unwrap();
        assert_eq!(w.status, WorkerStatus::Running);
        assert_eq!(w.current_tool.as_deref(), Some("bash"));
        assert_eq!(w.last_activity.as_deref(), Some("$ ls"));
        assert_eq!((w.turns, w.cost), (2, 0.5));

        board.apply(update("abcdef123", ProgressUpdate::ToolFinished));
        board.apply(update("abcdef123", ProgressUpdate::Activity("done".to_string())));
        let w = board.workers.get("abcdef123").unwrap();
        assert!(w.current_tool.is_none());
        assert_eq!(w.last_activity.as_deref(), Some("done"));

        board.apply(ProgressMessage::Finished {
            task_id: "abcdef123".to_string(),
            success: false,
        });
        assert_eq!(board.workers.get("abcdef123").unwrap().status, WorkerStatus::Failed);
    }

    #[test]
    fn test_updates_for_unknown_tasks_are_ignored() {
        let mut board = ProgressBoard::default();
        board.apply(update("nobody", ProgressUpdate::ToolFinished));
        assert!(board.is_empty());
    }

    #[test]
    fn test_render_lists_tasks_in_dispatch_order() {
        let mut board = ProgressBoard::default();
        board.apply(started("bbbbbbb999"));
        board.apply(started("aaaaaaa111"));
        board.apply(ProgressMessage::Finished {
            task_id: "bbbbbbb999".to_string(),
            success: true,
        });

        let text = board.render(Instant::now());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Workers: 0 running, 1 starting, 1 done, 0 failed");
        assert!(lines[1].contains("bbbbbbb") && lines[1].contains("done"));
        assert!(lines[2].contains("aaaaaaa") && lines[2].contains("starting"));
        assert!(lines[1].contains("$0.0000"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(7)), "7s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m05s");
    }

    #[test]
    fn test_dashboard_aggregates_messages_from_many_senders() {
        let buffer = SharedBuffer::default();
        let dashboard = Dashboard::spawn(Duration::from_millis(10), Box::new(buffer.clone()));

        let handles: Vec<_> = ["t1aaaaaa", "t2bbbbbb", "t3cccccc"]
            .into_iter()
            .map(|id| {
                let sender = dashboard.sender();
                thread::spawn(move || {
                    sender.send(started(id)).unwrap();
                    sender
                        .send(update(id, ProgressUpdate::TurnCompleted { turns: 1, cost: 0.25 }))
                        .unwrap();
                    sender
                        .send(ProgressMessage::Finished {
                            task_id: id.to_string(),
                            success: true,
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let board = dashboard.finish();
        assert_eq!(board.len(), 3);
        assert!(board.workers.values().all(|w| w.status == WorkerStatus::Done && w.turns == 1));

        let rendered = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(rendered.contains("3 done"));
    }
}
