//! Operator decisions.
//!
//! The control loop asks an [`Operator`] at every decision point. The terminal
//! implementation prints numbered choices; `--yes` swaps in [`AutoOperator`],
//! which approves, dispatches everything, and skips failed tasks.

use std::io::{BufRead, Write};

/// How much of the ready set to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchChoice {
    All,
    One,
    Stop,
}

/// What to do with a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureChoice {
    Retry,
    Skip,
    Stop,
}

pub trait Operator {
    /// The plan is not approved; approve it and continue?
    fn approve_plan(&mut self, title: &str, status: &str) -> bool;

    /// `ready` tasks can be dispatched.
    fn choose_batch(&mut self, ready: usize) -> BatchChoice;

    /// A worker failed; its log is at `log_path`.
    fn on_failure(&mut self, task: &str, subject: &str, log_path: &str) -> FailureChoice;

    /// Every task is resolved; fold the work into one change set?
    fn confirm_completion(&mut self, resolved: usize) -> bool;
}

/// Non-interactive operator for `--yes`.
#[derive(Debug, Default)]
pub struct AutoOperator;

impl Operator for AutoOperator {
    fn approve_plan(&mut self, _title: &str, _status: &str) -> bool {
        true
    }

    fn choose_batch(&mut self, _ready: usize) -> BatchChoice {
        BatchChoice::All
    }

    fn on_failure(&mut self, task: &str, _subject: &str, log_path: &str) -> FailureChoice {
        tracing::info!(task, log = log_path, "skipping failed task");
        FailureChoice::Skip
    }

    fn confirm_completion(&mut self, _resolved: usize) -> bool {
        true
    }
}

/// Numbered prompts over a reader and a writer.
///
/// End of input answers every prompt with its most conservative option.
pub struct TerminalOperator<R, W> {
    input: R,
    output: W,
}

impl TerminalOperator<std::io::StdinLock<'static>, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    /// Ask until a valid 1-based choice is entered. `None` at end of input.
    fn select(&mut self, title: &str, options: &[&str]) -> Option<usize> {
        loop {
            let _ = writeln!(self.output, "{}", title);
            for (i, option) in options.iter().enumerate() {
                let _ = writeln!(self.output, "  {}) {}", i + 1, option);
            }
            let _ = write!(self.output, "> ");
            let _ = self.output.flush();

            let line = self.read_line()?;
            match line.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Some(n - 1),
                _ => {
                    let _ = writeln!(self.output, "Enter a number between 1 and {}.", options.len());
                }
            }
        }
    }

    fn confirm(&mut self, question: &str) -> bool {
        let _ = write!(self.output, "{} [y/N] ", question);
        let _ = self.output.flush();
        matches!(
            self.read_line().map(|l| l.to_lowercase()).as_deref(),
            Some("y") | Some("yes")
        )
    }
}

impl<R: BufRead, W: Write> Operator for TerminalOperator<R, W> {
    fn approve_plan(&mut self, title: &str, status: &str) -> bool {
        self.confirm(&format!(
            "Plan \"{}\" has status \"{}\". Approve and proceed?",
            title, status
        ))
    }

    fn choose_batch(&mut self, ready: usize) -> BatchChoice {
        let all = format!("Dispatch all ({})", ready);
        let options = [all.as_str(), "Dispatch one", "Stop orchestration"];
        match self.select(&format!("{} task(s) ready for dispatch", ready), &options) {
            Some(0) => BatchChoice::All,
            Some(1) => BatchChoice::One,
            _ => BatchChoice::Stop,
        }
    }

    fn on_failure(&mut self, task: &str, subject: &str, log_path: &str) -> FailureChoice {
        let title = format!("Task {} ({}) failed. Log: {}", task, subject, log_path);
        let options = ["Retry", "Skip (continue with next batch)", "Stop orchestration"];
        match self.select(&title, &options) {
            Some(0) => FailureChoice::Retry,
            Some(1) => FailureChoice::Skip,
            _ => FailureChoice::Stop,
        }
    }

    fn confirm_completion(&mut self, resolved: usize) -> bool {
        self.confirm(&format!(
            "All tasks complete. Merge {} task commit(s), create a patch, and close the plan?",
            resolved
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn operator(input: &str) -> TerminalOperator<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalOperator::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_choose_batch_options() {
        assert_eq!(operator("1\n").choose_batch(3), BatchChoice::All);
        assert_eq!(operator("2\n").choose_batch(3), BatchChoice::One);
        assert_eq!(operator("3\n").choose_batch(3), BatchChoice::Stop);
    }

    #[test]
    fn test_invalid_choice_is_asked_again() {
        let mut op = operator("9\nabc\n2\n");
        assert_eq!(op.choose_batch(2), BatchChoice::One);
        let shown = String::from_utf8(op.output.clone()).unwrap();
        assert_eq!(shown.matches("Dispatch all (2)").count(), 3);
        assert!(shown.contains("Enter a number between 1 and 3."));
    }

    #[test]
    fn test_end_of_input_is_conservative() {
        assert_eq!(operator("").choose_batch(1), BatchChoice::Stop);
        assert_eq!(operator("").on_failure("a", "b", "/l"), FailureChoice::Stop);
        assert!(!operator("").approve_plan("t", "draft"));
        assert!(!operator("").confirm_completion(2));
    }

    #[test]
    fn test_failure_choices() {
        assert_eq!(operator("1\n").on_failure("a", "b", "/l"), FailureChoice::Retry);
        assert_eq!(operator("2\n").on_failure("a", "b", "/l"), FailureChoice::Skip);
    }

    #[test]
    fn test_confirm_accepts_yes_forms() {
        assert!(operator("y\n").approve_plan("t", "draft"));
        assert!(operator("YES\n").confirm_completion(1));
        assert!(!operator("n\n").confirm_completion(1));
    }

    #[test]
    fn test_auto_operator() {
        let mut op = AutoOperator;
        assert!(op.approve_plan("t", "draft"));
        assert_eq!(op.choose_batch(5), BatchChoice::All);
        assert_eq!(op.on_failure("a", "b", "/l"), FailureChoice::Skip);
        assert!(op.confirm_completion(5));
    }
}
