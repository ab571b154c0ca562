//! External command runner.
//!
//! Every collaborator CLI (git, the plan CLI, `rad`, the context CLI) is invoked
//! through [`run_command`], which captures stdout/stderr and enforces a timeout.
//! A non-zero exit is *not* an error here; callers decide what a failure means.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code (None if killed by a signal or by the timeout).
    pub code: Option<i32>,
    /// Standard output (trimmed).
    pub stdout: String,
    /// Standard error (trimmed).
    pub stderr: String,
    /// Whether the command was killed because it exceeded its timeout.
    pub timed_out: bool,
}

impl CommandOutput {
    /// Returns true if the command exited with code 0.
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    /// Stdout and stderr joined, for tools that report ids on either stream.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).trim().to_string()
    }

    /// The most useful diagnostic text: stderr if present, else stdout.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Run `program args...` in `cwd`, waiting at most `timeout`.
///
/// Returns `Err` only if the process could not be spawned.
pub fn run_command<P: AsRef<Path>>(
    program: &str,
    cwd: P,
    args: &[&str],
    timeout: Duration,
) -> io::Result<CommandOutput> {
    let mut child = Command::new(program)
        .current_dir(cwd.as_ref())
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let (code, timed_out) = wait_with_timeout(&mut child, timeout)?;

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(CommandOutput {
        code,
        stdout: stdout.trim().to_string(),
        stderr: stderr.trim().to_string(),
        timed_out,
    })
}

/// Check whether `program` resolves on PATH.
pub fn program_installed(program: &str) -> bool {
    let cwd = std::env::temp_dir();
    run_command("which", &cwd, &[program], Duration::from_secs(3))
        .map(|out| out.success())
        .unwrap_or(false)
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Wait for a child process with timeout.
///
/// Returns (exit_code, timed_out).
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<(Option<i32>, bool)> {
    let start = Instant::now();

    loop {
        match child.try_wait()? {
            Some(status) => return Ok((status.code(), false)),
            None => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok((None, true));
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}
