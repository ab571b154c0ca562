//! Worker prompts.
//!
//! Each worker gets a one-line task prompt pointing it at the plan, plus the
//! agent's system prompt written to a private temp file.

use crate::error::{RadorchError, Result};
use crate::git_worktree::slugify;
use crate::plan::short_id;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// The prompt handed to a worker for one task.
pub fn task_prompt(plan_command: &str, plan_id: &str, task_id: &str) -> String {
    let plan = short_id(plan_id);
    format!(
        "Execute task {} from plan {}. Read the plan with: {} show {} --json",
        short_id(task_id),
        plan,
        plan_command,
        plan
    )
}

/// System prompt written to a private temp directory.
///
/// The file is readable only by the owner. The directory and file are removed
/// when the value is dropped, on every exit path of the worker run.
#[derive(Debug)]
pub struct SystemPromptFile {
    dir: TempDir,
    path: PathBuf,
}

impl SystemPromptFile {
    /// Write `prompt` for agent `name`.
    pub fn write(name: &str, prompt: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("radorch-prompt-")
            .tempdir()
            .map_err(|e| {
                RadorchError::WorkerError(format!("failed to create prompt directory: {}", e))
            })?;

        let slug = slugify(name);
        let file_name = if slug.is_empty() {
            "prompt.md".to_string()
        } else {
            format!("prompt-{}.md", slug)
        };
        let path = dir.path().join(file_name);

        write_private(&path, prompt).map_err(|e| {
            RadorchError::WorkerError(format!(
                "failed to write system prompt '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the file.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}
