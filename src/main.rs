//! radorch: multi-agent dispatch orchestrator for Radicle plans.
//!
//! This is the main entry point for the `radorch` CLI. It parses arguments,
//! sets up diagnostics, dispatches to the appropriate command handler, and
//! handles errors with proper exit codes.

mod agent;
mod cli;
mod commands;
mod completion;
mod config;
mod context;
mod error;
mod events;
mod exec;
mod exit_codes;
mod feedback;
mod fs;
mod git;
mod git_worktree;
mod operator;
mod plan;
mod progress;
mod report;
mod retry;
mod run_state;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Diagnostics filter from `RADORCH_LOG`, then `RUST_LOG`, defaulting to `warn`.
fn init_tracing() {
    let filter = std::env::var("RADORCH_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing();
    agent::dispatch::install_interrupt_handler();

    match commands::dispatch(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
