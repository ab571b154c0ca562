//! CLI argument parsing for radorch.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// radorch: dispatch coding agents across git worktrees to execute a Radicle plan.
///
/// Tasks are read from a plan record, classified by dependencies, claims and
/// file conflicts, and run in parallel, one worker per isolated worktree.
/// Once every task is done, the work is folded into a single patch.
#[derive(Parser, Debug)]
#[command(name = "radorch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for radorch.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dispatch workers for a plan until it is complete or stopped.
    ///
    /// Each round analyzes the plan, prints the dispatch report, asks which
    /// ready tasks to run, and runs them with live progress. When every task
    /// is done, replays the commits onto one branch and publishes a patch.
    Orchestrate(OrchestrateArgs),

    /// Show the dispatch report for a plan without dispatching anything.
    Status(StatusArgs),
}

/// Arguments for the `orchestrate` command.
#[derive(Parser, Debug)]
pub struct OrchestrateArgs {
    /// Plan id (full or short form).
    pub plan_id: String,

    /// Maximum workers running at once (overrides `max_concurrency`).
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Answer every prompt automatically: approve, dispatch all, skip failures.
    #[arg(short, long)]
    pub yes: bool,

    /// Keep polling while tasks are in progress elsewhere instead of exiting.
    #[arg(long)]
    pub wait: bool,

    /// Agent definition file (overrides `agent_file`).
    #[arg(long)]
    pub agent: Option<PathBuf>,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Plan id (full or short form).
    pub plan_id: String,

    /// Print the classification as JSON.
    #[arg(long)]
    pub json: bool,

    /// Show the last N audit events for the plan (0 disables).
    #[arg(long, default_value_t = 5)]
    pub tail: usize,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_orchestrate_minimal() {
        let cli = Cli::try_parse_from(["radorch", "orchestrate", "abc1234"]).unwrap();
        let Command::Orchestrate(args) = cli.command else {
            panic!("Expected Orchestrate command");
        };
        assert_eq!(args.plan_id, "abc1234");
        assert_eq!(args.concurrency, None);
        assert!(!args.yes);
        assert!(!args.wait);
        assert!(args.agent.is_none());
    }

    #[test]
    fn parse_orchestrate_full() {
        let cli = Cli::try_parse_from([
            "radorch",
            "orchestrate",
            "abc1234",
            "--concurrency",
            "2",
            "--yes",
            "--wait",
            "--agent",
            "agents/worker.md",
        ])
        .unwrap();
        let Command::Orchestrate(args) = cli.command else {
            panic!("Expected Orchestrate command");
        };
        assert_eq!(args.concurrency, Some(2));
        assert!(args.yes);
        assert!(args.wait);
        assert_eq!(args.agent, Some(PathBuf::from("agents/worker.md")));
    }

    #[test]
    fn parse_status_json() {
        let cli = Cli::try_parse_from(["radorch", "status", "abc1234", "--json"]).unwrap();
        let Command::Status(args) = cli.command else {
            panic!("Expected Status command");
        };
        assert_eq!(args.plan_id, "abc1234");
        assert!(args.json);
        assert_eq!(args.tail, 5);
    }

    #[test]
    fn orchestrate_requires_plan_id() {
        assert!(Cli::try_parse_from(["radorch", "orchestrate"]).is_err());
    }
}
