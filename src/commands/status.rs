//! Implementation of the `radorch status` command.
//!
//! Analyzes the plan and prints the same report `orchestrate` shows before
//! each round, without dispatching anything.

use crate::cli::StatusArgs;
use crate::config::Config;
use crate::context::{Capabilities, RepoContext};
use crate::error::{RadorchError, Result};
use crate::events::{Event, plan_events};
use crate::feedback::{ContextCli, ContextFeedback};
use crate::plan::{PlanState, RadPlanCli, analyze, short_id};
use crate::report::dispatch_report;

/// Execute the `radorch status` command.
pub fn cmd_status(args: StatusArgs) -> Result<()> {
    let ctx = RepoContext::resolve()?;
    let config = Config::load_or_default(ctx.config_path());
    let caps = Capabilities::detect(&ctx, &config);
    caps.require_orchestration(&config)?;

    let store = RadPlanCli::new(&config.plan_command, &ctx.repo_root, config.command_timeout());
    let state = analyze(&store, &args.plan_id)?;

    let feedback = if caps.context_cli && !args.json {
        ContextCli::new(&config.context_command, &ctx.repo_root, config.command_timeout())
            .load(&args.plan_id)
    } else {
        Vec::new()
    };

    let mut out = render_status(&state, &feedback, args.json)?;
    if !args.json && args.tail > 0 {
        out.push_str(&recent_activity(&plan_events(&ctx, &args.plan_id, args.tail)));
    }
    print!("{}", out);
    Ok(())
}

fn recent_activity(events: &[Event]) -> String {
    if events.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n-- Recent Activity --\n");
    for event in events {
        out.push_str(&format!(
            "  {} {}",
            event.ts.format("%Y-%m-%d %H:%M:%S"),
            event.action
        ));
        if let Some(task) = &event.task {
            out.push_str(&format!(" {}", short_id(task)));
        }
        out.push_str(&format!(" ({})\n", event.actor));
    }
    out
}

fn render_status(state: &PlanState, feedback: &[ContextFeedback], json: bool) -> Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(state).map_err(|e| {
            RadorchError::UserError(format!("failed to serialize plan state: {}", e))
        })?;
        out.push('\n');
        return Ok(out);
    }
    Ok(dispatch_report(state, feedback))
}
