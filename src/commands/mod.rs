//! Command implementations for radorch.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod orchestrate;
mod status;

use crate::cli::Command;
use crate::error::Result;

use orchestrate::cmd_orchestrate;
use status::cmd_status;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Orchestrate(args) => cmd_orchestrate(args),
        Command::Status(args) => cmd_status(args),
    }
}
