//! Worker agents.
//!
//! - **Config**: the agent definition file (frontmatter plus system prompt)
//! - **Prompt**: the task prompt and the private system-prompt file
//! - **Dispatch**: worker subprocesses, stream decoding, the bounded pool
//!
//! Workers are separate processes. They talk to the orchestrator only through
//! their stdout event stream, their stderr, and the commits they leave in
//! their workspace.

mod config;
pub mod dispatch;
pub mod prompt;

pub use config::AgentConfig;
pub use dispatch::{
    CancelToken, ProgressUpdate, TaskExecutor, WorkerCommand, WorkerResult, WorktreeExecutor,
    dispatch,
};
