//! Plan record model and analysis.
//!
//! A plan is read from the collaboration backend as JSON, scanned for
//! coordination signals in its discussion thread, and classified into a
//! [`PlanState`] that tells the orchestrator which tasks can run next.
//!
//! - **Model**: typed plan snapshot and task id helpers
//! - **Store**: the plan CLI boundary (query and mutations)
//! - **Signals**: the `CLAIM`/`DONE`/`SIGNAL`/`REJECTED` line protocol
//! - **Analyzer**: readiness classification

mod analyzer;
mod model;
mod signals;
mod store;


pub use analyzer::{ClassifiedTask, PlanState, TaskState, analyze, analyze_plan, effective_files};
pub use model::{
    Comment, CommentEdit, Plan, PlanStatus, PlanTask, SHORT_ID_LEN, TaskIdSet, Thread, short_id,
};
pub use signals::{Signal, SignalIndex};
pub use store::{PlanStore, RadPlanCli};
