//! Exit code constants for the radorch CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, missing agent file, not a Radicle repo)
//! - 2: Plan record failure (unreachable, unparseable, mutation rejected)
//! - 3: Git / workspace failure
//! - 4: Worker failure that stopped the run
//! - 5: Merge failure during completion

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or an environment that cannot run the orchestrator.
pub const USER_ERROR: i32 = 1;

/// Plan record could not be loaded or updated.
pub const PLAN_FAILURE: i32 = 2;

/// Git operation failure: worktree, branch, cherry-pick, push.
pub const GIT_FAILURE: i32 = 3;

/// A worker failed and the operator stopped the run.
pub const WORKER_FAILURE: i32 = 4;

/// Completion could not fold worker commits into the integration branch.
pub const MERGE_FAILURE: i32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            PLAN_FAILURE,
            GIT_FAILURE,
            WORKER_FAILURE,
            MERGE_FAILURE,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
