//! Stable exit codes for the agent CLI.

/// Command succeeded; for `agent run` the build passed.
pub const OK: i32 = 0;
/// Missing credential/configuration, or the pipeline halted before a report.
pub const FAILURE: i32 = 1;
/// `agent run` applied the patch but the build failed (report still written).
pub const BUILD_FAILED: i32 = 2;
