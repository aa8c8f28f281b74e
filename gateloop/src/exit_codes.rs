//! Stable exit codes for gateloop CLI commands.

/// Every selected loop completed, or an informational command succeeded.
pub const OK: i32 = 0;
/// Fatal error, or a loop stopped exhausted or stuck.
pub const FAILURE: i32 = 1;
