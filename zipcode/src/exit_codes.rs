//! Stable exit codes for zipcode CLI commands.

/// Command succeeded; for `run`, the run ended `Succeeded`.
pub const OK: i32 = 0;
/// Invalid usage, configuration or workspace, or any other error.
pub const INVALID: i32 = 1;
/// `zipcode run` ended `Failed`.
pub const FAILED: i32 = 2;
/// `zipcode run` ended `Cancelled`.
pub const CANCELLED: i32 = 3;
