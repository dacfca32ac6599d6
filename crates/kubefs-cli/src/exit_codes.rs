//! Process exit codes for the mount CLI.
//!
//! Follows the contract in the mount CLI spec: 0 on success, 1 on bad
//! options, any other non-zero on mount failure.

/// Success - mounted and later unmounted cleanly.
pub const SUCCESS: i32 = 0;

/// Option error - invalid CLI flags or environment configuration.
pub const OPTION_ERROR: i32 = 1;

/// Mount failure - discovery, client construction or the FUSE mount call
/// itself failed.
pub const MOUNT_ERROR: i32 = 2;
