//! Build-time constants for finitd.

/// Program name used in usage text and syslog tagging.
pub const PROGRAM: &str = "finitd";
/// Fallback max-fd value when `SC_OPEN_MAX` cannot be queried (spec.md §4.3).
pub const FALLBACK_MAX_FD: i32 = 256;
