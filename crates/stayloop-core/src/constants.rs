//! Application-wide constants
//!
//! Centralized location for timing values and defaults that are used
//! across multiple modules.

/// Typing indicator expiry window in milliseconds. Each incoming signal
/// resets the deadline; the indicator drops when it elapses unrefreshed.
pub const TYPING_EXPIRY_MS: u64 = 3_000;

/// First reconnect delay after a dropped push channel.
pub const RECONNECT_BASE_DELAY_MS: u64 = 500;

/// Upper bound on the exponential reconnect delay.
pub const RECONNECT_MAX_DELAY_MS: u64 = 10_000;

/// Consecutive failed reconnect attempts before a channel degrades to
/// fetch-only polling.
pub const RECONNECT_ATTEMPTS: u32 = 5;

/// Poll interval once a channel has degraded to fetch-only mode.
pub const DEGRADED_POLL_INTERVAL_MS: u64 = 15_000;

/// Maximum characters kept in a directory preview line.
pub const PREVIEW_MAX_CHARS: usize = 80;
