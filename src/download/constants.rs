//! Constants for the download module (timeouts, pacing).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for long videos).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Delay between media items of the same candidate.
pub const ITEM_DELAY: Duration = Duration::from_millis(500);

/// Delay between candidates.
pub const CANDIDATE_DELAY: Duration = Duration::from_millis(1000);
