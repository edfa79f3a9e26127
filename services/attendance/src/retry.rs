//! Bounded retry policy for conditional-write loops
//!
//! Every mutation against the remote store is a read → compute →
//! conditional-write loop. The loop re-reads and redoes its checks on each
//! version mismatch, and gives up after a small fixed number of attempts
//! rather than blocking indefinitely.

use std::time::Duration;

/// Maximum conditional-write attempts before surfacing `Busy`
pub const MAX_ATTEMPTS: u32 = 4;

/// Sleep before retry `attempt` (1-based), roughly doubling each time
pub async fn backoff(attempt: u32) {
    let millis = 25u64 << attempt.min(5);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
