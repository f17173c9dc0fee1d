//! Identity minting for new blocks and entries.
//!
//! Ids are the creation timestamp in milliseconds. Two ids requested in the
//! same millisecond would collide, so the last value handed out is tracked
//! process wide and the next id is always strictly greater.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_ID: AtomicU64 = AtomicU64::new(0);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Mint a fresh, process-unique, timestamp-derived identity.
pub fn next_entry_id() -> String {
    let now = now_ms();
    // fetch_update never fails with a closure that always returns Some.
    let prev = LAST_ID
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(prev + 1).to_string()
}
