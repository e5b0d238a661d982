//! Process-wide sequence numbering.
//!
//! Every message received on any session draws its number from one shared
//! counter. Values are handed out exactly once and in order, no matter how
//! the sessions interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonically increasing message counter shared by all sessions.
///
/// Starts at zero, so the first message in the process is numbered 1.
/// Never reset for the lifetime of the process.
pub struct SequenceCounter {
    value: AtomicU64,
}

impl SequenceCounter {
    /// Create a new counter starting at zero.
    pub fn new() -> Arc<Self> {
        Arc::new(SequenceCounter {
            value: AtomicU64::new(0),
        })
    }

    /// Atomically increment the counter and return the new value.
    pub fn increment_and_get(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of messages numbered so far.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}
