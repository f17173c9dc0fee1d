//! Monotonic version stamps per block.
//!
//! Every `notify` takes a stamp from the shared counter. When the debounce
//! fires, the dispatch is admitted only if its stamp is newer than the last
//! stamp admitted for the same block. Two sessions editing the same block can
//! otherwise land their dispatches out of order and silently lose the newer
//! edit; with the gate the older one is rejected instead.

use core_model::BlockId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct VersionGate {
    counter: AtomicU64,
    admitted: Mutex<HashMap<BlockId, u64>>,
}

impl VersionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_stamp(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record `stamp` for `id` if it is newer than the last admitted one.
    pub fn admit(&self, id: &BlockId, stamp: u64) -> bool {
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        match admitted.get(id) {
            Some(&last) if stamp <= last => false,
            _ => {
                admitted.insert(id.clone(), stamp);
                true
            }
        }
    }

    pub fn last_admitted(&self, id: &BlockId) -> Option<u64> {
        self.admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }
}
