//! Trailing-edge debounced merge + dispatch for one block.
//!
//! Contract:
//! - `notify(snapshot)` replaces whatever dispatch is pending with one that
//!   fires after the quiet interval and carries `snapshot`. The leading edge is
//!   dropped; intermediate snapshots are never queued.
//! - When the timer fires, the store's *current* document is read, the
//!   snapshot merged into it by block identity, and the result dispatched.
//!   Reading at fire time means a sibling block updated by another editor in
//!   the meantime is never overwritten with a stale copy.
//! - `dispose` cancels the pending dispatch. Nothing dispatches afterwards.
//!
//! Each pending dispatch carries a generation number. A timer task only
//! dispatches if the pending slot still holds its generation, so a timer that
//! was already woken when it got superseded (or disposed) does nothing.

use core_config::Config;
use core_model::{BlockId, BlockPayload, merge, upsert};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::SyncError;
use crate::gate::VersionGate;
use crate::store::PreviewStore;

/// Engine knobs, normally derived from the loaded configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub debounce: Duration,
    pub append_on_missing: bool,
    pub reject_stale: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SyncOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            debounce: cfg.debounce(),
            append_on_missing: cfg.file.merge.append_on_missing,
            reject_stale: cfg.file.merge.reject_stale,
        }
    }
}

#[derive(Debug, Default)]
pub struct PropagatorMetrics {
    notifies: AtomicU64,
    coalesced: AtomicU64,
    dispatched: AtomicU64,
    unchanged: AtomicU64,
    flushed: AtomicU64,
    cancelled: AtomicU64,
    stale_rejected: AtomicU64,
    missing_target: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropagatorMetricsSnapshot {
    pub notifies: u64,
    /// Pending dispatches superseded by a later notify.
    pub coalesced: u64,
    pub dispatched: u64,
    /// Dispatches whose merge left the block list as it was.
    pub unchanged: u64,
    /// Dispatches forced early through `flush`.
    pub flushed: u64,
    /// Pending dispatches dropped by `dispose`.
    pub cancelled: u64,
    pub stale_rejected: u64,
    pub missing_target: u64,
}

impl PropagatorMetrics {
    pub fn snapshot(&self) -> PropagatorMetricsSnapshot {
        PropagatorMetricsSnapshot {
            notifies: self.notifies.load(Relaxed),
            coalesced: self.coalesced.load(Relaxed),
            dispatched: self.dispatched.load(Relaxed),
            unchanged: self.unchanged.load(Relaxed),
            flushed: self.flushed.load(Relaxed),
            cancelled: self.cancelled.load(Relaxed),
            stale_rejected: self.stale_rejected.load(Relaxed),
            missing_target: self.missing_target.load(Relaxed),
        }
    }
}

struct Pending {
    generation: u64,
    stamp: u64,
    snapshot: BlockPayload,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    pending: Option<Pending>,
    disposed: bool,
}

struct Shared<S> {
    block_id: BlockId,
    options: SyncOptions,
    store: Arc<S>,
    gate: Arc<VersionGate>,
    slot: Mutex<Slot>,
    metrics: PropagatorMetrics,
}

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    Stale,
    MissingTarget,
}

impl<S: PreviewStore> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, generation: u64) {
        let pending = {
            let mut slot = self.lock();
            let current = slot.pending.as_ref().map(|p| p.generation);
            if current == Some(generation) {
                slot.pending.take()
            } else {
                None
            }
        };
        match pending {
            Some(p) => {
                self.dispatch(p.stamp, p.snapshot, "timer");
            }
            None => {
                trace!(target: "sync.propagator", id = %self.block_id, generation, "timer_superseded");
            }
        }
    }

    fn dispatch(&self, stamp: u64, snapshot: BlockPayload, trigger: &'static str) -> DispatchOutcome {
        if self.options.reject_stale && !self.gate.admit(&self.block_id, stamp) {
            self.metrics.stale_rejected.fetch_add(1, Relaxed);
            warn!(
                target: "sync.propagator",
                id = %self.block_id,
                stamp,
                last = self.gate.last_admitted(&self.block_id),
                trigger,
                "stale_dispatch_rejected"
            );
            return DispatchOutcome::Stale;
        }

        // Read-merge-dispatch runs without awaiting: on the single-threaded
        // runtime no other dispatch can interleave with it.
        let document = self.store.current();
        let blocks = document.blocks();
        let merged = if blocks.contains(&self.block_id) {
            merge(blocks, &self.block_id, snapshot)
        } else if self.options.append_on_missing {
            upsert(blocks, &self.block_id, snapshot)
        } else {
            self.metrics.missing_target.fetch_add(1, Relaxed);
            debug!(target: "sync.propagator", id = %self.block_id, trigger, "dispatch_missing_target");
            return DispatchOutcome::MissingTarget;
        };

        // A burst that ends back at the stored value still dispatches.
        if &merged == blocks {
            self.metrics.unchanged.fetch_add(1, Relaxed);
            trace!(target: "sync.propagator", id = %self.block_id, trigger, "dispatch_unchanged");
        }

        let next = document.with_blocks(merged);
        self.store.dispatch(next);
        self.metrics.dispatched.fetch_add(1, Relaxed);
        debug!(target: "sync.propagator", id = %self.block_id, stamp, trigger, "dispatched");
        DispatchOutcome::Dispatched
    }
}

pub struct DebouncedPropagator<S: PreviewStore> {
    shared: Arc<Shared<S>>,
    runtime: Handle,
}

impl<S: PreviewStore> DebouncedPropagator<S> {
    /// Must be called from within a tokio runtime; timers are spawned on it.
    pub fn new(
        block_id: BlockId,
        store: Arc<S>,
        gate: Arc<VersionGate>,
        options: SyncOptions,
    ) -> Result<Self, SyncError> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        Ok(Self {
            shared: Arc::new(Shared {
                block_id,
                options,
                store,
                gate,
                slot: Mutex::new(Slot::default()),
                metrics: PropagatorMetrics::default(),
            }),
            runtime,
        })
    }

    pub fn block_id(&self) -> &BlockId {
        &self.shared.block_id
    }

    pub fn options(&self) -> &SyncOptions {
        &self.shared.options
    }

    /// Schedule `snapshot` for dispatch after the quiet interval, replacing
    /// any dispatch still pending.
    pub fn notify(&self, snapshot: BlockPayload) {
        let shared = &self.shared;
        let mut slot = shared.lock();
        if slot.disposed {
            trace!(target: "sync.propagator", id = %shared.block_id, "notify_after_dispose_ignored");
            return;
        }
        shared.metrics.notifies.fetch_add(1, Relaxed);
        slot.generation += 1;
        let generation = slot.generation;
        let stamp = shared.gate.next_stamp();

        if let Some(prev) = slot.pending.take() {
            prev.timer.abort();
            shared.metrics.coalesced.fetch_add(1, Relaxed);
            trace!(target: "sync.propagator", id = %shared.block_id, superseded = prev.generation, generation, "notify_coalesced");
        }

        let task_shared = Arc::clone(shared);
        let delay = shared.options.debounce;
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task_shared.fire(generation);
        });
        slot.pending = Some(Pending {
            generation,
            stamp,
            snapshot,
            timer,
        });
    }

    /// Dispatch the pending snapshot now. Returns `None` when nothing was pending.
    pub fn flush(&self) -> Option<DispatchOutcome> {
        let pending = self.shared.lock().pending.take()?;
        pending.timer.abort();
        self.shared.metrics.flushed.fetch_add(1, Relaxed);
        Some(self.shared.dispatch(pending.stamp, pending.snapshot, "flush"))
    }

    /// Cancel pending work and refuse further notifies. Returns `true` on the
    /// first call only.
    pub fn dispose(&self) -> bool {
        let mut slot = self.shared.lock();
        if slot.disposed {
            return false;
        }
        slot.disposed = true;
        if let Some(pending) = slot.pending.take() {
            pending.timer.abort();
            self.shared.metrics.cancelled.fetch_add(1, Relaxed);
        }
        debug!(target: "sync.propagator", id = %self.shared.block_id, "propagator_disposed");
        true
    }

    pub fn is_idle(&self) -> bool {
        self.shared.lock().pending.is_none()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    pub fn metrics(&self) -> PropagatorMetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl<S: PreviewStore> Drop for DebouncedPropagator<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
