//! Block editor: one open session wired to its debounced propagator.
//!
//! Opening a block mounts a `BlockFormSession` seeded from the store, creates
//! a `DebouncedPropagator` for the block and subscribes it to the session's
//! `Field` notifications. Closing (or opening another block) disposes both,
//! cancelling any dispatch still pending.
//!
//! The editor is the only place that reacts to store changes: `sync_from_store`
//! re-seeds the session from the store's copy of the block, but only while no
//! dispatch of our own is pending. Resetting mid-burst would otherwise replace
//! keystrokes that have not reached the store yet.

use core_model::{BlockId, BlockKind, NodeRef, PreviewDocument};
use core_state::{BlockFormSession, DragEnd, Subscription};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::SyncError;
use crate::gate::VersionGate;
use crate::propagator::{DebouncedPropagator, DispatchOutcome, PropagatorMetricsSnapshot, SyncOptions};
use crate::recommend::{RecommendError, RecommendSource};
use crate::store::PreviewStore;

struct ActiveBlock<S: PreviewStore> {
    session: BlockFormSession,
    propagator: Arc<DebouncedPropagator<S>>,
    _subscription: Subscription,
}

/// Pending recommended-content request. Its result is only applied if the
/// editor still has the same block open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendTicket {
    epoch: u64,
    block_id: BlockId,
    pub ids: Vec<String>,
}

pub struct BlockEditor<S: PreviewStore> {
    store: Arc<S>,
    gate: Arc<VersionGate>,
    options: SyncOptions,
    active: Option<ActiveBlock<S>>,
    epoch: u64,
}

impl<S: PreviewStore> BlockEditor<S> {
    pub fn new(store: Arc<S>, options: SyncOptions) -> Self {
        Self::with_gate(store, Arc::new(VersionGate::new()), options)
    }

    /// Editors that may open the same block must share one gate.
    pub fn with_gate(store: Arc<S>, gate: Arc<VersionGate>, options: SyncOptions) -> Self {
        Self {
            store,
            gate,
            options,
            active: None,
            epoch: 0,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn active_id(&self) -> Option<&BlockId> {
        self.active.as_ref().map(|a| a.session.block_id())
    }

    pub fn session(&self) -> Option<&BlockFormSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Open `id` for editing, closing whatever was open before.
    pub fn open(&mut self, id: BlockId, kind: BlockKind) -> Result<(), SyncError> {
        self.close();
        let document = self.store.current();
        let session = BlockFormSession::mount(id.clone(), kind, document.blocks());
        let propagator = Arc::new(DebouncedPropagator::new(
            id.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.gate),
            self.options,
        )?);
        let sink = Arc::clone(&propagator);
        let subscription = session.subscribe(move |notice| {
            if notice.origin.propagates() {
                sink.notify(notice.snapshot.clone());
            }
        });
        self.epoch += 1;
        info!(target: "sync.editor", id = %id, kind = kind.as_str(), exists = document.blocks().contains(&id), "block_opened");
        self.active = Some(ActiveBlock {
            session,
            propagator,
            _subscription: subscription,
        });
        Ok(())
    }

    /// Close the open block, cancelling its pending dispatch. Returns whether
    /// a block was open.
    pub fn close(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };
        self.epoch += 1;
        active.propagator.dispose();
        active.session.dispose();
        debug!(target: "sync.editor", id = %active.session.block_id(), "block_closed");
        true
    }

    pub fn session_mut(&mut self) -> Result<&mut BlockFormSession, SyncError> {
        self.active
            .as_mut()
            .map(|a| &mut a.session)
            .ok_or(SyncError::NoActiveBlock)
    }

    pub fn set_field(&mut self, path: &str, value: Value) -> Result<(), SyncError> {
        Ok(self.session_mut()?.set_field(path, value)?)
    }

    pub fn apply_drag(&mut self, drag: &DragEnd) -> Result<bool, SyncError> {
        Ok(self.session_mut()?.apply_drag(drag)?)
    }

    /// Dispatch the pending edit immediately.
    pub fn flush(&self) -> Option<DispatchOutcome> {
        self.active.as_ref().and_then(|a| a.propagator.flush())
    }

    pub fn is_idle(&self) -> bool {
        self.active.as_ref().is_none_or(|a| a.propagator.is_idle())
    }

    pub fn metrics(&self) -> Option<PropagatorMetricsSnapshot> {
        self.active.as_ref().map(|a| a.propagator.metrics())
    }

    /// Re-seed the session from the store when the store's copy of the block
    /// differs from the working copy. Returns whether a reset happened.
    pub fn sync_from_store(&mut self) -> Result<bool, SyncError> {
        let document = self.store.current();
        self.sync_from_document(&document)
    }

    pub fn sync_from_document(&mut self, document: &PreviewDocument) -> Result<bool, SyncError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        if !active.propagator.is_idle() {
            trace!(target: "sync.editor", id = %active.session.block_id(), "store_sync_deferred_pending_edit");
            return Ok(false);
        }
        let Some(block) = document.blocks().find(active.session.block_id()) else {
            return Ok(false);
        };
        if block.kind() != active.session.kind() || &block.payload == active.session.working() {
            return Ok(false);
        }
        active.session.reset_to(block.payload.clone())?;
        debug!(target: "sync.editor", id = %block.id, "session_reset_from_store");
        Ok(true)
    }

    /// Start a recommended-content request for the open document block.
    pub fn begin_recommend(&self, ids: Vec<String>) -> Result<RecommendTicket, SyncError> {
        let active = self.active.as_ref().ok_or(SyncError::NoActiveBlock)?;
        if active.session.kind() != BlockKind::SimpleDoc {
            return Err(SyncError::RecommendUnsupported(active.session.kind().as_str()));
        }
        Ok(RecommendTicket {
            epoch: self.epoch,
            block_id: active.session.block_id().clone(),
            ids,
        })
    }

    /// Apply a lookup result. A failed lookup leaves the working copy as it
    /// was and triggers no dispatch. A result arriving after the editor moved
    /// on to another block (or reopened this one) is discarded.
    pub fn finish_recommend(
        &mut self,
        ticket: RecommendTicket,
        result: Result<Vec<NodeRef>, RecommendError>,
    ) -> Result<bool, SyncError> {
        if ticket.epoch != self.epoch {
            debug!(target: "sync.editor", id = %ticket.block_id, "recommend_result_discarded");
            return Ok(false);
        }
        let nodes = match result {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(target: "sync.editor", id = %ticket.block_id, error = %e, "recommend_failed");
                return Err(e.into());
            }
        };
        let count = nodes.len();
        self.set_field("nodes", serde_json::to_value(nodes)?)?;
        debug!(target: "sync.editor", id = %ticket.block_id, count, "recommend_applied");
        Ok(true)
    }

    /// `begin_recommend` + lookup + `finish_recommend` in one call.
    pub async fn apply_recommendations<R: RecommendSource>(
        &mut self,
        source: &R,
        ids: Vec<String>,
    ) -> Result<bool, SyncError> {
        let ticket = self.begin_recommend(ids)?;
        let result = source.recommend(&ticket.ids).await;
        self.finish_recommend(ticket, result)
    }
}

impl<S: PreviewStore> Drop for BlockEditor<S> {
    fn drop(&mut self) {
        self.close();
    }
}
