//! Shared preview store.
//!
//! The store holds one `PreviewDocument` and accepts full replacement
//! documents through `dispatch`. The engine always submits a fully merged
//! document, never a partial patch.

use core_model::PreviewDocument;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::trace;

/// Store collaborator seen by the propagator.
pub trait PreviewStore: Send + Sync + 'static {
    fn current(&self) -> PreviewDocument;
    fn dispatch(&self, document: PreviewDocument);
}

/// In-process store backed by a `watch` channel so observers (preview
/// renderers, open editors) can await document changes.
#[derive(Debug)]
pub struct SharedPreviewStore {
    tx: watch::Sender<PreviewDocument>,
    dispatches: AtomicU64,
}

impl SharedPreviewStore {
    pub fn new(document: PreviewDocument) -> Self {
        let (tx, _rx) = watch::channel(document);
        Self {
            tx,
            dispatches: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewDocument> {
        self.tx.subscribe()
    }

    /// Number of dispatches accepted since construction.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }
}

impl Default for SharedPreviewStore {
    fn default() -> Self {
        Self::new(PreviewDocument::default())
    }
}

impl PreviewStore for SharedPreviewStore {
    fn current(&self) -> PreviewDocument {
        self.tx.borrow().clone()
    }

    fn dispatch(&self, document: PreviewDocument) {
        let n = self.dispatches.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(target: "sync.store", dispatch = n, blocks = document.blocks().len(), "store_dispatch");
        self.tx.send_replace(document);
    }
}
