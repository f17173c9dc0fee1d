//! Block synchronization engine.
//!
//! Control flow for one open block:
//!
//! ```text
//! edit -> BlockFormSession -> ChangeNotice(Field) -> DebouncedPropagator
//!      -> (quiet interval) -> merge(store.current(), id, snapshot) -> store.dispatch
//! ```
//!
//! Editors never mutate the shared document in place. They hand immutable
//! replacement payloads to their propagator, which merges exactly one block
//! identity into the store's current list. Concurrent editors of *different*
//! blocks therefore cannot clobber each other; editors of the *same* block are
//! ordered by the shared [`VersionGate`].

pub mod editor;
pub mod gate;
pub mod propagator;
pub mod recommend;
pub mod store;

pub use editor::{BlockEditor, RecommendTicket};
pub use gate::VersionGate;
pub use propagator::{
    DebouncedPropagator, DispatchOutcome, PropagatorMetrics, PropagatorMetricsSnapshot,
    SyncOptions,
};
pub use recommend::{RecommendError, RecommendSource, StaticRecommendSource};
pub use store::{PreviewStore, SharedPreviewStore};

use core_state::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no tokio runtime available for debounce timers")]
    NoRuntime,
    #[error("no block is open")]
    NoActiveBlock,
    #[error("`{0}` blocks do not take recommended documents")]
    RecommendUnsupported(&'static str),
    #[error("recommended content lookup failed: {0}")]
    Recommend(#[from] RecommendError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to encode field value: {0}")]
    Encode(#[from] serde_json::Error),
}
