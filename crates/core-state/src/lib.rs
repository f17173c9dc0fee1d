//! Block edit sessions: the form abstraction the sync engine drives.
//!
//! A [`BlockFormSession`] owns a private working copy of one block's payload.
//! Field edits, entry operations and drag drops mutate that copy and emit a
//! [`ChangeNotice`] carrying the full snapshot to every subscriber. Subscribers
//! hold a [`Subscription`] handle; dropping it unsubscribes, which is how the
//! editor tears down its propagation wiring deterministically.

pub mod drag;
pub mod field_path;
pub mod session;
pub mod subscribers;

pub use drag::DragEnd;
pub use field_path::FieldError;
pub use session::{BlockFormSession, ChangeNotice, ChangeOrigin, SessionState};
pub use subscribers::{Subscribers, Subscription};

use core_model::BlockId;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session for block `{0}` is not seeded yet")]
    NotReady(BlockId),
    #[error("session for block `{0}` is disposed")]
    Disposed(BlockId),
    #[error("block kind mismatch: session edits `{expected}`, got `{found}`")]
    KindMismatch { expected: &'static str, found: String },
    #[error("`{0}` blocks have no entry list")]
    NoEntries(&'static str),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("value does not fit the block schema: {0}")]
    Shape(#[from] serde_json::Error),
}
