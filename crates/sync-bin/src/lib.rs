//! landing-sync runtime: replays an edit script against a preview document.
//!
//! `main.rs` owns process concerns (CLI, logging, file IO). Everything that
//! runs inside the event loop lives here so it can be driven from tests.

pub mod document_io;
pub mod runtime;
pub mod sources;

pub use runtime::{LoopStats, ShutdownReason, SyncRuntime};
pub use sources::StoreEventSource;
