//! Per-block edit session: an isolated working copy of one block's payload.
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized --seed/reset_to--> Ready --set_field/entry ops--> Ready (emits Field)
//!                                  Ready --reset_to-------------> Ready (emits Reset)
//!                                  Ready --dispose--------------> Disposed (idempotent)
//! ```
//!
//! The session never touches the shared document. Its only externally visible
//! effect is the stream of [`ChangeNotice`]s, each carrying the full working
//! copy so consumers can merge without tracking partial state.

use core_model::{BlockId, BlockKind, BlockPayload, Entry, OrderedConfigList, lookup, next_entry_id};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, trace};

use crate::SessionError;
use crate::drag::DragEnd;
use crate::field_path::{self, FieldError};
use crate::subscribers::{Subscribers, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Disposed,
}

/// What caused a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Edit of the working copy (user field edit, entry op, collaborator write).
    Field,
    /// Working copy replaced from the outside source.
    Reset,
}

impl ChangeOrigin {
    /// Whether the change should be written back to the shared document.
    /// A reset mirrors what the source already holds.
    pub fn propagates(&self) -> bool {
        matches!(self, ChangeOrigin::Field)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotice {
    pub block_id: BlockId,
    pub origin: ChangeOrigin,
    /// Path of the edited field; `None` for whole-payload replacements.
    pub field: Option<String>,
    /// Monotonic per-session sequence number.
    pub seq: u64,
    pub snapshot: BlockPayload,
}

pub struct BlockFormSession {
    block_id: BlockId,
    kind: BlockKind,
    state: SessionState,
    defaults: BlockPayload,
    working: BlockPayload,
    dirty: bool,
    seq: u64,
    subscribers: Subscribers,
}

impl BlockFormSession {
    /// Unseeded session. Edits are refused until `seed` or `reset_to`.
    pub fn new(block_id: BlockId, kind: BlockKind) -> Self {
        let empty = kind.default_payload();
        Self {
            block_id,
            kind,
            state: SessionState::Uninitialized,
            defaults: empty.clone(),
            working: empty,
            dirty: false,
            seq: 0,
            subscribers: Subscribers::new(),
        }
    }

    /// Session seeded from the block's entry in `list` (or the kind default).
    pub fn mount(block_id: BlockId, kind: BlockKind, list: &OrderedConfigList) -> Self {
        let seed = lookup(list, &block_id, kind);
        let mut session = Self::new(block_id, kind);
        session.install(seed);
        debug!(target: "state.session", id = %session.block_id, kind = kind.as_str(), "session_mounted");
        session
    }

    pub fn block_id(&self) -> &BlockId {
        &self.block_id
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn working(&self) -> &BlockPayload {
        &self.working
    }

    pub fn defaults(&self) -> &BlockPayload {
        &self.defaults
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&ChangeNotice) + Send + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Seed an unseeded session without notifying (mount time).
    pub fn seed(&mut self, payload: BlockPayload) -> Result<(), SessionError> {
        match self.state {
            SessionState::Uninitialized => {
                self.check_kind(&payload)?;
                self.install(payload);
                Ok(())
            }
            SessionState::Ready => self.reset_to(payload),
            SessionState::Disposed => Err(SessionError::Disposed(self.block_id.clone())),
        }
    }

    /// Atomically replace the working copy and re-seed the defaults.
    pub fn reset_to(&mut self, payload: BlockPayload) -> Result<(), SessionError> {
        if self.state == SessionState::Disposed {
            return Err(SessionError::Disposed(self.block_id.clone()));
        }
        self.check_kind(&payload)?;
        self.install(payload);
        self.notify(ChangeOrigin::Reset, None);
        Ok(())
    }

    /// Discard edits made since the last seed/reset.
    pub fn reset_to_defaults(&mut self) -> Result<(), SessionError> {
        self.ensure_ready()?;
        self.working = self.defaults.clone();
        self.dirty = false;
        self.notify(ChangeOrigin::Reset, None);
        Ok(())
    }

    /// Write `value` at the dot path `path` of the working copy.
    ///
    /// The top-level field must belong to the kind's schema and the result
    /// must still deserialize into the kind's payload. Entry ids are fixed:
    /// an edit inside one entry may not change its id, and no edit may leave
    /// two entries sharing one. Otherwise the working copy is left untouched
    /// and the error returned.
    pub fn set_field(&mut self, path: &str, value: Value) -> Result<(), SessionError> {
        self.ensure_ready()?;
        let root = field_path::root_field(path);
        if let Some(known) = self.kind.field_names()
            && !known.iter().any(|field| *field == root)
        {
            return Err(FieldError::UnknownField(path.to_string()).into());
        }
        let mut fields = self.working.to_fields()?;
        let slot = self
            .kind
            .entries_field()
            .and_then(|entries| field_path::entry_slot(path, entries));
        let id_before = slot.and_then(|slot| entry_id(&fields, slot));
        field_path::assign(&mut fields, path, value)?;
        if let Some(slot) = slot
            && entry_id(&fields, slot) != id_before
        {
            return Err(FieldError::EntryIdentity(path.to_string()).into());
        }
        let next = self.working.with_fields(fields)?;
        check_unique_entries(&next)?;
        self.commit(next, Some(path.to_string()));
        Ok(())
    }

    /// Replace the whole working copy as an edit (propagates, unlike `reset_to`).
    pub fn replace(&mut self, payload: BlockPayload) -> Result<(), SessionError> {
        self.ensure_ready()?;
        self.check_kind(&payload)?;
        self.commit(payload, None);
        Ok(())
    }

    /// Append a blank entry with a fresh timestamp id; returns the id.
    pub fn add_entry(&mut self) -> Result<String, SessionError> {
        self.ensure_ready()?;
        let id = next_entry_id();
        let entry = Entry::blank(self.kind, id.clone()).ok_or(SessionError::NoEntries(self.kind.as_str()))?;
        let next = self.working.insert_entry(entry);
        self.commit(next, self.entries_path());
        Ok(id)
    }

    pub fn insert_entry(&mut self, entry: Entry) -> Result<(), SessionError> {
        self.ensure_entries()?;
        let next = self.working.insert_entry(entry);
        self.commit(next, self.entries_path());
        Ok(())
    }

    pub fn remove_entry(&mut self, id: &str) -> Result<(), SessionError> {
        self.ensure_entries()?;
        let next = self.working.remove_entry(id);
        self.commit(next, self.entries_path());
        Ok(())
    }

    pub fn update_entry(&mut self, entry: Entry) -> Result<(), SessionError> {
        self.ensure_entries()?;
        let next = self.working.update_entry(entry);
        self.commit(next, self.entries_path());
        Ok(())
    }

    pub fn reorder_entries(&mut self, from: &str, to: &str) -> Result<(), SessionError> {
        self.ensure_entries()?;
        let next = self.working.reorder_entries(from, to);
        self.commit(next, self.entries_path());
        Ok(())
    }

    /// Apply a drop gesture. Returns whether the entry list changed.
    pub fn apply_drag(&mut self, drag: &DragEnd) -> Result<bool, SessionError> {
        self.ensure_entries()?;
        let Some((from, to)) = drag.resolve() else {
            trace!(target: "state.session", id = %self.block_id, ?drag, "drag_ignored");
            return Ok(false);
        };
        let before = self.seq;
        self.reorder_entries(from, to)?;
        Ok(self.seq != before)
    }

    /// Tear down: drop subscribers and refuse further edits. Returns `true`
    /// on the first call only.
    pub fn dispose(&mut self) -> bool {
        if self.state == SessionState::Disposed {
            return false;
        }
        self.state = SessionState::Disposed;
        self.subscribers.clear();
        debug!(target: "state.session", id = %self.block_id, seq = self.seq, "session_disposed");
        true
    }

    fn install(&mut self, payload: BlockPayload) {
        self.defaults = payload.clone();
        self.working = payload;
        self.dirty = false;
        self.state = SessionState::Ready;
    }

    fn commit(&mut self, next: BlockPayload, field: Option<String>) {
        if next == self.working {
            trace!(target: "state.session", id = %self.block_id, field = field.as_deref(), "edit_unchanged");
            return;
        }
        self.working = next;
        self.dirty = true;
        self.notify(ChangeOrigin::Field, field);
    }

    fn notify(&mut self, origin: ChangeOrigin, field: Option<String>) {
        self.seq += 1;
        trace!(target: "state.session", id = %self.block_id, seq = self.seq, ?origin, field = field.as_deref(), "change_notice");
        let notice = ChangeNotice {
            block_id: self.block_id.clone(),
            origin,
            field,
            seq: self.seq,
            snapshot: self.working.clone(),
        };
        self.subscribers.emit(&notice);
    }

    fn entries_path(&self) -> Option<String> {
        self.kind.entries_field().map(str::to_string)
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Uninitialized => Err(SessionError::NotReady(self.block_id.clone())),
            SessionState::Disposed => Err(SessionError::Disposed(self.block_id.clone())),
        }
    }

    fn ensure_entries(&self) -> Result<(), SessionError> {
        self.ensure_ready()?;
        match self.kind.entries_field() {
            Some(_) => Ok(()),
            None => Err(SessionError::NoEntries(self.kind.as_str())),
        }
    }

    fn check_kind(&self, payload: &BlockPayload) -> Result<(), SessionError> {
        if payload.kind() == self.kind {
            Ok(())
        } else {
            Err(SessionError::KindMismatch {
                expected: self.kind.as_str(),
                found: payload.kind_name().to_string(),
            })
        }
    }
}

fn entry_id(fields: &Value, slot: &str) -> Option<Value> {
    field_path::get(fields, slot).and_then(|entry| entry.get("id")).cloned()
}

fn check_unique_entries(payload: &BlockPayload) -> Result<(), FieldError> {
    let mut seen = HashSet::new();
    match payload.entry_ids().into_iter().find(|id| !seen.insert(*id)) {
        Some(dup) => Err(FieldError::DuplicateEntryId(dup.to_string())),
        None => Ok(()),
    }
}

impl std::fmt::Debug for BlockFormSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockFormSession")
            .field("block_id", &self.block_id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .field("seq", &self.seq)
            .finish()
    }
}
