//! The shared ordered block list and the lookup / merge entry points.
//!
//! Invariants (hold after every public call):
//! * Block identities are unique within an `OrderedConfigList`.
//! * Order is the render order of the landing page; only an explicit reorder
//!   changes it.
//! * `merge` and `upsert` touch at most the one block matching the identity;
//!   every sibling keeps its id, kind, payload and relative position.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::ModelError;
use crate::ordered::{self, Identified};
use crate::payload::{BlockKind, BlockPayload};

/// Stable block identity. Assigned once at creation, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BlockId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One independently editable section of the landing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock", into = "RawBlock")]
pub struct ConfigBlock {
    pub id: BlockId,
    pub payload: BlockPayload,
}

impl ConfigBlock {
    pub fn new(id: impl Into<BlockId>, payload: BlockPayload) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.payload.kind()
    }
}

impl Identified for ConfigBlock {
    fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// Wire form: `{ "id": ..., "type": ..., "config": { ... } }`.
#[derive(Serialize, Deserialize)]
struct RawBlock {
    id: BlockId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "empty_object")]
    config: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl TryFrom<RawBlock> for ConfigBlock {
    type Error = serde_json::Error;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        let config = match raw.config {
            Value::Null => empty_object(),
            config => config,
        };
        let payload = BlockPayload::from_wire(&raw.kind, config)?;
        Ok(ConfigBlock {
            id: raw.id,
            payload,
        })
    }
}

impl From<ConfigBlock> for RawBlock {
    fn from(block: ConfigBlock) -> Self {
        let kind = block.payload.kind_name().to_string();
        // Typed payloads are plain structs of strings and vectors; serializing
        // them into a `Value` cannot fail.
        let config = block.payload.to_fields().unwrap_or_else(|_| empty_object());
        RawBlock {
            id: block.id,
            kind,
            config,
        }
    }
}

/// Ordered sequence of blocks with unique identities.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<ConfigBlock>", into = "Vec<ConfigBlock>")]
pub struct OrderedConfigList {
    blocks: Vec<ConfigBlock>,
}

impl OrderedConfigList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list, rejecting duplicate identities.
    pub fn from_blocks(blocks: Vec<ConfigBlock>) -> Result<Self, ModelError> {
        let mut seen = HashSet::with_capacity(blocks.len());
        for block in &blocks {
            if !seen.insert(block.id.as_str()) {
                return Err(ModelError::DuplicateBlockId(block.id.clone()));
            }
        }
        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[ConfigBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigBlock> {
        self.blocks.iter()
    }

    pub fn ids(&self) -> Vec<&BlockId> {
        self.blocks.iter().map(|b| &b.id).collect()
    }

    pub fn find(&self, id: &BlockId) -> Option<&ConfigBlock> {
        ordered::find(&self.blocks, id.as_str())
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.find(id).is_some()
    }

    /// Explicit block reorder (the only operation allowed to change order).
    pub fn reorder(&self, from: &BlockId, to: &BlockId) -> Self {
        Self {
            blocks: ordered::reorder(&self.blocks, from.as_str(), to.as_str()),
        }
    }

    pub fn remove(&self, id: &BlockId) -> Self {
        Self {
            blocks: ordered::remove(&self.blocks, id.as_str()),
        }
    }
}

impl TryFrom<Vec<ConfigBlock>> for OrderedConfigList {
    type Error = ModelError;

    fn try_from(blocks: Vec<ConfigBlock>) -> Result<Self, Self::Error> {
        Self::from_blocks(blocks)
    }
}

impl From<OrderedConfigList> for Vec<ConfigBlock> {
    fn from(list: OrderedConfigList) -> Self {
        list.blocks
    }
}

impl<'a> IntoIterator for &'a OrderedConfigList {
    type Item = &'a ConfigBlock;
    type IntoIter = std::slice::Iter<'a, ConfigBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

/// Payload of block `id`, or the empty default for `kind` when absent.
///
/// A block found under `id` whose kind differs from `kind` is treated as
/// absent: the caller is about to edit it with a `kind` schema.
pub fn lookup(list: &OrderedConfigList, id: &BlockId, kind: BlockKind) -> BlockPayload {
    match list.find(id) {
        Some(block) if block.kind() == kind => block.payload.clone(),
        Some(block) => {
            warn!(
                target: "model.list",
                id = %id,
                expected = kind.as_str(),
                found = block.payload.kind_name(),
                "lookup_kind_mismatch"
            );
            kind.default_payload()
        }
        None => {
            trace!(target: "model.list", id = %id, kind = kind.as_str(), "lookup_default");
            kind.default_payload()
        }
    }
}

/// Replace the payload of block `id`, leaving every other block untouched.
///
/// Absent `id` returns the list unchanged. A payload whose kind differs from
/// the stored block's kind is refused (also unchanged): a merge never changes
/// a block's kind.
pub fn merge(list: &OrderedConfigList, id: &BlockId, payload: BlockPayload) -> OrderedConfigList {
    let Some(index) = ordered::position(&list.blocks, id.as_str()) else {
        trace!(target: "model.list", id = %id, "merge_missing_identity");
        return list.clone();
    };
    let current = &list.blocks[index];
    if current.kind() != payload.kind() {
        warn!(
            target: "model.list",
            id = %id,
            stored = current.payload.kind_name(),
            incoming = payload.kind_name(),
            "merge_kind_mismatch"
        );
        return list.clone();
    }
    let mut blocks = list.blocks.clone();
    blocks[index].payload = payload;
    OrderedConfigList { blocks }
}

/// `merge`, appending a new block at the end when `id` is absent.
pub fn upsert(list: &OrderedConfigList, id: &BlockId, payload: BlockPayload) -> OrderedConfigList {
    if list.contains(id) {
        return merge(list, id, payload);
    }
    debug!(target: "model.list", id = %id, kind = payload.kind_name(), "upsert_append");
    let mut blocks = list.blocks.clone();
    blocks.push(ConfigBlock::new(id.clone(), payload));
    OrderedConfigList { blocks }
}
