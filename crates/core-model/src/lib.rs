//! Landing page document model.
//!
//! The document is an ordered list of configuration blocks. Each block has a
//! stable identity and a kind-specific payload; payloads of the editable kinds
//! carry a draggable entry list. Everything here is plain data plus pure
//! functions: the identity-keyed list operations live in [`ordered`], the
//! block-level `lookup` / `merge` / `upsert` entry points in [`list`].
//!
//! Nothing in this crate mutates shared state. Editors produce replacement
//! payloads and the store is updated only by merging those into a new list.

pub mod document;
pub mod ids;
pub mod list;
pub mod ordered;
pub mod payload;

pub use document::{PreviewDocument, PreviewSettings};
pub use ids::next_entry_id;
pub use list::{BlockId, ConfigBlock, OrderedConfigList, lookup, merge, upsert};
pub use ordered::Identified;
pub use payload::{
    BlockKind, BlockPayload, CaseConfig, Entry, MetricItem, MetricsConfig, NodeRef,
    SimpleDocConfig, SubItem,
};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("duplicate block id `{0}`")]
    DuplicateBlockId(BlockId),
}

impl Identified for SubItem {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for NodeRef {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for MetricItem {
    fn id(&self) -> &str {
        &self.id
    }
}
