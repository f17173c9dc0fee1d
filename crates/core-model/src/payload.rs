//! Kind-specific block payloads and their draggable entries.
//!
//! Every payload struct is `#[serde(default)]` so a partial JSON object (for
//! example a form that only ever touched `title`) deserializes with schema
//! defaults filled in for the untouched fields. Keys outside the modelled
//! schema land in each struct's `extra` map and are written back unchanged. The block kind is the
//! discriminant of [`BlockPayload`]; there is no separate kind field that
//! could drift out of sync with the payload shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ordered::{self, Identified};

/// Entry of a case-list block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubItem {
    pub id: String,
    pub name: String,
    pub link: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Recommended document reference. Only the display fields the preview needs
/// are typed; the rest of the node is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeRef {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub emoji: String,
    /// 1 = folder, 2 = document.
    #[serde(rename = "type")]
    pub node_type: u8,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeRef {
    pub const FOLDER: u8 = 1;
    pub const DOCUMENT: u8 = 2;

    pub fn is_folder(&self) -> bool {
        self.node_type == Self::FOLDER
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricItem {
    pub id: String,
    pub name: String,
    pub number: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseConfig {
    pub title: String,
    pub list: Vec<SubItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleDocConfig {
    pub title: String,
    pub nodes: Vec<NodeRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub title: String,
    pub list: Vec<MetricItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Block kind discriminator.
///
/// `Opaque` covers block types this engine renders in the preview but does
/// not edit (banners, FAQ sections, ...). They are carried through every list
/// operation untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Case,
    SimpleDoc,
    Metrics,
    Opaque,
}

impl BlockKind {
    /// Wire name for the editable kinds. `Opaque` has no fixed name; the
    /// payload keeps the original one.
    pub const fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Case => "case",
            BlockKind::SimpleDoc => "simple_doc",
            BlockKind::Metrics => "metrics",
            BlockKind::Opaque => "opaque",
        }
    }

    pub fn parse(name: &str) -> Option<BlockKind> {
        match name {
            "case" => Some(BlockKind::Case),
            "simple_doc" => Some(BlockKind::SimpleDoc),
            "metrics" => Some(BlockKind::Metrics),
            _ => None,
        }
    }

    /// Empty payload for a block of this kind: empty title, empty entry list.
    pub fn default_payload(self) -> BlockPayload {
        match self {
            BlockKind::Case => BlockPayload::Case(CaseConfig::default()),
            BlockKind::SimpleDoc => BlockPayload::SimpleDoc(SimpleDocConfig::default()),
            BlockKind::Metrics => BlockPayload::Metrics(MetricsConfig::default()),
            BlockKind::Opaque => BlockPayload::Opaque {
                kind: String::new(),
                config: Value::Object(Default::default()),
            },
        }
    }

    /// Top-level field names of the kind's schema. `None` for opaque blocks,
    /// whose fields are not known to this engine.
    pub const fn field_names(self) -> Option<&'static [&'static str]> {
        match self {
            BlockKind::Case | BlockKind::Metrics => Some(&["title", "list"]),
            BlockKind::SimpleDoc => Some(&["title", "nodes", "title_color", "bg_color"]),
            BlockKind::Opaque => None,
        }
    }

    /// Name of the field holding the draggable entry list, if the kind has one.
    pub const fn entries_field(self) -> Option<&'static str> {
        match self {
            BlockKind::Case | BlockKind::Metrics => Some("list"),
            BlockKind::SimpleDoc => Some("nodes"),
            BlockKind::Opaque => None,
        }
    }
}

/// A single draggable entry of any editable kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Case(SubItem),
    Node(NodeRef),
    Metric(MetricItem),
}

impl Entry {
    /// Empty entry matching the kind's list, carrying the given id.
    pub fn blank(kind: BlockKind, id: String) -> Option<Entry> {
        match kind {
            BlockKind::Case => Some(Entry::Case(SubItem {
                id,
                ..Default::default()
            })),
            BlockKind::SimpleDoc => Some(Entry::Node(NodeRef {
                id,
                ..Default::default()
            })),
            BlockKind::Metrics => Some(Entry::Metric(MetricItem {
                id,
                ..Default::default()
            })),
            BlockKind::Opaque => None,
        }
    }
}

impl Identified for Entry {
    fn id(&self) -> &str {
        match self {
            Entry::Case(item) => &item.id,
            Entry::Node(node) => &node.id,
            Entry::Metric(metric) => &metric.id,
        }
    }
}

/// Kind-specific field data owned by a block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockPayload {
    Case(CaseConfig),
    SimpleDoc(SimpleDocConfig),
    Metrics(MetricsConfig),
    /// Block type without an editor; `kind` is the original wire name.
    Opaque { kind: String, config: Value },
}

impl BlockPayload {
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockPayload::Case(_) => BlockKind::Case,
            BlockPayload::SimpleDoc(_) => BlockKind::SimpleDoc,
            BlockPayload::Metrics(_) => BlockKind::Metrics,
            BlockPayload::Opaque { .. } => BlockKind::Opaque,
        }
    }

    /// Wire name written into the `type` field.
    pub fn kind_name(&self) -> &str {
        match self {
            BlockPayload::Opaque { kind, .. } => kind,
            other => other.kind().as_str(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            BlockPayload::Case(c) => Some(&c.title),
            BlockPayload::SimpleDoc(c) => Some(&c.title),
            BlockPayload::Metrics(c) => Some(&c.title),
            BlockPayload::Opaque { config, .. } => config.get("title").and_then(Value::as_str),
        }
    }

    pub fn entry_ids(&self) -> Vec<&str> {
        match self {
            BlockPayload::Case(c) => c.list.iter().map(Identified::id).collect(),
            BlockPayload::SimpleDoc(c) => c.nodes.iter().map(Identified::id).collect(),
            BlockPayload::Metrics(c) => c.list.iter().map(Identified::id).collect(),
            BlockPayload::Opaque { .. } => Vec::new(),
        }
    }

    /// Move entry `from` into the slot held by `to`.
    pub fn reorder_entries(&self, from: &str, to: &str) -> BlockPayload {
        let mut next = self.clone();
        match &mut next {
            BlockPayload::Case(c) => c.list = ordered::reorder(&c.list, from, to),
            BlockPayload::SimpleDoc(c) => c.nodes = ordered::reorder(&c.nodes, from, to),
            BlockPayload::Metrics(c) => c.list = ordered::reorder(&c.list, from, to),
            BlockPayload::Opaque { .. } => {}
        }
        next
    }

    pub fn remove_entry(&self, id: &str) -> BlockPayload {
        let mut next = self.clone();
        match &mut next {
            BlockPayload::Case(c) => c.list = ordered::remove(&c.list, id),
            BlockPayload::SimpleDoc(c) => c.nodes = ordered::remove(&c.nodes, id),
            BlockPayload::Metrics(c) => c.list = ordered::remove(&c.list, id),
            BlockPayload::Opaque { .. } => {}
        }
        next
    }

    /// Replace the entry sharing `entry`'s id. An entry of the wrong kind
    /// leaves the payload unchanged.
    pub fn update_entry(&self, entry: Entry) -> BlockPayload {
        let mut next = self.clone();
        match (&mut next, entry) {
            (BlockPayload::Case(c), Entry::Case(item)) => {
                c.list = ordered::update_one(&c.list, &item.id.clone(), item)
            }
            (BlockPayload::SimpleDoc(c), Entry::Node(node)) => {
                c.nodes = ordered::update_one(&c.nodes, &node.id.clone(), node)
            }
            (BlockPayload::Metrics(c), Entry::Metric(metric)) => {
                c.list = ordered::update_one(&c.list, &metric.id.clone(), metric)
            }
            (payload, entry) => {
                tracing::debug!(target: "model.payload", kind = payload.kind_name(), entry_id = entry.id(), "entry_kind_mismatch");
            }
        }
        next
    }

    /// Append `entry` to the list (or replace an entry already holding its id).
    pub fn insert_entry(&self, entry: Entry) -> BlockPayload {
        let mut next = self.clone();
        match (&mut next, entry) {
            (BlockPayload::Case(c), Entry::Case(item)) => c.list = ordered::insert(&c.list, item),
            (BlockPayload::SimpleDoc(c), Entry::Node(node)) => {
                c.nodes = ordered::insert(&c.nodes, node)
            }
            (BlockPayload::Metrics(c), Entry::Metric(metric)) => {
                c.list = ordered::insert(&c.list, metric)
            }
            (payload, entry) => {
                tracing::debug!(target: "model.payload", kind = payload.kind_name(), entry_id = entry.id(), "entry_kind_mismatch");
            }
        }
        next
    }

    /// JSON object of the payload fields (the `config` part of the wire form).
    pub fn to_fields(&self) -> Result<Value, serde_json::Error> {
        match self {
            BlockPayload::Case(c) => serde_json::to_value(c),
            BlockPayload::SimpleDoc(c) => serde_json::to_value(c),
            BlockPayload::Metrics(c) => serde_json::to_value(c),
            BlockPayload::Opaque { config, .. } => Ok(config.clone()),
        }
    }

    /// Rebuild a payload of the same kind from a JSON field object. Fields
    /// missing from `fields` take their schema defaults.
    pub fn with_fields(&self, fields: Value) -> Result<BlockPayload, serde_json::Error> {
        Ok(match self {
            BlockPayload::Case(_) => BlockPayload::Case(serde_json::from_value(fields)?),
            BlockPayload::SimpleDoc(_) => BlockPayload::SimpleDoc(serde_json::from_value(fields)?),
            BlockPayload::Metrics(_) => BlockPayload::Metrics(serde_json::from_value(fields)?),
            BlockPayload::Opaque { kind, .. } => BlockPayload::Opaque {
                kind: kind.clone(),
                config: fields,
            },
        })
    }

    /// Decode a payload from its wire kind name and field object.
    pub fn from_wire(kind: &str, fields: Value) -> Result<BlockPayload, serde_json::Error> {
        match BlockKind::parse(kind) {
            Some(known) => known.default_payload().with_fields(fields),
            None => Ok(BlockPayload::Opaque {
                kind: kind.to_string(),
                config: fields,
            }),
        }
    }
}
