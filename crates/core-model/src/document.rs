//! Preview document held by the shared store.
//!
//! Only the landing block list is modelled; every other key of the document
//! and of its `settings` object is carried through verbatim so a dispatch
//! never drops preview state this engine does not own.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::list::OrderedConfigList;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PreviewSettings {
    #[serde(default)]
    pub web_app_landing_configs: OrderedConfigList,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PreviewDocument {
    #[serde(default)]
    pub settings: PreviewSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PreviewDocument {
    pub fn new(blocks: OrderedConfigList) -> Self {
        Self {
            settings: PreviewSettings {
                web_app_landing_configs: blocks,
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    pub fn blocks(&self) -> &OrderedConfigList {
        &self.settings.web_app_landing_configs
    }

    /// Same document with the block list replaced; every other key is kept.
    pub fn with_blocks(&self, blocks: OrderedConfigList) -> Self {
        let mut next = self.clone();
        next.settings.web_app_landing_configs = blocks;
        next
    }
}
