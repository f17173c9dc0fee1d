//! Recommended-content lookup collaborator.
//!
//! Given the identities the operator picked, the lookup returns enriched
//! `NodeRef`s. Results are written into the session as an ordinary field edit
//! and flow through the normal debounce path.

use core_model::{NodeRef, ordered};
use std::collections::HashMap;
use std::future::Future;

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("lookup rejected: {0}")]
    Rejected(String),
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

pub trait RecommendSource {
    fn recommend(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<NodeRef>, RecommendError>> + Send;
}

/// Fixed in-memory catalog. Returns the requested nodes in request order and
/// skips identities it does not know.
#[derive(Debug, Clone, Default)]
pub struct StaticRecommendSource {
    catalog: HashMap<String, NodeRef>,
}

impl StaticRecommendSource {
    pub fn new(nodes: impl IntoIterator<Item = NodeRef>) -> Self {
        Self {
            catalog: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }
}

impl RecommendSource for StaticRecommendSource {
    fn recommend(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<NodeRef>, RecommendError>> + Send {
        let mut nodes: Vec<NodeRef> = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = self.catalog.get(id) {
                nodes = ordered::insert(&nodes, node.clone());
            }
        }
        std::future::ready(Ok(nodes))
    }
}
