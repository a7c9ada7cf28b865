use crate::query::canonical::CanonicalQuery;
use bson::Document;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// The index filter configured for one query shape: the only key patterns
/// the planner may consider for matching queries.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowedIndices {
    key_patterns: Vec<Document>,
}

impl AllowedIndices {
    pub fn new(key_patterns: Vec<Document>) -> Self {
        AllowedIndices { key_patterns }
    }

    pub fn key_patterns(&self) -> &[Document] {
        &self.key_patterns
    }
}

/// Per-collection query settings: admin-configured index filters keyed by
/// query shape.
pub struct QuerySettings {
    filters: RwLock<HashMap<String, Arc<AllowedIndices>>>,
}

impl QuerySettings {
    pub fn new() -> Self {
        QuerySettings {
            filters: RwLock::new(HashMap::new()),
        }
    }

    /// The allowed-index list for this query's shape, if one was configured.
    pub fn get_allowed_indices(&self, cq: &CanonicalQuery) -> Option<Arc<AllowedIndices>> {
        let filters = self
            .filters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        filters.get(&cq.plan_cache_key()).cloned()
    }

    pub fn set_allowed_indices(&self, cq: &CanonicalQuery, key_patterns: Vec<Document>) {
        let mut filters = self
            .filters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        filters.insert(
            cq.plan_cache_key(),
            Arc::new(AllowedIndices::new(key_patterns)),
        );
    }

    pub fn remove_allowed_indices(&self, cq: &CanonicalQuery) {
        let mut filters = self
            .filters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        filters.remove(&cq.plan_cache_key());
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self::new()
    }
}
