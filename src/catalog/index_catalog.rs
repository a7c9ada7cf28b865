use bson::{Bson, Document};
use std::sync::{Arc, RwLock};

/// Description of one index on a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    key_pattern: Document,
    name: String,
    multikey: bool,
    sparse: bool,
    /// Still being built; hidden from planning unless explicitly requested.
    in_progress: bool,
    /// Opaque creation-options document, carried for diagnostics.
    info: Document,
}

impl IndexDescriptor {
    pub fn new(key_pattern: Document) -> Self {
        let name = default_index_name(&key_pattern);
        IndexDescriptor {
            key_pattern,
            name,
            multikey: false,
            sparse: false,
            in_progress: false,
            info: Document::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn multikey(mut self, multikey: bool) -> Self {
        self.multikey = multikey;
        self
    }

    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn in_progress(mut self, in_progress: bool) -> Self {
        self.in_progress = in_progress;
        self
    }

    pub fn with_info(mut self, info: Document) -> Self {
        self.info = info;
        self
    }

    pub fn key_pattern(&self) -> &Document {
        &self.key_pattern
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_multikey(&self) -> bool {
        self.multikey
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn info(&self) -> &Document {
        &self.info
    }

    pub fn is_id_index(&self) -> bool {
        let mut keys = self.key_pattern.iter();
        matches!((keys.next(), keys.next()), (Some((field, _)), None) if field == "_id")
    }
}

/// Derives the conventional index name from a key pattern, e.g.
/// `{a: 1, b: -1}` -> `a_1_b_-1`.
fn default_index_name(key_pattern: &Document) -> String {
    let mut name = String::new();
    for (field, direction) in key_pattern.iter() {
        if !name.is_empty() {
            name.push('_');
        }
        name.push_str(field);
        name.push('_');
        match direction {
            Bson::String(plugin) => name.push_str(plugin),
            Bson::Int32(n) => name.push_str(&n.to_string()),
            Bson::Int64(n) => name.push_str(&n.to_string()),
            Bson::Double(n) => name.push_str(&(*n as i64).to_string()),
            other => name.push_str(&other.to_string()),
        }
    }
    name
}

/// The live set of indexes on one collection.
pub struct IndexCatalog {
    indexes: RwLock<Vec<Arc<IndexDescriptor>>>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        IndexCatalog {
            indexes: RwLock::new(Vec::new()),
        }
    }

    pub fn create_index(&self, descriptor: IndexDescriptor) {
        let mut indexes = self
            .indexes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        indexes.push(Arc::new(descriptor));
    }

    /// Snapshot of the catalog; in-progress builds are skipped unless
    /// requested.
    pub fn iterate(&self, include_unfinished: bool) -> Vec<Arc<IndexDescriptor>> {
        let indexes = self
            .indexes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        indexes
            .iter()
            .filter(|descriptor| include_unfinished || !descriptor.is_in_progress())
            .cloned()
            .collect()
    }

    pub fn find_id_index(&self) -> Option<Arc<IndexDescriptor>> {
        let indexes = self
            .indexes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        indexes
            .iter()
            .find(|descriptor| !descriptor.is_in_progress() && descriptor.is_id_index())
            .cloned()
    }
}

impl Default for IndexCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_default_index_names() {
        assert_eq!(IndexDescriptor::new(doc! { "a": 1 }).name(), "a_1");
        assert_eq!(
            IndexDescriptor::new(doc! { "a": 1, "b": -1 }).name(),
            "a_1_b_-1"
        );
        assert_eq!(
            IndexDescriptor::new(doc! { "loc": "2d" }).name(),
            "loc_2d"
        );
    }

    #[test]
    fn test_id_index_detection() {
        assert!(IndexDescriptor::new(doc! { "_id": 1 }).is_id_index());
        assert!(!IndexDescriptor::new(doc! { "a": 1 }).is_id_index());
        assert!(!IndexDescriptor::new(doc! { "_id": 1, "a": 1 }).is_id_index());
    }

    #[test]
    fn test_iterate_skips_unfinished() {
        let catalog = IndexCatalog::new();
        catalog.create_index(IndexDescriptor::new(doc! { "a": 1 }));
        catalog.create_index(IndexDescriptor::new(doc! { "b": 1 }).in_progress(true));

        assert_eq!(catalog.iterate(false).len(), 1);
        assert_eq!(catalog.iterate(true).len(), 2);
    }

    #[test]
    fn test_find_id_index() {
        let catalog = IndexCatalog::new();
        assert!(catalog.find_id_index().is_none());

        catalog.create_index(IndexDescriptor::new(doc! { "a": 1 }));
        catalog.create_index(IndexDescriptor::new(doc! { "_id": 1 }));
        let found = catalog.find_id_index().unwrap();
        assert_eq!(found.name(), "_id_1");
    }
}
