use bson::Document;

/// Sharding metadata for one collection: at this layer only the shard key
/// pattern matters, so the planner can attach a shard filter stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionShardMetadata {
    key_pattern: Document,
}

impl CollectionShardMetadata {
    pub fn new(key_pattern: Document) -> Self {
        CollectionShardMetadata { key_pattern }
    }

    pub fn key_pattern(&self) -> &Document {
        &self.key_pattern
    }
}
