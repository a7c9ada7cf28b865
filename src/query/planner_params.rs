use crate::catalog::CollectionCatalogEntry;
use crate::error::{Error, Result};
use crate::options::options::PlannerKnobs;
use crate::query::canonical::CanonicalQuery;
use crate::query::query_settings::AllowedIndices;
use bson::{Bson, Document};

/// One index the planner may consider, snapshotted from the catalog.
///
/// Lifetime is bound to the `PlannerParams` record holding it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub key_pattern: Document,
    pub multikey: bool,
    pub sparse: bool,
    pub name: String,
    pub info: Document,
}

impl IndexEntry {
    /// The index plugin selected by the key pattern, e.g. `"2d"`, `"hashed"`
    /// or `"text"`. `None` for plain btree indexes. The plugin is named by
    /// the first string-valued field of the pattern.
    pub fn plugin_name(&self) -> Option<&str> {
        self.key_pattern.iter().find_map(|(_, value)| match value {
            Bson::String(plugin) => Some(plugin.as_str()),
            _ => None,
        })
    }

    pub fn first_field(&self) -> Option<&str> {
        self.key_pattern.keys().next().map(|field| field.as_str())
    }
}

/// The configuration bundle handed to the planner.
#[derive(Debug, Default, Clone)]
pub struct PlannerParams {
    pub indices: Vec<IndexEntry>,
    pub options: u32,
    /// Present only when the collection is sharded.
    pub shard_key: Option<Document>,
    /// Set when admin index filters constrained `indices`; tells the planner
    /// to ignore any client hint.
    pub index_filters_applied: bool,
}

impl PlannerParams {
    /// Planning must not generate a full collection scan.
    pub const NO_TABLE_SCAN: u32 = 1 << 0;
    /// Planning may emit a collection-scan candidate alongside index plans.
    pub const INCLUDE_COLLSCAN: u32 = 1 << 1;
    /// Attach a shard filter stage to every plan.
    pub const INCLUDE_SHARD_FILTER: u32 = 1 << 2;
    /// Planning may emit index-intersection candidates.
    pub const INDEX_INTERSECTION: u32 = 1 << 3;
    /// Plans must keep track of documents mutated during the scan.
    pub const KEEP_MUTATIONS: u32 = 1 << 4;
    /// The caller is counting, not returning documents; internal use only.
    pub const PRIVATE_IS_COUNT: u32 = 1 << 5;

    pub fn with_options(options: u32) -> Self {
        PlannerParams {
            options,
            ..Default::default()
        }
    }

    pub fn has_option(&self, option: u32) -> bool {
        self.options & option != 0
    }
}

pub fn index_entry_from_descriptor(
    descriptor: &crate::catalog::index_catalog::IndexDescriptor,
) -> IndexEntry {
    IndexEntry {
        key_pattern: descriptor.key_pattern().clone(),
        multikey: descriptor.is_multikey(),
        sparse: descriptor.is_sparse(),
        name: descriptor.name().to_string(),
        info: descriptor.info().clone(),
    }
}

/// Populates `params` for planning `cq` against `collection`.
///
/// Walks the live index catalog, applies admin index filters, validates
/// tailable constraints, and folds the process-wide knobs and sharding state
/// into the option bits.
pub fn fill_out_planner_params(
    collection: &CollectionCatalogEntry,
    cq: &CanonicalQuery,
    params: &mut PlannerParams,
    knobs: &PlannerKnobs,
) -> Result<()> {
    for descriptor in collection.index_catalog().iterate(false) {
        params.indices.push(index_entry_from_descriptor(&descriptor));
    }

    // Admin-configured index filters override the catalog set and any client
    // hint for this query shape.
    if let Some(allowed) = collection.query_settings().get_allowed_indices(cq) {
        filter_allowed_index_entries(&allowed, &mut params.indices);
        params.index_filters_applied = true;
    }

    // Tailable cursors only work against capped collections, scanned in
    // natural order.
    if cq.is_tailable() {
        if !collection.is_capped() {
            return Err(Error::BadValue(format!(
                "error processing query: {} tailable cursor requested on non capped collection",
                cq
            )));
        }

        let expected_sort = bson::doc! { "$natural": 1 };
        let actual_sort = cq.sort();
        if !actual_sort.is_empty() && *actual_sort != expected_sort {
            return Err(Error::BadValue(format!(
                "error processing query: {} invalid sort specified for tailable cursor: {}",
                cq, actual_sort
            )));
        }
    }

    if knobs.no_table_scan() {
        let ns = cq.ns();
        // Certain namespaces are exempt from the restriction.
        let ignore = cq.filter_doc().is_empty()
            || ns.contains(".system.")
            || ns.starts_with("local.");
        if !ignore {
            params.options |= PlannerParams::NO_TABLE_SCAN;
        }
    }

    if !params.has_option(PlannerParams::NO_TABLE_SCAN) {
        params.options |= PlannerParams::INCLUDE_COLLSCAN;
    }

    // If the caller wants a shard filter, make sure we're actually sharded.
    if params.has_option(PlannerParams::INCLUDE_SHARD_FILTER) {
        match collection.sharding_metadata() {
            Some(metadata) => {
                params.shard_key = Some(metadata.key_pattern().clone());
            }
            None => {
                // Without metadata the key pattern is unknown; drop the
                // filter rather than fail the query.
                params.options &= !PlannerParams::INCLUDE_SHARD_FILTER;
            }
        }
    }

    if knobs.enable_index_intersection() {
        params.options |= PlannerParams::INDEX_INTERSECTION;
    }

    params.options |= PlannerParams::KEEP_MUTATIONS;

    Ok(())
}

fn filter_allowed_index_entries(allowed: &AllowedIndices, indices: &mut Vec<IndexEntry>) {
    indices.retain(|entry| {
        allowed
            .key_patterns()
            .iter()
            .any(|pattern| *pattern == entry.key_pattern)
    });
}
