use crate::obs::logger::LoggerAndTracer;
use crate::obs::metrics::MetricRegistry;
use crate::query::cursor_registry::CursorRegistry;
use crate::query::plan_cache::PlanCache;
use crate::query::query_settings::QuerySettings;
use std::sync::{Arc, RwLock};

pub mod index_catalog;
pub mod sharding;

use index_catalog::IndexCatalog;
use sharding::CollectionShardMetadata;

/// Options a collection was created with.
#[derive(Debug, Default, Clone)]
pub struct CollectionOptions {
    /// Fixed-size collection preserving insertion order; required for
    /// tailable cursors.
    pub capped: bool,
}

impl CollectionOptions {
    pub fn capped() -> Self {
        CollectionOptions { capped: true }
    }
}

/// Catalog entry for one collection: the state the runner selector consults
/// (indexes, cappedness, per-collection plan cache, query settings, sharding
/// metadata) and the cursor registry runners register with.
pub struct CollectionCatalogEntry {
    ns: String,
    options: CollectionOptions,
    logger: Arc<dyn LoggerAndTracer>,
    index_catalog: IndexCatalog,
    query_settings: QuerySettings,
    plan_cache: PlanCache,
    sharding: RwLock<Option<Arc<CollectionShardMetadata>>>,
    cursor_registry: CursorRegistry,
}

impl CollectionCatalogEntry {
    pub fn new(
        logger: Arc<dyn LoggerAndTracer>,
        metric_registry: &mut MetricRegistry,
        ns: &str,
        options: CollectionOptions,
    ) -> Arc<Self> {
        let knobs = crate::options::options::planner_knobs();
        Arc::new(CollectionCatalogEntry {
            ns: ns.to_string(),
            options,
            logger: logger.clone(),
            index_catalog: IndexCatalog::new(),
            query_settings: QuerySettings::new(),
            plan_cache: PlanCache::new(logger, metric_registry, ns, &knobs),
            sharding: RwLock::new(None),
            cursor_registry: CursorRegistry::new(),
        })
    }

    /// Test-friendly constructor with a silent logger and throwaway metrics.
    pub fn for_namespace(ns: &str) -> Arc<Self> {
        Self::new(
            crate::obs::logger::NoOpLogger::new(),
            &mut MetricRegistry::new(),
            ns,
            CollectionOptions::default(),
        )
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    pub fn is_capped(&self) -> bool {
        self.options.capped
    }

    pub fn logger(&self) -> &Arc<dyn LoggerAndTracer> {
        &self.logger
    }

    pub fn index_catalog(&self) -> &IndexCatalog {
        &self.index_catalog
    }

    pub fn query_settings(&self) -> &QuerySettings {
        &self.query_settings
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plan_cache
    }

    pub fn cursor_registry(&self) -> &CursorRegistry {
        &self.cursor_registry
    }

    pub fn sharding_metadata(&self) -> Option<Arc<CollectionShardMetadata>> {
        self.sharding
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_sharding_metadata(&self, metadata: Option<CollectionShardMetadata>) {
        let mut slot = self
            .sharding
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = metadata.map(Arc::new);
    }
}
