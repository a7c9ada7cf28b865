use crate::obs::logger::LoggerAndTracer;
use crate::obs::metrics::{Computed, Counter, DerivedGauge, Gauge, HitRatio, MetricRegistry};
use crate::options::options::PlannerKnobs;
use crate::query::canonical::CanonicalQuery;
use crate::query::solution::{QuerySolution, SolutionNode};
use moka::sync::Cache;
use std::sync::Arc;

/// A cache entry: the blueprint of a previously winning solution, plus the
/// runner-up the cached-plan runner fails over to.
///
/// The caller of [`PlanCache::get`] owns the returned entry until it is
/// transferred into a cached-plan runner or dropped.
#[derive(Debug, Clone)]
pub struct CachedSolution {
    pub key: String,
    pub plan: SolutionNode,
    pub backup: Option<SolutionNode>,
}

/// Per-collection memo from query shape to previously winning solutions.
///
/// Lookups are internally synchronised; hit/miss counters, an entry gauge
/// and a hit-ratio metric are registered at construction.
pub struct PlanCache {
    logger: Arc<dyn LoggerAndTracer>,
    metrics: Metrics,
    cache: Cache<String, Arc<CachedSolution>>, // key = canonical query shape
}

impl PlanCache {
    pub fn new(
        logger: Arc<dyn LoggerAndTracer>,
        metric_registry: &mut MetricRegistry,
        ns: &str,
        knobs: &PlannerKnobs,
    ) -> Self {
        let cache = Cache::new(knobs.plan_cache_size());
        let metrics = Metrics::new(cache.clone());
        metrics.register_to(metric_registry, ns);

        Self {
            logger,
            metrics,
            cache,
        }
    }

    /// Whether the cache takes part in planning this query at all.
    ///
    /// Trivial, hinted, explained, tailable and disk-loc queries bypass the
    /// cache entirely.
    pub fn should_cache_query(cq: &CanonicalQuery) -> bool {
        if cq.filter_doc().is_empty() && cq.sort().is_empty() {
            return false;
        }
        if !cq.hint().is_empty() {
            return false;
        }
        if cq.is_explain() || cq.is_tailable() || cq.show_disk_loc() {
            return false;
        }
        true
    }

    pub fn get(&self, cq: &CanonicalQuery) -> Option<Arc<CachedSolution>> {
        let key = cq.plan_cache_key();
        match self.cache.get(&key) {
            Some(entry) => {
                self.logger
                    .event(format_args!("event: plan_cache hit, key={}", key));
                self.metrics.hits.inc();
                Some(entry)
            }
            None => {
                self.logger
                    .event(format_args!("event: plan_cache miss, key={}", key));
                self.metrics.misses.inc();
                None
            }
        }
    }

    /// Records the winning solution for this query shape, replacing any
    /// previous entry.
    pub fn add(&self, cq: &CanonicalQuery, winner: &QuerySolution, backup: Option<&QuerySolution>) {
        let key = cq.plan_cache_key();
        self.logger
            .event(format_args!("event: plan_cache add, key={}", key));
        self.cache.insert(
            key.clone(),
            Arc::new(CachedSolution {
                key,
                plan: (*winner.root).clone(),
                backup: backup.map(|solution| (*solution.root).clone()),
            }),
        );
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

struct Metrics {
    /// Number of cached plans currently held.
    entries: Arc<DerivedGauge>,

    /// Lookups answered from the cache.
    hits: Arc<Counter>,

    /// Lookups that fell through to full planning.
    misses: Arc<Counter>,

    /// hits / (hits + misses)
    hit_ratio: Arc<HitRatio>,
}

impl Metrics {
    fn new(cache: Cache<String, Arc<CachedSolution>>) -> Metrics {
        let hits = Counter::new();
        let misses = Counter::new();

        Self {
            entries: DerivedGauge::new(Arc::new(move || cache.entry_count())),
            hits: hits.clone(),
            misses: misses.clone(),
            hit_ratio: HitRatio::new(hits, misses),
        }
    }

    fn register_to(&self, metric_registry: &mut MetricRegistry, ns: &str) {
        let entries: Arc<dyn Gauge> = self.entries.clone();
        let hit_ratio: Arc<dyn Computed> = self.hit_ratio.clone();
        metric_registry
            .register_gauge(&format!("plan_cache_entries.{}", ns), &entries)
            .register_counter(&format!("plan_cache_hit.{}", ns), &self.hits)
            .register_counter(&format!("plan_cache_miss.{}", ns), &self.misses)
            .register_computed(&format!("plan_cache_hit_ratio.{}", ns), &hit_ratio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::logger;
    use crate::query::bounds::IndexBounds;
    use crate::query::canonical::QueryRequest;
    use bson::doc;

    fn sample_solution() -> QuerySolution {
        QuerySolution::new(SolutionNode::Fetch {
            child: Box::new(SolutionNode::IndexScan {
                key_pattern: doc! { "a": 1 },
                index_name: "a_1".to_string(),
                bounds: IndexBounds::all_values(&doc! { "a": 1 }),
                direction: 1,
                filter: None,
            }),
            filter: None,
        })
    }

    fn new_cache(registry: &mut MetricRegistry) -> PlanCache {
        PlanCache::new(
            logger::test_instance(),
            registry,
            "db.c",
            &PlannerKnobs::default(),
        )
    }

    #[test]
    fn test_should_cache_query() {
        let cacheable =
            CanonicalQuery::from_filter("db.c", doc! { "a": { "$gt": 1 } }).unwrap();
        assert!(PlanCache::should_cache_query(&cacheable));

        // sorted-but-unfiltered queries are still worth caching
        let sorted = CanonicalQuery::canonicalize(
            QueryRequest::new("db.c", doc! {}).sort(doc! { "a": 1 }),
        )
        .unwrap();
        assert!(PlanCache::should_cache_query(&sorted));

        let trivial = CanonicalQuery::from_filter("db.c", doc! {}).unwrap();
        assert!(!PlanCache::should_cache_query(&trivial));

        let hinted = CanonicalQuery::canonicalize(
            QueryRequest::new("db.c", doc! { "a": 1 }).hint(doc! { "a": 1 }),
        )
        .unwrap();
        assert!(!PlanCache::should_cache_query(&hinted));

        let explain = CanonicalQuery::canonicalize(
            QueryRequest::new("db.c", doc! { "a": 1 }).explain(true),
        )
        .unwrap();
        assert!(!PlanCache::should_cache_query(&explain));

        let tailable = CanonicalQuery::canonicalize(
            QueryRequest::new("db.c", doc! { "a": 1 }).tailable(true),
        )
        .unwrap();
        assert!(!PlanCache::should_cache_query(&tailable));

        let disk_loc = CanonicalQuery::canonicalize(
            QueryRequest::new("db.c", doc! { "a": 1 }).show_disk_loc(true),
        )
        .unwrap();
        assert!(!PlanCache::should_cache_query(&disk_loc));
    }

    #[test]
    fn test_get_add_and_metrics() {
        let mut registry = MetricRegistry::new();
        let cache = new_cache(&mut registry);

        let cq = CanonicalQuery::from_filter("db.c", doc! { "a": { "$gt": 1 } }).unwrap();
        assert!(cache.get(&cq).is_none());

        cache.add(&cq, &sample_solution(), None);

        // same shape, different constant: hit
        let same_shape =
            CanonicalQuery::from_filter("db.c", doc! { "a": { "$gt": 42 } }).unwrap();
        let entry = cache.get(&same_shape).unwrap();
        assert!(entry.backup.is_none());
        assert_eq!(entry.plan, *sample_solution().root);

        let hits = registry.get_counter("plan_cache_hit.db.c").unwrap();
        let misses = registry.get_counter("plan_cache_miss.db.c").unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(misses.get(), 1);
    }

    #[test]
    fn test_backup_roundtrip_and_clear() {
        let mut registry = MetricRegistry::new();
        let cache = new_cache(&mut registry);
        let cq = CanonicalQuery::from_filter("db.c", doc! { "a": 1 }).unwrap();

        let backup = QuerySolution::new(SolutionNode::CollectionScan {
            ns: "db.c".to_string(),
            filter: None,
            tailable: false,
        });
        cache.add(&cq, &sample_solution(), Some(&backup));

        let entry = cache.get(&cq).unwrap();
        assert_eq!(entry.backup.as_ref(), Some(&*backup.root));

        cache.clear();
        assert!(cache.get(&cq).is_none());
    }
}
