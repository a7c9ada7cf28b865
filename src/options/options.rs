use arc_swap::ArcSwap;
use std::sync::{Arc, LazyLock};

/// Process-wide planner knobs.
///
/// Unset fields fall back to the built-in defaults through the getters, so an
/// embedder only ever sets the knobs it cares about.
#[derive(Debug, Default, Clone)]
pub struct PlannerKnobs {
    /// Forbid full collection scans for non-trivial queries.
    no_table_scan: Option<bool>,

    /// Allow the planner to consider index intersection plans.
    enable_index_intersection: Option<bool>,

    /// Maximum number of entries kept per collection plan cache.
    plan_cache_size: Option<u64>,
}

impl PlannerKnobs {
    pub fn no_table_scan(&self) -> bool {
        self.no_table_scan.unwrap_or(false)
    }

    pub fn enable_index_intersection(&self) -> bool {
        self.enable_index_intersection.unwrap_or(false)
    }

    pub fn plan_cache_size(&self) -> u64 {
        self.plan_cache_size.unwrap_or(5_000)
    }

    pub fn with_no_table_scan(mut self, value: bool) -> Self {
        self.no_table_scan = Some(value);
        self
    }

    pub fn with_index_intersection(mut self, value: bool) -> Self {
        self.enable_index_intersection = Some(value);
        self
    }

    pub fn with_plan_cache_size(mut self, value: u64) -> Self {
        self.plan_cache_size = Some(value);
        self
    }
}

static PLANNER_KNOBS: LazyLock<ArcSwap<PlannerKnobs>> =
    LazyLock::new(|| ArcSwap::from_pointee(PlannerKnobs::default()));

/// Returns the current knob snapshot.
///
/// Callers take one snapshot at the start of an invocation and never re-read
/// mid-flight, so a concurrent [`set_planner_knobs`] cannot split a single
/// planning cycle across two policies.
pub fn planner_knobs() -> Arc<PlannerKnobs> {
    PLANNER_KNOBS.load_full()
}

/// Replaces the process-wide knobs.
pub fn set_planner_knobs(knobs: PlannerKnobs) {
    PLANNER_KNOBS.store(Arc::new(knobs));
}
