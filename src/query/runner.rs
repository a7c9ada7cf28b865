use crate::catalog::CollectionCatalogEntry;
use crate::query::canonical::CanonicalQuery;
use crate::query::solution::QuerySolution;
use crate::query::stage_builder::{PlanStage, WorkingSet};
use bson::Bson;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_RUNNER_ID: AtomicU64 = AtomicU64::new(1);

/// One candidate plan owned by a multi-plan runner.
#[derive(Debug)]
pub struct CandidatePlan {
    pub solution: QuerySolution,
    pub root: Box<PlanStage>,
}

/// The executable variants a selector invocation can produce.
#[derive(Debug)]
pub enum RunnerKind {
    /// The collection does not exist; yields nothing.
    Eof,

    /// Point lookup through the `_id` index, bypassing the planner.
    IdHack { key: Bson },

    /// Exactly one plan survived selection.
    SingleSolution {
        solution: QuerySolution,
        root: Box<PlanStage>,
        working_set: WorkingSet,
    },

    /// A cached winner, plus the runner-up to fail over to if the winner
    /// underperforms its history.
    CachedPlan {
        solution: QuerySolution,
        root: Box<PlanStage>,
        backup: Option<CandidatePlan>,
        working_set: WorkingSet,
    },

    /// Several candidates to race; the winner is kept and reported back to
    /// the plan cache.
    MultiPlan {
        candidates: Vec<CandidatePlan>,
        working_set: WorkingSet,
    },
}

/// A constructed runner: the object handed back to the caller.
///
/// Owns its canonical query (when one was produced), its solution(s) and
/// stage tree(s). May be registered with the owning collection's cursor
/// registry for the duration of a scope.
pub struct Runner {
    id: u64,
    ns: String,
    collection: Option<Arc<CollectionCatalogEntry>>,
    canonical_query: Option<CanonicalQuery>,
    kind: RunnerKind,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("id", &self.id)
            .field("ns", &self.ns)
            .field("collection", &self.collection.is_some())
            .field("canonical_query", &self.canonical_query)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Runner {
    pub fn new(
        ns: &str,
        collection: Option<Arc<CollectionCatalogEntry>>,
        canonical_query: Option<CanonicalQuery>,
        kind: RunnerKind,
    ) -> Runner {
        Runner {
            id: NEXT_RUNNER_ID.fetch_add(1, Ordering::Relaxed),
            ns: ns.to_string(),
            collection,
            canonical_query,
            kind,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// `None` for an EOF runner over a missing collection.
    pub fn collection(&self) -> Option<&Arc<CollectionCatalogEntry>> {
        self.collection.as_ref()
    }

    /// `None` when the id-hack fast path skipped canonicalisation.
    pub fn canonical_query(&self) -> Option<&CanonicalQuery> {
        self.canonical_query.as_ref()
    }

    pub fn kind(&self) -> &RunnerKind {
        &self.kind
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, RunnerKind::Eof)
    }

    /// The solution this runner executes, for single-plan variants.
    pub fn solution(&self) -> Option<&QuerySolution> {
        match &self.kind {
            RunnerKind::SingleSolution { solution, .. }
            | RunnerKind::CachedPlan { solution, .. } => Some(solution),
            _ => None,
        }
    }
}
