use crate::query::bounds::IndexBounds;
use crate::query::{BsonValue, Expr};
use bson::Document;

/// One node of a query solution.
///
/// A solution is a tree of these variants; every parent owns its children
/// through `Box` slots, so a rewrite can swap a slot and drop the old
/// subtree without touching the rest of the plan.
#[derive(Debug, Clone, PartialEq)]
pub enum SolutionNode {
    /// Full scan of the collection.
    CollectionScan {
        ns: String,
        /// Residual predicate applied to each fetched document.
        filter: Option<Expr>,
        tailable: bool,
    },

    /// Scan of one index over the given bounds.
    IndexScan {
        key_pattern: Document,
        index_name: String,
        bounds: IndexBounds,
        /// 1 for forward, -1 for backward.
        direction: i32,
        /// Residual predicate evaluated against index keys.
        filter: Option<Expr>,
    },

    /// Fetches the full document behind each child result.
    Fetch {
        child: Box<SolutionNode>,
        /// Residual predicate applied after the fetch.
        filter: Option<Expr>,
    },

    /// Applies a projection to the child results.
    Projection {
        child: Box<SolutionNode>,
        spec: Document,
    },

    /// Blocking sort of the child results.
    Sort {
        child: Box<SolutionNode>,
        pattern: Document,
    },

    /// Skips the first `skip` child results.
    Skip { child: Box<SolutionNode>, skip: u64 },

    /// Caps the child results at `limit`.
    Limit { child: Box<SolutionNode>, limit: u64 },

    /// Drops documents not owned by this shard.
    ShardFilter {
        child: Box<SolutionNode>,
        shard_key: Document,
    },

    /// Counts the index keys in one contiguous interval without fetching.
    /// Keys are positional tuples aligned with the key pattern.
    Count {
        key_pattern: Document,
        start_key: Vec<BsonValue>,
        start_key_inclusive: bool,
        end_key: Vec<BsonValue>,
        end_key_inclusive: bool,
    },

    /// Index scan that skips ahead to the next distinct value of the
    /// `field_no`-th key-pattern field after each match.
    DistinctScan {
        key_pattern: Document,
        direction: i32,
        bounds: IndexBounds,
        field_no: usize,
    },
}

impl SolutionNode {
    pub fn children(&self) -> Vec<&SolutionNode> {
        match self {
            SolutionNode::Fetch { child, .. }
            | SolutionNode::Projection { child, .. }
            | SolutionNode::Sort { child, .. }
            | SolutionNode::Skip { child, .. }
            | SolutionNode::Limit { child, .. }
            | SolutionNode::ShardFilter { child, .. } => vec![&**child],
            _ => vec![],
        }
    }

    /// True when any node in the subtree is a blocking sort.
    pub fn has_blocking_sort(&self) -> bool {
        matches!(self, SolutionNode::Sort { .. })
            || self.children().iter().any(|c| c.has_blocking_sort())
    }

    /// The first index-scan node in the subtree, if any.
    pub fn first_index_scan(&self) -> Option<&SolutionNode> {
        if matches!(self, SolutionNode::IndexScan { .. }) {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.first_index_scan())
    }
}

/// Side-band data the plan cache keeps with a winning solution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionCacheData {
    /// Set when admin-configured index filters constrained planning; the
    /// cached entry must not outrank a later hint.
    pub index_filters_applied: bool,
}

/// A complete plan for one query: the node tree plus its cache side-band.
///
/// The runner that executes a solution is its sole owner.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySolution {
    pub root: Box<SolutionNode>,
    pub cache_data: Option<SolutionCacheData>,
}

impl QuerySolution {
    pub fn new(root: SolutionNode) -> Self {
        QuerySolution {
            root: Box::new(root),
            cache_data: Some(SolutionCacheData::default()),
        }
    }

    pub fn has_blocking_sort(&self) -> bool {
        self.root.has_blocking_sort()
    }
}
