use crate::query::bounds::IndexBounds;
use crate::query::solution::{QuerySolution, SolutionNode};
use crate::query::{BsonValue, Expr};
use bson::Document;

/// Shared scratch space for one stage tree. Slots are handed out to stages
/// as they materialise intermediate results; the runner owns it alongside
/// the tree.
#[derive(Debug, Default)]
pub struct WorkingSet {
    next_slot: u64,
}

impl WorkingSet {
    pub fn new() -> Self {
        WorkingSet::default()
    }

    pub fn allocate(&mut self) -> u64 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    pub fn allocated(&self) -> u64 {
        self.next_slot
    }
}

/// An executable stage. Mirrors the solution tree one to one; the execution
/// machinery itself lives behind this crate's boundary.
#[derive(Debug)]
pub enum PlanStage {
    CollScan {
        ns: String,
        filter: Option<Expr>,
        tailable: bool,
    },
    IxScan {
        key_pattern: Document,
        index_name: String,
        bounds: IndexBounds,
        direction: i32,
        filter: Option<Expr>,
    },
    Fetch {
        child: Box<PlanStage>,
        filter: Option<Expr>,
    },
    Projection {
        child: Box<PlanStage>,
        spec: Document,
    },
    Sort {
        child: Box<PlanStage>,
        pattern: Document,
    },
    Skip {
        child: Box<PlanStage>,
        skip: u64,
    },
    Limit {
        child: Box<PlanStage>,
        limit: u64,
    },
    ShardFilter {
        child: Box<PlanStage>,
        shard_key: Document,
    },
    Count {
        key_pattern: Document,
        start_key: Vec<BsonValue>,
        start_key_inclusive: bool,
        end_key: Vec<BsonValue>,
        end_key_inclusive: bool,
    },
    DistinctScan {
        key_pattern: Document,
        direction: i32,
        bounds: IndexBounds,
        field_no: usize,
    },
}

pub struct StageBuilder;

impl StageBuilder {
    /// Turns a solution into its stage tree and the working set the stages
    /// share. Infallible: every solution node has a stage counterpart.
    pub fn build(solution: &QuerySolution) -> (Box<PlanStage>, WorkingSet) {
        let mut working_set = WorkingSet::new();
        let root = Self::build_node(&solution.root, &mut working_set);
        (root, working_set)
    }

    /// Builds a stage tree into an existing working set, so several trees
    /// owned by the same runner can share their scratch space.
    pub fn build_shared(solution: &QuerySolution, working_set: &mut WorkingSet) -> Box<PlanStage> {
        Self::build_node(&solution.root, working_set)
    }

    fn build_node(node: &SolutionNode, working_set: &mut WorkingSet) -> Box<PlanStage> {
        working_set.allocate();
        Box::new(match node {
            SolutionNode::CollectionScan { ns, filter, tailable } => PlanStage::CollScan {
                ns: ns.clone(),
                filter: filter.clone(),
                tailable: *tailable,
            },
            SolutionNode::IndexScan {
                key_pattern,
                index_name,
                bounds,
                direction,
                filter,
            } => PlanStage::IxScan {
                key_pattern: key_pattern.clone(),
                index_name: index_name.clone(),
                bounds: bounds.clone(),
                direction: *direction,
                filter: filter.clone(),
            },
            SolutionNode::Fetch { child, filter } => PlanStage::Fetch {
                child: Self::build_node(child, working_set),
                filter: filter.clone(),
            },
            SolutionNode::Projection { child, spec } => PlanStage::Projection {
                child: Self::build_node(child, working_set),
                spec: spec.clone(),
            },
            SolutionNode::Sort { child, pattern } => PlanStage::Sort {
                child: Self::build_node(child, working_set),
                pattern: pattern.clone(),
            },
            SolutionNode::Skip { child, skip } => PlanStage::Skip {
                child: Self::build_node(child, working_set),
                skip: *skip,
            },
            SolutionNode::Limit { child, limit } => PlanStage::Limit {
                child: Self::build_node(child, working_set),
                limit: *limit,
            },
            SolutionNode::ShardFilter { child, shard_key } => PlanStage::ShardFilter {
                child: Self::build_node(child, working_set),
                shard_key: shard_key.clone(),
            },
            SolutionNode::Count {
                key_pattern,
                start_key,
                start_key_inclusive,
                end_key,
                end_key_inclusive,
            } => PlanStage::Count {
                key_pattern: key_pattern.clone(),
                start_key: start_key.clone(),
                start_key_inclusive: *start_key_inclusive,
                end_key: end_key.clone(),
                end_key_inclusive: *end_key_inclusive,
            },
            SolutionNode::DistinctScan {
                key_pattern,
                direction,
                bounds,
                field_no,
            } => PlanStage::DistinctScan {
                key_pattern: key_pattern.clone(),
                direction: *direction,
                bounds: bounds.clone(),
                field_no: *field_no,
            },
        })
    }
}
