use crate::error::{Error, Result};
use crate::query::bounds::{IndexBounds, Interval, OrderedIntervalList};
use crate::query::canonical::CanonicalQuery;
use crate::query::plan_cache::CachedSolution;
use crate::query::planner_params::{IndexEntry, PlannerParams};
use crate::query::solution::{QuerySolution, SolutionNode};
use crate::query::{BsonValue, ComparisonOperator, Expr};
use bson::{Bson, Document};
use std::collections::HashMap;

/// Enumerates candidate solutions for a canonical query.
///
/// The enumeration is heuristic: one candidate per usable index (bounds from
/// the conjunctive predicates, or a sort-providing scan), plus an optional
/// collection scan. Ranking the candidates is the multi-plan runner's job,
/// not the planner's.
pub struct QueryPlanner;

impl QueryPlanner {
    /// Returns zero or more candidate solutions. Zero is not an error here;
    /// the selector decides how to report it.
    pub fn plan(cq: &CanonicalQuery, params: &PlannerParams) -> Result<Vec<QuerySolution>> {
        let can_table_scan = !params.has_option(PlannerParams::NO_TABLE_SCAN);

        // Tailable cursors scan the collection in natural order; nothing else
        // applies.
        if cq.is_tailable() {
            return Ok(vec![build_collscan_solution(cq, true)]);
        }

        // A $natural hint forces the scan direction decision to a collection
        // scan; any other hint restricts planning to the named index.
        let hint = cq.hint();
        let mut hinted_index: Option<&IndexEntry> = None;
        if !hint.is_empty() && !params.index_filters_applied {
            if hint.get("$natural").is_some() {
                if !can_table_scan {
                    return Err(Error::BadValue(
                        "hint $natural is not allowed, because 'notablescan' is enabled"
                            .to_string(),
                    ));
                }
                return Ok(vec![build_collscan_solution(cq, false)]);
            }

            match params.indices.iter().find(|entry| entry.key_pattern == *hint) {
                Some(entry) => hinted_index = Some(entry),
                None => {
                    return Err(Error::BadValue(format!("bad hint: {}", hint)));
                }
            }
        }

        let predicates = conjunctive_predicates(cq.filter());

        let mut solutions = Vec::new();
        let candidates: Vec<&IndexEntry> = match hinted_index {
            Some(entry) => vec![entry],
            None => params.indices.iter().collect(),
        };

        for entry in candidates {
            // Special indexes (geo, hashed, text) answer their own operators,
            // none of which reach this planner.
            if entry.plugin_name().is_some() {
                continue;
            }

            let first_field_predicated = match (&predicates, entry.first_field()) {
                (Some(map), Some(field)) => map.contains_key(field),
                _ => false,
            };
            let provides_sort = !cq.sort().is_empty()
                && sort_order_from_index(&entry.key_pattern, cq.sort()).is_some();

            if !first_field_predicated && !provides_sort && hinted_index.is_none() {
                continue;
            }

            solutions.push(build_index_solution(cq, entry, predicates.as_ref(), params));
        }

        // Emit a collection scan when requested, or when nothing else can
        // answer the query and scanning is still allowed.
        let collscan_requested = params.has_option(PlannerParams::INCLUDE_COLLSCAN);
        let collscan_required = solutions.is_empty() && can_table_scan;
        if collscan_requested || collscan_required {
            solutions.push(build_collscan_solution(cq, false));
        }

        Ok(solutions)
    }

    /// Hydrates a cached entry into a primary solution and, when recorded,
    /// its backup. Fails when the entry references an index that no longer
    /// exists; the caller recovers by planning from scratch.
    pub fn plan_from_cache(
        cq: &CanonicalQuery,
        params: &PlannerParams,
        cached: &CachedSolution,
    ) -> Result<(QuerySolution, Option<QuerySolution>)> {
        let primary = hydrate(cq, params, &cached.plan)?;
        let backup = match &cached.backup {
            Some(node) => Some(hydrate(cq, params, node)?),
            None => None,
        };
        Ok((primary, backup))
    }
}

fn hydrate(
    cq: &CanonicalQuery,
    params: &PlannerParams,
    node: &SolutionNode,
) -> Result<QuerySolution> {
    verify_indexes_exist(cq, params, node)?;
    Ok(QuerySolution {
        root: Box::new(node.clone()),
        cache_data: Some(Default::default()),
    })
}

fn verify_indexes_exist(
    cq: &CanonicalQuery,
    params: &PlannerParams,
    node: &SolutionNode,
) -> Result<()> {
    let key_pattern = match node {
        SolutionNode::IndexScan { key_pattern, .. }
        | SolutionNode::Count { key_pattern, .. }
        | SolutionNode::DistinctScan { key_pattern, .. } => Some(key_pattern),
        _ => None,
    };
    if let Some(pattern) = key_pattern {
        if !params.indices.iter().any(|entry| entry.key_pattern == *pattern) {
            return Err(Error::Internal(format!(
                "cached plan for {} references missing index {}",
                cq, pattern
            )));
        }
    }
    for child in node.children() {
        verify_indexes_exist(cq, params, child)?;
    }
    Ok(())
}

/// Splits a filter into per-field conjunctive predicate lists.
///
/// Returns `None` when the filter's top level is not a conjunction of field
/// predicates (disjunctions, negations and element matches are answered by
/// residual filtering, not bounds).
fn conjunctive_predicates(filter: &Expr) -> Option<HashMap<String, Vec<&Expr>>> {
    match filter {
        Expr::AlwaysTrue => Some(HashMap::new()),
        Expr::FieldFilters { field, filters } => {
            let mut map = HashMap::new();
            map.insert(field.clone(), filters.iter().collect());
            Some(map)
        }
        Expr::And(children) => {
            let mut map: HashMap<String, Vec<&Expr>> = HashMap::new();
            for child in children {
                match child {
                    Expr::FieldFilters { field, filters } => {
                        map.entry(field.clone()).or_default().extend(filters.iter());
                    }
                    _ => return None,
                }
            }
            Some(map)
        }
        _ => None,
    }
}

/// The scan direction with which `key_pattern` delivers `sort`, if any.
fn sort_order_from_index(key_pattern: &Document, sort: &Document) -> Option<i32> {
    if sort.is_empty() || sort.len() > key_pattern.len() {
        return None;
    }

    let mut direction = 0;
    for ((sort_field, sort_dir), (pattern_field, pattern_dir)) in
        sort.iter().zip(key_pattern.iter())
    {
        if sort_field != pattern_field || sort_field.starts_with('$') {
            return None;
        }
        let this_direction = if direction_of(sort_dir) == direction_of(pattern_dir) {
            1
        } else {
            -1
        };
        if direction == 0 {
            direction = this_direction;
        } else if direction != this_direction {
            return None;
        }
    }
    Some(if direction == 0 { 1 } else { direction })
}

fn direction_of(value: &Bson) -> i32 {
    match value {
        Bson::Int32(n) if *n < 0 => -1,
        Bson::Int64(n) if *n < 0 => -1,
        Bson::Double(n) if *n < 0.0 => -1,
        _ => 1,
    }
}

fn build_index_solution(
    cq: &CanonicalQuery,
    entry: &IndexEntry,
    predicates: Option<&HashMap<String, Vec<&Expr>>>,
    params: &PlannerParams,
) -> QuerySolution {
    let (direction, needs_sort) = if cq.sort().is_empty() {
        (1, false)
    } else {
        match sort_order_from_index(&entry.key_pattern, cq.sort()) {
            Some(direction) => (direction, false),
            None => (1, true),
        }
    };

    // Build the bounds field by field. Once a field contributes a non-point
    // interval (or no predicate at all), the remaining fields scan all
    // values.
    let mut fields = Vec::new();
    let mut consumed_all = predicates.is_some();
    let mut prefix_exhausted = false;
    for field in entry.key_pattern.keys() {
        if prefix_exhausted {
            fields.push(OrderedIntervalList::all_values(field));
            continue;
        }

        let field_predicates = predicates.and_then(|map| map.get(field.as_str()));
        match field_predicates {
            None => {
                fields.push(OrderedIntervalList::all_values(field));
                prefix_exhausted = true;
            }
            Some(filters) => {
                let (intervals, consumed) = translate_field_predicates(filters);
                if !consumed {
                    consumed_all = false;
                }
                match intervals {
                    Some(intervals) => {
                        if intervals.len() != 1 || !intervals[0].is_point() {
                            prefix_exhausted = true;
                        }
                        fields.push(OrderedIntervalList::new(field, intervals));
                    }
                    None => {
                        fields.push(OrderedIntervalList::all_values(field));
                        prefix_exhausted = true;
                    }
                }
            }
        }
    }

    // Fields constrained by the filter but absent from the index still need
    // residual filtering.
    if let Some(map) = predicates {
        let pattern_fields: Vec<&str> = entry.key_pattern.keys().map(|k| k.as_str()).collect();
        if map.keys().any(|field| !pattern_fields.contains(&field.as_str())) {
            consumed_all = false;
        }
    }

    let mut bounds = IndexBounds::new(fields);
    if direction == -1 {
        for oil in &mut bounds.fields {
            for interval in &mut oil.intervals {
                interval.reverse();
            }
        }
    }

    let residual = if consumed_all {
        None
    } else {
        Some(cq.filter().clone())
    };

    let index_scan = SolutionNode::IndexScan {
        key_pattern: entry.key_pattern.clone(),
        index_name: entry.name.clone(),
        bounds,
        direction,
        filter: None,
    };

    // Shard filtering needs the document, so it forces the fetch path.
    let shard_filtered =
        params.has_option(PlannerParams::INCLUDE_SHARD_FILTER) && params.shard_key.is_some();

    let covered = !shard_filtered
        && residual.is_none()
        && !entry.multikey
        && cq
            .projection()
            .map(|projection| {
                !projection.requires_document()
                    && projection
                        .required_fields()
                        .iter()
                        .all(|field| entry.key_pattern.get(field.as_str()).is_some())
            })
            .unwrap_or(false);

    let mut root = if covered {
        index_scan
    } else {
        let mut fetched = SolutionNode::Fetch {
            child: Box::new(index_scan),
            filter: residual,
        };
        if shard_filtered {
            if let Some(shard_key) = &params.shard_key {
                fetched = SolutionNode::ShardFilter {
                    child: Box::new(fetched),
                    shard_key: shard_key.clone(),
                };
            }
        }
        fetched
    };

    root = finish_solution(cq, root, needs_sort);
    QuerySolution::new(root)
}

fn build_collscan_solution(cq: &CanonicalQuery, tailable: bool) -> QuerySolution {
    let filter = if cq.filter().is_trivially_true() {
        None
    } else {
        Some(cq.filter().clone())
    };
    let root = SolutionNode::CollectionScan {
        ns: cq.ns().to_string(),
        filter,
        tailable,
    };
    let needs_sort = !cq.sort().is_empty() && cq.sort().get("$natural").is_none();
    QuerySolution::new(finish_solution(cq, root, needs_sort))
}

/// Stacks the common upper stages: blocking sort, projection, skip, limit.
fn finish_solution(cq: &CanonicalQuery, mut root: SolutionNode, needs_sort: bool) -> SolutionNode {
    if needs_sort {
        root = SolutionNode::Sort {
            child: Box::new(root),
            pattern: cq.sort().clone(),
        };
    }
    if let Some(projection) = cq.projection() {
        root = SolutionNode::Projection {
            child: Box::new(root),
            spec: projection.source().clone(),
        };
    }
    if cq.skip() > 0 {
        root = SolutionNode::Skip {
            child: Box::new(root),
            skip: cq.skip(),
        };
    }
    if let Some(limit) = cq.limit() {
        if limit > 0 {
            root = SolutionNode::Limit {
                child: Box::new(root),
                limit,
            };
        }
    }
    root
}

/// Turns one field's predicate list into scan intervals.
///
/// Returns the intervals (None when nothing was translatable) and whether
/// every predicate was folded into them.
fn translate_field_predicates(filters: &[&Expr]) -> (Option<Vec<Interval>>, bool) {
    // A sole $in becomes one point interval per element.
    if let [Expr::Comparison {
        operator: ComparisonOperator::In,
        value,
    }] = filters
    {
        if let Bson::Array(elements) = value.as_bson() {
            let mut points: Vec<BsonValue> =
                elements.iter().cloned().map(BsonValue).collect();
            points.sort();
            points.dedup();
            let intervals = points.into_iter().map(Interval::point).collect();
            return (Some(intervals), true);
        }
    }

    let mut consumed = 0usize;
    let mut point: Option<BsonValue> = None;
    let mut interval = Interval::all_values();
    let mut bounded = false;

    for filter in filters {
        if let Expr::Comparison { operator, value } = filter {
            match operator {
                ComparisonOperator::Eq => {
                    point = Some(value.clone());
                    consumed += 1;
                }
                ComparisonOperator::Gt => {
                    tighten_lower(&mut interval, value.clone(), false);
                    bounded = true;
                    consumed += 1;
                }
                ComparisonOperator::Gte => {
                    tighten_lower(&mut interval, value.clone(), true);
                    bounded = true;
                    consumed += 1;
                }
                ComparisonOperator::Lt => {
                    tighten_upper(&mut interval, value.clone(), false);
                    bounded = true;
                    consumed += 1;
                }
                ComparisonOperator::Lte => {
                    tighten_upper(&mut interval, value.clone(), true);
                    bounded = true;
                    consumed += 1;
                }
                _ => {}
            }
        }
    }

    let consumed_all = consumed == filters.len();
    if let Some(value) = point {
        // An equality subsumes any range predicates on the same field, but
        // the ranges then have to be re-checked by a residual filter.
        let exact = consumed_all && filters.len() == 1;
        return (Some(vec![Interval::point(value)]), exact);
    }
    if bounded {
        (Some(vec![interval]), consumed_all)
    } else {
        (None, consumed_all && filters.is_empty())
    }
}

fn tighten_lower(interval: &mut Interval, value: BsonValue, inclusive: bool) {
    match value.cmp(&interval.start) {
        std::cmp::Ordering::Greater => {
            interval.start = value;
            interval.start_inclusive = inclusive;
        }
        std::cmp::Ordering::Equal => {
            interval.start_inclusive = interval.start_inclusive && inclusive;
        }
        std::cmp::Ordering::Less => {}
    }
}

fn tighten_upper(interval: &mut Interval, value: BsonValue, inclusive: bool) {
    match value.cmp(&interval.end) {
        std::cmp::Ordering::Less => {
            interval.end = value;
            interval.end_inclusive = inclusive;
        }
        std::cmp::Ordering::Equal => {
            interval.end_inclusive = interval.end_inclusive && inclusive;
        }
        std::cmp::Ordering::Greater => {}
    }
}
