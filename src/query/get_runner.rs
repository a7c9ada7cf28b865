use crate::catalog::CollectionCatalogEntry;
use crate::error::{Error, Result};
use crate::options::options;
use crate::query::bounds::{IndexBounds, Interval};
use crate::query::canonical::{is_simple_id_query, CanonicalQuery, QueryRequest};
use crate::query::plan_cache::PlanCache;
use crate::query::planner::QueryPlanner;
use crate::query::planner_params::{
    fill_out_planner_params, index_entry_from_descriptor, IndexEntry, PlannerParams,
};
use crate::query::runner::{CandidatePlan, Runner, RunnerKind};
use crate::query::solution::{QuerySolution, SolutionNode};
use crate::query::stage_builder::{StageBuilder, WorkingSet};
use crate::query::BsonValue;
use bson::{doc, Bson, Document};
use std::sync::Arc;

/// For a given query, selects a runner: EOF, id-hack, cached plan, single
/// solution, or a multi-plan race, depending on the cache and the planner.
///
/// Takes ownership of the canonical query; on success it lives inside the
/// returned runner.
pub fn get_runner(
    collection: Option<&Arc<CollectionCatalogEntry>>,
    cq: CanonicalQuery,
    options: u32,
) -> Result<Runner> {
    // This can happen as we're called by internal clients as well.
    let collection = match collection {
        Some(collection) => collection,
        None => {
            let ns = cq.ns().to_string();
            return Ok(Runner::new(&ns, None, Some(cq), RunnerKind::Eof));
        }
    };
    let ns = cq.ns().to_string();

    // If we have an _id index we can answer a trivial _id equality without
    // planning at all.
    if can_use_id_hack(&cq) && collection.index_catalog().find_id_index().is_some() {
        collection
            .logger()
            .debug(format_args!("Using idhack: {}", cq));
        let key = cq.filter_doc().get("_id").cloned().unwrap_or(Bson::Null);
        return Ok(Runner::new(
            &ns,
            Some(collection.clone()),
            Some(cq),
            RunnerKind::IdHack { key },
        ));
    }

    // One knob snapshot per invocation.
    let knobs = options::planner_knobs();
    let mut params = PlannerParams::with_options(options);
    fill_out_planner_params(collection, &cq, &mut params, &knobs)?;

    // Try to reuse a previously winning plan before planning from scratch.
    if PlanCache::should_cache_query(&cq) {
        if let Some(cached) = collection.plan_cache().get(&cq) {
            match QueryPlanner::plan_from_cache(&cq, &params, &cached) {
                Ok((mut primary, mut backup)) => {
                    // A batched query with a sort historically runs the
                    // non-blocking runner-up instead of the cached winner.
                    if cq.has_positive_limit() && !cq.sort().is_empty() {
                        if let Some(backup_solution) = backup.take() {
                            collection.logger().debug(format_args!(
                                "Using backup plan for batched sorted query: {}",
                                cq
                            ));
                            return Ok(single_solution_runner(collection, cq, backup_solution));
                        }
                    }

                    if params.has_option(PlannerParams::PRIVATE_IS_COUNT)
                        && turn_ixscan_into_count(&mut primary)
                    {
                        collection
                            .logger()
                            .debug(format_args!("Using fast count: {}", cq));
                        // A backup plan is not needed when counting.
                        return Ok(single_solution_runner(collection, cq, primary));
                    }

                    collection
                        .logger()
                        .debug(format_args!("Using cached plan: {}", cq));
                    let mut working_set = WorkingSet::new();
                    let root = StageBuilder::build_shared(&primary, &mut working_set);
                    let backup = backup.map(|solution| {
                        let backup_root = StageBuilder::build_shared(&solution, &mut working_set);
                        CandidatePlan {
                            solution,
                            root: backup_root,
                        }
                    });
                    return Ok(Runner::new(
                        &ns,
                        Some(collection.clone()),
                        Some(cq),
                        RunnerKind::CachedPlan {
                            solution: primary,
                            root,
                            backup,
                            working_set,
                        },
                    ));
                }
                Err(error) => {
                    // Hydration failures are recovered by planning from
                    // scratch; they never surface to the caller.
                    collection.logger().warn(format_args!(
                        "Failed to use cached plan, replanning: {}",
                        error
                    ));
                }
            }
        }
    }

    let mut solutions = QueryPlanner::plan(&cq, &params).map_err(|error| {
        Error::BadValue(format!(
            "error processing query: {} planner returned error: {}",
            cq,
            error.reason()
        ))
    })?;

    // We cannot figure out how to answer the query.
    if solutions.is_empty() {
        return Err(Error::BadValue(format!(
            "error processing query: {} No query solutions",
            cq
        )));
    }

    // See if one of our solutions is a fast count in disguise. Fast counts
    // are never cached.
    if params.has_option(PlannerParams::PRIVATE_IS_COUNT) {
        if let Some(index) = solutions
            .iter_mut()
            .position(|solution| turn_ixscan_into_count(solution))
        {
            let solution = solutions.swap_remove(index);
            collection
                .logger()
                .debug(format_args!("Using fast count: {}", cq));
            return Ok(single_solution_runner(collection, cq, solution));
        }
    }

    if solutions.len() == 1 {
        let solution = solutions.swap_remove(0);
        return Ok(single_solution_runner(collection, cq, solution));
    }

    // A batched sorted query prefers the first plan that delivers the sort
    // order without blocking, skipping the race.
    if cq.has_positive_limit() && !cq.sort().is_empty() {
        if let Some(index) = solutions
            .iter()
            .position(|solution| !solution.has_blocking_sort())
        {
            let solution = solutions.swap_remove(index);
            collection.logger().debug(format_args!(
                "Avoiding multi-plan race for batched sorted query: {}",
                cq
            ));
            return Ok(single_solution_runner(collection, cq, solution));
        }
    }

    // Many solutions. Let the multi-plan runner pick the best and update
    // the cache.
    let mut working_set = WorkingSet::new();
    let mut candidates = Vec::with_capacity(solutions.len());
    for mut solution in solutions {
        if let Some(cache_data) = &mut solution.cache_data {
            cache_data.index_filters_applied = params.index_filters_applied;
        }
        let root = StageBuilder::build_shared(&solution, &mut working_set);
        candidates.push(CandidatePlan { solution, root });
    }
    Ok(Runner::new(
        &ns,
        Some(collection.clone()),
        Some(cq),
        RunnerKind::MultiPlan {
            candidates,
            working_set,
        },
    ))
}

/// Runner selection for a not-yet-canonicalised query. A plain `_id`
/// equality with an existing id index skips canonicalisation entirely; the
/// resulting runner then owns no canonical query.
pub fn get_runner_unparsed(
    collection: Option<&Arc<CollectionCatalogEntry>>,
    ns: &str,
    unparsed: &Document,
    options: u32,
) -> Result<Runner> {
    let collection = match collection {
        Some(collection) => collection,
        None => return Ok(Runner::new(ns, None, None, RunnerKind::Eof)),
    };

    if !is_simple_id_query(unparsed) || collection.index_catalog().find_id_index().is_none() {
        let cq = CanonicalQuery::from_filter(ns, unparsed.clone())?;
        return get_runner(Some(collection), cq, options);
    }

    collection
        .logger()
        .debug(format_args!("Using idhack: {}", unparsed));
    let key = unparsed.get("_id").cloned().unwrap_or(Bson::Null);
    Ok(Runner::new(
        ns,
        Some(collection.clone()),
        None,
        RunnerKind::IdHack { key },
    ))
}

/// Runner selection for a count: normal selection with the count rewrite
/// armed.
pub fn get_runner_count(
    collection: &Arc<CollectionCatalogEntry>,
    query: Document,
    hint: Document,
) -> Result<Runner> {
    let cq = CanonicalQuery::canonicalize(QueryRequest::new(collection.ns(), query).hint(hint))?;
    get_runner(Some(collection), cq, PlannerParams::PRIVATE_IS_COUNT)
}

/// Runner selection for a distinct.
///
/// The fast distinct scan works when some index is prefixed by the distinct
/// field, the query is covered by it, and the index scan has no residual
/// filter. Planning runs with only those indexes; if nothing rewrites, we
/// fall back to normal selection.
pub fn get_runner_distinct(
    collection: &Arc<CollectionCatalogEntry>,
    query: Document,
    field: &str,
) -> Result<Runner> {
    let mut params = PlannerParams::with_options(PlannerParams::NO_TABLE_SCAN);
    for descriptor in collection.index_catalog().iterate(false) {
        let prefixed = descriptor
            .key_pattern()
            .keys()
            .next()
            .map(|first| first == field)
            .unwrap_or(false);
        if prefixed {
            params.indices.push(index_entry_from_descriptor(&descriptor));
        }
    }

    // No suitable indexes: bail out into regular planning, no projection.
    if params.indices.is_empty() {
        let cq = CanonicalQuery::from_filter(collection.ns(), query)?;
        return get_runner(Some(collection), cq, 0);
    }

    // Project the distinct key so the planner can offer covered plans.
    let projection = get_distinct_projection(field);
    let cq = CanonicalQuery::canonicalize(
        QueryRequest::new(collection.ns(), query.clone()).projection(projection),
    )?;

    // Without a query, distinct-scan the narrowest suitable index outright.
    if query.is_empty() {
        if let Some(index) = get_distinct_node_index(&params.indices, field) {
            let entry = &params.indices[index];
            collection.logger().debug(format_args!(
                "Using fast distinct over {}: {}",
                entry.name, cq
            ));
            let solution = QuerySolution::new(SolutionNode::DistinctScan {
                key_pattern: entry.key_pattern.clone(),
                direction: 1,
                bounds: IndexBounds::all_values(&entry.key_pattern),
                field_no: 0,
            });
            return Ok(single_solution_runner(collection, cq, solution));
        }
    }

    let mut solutions = match QueryPlanner::plan(&cq, &params) {
        Ok(solutions) => solutions,
        // The restricted index set could not answer the query; plan
        // normally instead.
        Err(_) => return get_runner(Some(collection), cq, 0),
    };

    // First solution with a rewritable index scan wins; the rest are
    // dropped.
    for index in 0..solutions.len() {
        if turn_ixscan_into_distinct_scan(&mut solutions[index], field) {
            let solution = solutions.swap_remove(index);
            collection
                .logger()
                .debug(format_args!("Using fast distinct: {}", cq));
            return Ok(single_solution_runner(collection, cq, solution));
        }
    }

    // Nothing rewrote into a distinct scan; go through normal selection.
    get_runner(Some(collection), cq, 0)
}

fn can_use_id_hack(cq: &CanonicalQuery) -> bool {
    !cq.is_explain()
        && !cq.show_disk_loc()
        && !cq.is_tailable()
        && is_simple_id_query(cq.filter_doc())
}

fn single_solution_runner(
    collection: &Arc<CollectionCatalogEntry>,
    cq: CanonicalQuery,
    solution: QuerySolution,
) -> Runner {
    let ns = cq.ns().to_string();
    let (root, working_set) = StageBuilder::build(&solution);
    Runner::new(
        &ns,
        Some(collection.clone()),
        Some(cq),
        RunnerKind::SingleSolution {
            solution,
            root,
            working_set,
        },
    )
}

/// Collapses FETCH over IXSCAN into a key-interval count when the scan's
/// bounds form one contiguous interval and no residual filters remain.
/// Replaces the solution root in place; the old subtree is dropped.
pub(crate) fn turn_ixscan_into_count(solution: &mut QuerySolution) -> bool {
    let (key_pattern, keys) = match &*solution.root {
        SolutionNode::Fetch { child, filter: None } => match &**child {
            SolutionNode::IndexScan {
                key_pattern,
                bounds,
                filter: None,
                ..
            } => {
                if bounds.is_simple_range {
                    return false;
                }
                match is_single_interval(bounds) {
                    Some(keys) => (key_pattern.clone(), keys),
                    None => return false,
                }
            }
            _ => return false,
        },
        _ => return false,
    };

    let (start_key, start_key_inclusive, end_key, end_key_inclusive) = keys;
    solution.root = Box::new(SolutionNode::Count {
        key_pattern,
        start_key,
        start_key_inclusive,
        end_key,
        end_key_inclusive,
    });
    true
}

/// Decomposes index bounds into a single `[startKey, endKey]` interval.
///
/// The accepted grammar is: zero or more point intervals, then at most one
/// non-point interval, then zero or more all-values intervals (either
/// direction).
pub(crate) fn is_single_interval(
    bounds: &IndexBounds,
) -> Option<(Vec<BsonValue>, bool, Vec<BsonValue>, bool)> {
    let fields = &bounds.fields;
    let mut start_key = Vec::new();
    let mut end_key = Vec::new();

    // Leading point intervals become the equal prefix of both keys.
    let mut field_no = 0;
    while field_no < fields.len() {
        let oil = &fields[field_no];
        if oil.intervals.len() != 1 || !oil.intervals[0].is_point() {
            break;
        }
        start_key.push(oil.intervals[0].start.clone());
        end_key.push(oil.intervals[0].end.clone());
        field_no += 1;
    }

    // All point intervals: we count one value per remaining key.
    if field_no == fields.len() {
        return Some((start_key, true, end_key, true));
    }

    // After the points, exactly one non-point interval contributes its
    // endpoints and decides the inclusivity of both keys.
    let oil = &fields[field_no];
    if oil.intervals.len() != 1 {
        return None;
    }
    let interval = &oil.intervals[0];
    start_key.push(interval.start.clone());
    let start_key_inclusive = interval.start_inclusive;
    end_key.push(interval.end.clone());
    let end_key_inclusive = interval.end_inclusive;
    field_no += 1;

    // Everything after must scan all values. The sentinel appended per
    // field is picked to agree with the inclusivity decided above: an
    // exclusive start must seek past every key sharing the start value, so
    // it appends MaxKey where an inclusive start appends MinKey. A
    // descending all-values interval mirrors the choice.
    let min_max = Interval::all_values();
    let max_min = Interval::all_values_reversed();
    while field_no < fields.len() {
        let oil = &fields[field_no];
        if oil.intervals.len() != 1 {
            return None;
        }
        let interval = &oil.intervals[0];
        if *interval == min_max {
            start_key.push(BsonValue(if start_key_inclusive {
                Bson::MinKey
            } else {
                Bson::MaxKey
            }));
            end_key.push(BsonValue(if end_key_inclusive {
                Bson::MaxKey
            } else {
                Bson::MinKey
            }));
        } else if *interval == max_min {
            start_key.push(BsonValue(if start_key_inclusive {
                Bson::MaxKey
            } else {
                Bson::MinKey
            }));
            end_key.push(BsonValue(if end_key_inclusive {
                Bson::MinKey
            } else {
                Bson::MaxKey
            }));
        } else {
            return None;
        }
        field_no += 1;
    }

    Some((start_key, start_key_inclusive, end_key, end_key_inclusive))
}

/// Swaps the IXSCAN child of a PROJECTION root for a distinct scan over the
/// same bounds. The projection parent is retained; the old scan is dropped.
pub(crate) fn turn_ixscan_into_distinct_scan(
    solution: &mut QuerySolution,
    field: &str,
) -> bool {
    if let SolutionNode::Projection { child, .. } = &mut *solution.root {
        if let SolutionNode::IndexScan {
            key_pattern,
            bounds,
            direction,
            filter,
            ..
        } = &mut **child
        {
            // A residual filter would have to examine every key, which
            // defeats skipping between distinct values.
            if filter.is_some() || bounds.is_simple_range {
                return false;
            }

            // Ordinal of the distinct field in the key pattern; zero when
            // the field is absent.
            let field_no = key_pattern
                .keys()
                .position(|name| name == field)
                .unwrap_or(0);

            let distinct = SolutionNode::DistinctScan {
                key_pattern: std::mem::take(key_pattern),
                direction: *direction,
                bounds: std::mem::take(bounds),
                field_no,
            };
            **child = distinct;
            return true;
        }
    }
    false
}

/// Picks the index the no-query distinct shortcut scans: the fewest
/// key-pattern fields among the non-special indexes prefixed by the field.
/// Ties go to the first candidate.
pub(crate) fn get_distinct_node_index(indices: &[IndexEntry], field: &str) -> Option<usize> {
    let mut best = None;
    let mut min_fields = usize::MAX;
    for (index, entry) in indices.iter().enumerate() {
        // Skip special indexes (geo, hashed, text).
        if entry.plugin_name().is_some() {
            continue;
        }
        if entry.first_field() != Some(field) {
            continue;
        }
        let fields = entry.key_pattern.len();
        if fields < min_fields {
            min_fields = fields;
            best = Some(index);
        }
    }
    best
}

/// The projection a distinct plans under: just the distinct key, with `_id`
/// retained only when it is the key.
fn get_distinct_projection(field: &str) -> Document {
    if field == "_id" {
        return doc! { "_id": 1 };
    }
    let mut projection = doc! { "_id": 0 };
    projection.insert(field, 1);
    projection
}
