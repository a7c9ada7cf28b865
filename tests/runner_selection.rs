use bson::{doc, Bson, Document};
use std::sync::Arc;
use wallabydb::catalog::index_catalog::IndexDescriptor;
use wallabydb::catalog::CollectionCatalogEntry;
use wallabydb::query::bounds::{IndexBounds, Interval};
use wallabydb::query::cursor_registry::ScopedRunnerRegistration;
use wallabydb::query::planner_params::PlannerParams;
use wallabydb::query::solution::{QuerySolution, SolutionNode};
use wallabydb::query::BsonValue;
use wallabydb::{
    get_runner, get_runner_count, get_runner_distinct, get_runner_unparsed, CanonicalQuery,
    QueryRequest, RunnerKind,
};

fn setup_collection(ns: &str, key_patterns: &[Document]) -> Arc<CollectionCatalogEntry> {
    let collection = CollectionCatalogEntry::for_namespace(ns);
    for pattern in key_patterns {
        collection
            .index_catalog()
            .create_index(IndexDescriptor::new(pattern.clone()));
    }
    collection
}

#[test]
fn test_missing_collection_yields_eof_runner() {
    let cq = CanonicalQuery::from_filter("t.c", doc! { "a": 5 }).unwrap();
    let runner = get_runner(None, cq, 0).unwrap();

    assert!(matches!(runner.kind(), RunnerKind::Eof));
    assert_eq!(runner.ns(), "t.c");
    assert!(runner.collection().is_none());
    assert!(runner.canonical_query().is_some());
}

#[test]
fn test_simple_id_query_uses_idhack() {
    let collection = setup_collection("t.c", &[doc! { "_id": 1 }, doc! { "a": 1 }]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "_id": 42 }).unwrap();
    let runner = get_runner(Some(&collection), cq, 0).unwrap();

    match runner.kind() {
        RunnerKind::IdHack { key } => assert_eq!(key, &Bson::Int32(42)),
        other => panic!("expected IdHack, got {:?}", std::mem::discriminant(other)),
    }
}

#[test]
fn test_idhack_needs_an_id_index() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "_id": 42 }).unwrap();
    let runner = get_runner(Some(&collection), cq, 0).unwrap();
    assert!(!matches!(runner.kind(), RunnerKind::IdHack { .. }));
}

#[test]
fn test_unparsed_idhack_skips_canonicalization() {
    let collection = setup_collection("t.c", &[doc! { "_id": 1 }]);
    let runner =
        get_runner_unparsed(Some(&collection), "t.c", &doc! { "_id": 7 }, 0).unwrap();

    assert!(matches!(runner.kind(), RunnerKind::IdHack { .. }));
    assert!(runner.canonical_query().is_none());
}

#[test]
fn test_unparsed_non_id_query_canonicalizes() {
    let collection = setup_collection("t.c", &[doc! { "_id": 1 }, doc! { "a": 1 }]);
    let runner = get_runner_unparsed(
        Some(&collection),
        "t.c",
        &doc! { "a": { "$gt": 5 } },
        PlannerParams::NO_TABLE_SCAN,
    )
    .unwrap();

    assert!(runner.canonical_query().is_some());
    assert!(matches!(runner.kind(), RunnerKind::SingleSolution { .. }));
}

#[test]
fn test_unparsed_missing_collection_is_eof_without_query() {
    let runner = get_runner_unparsed(None, "t.c", &doc! { "_id": 7 }, 0).unwrap();
    assert!(matches!(runner.kind(), RunnerKind::Eof));
    assert!(runner.canonical_query().is_none());
}

#[test]
fn test_tailable_on_non_capped_collection_fails() {
    let collection = setup_collection("t.c", &[]);
    let cq = CanonicalQuery::canonicalize(
        QueryRequest::new("t.c", doc! {}).tailable(true),
    )
    .unwrap();
    let err = get_runner(Some(&collection), cq, 0).unwrap_err();
    assert!(err.is_bad_value());
    assert!(err
        .reason()
        .contains("tailable cursor requested on non capped collection"));
}

#[test]
fn test_single_solution_runner() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "a": { "$gt": 5 } }).unwrap();
    let runner = get_runner(Some(&collection), cq, PlannerParams::NO_TABLE_SCAN).unwrap();

    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => {
            assert!(matches!(*solution.root, SolutionNode::Fetch { .. }));
        }
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_multiple_solutions_race_in_multi_plan_runner() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }, doc! { "a": 1, "b": 1 }]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "a": 5 }).unwrap();
    let runner = get_runner(Some(&collection), cq, 0).unwrap();

    match runner.kind() {
        RunnerKind::MultiPlan { candidates, .. } => {
            // two index plans plus the raced collection scan
            assert_eq!(candidates.len(), 3);
            for candidate in candidates {
                assert_eq!(
                    candidate.solution.cache_data.as_ref().map(|data| data.index_filters_applied),
                    Some(false)
                );
            }
        }
        other => panic!("expected MultiPlan, got {:?}", std::mem::discriminant(other)),
    }
}

#[test]
fn test_batched_sorted_query_prefers_non_blocking_plan() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }, doc! { "b": 1 }]);
    let cq = CanonicalQuery::canonicalize(
        QueryRequest::new("t.c", doc! { "a": { "$gt": 5 } })
            .sort(doc! { "b": 1 })
            .limit(5),
    )
    .unwrap();
    let runner = get_runner(Some(&collection), cq, PlannerParams::NO_TABLE_SCAN).unwrap();

    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => {
            assert!(!solution.has_blocking_sort());
        }
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_no_query_solutions_is_bad_value() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "zzz": 1 }).unwrap();
    let err = get_runner(Some(&collection), cq, PlannerParams::NO_TABLE_SCAN).unwrap_err();
    assert!(err.is_bad_value());
    assert!(err.reason().contains("No query solutions"));
}

#[test]
fn test_planner_error_is_surfaced_with_query_context() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    let cq = CanonicalQuery::canonicalize(
        QueryRequest::new("t.c", doc! { "a": 5 }).hint(doc! { "nope": 1 }),
    )
    .unwrap();
    let err = get_runner(Some(&collection), cq, 0).unwrap_err();
    assert!(err.is_bad_value());
    assert!(err.reason().contains("error processing query"));
    assert!(err.reason().contains("planner returned error"));
    assert!(err.reason().contains("bad hint"));
}

#[test]
fn test_count_hack_end_to_end() {
    // Indexes {a:1} and {a:1,b:1}, query {a: {$gt: 5}}: the planner's
    // FETCH over IXSCAN with bounds a:(5, MaxKey] collapses into a count
    // over a single key interval.
    let collection = setup_collection("t.c", &[doc! { "a": 1 }, doc! { "a": 1, "b": 1 }]);
    let runner = get_runner_count(&collection, doc! { "a": { "$gt": 5 } }, doc! {}).unwrap();

    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => match &*solution.root {
            SolutionNode::Count {
                start_key,
                start_key_inclusive,
                end_key,
                end_key_inclusive,
                ..
            } => {
                assert_eq!(start_key, &vec![BsonValue(Bson::Int32(5))]);
                assert!(!start_key_inclusive);
                assert_eq!(end_key, &vec![BsonValue(Bson::MaxKey)]);
                assert!(end_key_inclusive);
            }
            other => panic!("expected Count root, got {:?}", other),
        },
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_count_without_usable_interval_still_runs() {
    // An unindexed count can't use the rewrite; it must still produce a
    // runner over a collection scan.
    let collection = setup_collection("t.c", &[]);
    let runner = get_runner_count(&collection, doc! { "zzz": 1 }, doc! {}).unwrap();
    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => {
            assert!(matches!(*solution.root, SolutionNode::CollectionScan { .. }));
        }
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_distinct_no_query_picks_narrowest_index() {
    let collection = setup_collection("t.c", &[doc! { "x": 1, "y": 1 }, doc! { "x": 1 }]);
    let runner = get_runner_distinct(&collection, doc! {}, "x").unwrap();

    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => match &*solution.root {
            SolutionNode::DistinctScan {
                key_pattern,
                direction,
                bounds,
                field_no,
            } => {
                assert_eq!(*key_pattern, doc! { "x": 1 });
                assert_eq!(*direction, 1);
                assert_eq!(*bounds, IndexBounds::all_values(&doc! { "x": 1 }));
                assert_eq!(*field_no, 0);
            }
            other => panic!("expected DistinctScan root, got {:?}", other),
        },
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_distinct_with_query_rewrites_covered_plan() {
    let collection = setup_collection("t.c", &[doc! { "x": 1 }]);
    let runner =
        get_runner_distinct(&collection, doc! { "x": { "$gt": 1 } }, "x").unwrap();

    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => match &*solution.root {
            SolutionNode::Projection { child, .. } => {
                assert!(matches!(**child, SolutionNode::DistinctScan { .. }));
            }
            other => panic!("expected Projection root, got {:?}", other),
        },
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_distinct_without_prefixed_index_falls_back() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    let runner = get_runner_distinct(&collection, doc! {}, "z").unwrap();

    // normal planning: an empty query over an unrelated index becomes a
    // plain collection scan
    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => {
            assert!(matches!(*solution.root, SolutionNode::CollectionScan { .. }));
        }
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_cached_plan_is_reused() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "a": { "$gt": 5 } }).unwrap();

    // run once to obtain the winning solution, then seed the cache with it
    let first = get_runner(Some(&collection), cq.clone(), PlannerParams::NO_TABLE_SCAN).unwrap();
    let winner = first.solution().expect("single solution").clone();
    collection.plan_cache().add(&cq, &winner, None);

    let runner = get_runner(Some(&collection), cq, PlannerParams::NO_TABLE_SCAN).unwrap();
    match runner.kind() {
        RunnerKind::CachedPlan { solution, backup, .. } => {
            assert_eq!(*solution, winner);
            assert!(backup.is_none());
        }
        other => panic!(
            "expected CachedPlan, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_cached_backup_preferred_for_batched_sorted_query() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }, doc! { "b": 1 }]);
    let cq = CanonicalQuery::canonicalize(
        QueryRequest::new("t.c", doc! { "a": { "$gt": 5 } })
            .sort(doc! { "b": 1 })
            .limit(2),
    )
    .unwrap();

    let backup = QuerySolution::new(SolutionNode::Fetch {
        child: Box::new(SolutionNode::IndexScan {
            key_pattern: doc! { "b": 1 },
            index_name: "b_1".to_string(),
            bounds: IndexBounds::all_values(&doc! { "b": 1 }),
            direction: 1,
            filter: None,
        }),
        filter: None,
    });
    let winner = QuerySolution::new(SolutionNode::Sort {
        child: Box::new(SolutionNode::Fetch {
            child: Box::new(SolutionNode::IndexScan {
                key_pattern: doc! { "a": 1 },
                index_name: "a_1".to_string(),
                bounds: IndexBounds::all_values(&doc! { "a": 1 }),
                direction: 1,
                filter: None,
            }),
            filter: None,
        }),
        pattern: doc! { "b": 1 },
    });
    collection.plan_cache().add(&cq, &winner, Some(&backup));

    let runner = get_runner(Some(&collection), cq, 0).unwrap();
    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => {
            // the backup, not the cached winner, is executed
            assert_eq!(*solution, backup);
        }
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_cached_plan_count_rewrite_drops_backup() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "a": { "$gt": 5 } }).unwrap();

    let winner = QuerySolution::new(SolutionNode::Fetch {
        child: Box::new(SolutionNode::IndexScan {
            key_pattern: doc! { "a": 1 },
            index_name: "a_1".to_string(),
            bounds: IndexBounds::new(vec![
                wallabydb::query::bounds::OrderedIntervalList::new(
                    "a",
                    vec![Interval::new(
                        BsonValue(Bson::Int32(5)),
                        BsonValue(Bson::MaxKey),
                        false,
                        true,
                    )],
                ),
            ]),
            direction: 1,
            filter: None,
        }),
        filter: None,
    });
    let backup = QuerySolution::new(SolutionNode::CollectionScan {
        ns: "t.c".to_string(),
        filter: None,
        tailable: false,
    });
    collection.plan_cache().add(&cq, &winner, Some(&backup));

    let runner =
        get_runner(Some(&collection), cq, PlannerParams::PRIVATE_IS_COUNT).unwrap();
    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => {
            assert!(matches!(*solution.root, SolutionNode::Count { .. }));
        }
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_cache_hydration_failure_falls_through_to_planning() {
    let collection = setup_collection("t.c", &[]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "a": 5 }).unwrap();

    // cached plan references an index that no longer exists
    let stale = QuerySolution::new(SolutionNode::Fetch {
        child: Box::new(SolutionNode::IndexScan {
            key_pattern: doc! { "a": 1 },
            index_name: "a_1".to_string(),
            bounds: IndexBounds::all_values(&doc! { "a": 1 }),
            direction: 1,
            filter: None,
        }),
        filter: None,
    });
    collection.plan_cache().add(&cq, &stale, None);

    // recovered locally: full planning produces a collection scan
    let runner = get_runner(Some(&collection), cq, 0).unwrap();
    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => {
            assert!(matches!(*solution.root, SolutionNode::CollectionScan { .. }));
        }
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_scoped_registration_roundtrip() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "a": { "$gt": 5 } }).unwrap();
    let runner = get_runner(Some(&collection), cq, PlannerParams::NO_TABLE_SCAN).unwrap();

    let before = collection.cursor_registry().registered_count();
    {
        let _registration = ScopedRunnerRegistration::new(&runner);
        assert_eq!(collection.cursor_registry().registered_count(), before + 1);
    }
    // the registry holds the same set of runners as before the scope
    assert_eq!(collection.cursor_registry().registered_count(), before);
}

#[test]
fn test_scoped_registration_is_a_noop_for_eof() {
    let cq = CanonicalQuery::from_filter("t.c", doc! {}).unwrap();
    let runner = get_runner(None, cq, 0).unwrap();
    let _registration = ScopedRunnerRegistration::new(&runner);
    // nothing to assert against a registry: the runner has no collection
    assert!(runner.is_eof());
}

#[test]
fn test_shard_filter_stage_attached_when_sharded() {
    use wallabydb::catalog::sharding::CollectionShardMetadata;

    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    collection.set_sharding_metadata(Some(CollectionShardMetadata::new(doc! { "a": 1 })));

    let cq = CanonicalQuery::from_filter("t.c", doc! { "a": { "$gt": 5 } }).unwrap();
    let runner = get_runner(
        Some(&collection),
        cq,
        PlannerParams::NO_TABLE_SCAN | PlannerParams::INCLUDE_SHARD_FILTER,
    )
    .unwrap();

    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => match &*solution.root {
            SolutionNode::ShardFilter { shard_key, .. } => {
                assert_eq!(*shard_key, doc! { "a": 1 });
            }
            other => panic!("expected ShardFilter root, got {:?}", other),
        },
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}

#[test]
fn test_shard_filter_silently_dropped_when_not_sharded() {
    let collection = setup_collection("t.c", &[doc! { "a": 1 }]);
    let cq = CanonicalQuery::from_filter("t.c", doc! { "a": { "$gt": 5 } }).unwrap();
    let runner = get_runner(
        Some(&collection),
        cq,
        PlannerParams::NO_TABLE_SCAN | PlannerParams::INCLUDE_SHARD_FILTER,
    )
    .unwrap();

    match runner.kind() {
        RunnerKind::SingleSolution { solution, .. } => {
            assert!(matches!(*solution.root, SolutionNode::Fetch { .. }));
        }
        other => panic!(
            "expected SingleSolution, got {:?}",
            std::mem::discriminant(other)
        ),
    }
}
