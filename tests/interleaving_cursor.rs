//! Interleaving Cursor Tests
//!
//! Invariants covered:
//! - Every matching document is produced exactly once, before and after takeover
//! - A plan that reaches the match threshold takes over and is cached
//! - A cached plan is raced first on the next query of the same shape
//! - An interrupt fails the cursor on its next advance and it stays failed

use std::collections::HashSet;
use std::sync::Arc;

use aerocursor::executor::{
    new_query_cursor, CursorContext, CursorRequest, ExecutorConfig, Interrupt, QueryCursor,
};
use aerocursor::index::KeyPattern;
use aerocursor::observability::MetricsRegistry;
use aerocursor::planner::{parse_sort, PlanCache, QueryExpr};
use aerocursor::storage::{write_collection, Catalog, CollectionHandle};
use serde_json::{json, Value};

const NS: &str = "test.interleave";

// =============================================================================
// Helpers
// =============================================================================

fn populate(catalog: &Catalog, docs: impl IntoIterator<Item = Value>, indexes: &[&str]) -> CollectionHandle {
    let handle = catalog.get_or_create(NS).unwrap();
    {
        let mut coll = write_collection(&handle);
        for field in indexes {
            coll.create_index(KeyPattern::single(*field), None).unwrap();
        }
        for doc in docs {
            coll.insert(doc).unwrap();
        }
    }
    handle
}

fn open(ctx: &CursorContext, filter: Value, sort: Value) -> Box<dyn QueryCursor> {
    let query = QueryExpr::parse(&filter).unwrap();
    let sort = parse_sort(&sort).unwrap();
    new_query_cursor(ctx, &CursorRequest::new(&query, &sort)).unwrap()
}

/// Drives the cursor the way a batch builder does and returns `_id`s
fn drain_ids(cursor: &mut dyn QueryCursor) -> Vec<i64> {
    let mut ids = Vec::new();
    while cursor.ok() {
        if cursor.current_matches() {
            let pk = cursor.curr_pk().unwrap().clone();
            if !cursor.getsetdup(&pk) {
                ids.push(cursor.current().unwrap()["_id"].as_i64().unwrap());
            }
        }
        cursor.advance().unwrap();
    }
    ids
}

// =============================================================================
// Exactly-once Tests
// =============================================================================

/// Two helpful indexes and the table scan race; 250 matches exceed the
/// takeover threshold, and no document is returned twice.
#[test]
fn test_two_index_race_returns_each_document_once() {
    let catalog = Catalog::new();
    let handle = populate(&catalog, (1..=250).map(|i| json!({"_id": i, "a": i})), &["a"]);
    let cache = Arc::new(PlanCache::new(100));
    let metrics = Arc::new(MetricsRegistry::new());
    let ctx = CursorContext::new(handle, NS, ExecutorConfig::default())
        .with_cache(Arc::clone(&cache))
        .with_metrics(Arc::clone(&metrics));

    let mut cursor = open(&ctx, json!({"_id": {"$gt": 0}, "a": {"$gt": 0}}), json!(null));
    assert_eq!(cursor.describe(), "QueryOptimizerCursor");

    let ids = drain_ids(cursor.as_mut());
    assert_eq!(ids.len(), 250);
    let distinct: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(distinct, (1..=250).collect::<HashSet<_>>());

    assert!(!cursor.ok());
    assert_eq!(metrics.snapshot().plan_takeovers, 1);
    assert!(!cache.is_empty());

    let explain = cursor.explain_info();
    assert_eq!(explain[0].n, 250);
    assert_eq!(explain[0].all_plans.iter().filter(|p| p.picked).count(), 1);
}

/// A small result never reaches the threshold; the race runs to completion
/// and still yields each match once.
#[test]
fn test_race_without_takeover_is_exact() {
    let catalog = Catalog::new();
    let handle = populate(
        &catalog,
        (0..80).map(|i| json!({"_id": i, "a": i % 8, "b": i % 5})),
        &["a", "b"],
    );
    let metrics = Arc::new(MetricsRegistry::new());
    let ctx = CursorContext::new(handle, NS, ExecutorConfig::default()).with_metrics(Arc::clone(&metrics));

    let mut cursor = open(&ctx, json!({"a": {"$gte": 2}, "b": {"$lte": 1}}), json!(null));
    let mut ids = drain_ids(cursor.as_mut());
    ids.sort_unstable();

    let expected: Vec<i64> = (0..80).filter(|i| i % 8 >= 2 && i % 5 <= 1).collect();
    assert_eq!(ids, expected);
    assert_eq!(metrics.snapshot().plan_takeovers, 0);
}

/// A low takeover threshold hands the scan to one plan early; documents
/// seen during the race are not repeated afterwards.
#[test]
fn test_takeover_keeps_dedup_history() {
    let catalog = Catalog::new();
    let handle = populate(&catalog, (0..120).map(|i| json!({"_id": i, "a": i, "b": 119 - i})), &["a", "b"]);
    let config = ExecutorConfig {
        takeover_match_threshold: 5,
        ..ExecutorConfig::default()
    };
    let ctx = CursorContext::new(handle, NS, config);

    let mut cursor = open(&ctx, json!({"a": {"$gte": 0}, "b": {"$gte": 0}}), json!(null));
    let ids = drain_ids(cursor.as_mut());
    let distinct: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 120);
    assert_eq!(distinct.len(), 120);
    assert_ne!(cursor.describe(), "QueryOptimizerCursor");
}

// =============================================================================
// Plan Cache Tests
// =============================================================================

/// After a takeover the winner is cached and reported as the old plan of
/// the next query with the same shape.
#[test]
fn test_cached_winner_is_reused() {
    let catalog = Catalog::new();
    let handle = populate(&catalog, (0..300).map(|i| json!({"_id": i, "a": i, "b": i % 3})), &["a", "b"]);
    let cache = Arc::new(PlanCache::new(100));
    let metrics = Arc::new(MetricsRegistry::new());
    let ctx = CursorContext::new(handle, NS, ExecutorConfig::default())
        .with_cache(Arc::clone(&cache))
        .with_metrics(Arc::clone(&metrics));

    let filter = json!({"a": {"$gte": 0}, "b": {"$gte": 0}});
    let mut first = open(&ctx, filter.clone(), json!(null));
    assert_eq!(drain_ids(first.as_mut()).len(), 300);
    assert_eq!(cache.len(), 1);

    let mut second = open(&ctx, filter, json!(null));
    assert_eq!(drain_ids(second.as_mut()).len(), 300);
    assert!(second.explain_info()[0].old_plan.is_some());
    assert_eq!(metrics.snapshot().plan_cache_hits, 1);
}

// =============================================================================
// Interrupt Tests
// =============================================================================

/// Killing the operation mid-scan fails the next advance; the failure is
/// sticky and no document can be read afterwards.
#[test]
fn test_interrupt_mid_scan() {
    let catalog = Catalog::new();
    let handle = populate(&catalog, (0..200).map(|i| json!({"_id": i, "a": i, "b": i})), &["a", "b"]);
    let interrupt = Interrupt::new();
    let ctx = CursorContext::new(handle, NS, ExecutorConfig::default()).with_interrupt(interrupt.clone());

    let mut cursor = open(&ctx, json!({"a": {"$gte": 0}, "b": {"$gte": 0}}), json!(null));
    for _ in 0..10 {
        cursor.advance().unwrap();
    }
    interrupt.kill();

    let err = cursor.advance().unwrap_err();
    assert!(err.is_interrupted());
    assert!(!cursor.ok());
    assert!(cursor.current().is_err());
    assert!(cursor.advance().unwrap_err().is_interrupted());
}
