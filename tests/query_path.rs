//! Request Path Tests
//!
//! Drives the engine the way a client does, one JSON request line at a
//! time through `ApiHandler`.
//!
//! Invariants covered:
//! - A limit is honored across find and every getMore
//! - Exhausted, single-batch and killed cursors answer with cursor id 0
//!   or not-found, never with stale data
//! - Projection and chunk ownership shape every batch, not just the first
//! - Writes and drops reach open cursors and cached plans
//! - Failures carry the code of the subsystem that produced them

use std::sync::Arc;

use aerocursor::api::ApiHandler;
use aerocursor::ops::QueryEngine;
use serde_json::{json, Value};

const NS: &str = "shop.orders";

// =============================================================================
// Helpers
// =============================================================================

fn handler() -> ApiHandler {
    let handler = ApiHandler::new(Arc::new(QueryEngine::default()));
    let index = json!({"op": "createIndex", "ns": NS, "key": {"status": 1}});
    assert!(handler.handle(&index.to_string()).is_success());

    let documents: Vec<Value> = (0..60)
        .map(|i| json!({"_id": i, "status": i % 3, "total": i * 10, "note": "x"}))
        .collect();
    let insert = json!({"op": "insert", "ns": NS, "documents": documents});
    assert!(handler.handle(&insert.to_string()).is_success());
    handler
}

fn call(handler: &ApiHandler, request: Value) -> Value {
    let response = handler.handle(&request.to_string());
    serde_json::from_str(&response.to_json()).unwrap()
}

fn ok(handler: &ApiHandler, request: Value) -> Value {
    let response = call(handler, request);
    assert_eq!(response["status"], "ok", "{}", response);
    response["data"].clone()
}

fn ids(data: &Value) -> Vec<i64> {
    data["documents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["_id"].as_i64().unwrap())
        .collect()
}

/// Follows a cursor to the end; returns every `_id` after the first batch
fn drain(handler: &ApiHandler, mut cursor_id: i64, batch_size: usize) -> Vec<i64> {
    let mut out = Vec::new();
    while cursor_id != 0 {
        let data = ok(
            handler,
            json!({"op": "getMore", "ns": NS, "cursorId": cursor_id, "batchSize": batch_size}),
        );
        out.extend(ids(&data));
        cursor_id = data["cursorId"].as_i64().unwrap();
    }
    out
}

// =============================================================================
// Batching Tests
// =============================================================================

/// 20 matches, limit 13, batches of 4: exactly 13 documents in all.
#[test]
fn test_limit_across_batches() {
    let handler = handler();
    let first = ok(
        &handler,
        json!({"op": "find", "ns": NS, "filter": {"status": 1}, "limit": 13, "batchSize": 4}),
    );
    let mut all = ids(&first);
    assert_eq!(all.len(), 4);

    all.extend(drain(&handler, first["cursorId"].as_i64().unwrap(), 4));
    assert_eq!(all.len(), 13);
    assert!(all.iter().all(|id| id % 3 == 1));
    assert_eq!(ok(&handler, json!({"op": "cursorInfo"}))["totalOpen"], 0);
}

/// A negative limit is one batch and no cursor.
#[test]
fn test_negative_limit_is_single_batch() {
    let handler = handler();
    let data = ok(&handler, json!({"op": "find", "ns": NS, "limit": -7}));
    assert_eq!(ids(&data).len(), 7);
    assert_eq!(data["cursorId"], 0);
}

/// Projection holds for getMore batches too.
#[test]
fn test_projection_applies_to_every_batch() {
    let handler = handler();
    let first = ok(
        &handler,
        json!({"op": "find", "ns": NS, "projection": {"total": 1}, "batchSize": 10}),
    );
    let cursor_id = first["cursorId"].as_i64().unwrap();
    let more = ok(
        &handler,
        json!({"op": "getMore", "ns": NS, "cursorId": cursor_id, "batchSize": 10}),
    );
    for doc in first["documents"].as_array().unwrap().iter().chain(more["documents"].as_array().unwrap()) {
        assert!(doc.get("total").is_some());
        assert!(doc.get("_id").is_some());
        assert!(doc.get("status").is_none());
        assert!(doc.get("note").is_none());
    }
}

/// Documents outside the owned chunks are never returned, on any batch.
#[test]
fn test_chunk_filter_across_batches() {
    let handler = handler();
    let first = ok(
        &handler,
        json!({
            "op": "find",
            "ns": NS,
            "batchSize": 5,
            "chunkFilter": {"key": "total", "ranges": [[0, 100], [300, 400]]}
        }),
    );
    let mut all = ids(&first);
    all.extend(drain(&handler, first["cursorId"].as_i64().unwrap(), 5));
    all.sort_unstable();
    assert_eq!(all, (0..10).chain(30..40).collect::<Vec<_>>());
}

/// Sorted descending with skip, read in pages.
#[test]
fn test_sorted_pages_with_skip() {
    let handler = handler();
    let first = ok(
        &handler,
        json!({"op": "find", "ns": NS, "sort": {"total": -1}, "skip": 10, "batchSize": 15}),
    );
    let mut all = ids(&first);
    all.extend(drain(&handler, first["cursorId"].as_i64().unwrap(), 15));
    assert_eq!(all, (0..50).rev().collect::<Vec<_>>());
}

// =============================================================================
// Kill and Invalidation Tests
// =============================================================================

/// A killed cursor is gone for getMore.
#[test]
fn test_kill_cursors_then_get_more() {
    let handler = handler();
    let first = ok(&handler, json!({"op": "find", "ns": NS, "batchSize": 2}));
    let cursor_id = first["cursorId"].as_i64().unwrap();

    let killed = ok(&handler, json!({"op": "killCursors", "ids": [cursor_id]}));
    assert_eq!(killed["killed"], 1);

    let response = call(
        &handler,
        json!({"op": "getMore", "ns": NS, "cursorId": cursor_id, "batchSize": 2}),
    );
    assert_eq!(response["status"], "error");
    assert_eq!(response["code"], "AERO_CURSOR_NOT_FOUND");
}

/// Dropping the database invalidates its open cursors.
#[test]
fn test_drop_database_invalidates_cursor() {
    let handler = handler();
    let first = ok(&handler, json!({"op": "find", "ns": NS, "batchSize": 2}));
    let dropped = ok(&handler, json!({"op": "dropDatabase", "db": "shop"}));
    assert_eq!(dropped["cursorsInvalidated"], 1);

    let response = call(
        &handler,
        json!({"op": "getMore", "ns": NS, "cursorId": first["cursorId"], "batchSize": 2}),
    );
    assert_eq!(response["code"], "AERO_CURSOR_NOT_FOUND");

    let empty = ok(&handler, json!({"op": "find", "ns": NS}));
    assert!(ids(&empty).is_empty());
}

/// A principal limited to another database cannot read or kill here.
#[test]
fn test_foreign_principal_is_refused() {
    let handler = handler();
    let response = call(&handler, json!({"op": "find", "ns": NS, "databases": ["other"]}));
    assert_eq!(response["code"], "AERO_UNAUTHORIZED");

    let first = ok(&handler, json!({"op": "find", "ns": NS, "batchSize": 2}));
    let killed = ok(
        &handler,
        json!({"op": "killCursors", "ids": [first["cursorId"]], "databases": ["other"]}),
    );
    assert_eq!(killed["killed"], 0);
}

// =============================================================================
// Write Visibility Tests
// =============================================================================

/// Removed documents disappear from later finds; inserts appear.
#[test]
fn test_writes_are_visible_to_new_queries() {
    let handler = handler();
    let removed = ok(&handler, json!({"op": "remove", "ns": NS, "filter": {"status": 2}}));
    assert_eq!(removed["removed"], 20);

    ok(&handler, json!({"op": "insert", "ns": NS, "document": {"_id": 1000, "status": 2}}));
    let data = ok(&handler, json!({"op": "find", "ns": NS, "filter": {"status": 2}}));
    assert_eq!(ids(&data), vec![1000]);
}

/// Dropping an index leaves queries answerable by a table scan.
#[test]
fn test_drop_index_falls_back_to_table_scan() {
    let handler = handler();
    let before = ok(&handler, json!({"op": "explain", "ns": NS, "filter": {"status": 0}}));
    assert_eq!(before["cursor"], "BtreeCursor status_1");

    ok(&handler, json!({"op": "dropIndex", "ns": NS, "name": "status_1"}));
    let after = ok(&handler, json!({"op": "explain", "ns": NS, "filter": {"status": 0}}));
    assert_eq!(after["cursor"], "BasicCursor");
    assert_eq!(after["n"], 20);
}

// =============================================================================
// Diagnostics Tests
// =============================================================================

/// Nothing is in progress between requests; counters track the session.
#[test]
fn test_current_op_and_metrics() {
    let handler = handler();
    let first = ok(&handler, json!({"op": "find", "ns": NS, "batchSize": 50}));
    drain(&handler, first["cursorId"].as_i64().unwrap(), 50);

    let current = ok(&handler, json!({"op": "currentOp"}));
    assert_eq!(current["inprog"], json!([]));

    let metrics = ok(&handler, json!({"op": "metrics"}));
    assert_eq!(metrics["queries_executed"], 1);
    assert_eq!(metrics["get_mores"], 1);
    assert_eq!(metrics["cursors_exhausted"], 1);
}

/// Malformed requests are refused with a request-level code.
#[test]
fn test_malformed_requests() {
    let handler = handler();
    let response = call(&handler, json!({"op": "getMore", "ns": NS}));
    assert_eq!(response["code"], "AERO_INVALID_REQUEST");

    let response = call(&handler, json!({"op": "find", "ns": NS, "sort": {"a": 0}}));
    assert_eq!(response["code"], "AERO_QUERY_INVALID");

    let response = handler.handle("not json");
    assert!(!response.is_success());
}
