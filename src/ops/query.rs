//! find, getMore and killCursors
//!
//! A find registers its client cursor before producing anything, through a
//! `ClientCursorHolder`, so kills and invalidations can reach it while the
//! first batch is built. The holder is released only when the cursor is
//! kept for a later getMore; every other exit erases it.

use serde::Serialize;
use serde_json::Value;

use crate::cursor::{
    ClientCursor, ClientCursorHolder, ClientCursorTable, CursorError, CursorId, CursorSource,
    NO_CURSOR_ID,
};
use crate::executor::{new_query_cursor, CursorContext, ExecutorConfig, ExecutorError, ExecutorResult};
use crate::observability::{Event, Logger};

use super::batch::{Batch, BatchLimits};
use super::current_op::{CurrentOpRegistry, OpKind};
use super::errors::OpsResult;
use super::parsed::ParsedQuery;
use super::principal::Principal;
use super::strategy::{BatchOutcome, Remainder, ResponseBuildStrategy, ResultShape};

/// One reply to find or getMore
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub ns: String,
    /// 0 once nothing further can be fetched
    pub cursor_id: CursorId,
    /// Documents returned by earlier batches of the same cursor
    pub starting_from: u64,
    pub documents: Vec<Value>,
}

impl QueryResponse {
    pub fn empty(ns: &str) -> Self {
        Self {
            ns: ns.to_string(),
            cursor_id: NO_CURSOR_ID,
            starting_from: 0,
            documents: Vec::new(),
        }
    }

    pub fn n_returned(&self) -> usize {
        self.documents.len()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

enum Attempt {
    Done(QueryResponse),
    /// A cached plan led to the memory limit and has been forgotten
    Retry,
}

/// Runs a find and returns its first batch.
///
/// When the scan-and-order buffer overflows because a cached plan kept
/// a better candidate out of the race, the cached plan is cleared and the
/// query runs once more from scratch.
pub fn run_query(
    ctx: &CursorContext,
    parsed: &ParsedQuery,
    table: &ClientCursorTable,
) -> OpsResult<QueryResponse> {
    if let Attempt::Done(response) = attempt(ctx, parsed, table, true)? {
        return Ok(response);
    }

    Logger::info(
        Event::QueryRetry.as_str(),
        &[
            ("ns", parsed.ns.as_str()),
            ("reason", "scan_and_order_memory_limit"),
        ],
    );
    if let Some(metrics) = &ctx.metrics {
        metrics.increment_query_retries();
    }
    match attempt(ctx, parsed, table, false)? {
        Attempt::Done(response) => Ok(response),
        Attempt::Retry => Err(ExecutorError::memory_limit(&parsed.ns, ctx.config.scan_and_order_max_bytes).into()),
    }
}

fn attempt(
    ctx: &CursorContext,
    parsed: &ParsedQuery,
    table: &ClientCursorTable,
    may_retry: bool,
) -> OpsResult<Attempt> {
    let cursor = new_query_cursor(ctx, &parsed.cursor_request())?;
    let limits = BatchLimits::first_batch(parsed, &ctx.config);
    let mut strategy = ResponseBuildStrategy::for_query(cursor.as_ref(), parsed, limits, &ctx.config);

    let client_cursor = ClientCursor::new(
        parsed.ns.clone(),
        CursorSource::Live(cursor),
        ctx.interrupt.clone(),
        parsed.filter.clone(),
    )
    .with_options(parsed.options)
    .with_projection(parsed.projection.clone())
    .with_chunk_filter(parsed.chunk_filter.clone())
    .with_limit_remaining(parsed.limit());

    let holder = ClientCursorHolder::register(table, client_cursor);
    let mut pin = table.pin(holder.id())?;
    let Some(cc) = pin.c() else {
        return Err(CursorError::NotFound(holder.id()).into());
    };

    let (source, projection, chunk_filter) = cc.source_and_shaping();
    let shape = ResultShape {
        projection,
        chunk_filter,
    };
    let outcome = match source {
        CursorSource::Live(cursor) => {
            if let Err(err) = strategy.drive(cursor.as_mut(), &shape) {
                if may_retry && err.is_memory_limit() && cursor.has_possibly_excluded_plans() {
                    cursor.clear_cached_plans();
                    return Ok(Attempt::Retry);
                }
                return Err(err.into());
            }
            strategy.finish(cursor.as_ref(), &shape)
        }
        CursorSource::Buffered(_) => {
            return Err(ExecutorError::invalid_access("first batch of a buffered cursor").into());
        }
    };

    let (documents, exhausted) = settle(cc, outcome);
    let cursor_id = if exhausted || parsed.single_batch {
        pin.delete();
        NO_CURSOR_ID
    } else {
        drop(pin);
        holder.release()
    };

    Ok(Attempt::Done(QueryResponse {
        ns: parsed.ns.clone(),
        cursor_id,
        starting_from: 0,
        documents,
    }))
}

/// Stores what is left on the cursor; true when nothing is left
fn settle(cc: &mut ClientCursor, outcome: BatchOutcome) -> (Vec<Value>, bool) {
    let BatchOutcome { batch, remainder } = outcome;
    cc.record_batch(batch.len(), batch.last_ts());
    let drained = match remainder {
        Remainder::Exhausted => true,
        Remainder::Live { limit_remaining } => {
            cc.set_limit_remaining(limit_remaining);
            false
        }
        Remainder::Buffered(rest) => {
            // skip and limit were applied while sorting
            cc.set_limit_remaining(None);
            *cc.source_mut() = CursorSource::Buffered(rest);
            false
        }
    };
    (batch.into_docs(), drained || cc.is_exhausted())
}

/// Continues a saved cursor.
///
/// The cursor must have been created on `ns`; the check runs before any
/// document is read. A cursor that runs out, or whose batch fails, is
/// erased.
pub fn get_more(
    table: &ClientCursorTable,
    ops: &CurrentOpRegistry,
    ns: &str,
    id: CursorId,
    batch_size: usize,
    config: &ExecutorConfig,
) -> OpsResult<QueryResponse> {
    let mut pin = match table.pin(id) {
        Ok(pin) => pin,
        Err(err) => {
            if matches!(err, CursorError::NotFound(_)) {
                Logger::info(
                    Event::GetMoreCursorNotFound.as_str(),
                    &[("cursor_id", id.to_string().as_str()), ("ns", ns)],
                );
            }
            return Err(err.into());
        }
    };
    let Some(cc) = pin.c() else {
        return Err(CursorError::NotFound(id).into());
    };
    if cc.ns() != ns {
        return Err(CursorError::NamespaceMismatch {
            id,
            owner: cc.ns().to_string(),
            presented: ns.to_string(),
        }
        .into());
    }

    let _op = ops.register(OpKind::GetMore, ns, cc.interrupt().clone());
    let starting_from = cc.pos();
    match next_batch(cc, BatchLimits::get_more(batch_size, config)) {
        Ok((documents, exhausted)) => {
            let cursor_id = if exhausted {
                pin.delete();
                NO_CURSOR_ID
            } else {
                id
            };
            Ok(QueryResponse {
                ns: ns.to_string(),
                cursor_id,
                starting_from,
                documents,
            })
        }
        Err(err) => {
            pin.delete();
            Err(err.into())
        }
    }
}

fn next_batch(cc: &mut ClientCursor, limits: BatchLimits) -> ExecutorResult<(Vec<Value>, bool)> {
    cc.interrupt().check()?;
    let limit_remaining = cc.limit_remaining();
    let (source, projection, chunk_filter) = cc.source_and_shaping();
    let shape = ResultShape {
        projection,
        chunk_filter,
    };

    let outcome = match source {
        CursorSource::Live(cursor) => {
            let mut strategy = ResponseBuildStrategy::resume(limit_remaining, limits);
            strategy.drive(cursor.as_mut(), &shape)?;
            strategy.finish(cursor.as_ref(), &shape)
        }
        CursorSource::Buffered(docs) => {
            let mut batch = Batch::new(limits);
            while !batch.is_full() {
                let Some(document) = docs.pop_front() else {
                    break;
                };
                batch.push(&document, shape.projection);
            }
            let remainder = if docs.is_empty() {
                Remainder::Exhausted
            } else {
                Remainder::Buffered(std::mem::take(docs))
            };
            BatchOutcome { batch, remainder }
        }
    };
    Ok(settle(cc, outcome))
}

/// Erases each id the principal may act on; returns how many were erased.
/// Unknown ids are skipped silently.
pub fn kill_cursors(table: &ClientCursorTable, ids: &[CursorId], principal: &Principal) -> usize {
    ids.iter()
        .filter(|id| table.erase_if_authorized(**id, |ns| principal.is_authorized(ns)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorConfig;
    use crate::index::KeyPattern;
    use crate::ops::errors::OpsError;
    use crate::storage::{write_collection, Catalog};
    use serde_json::json;

    fn context(docs: usize) -> CursorContext {
        let catalog = Catalog::new();
        let handle = catalog.get_or_create("db.c").unwrap();
        {
            let mut coll = write_collection(&handle);
            coll.create_index(KeyPattern::single("a"), None).unwrap();
            for i in 0..docs {
                coll.insert(json!({"_id": i as i64, "a": (i % 10) as i64, "ts": i as i64}))
                    .unwrap();
            }
        }
        CursorContext::new(handle, "db.c", ExecutorConfig::default())
    }

    fn find(ctx: &CursorContext, table: &ClientCursorTable, request: Value) -> QueryResponse {
        let parsed = ParsedQuery::parse(&request).unwrap();
        run_query(ctx, &parsed, table).unwrap()
    }

    fn drain(table: &ClientCursorTable, first: QueryResponse, batch_size: usize) -> Vec<Value> {
        let ops = CurrentOpRegistry::new();
        let config = ExecutorConfig::default();
        let mut docs = first.documents;
        let mut id = first.cursor_id;
        while id != NO_CURSOR_ID {
            let more = get_more(table, &ops, "db.c", id, batch_size, &config).unwrap();
            assert_eq!(more.starting_from as usize, docs.len());
            docs.extend(more.documents);
            id = more.cursor_id;
        }
        docs
    }

    #[test]
    fn test_first_batch_then_get_more_to_the_end() {
        let ctx = context(25);
        let table = ClientCursorTable::new(CursorConfig::default());
        let first = find(&ctx, &table, json!({"ns": "db.c", "batchSize": 10}));
        assert_eq!(first.n_returned(), 10);
        assert_ne!(first.cursor_id, NO_CURSOR_ID);
        assert!(table.contains(first.cursor_id));

        let docs = drain(&table, first, 10);
        assert_eq!(docs.len(), 25);
        assert!(table.is_empty());
    }

    #[test]
    fn test_limit_spans_batches() {
        let ctx = context(25);
        let table = ClientCursorTable::new(CursorConfig::default());
        let first = find(&ctx, &table, json!({"ns": "db.c", "batchSize": 4, "limit": 9}));
        assert_eq!(first.n_returned(), 4);
        let docs = drain(&table, first, 4);
        assert_eq!(docs.len(), 9);
        assert!(table.is_empty());
    }

    #[test]
    fn test_sorted_remainder_is_served_from_buffer() {
        let ctx = context(30);
        let table = ClientCursorTable::new(CursorConfig::default());
        let first = find(
            &ctx,
            &table,
            json!({"ns": "db.c", "sort": {"ts": -1}, "batchSize": 7, "projection": {"ts": 1}}),
        );
        assert_eq!(first.n_returned(), 7);
        let docs = drain(&table, first, 7);
        let ts: Vec<i64> = docs.iter().map(|d| d["ts"].as_i64().unwrap()).collect();
        assert_eq!(ts, (0..30).rev().collect::<Vec<i64>>());
        assert!(docs.iter().all(|d| d.get("a").is_none()));
    }

    #[test]
    fn test_single_batch_closes_cursor() {
        let ctx = context(25);
        let table = ClientCursorTable::new(CursorConfig::default());
        let first = find(&ctx, &table, json!({"ns": "db.c", "limit": -5}));
        assert_eq!(first.n_returned(), 5);
        assert_eq!(first.cursor_id, NO_CURSOR_ID);
        assert!(table.is_empty());
    }

    #[test]
    fn test_exhausted_first_batch_leaves_no_cursor() {
        let ctx = context(5);
        let table = ClientCursorTable::new(CursorConfig::default());
        let first = find(&ctx, &table, json!({"ns": "db.c", "filter": {"a": 3}}));
        assert_eq!(first.n_returned(), 1);
        assert_eq!(first.cursor_id, NO_CURSOR_ID);
        assert!(table.is_empty());
    }

    #[test]
    fn test_get_more_rejects_other_namespace_and_keeps_cursor() {
        let ctx = context(25);
        let table = ClientCursorTable::new(CursorConfig::default());
        let ops = CurrentOpRegistry::new();
        let first = find(&ctx, &table, json!({"ns": "db.c", "batchSize": 5}));
        let err = get_more(&table, &ops, "db.other", first.cursor_id, 5, &ExecutorConfig::default())
            .unwrap_err();
        assert!(matches!(err, OpsError::Cursor(CursorError::NamespaceMismatch { .. })));
        assert!(table.contains(first.cursor_id));
        assert_eq!(table.cursor_info().pinned, 0);
    }

    #[test]
    fn test_get_more_unknown_cursor() {
        let table = ClientCursorTable::new(CursorConfig::default());
        let ops = CurrentOpRegistry::new();
        let err = get_more(&table, &ops, "db.c", 42, 5, &ExecutorConfig::default()).unwrap_err();
        assert_eq!(err.code(), "AERO_CURSOR_NOT_FOUND");
    }

    #[test]
    fn test_killed_cursor_fails_and_is_erased() {
        let ctx = context(25);
        let table = ClientCursorTable::new(CursorConfig::default());
        let ops = CurrentOpRegistry::new();
        let first = find(&ctx, &table, json!({"ns": "db.c", "batchSize": 5}));
        ctx.interrupt.kill();
        let err = get_more(&table, &ops, "db.c", first.cursor_id, 5, &ExecutorConfig::default())
            .unwrap_err();
        assert!(err.is_interrupted());
        assert!(!table.contains(first.cursor_id));
    }

    #[test]
    fn test_kill_cursors_counts_erased_ids() {
        let ctx = context(25);
        let table = ClientCursorTable::new(CursorConfig::default());
        let a = find(&ctx, &table, json!({"ns": "db.c", "batchSize": 5})).cursor_id;
        let b = find(&ctx, &table, json!({"ns": "db.c", "batchSize": 5})).cursor_id;

        assert_eq!(kill_cursors(&table, &[a], &Principal::for_databases(["other"])), 0);
        assert_eq!(kill_cursors(&table, &[a, b, 12345], &Principal::all()), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_oplog_replay_bookmark_follows_batches() {
        let ctx = context(10);
        let table = ClientCursorTable::new(CursorConfig::default());
        let first = find(&ctx, &table, json!({"ns": "db.c", "batchSize": 3, "oplogReplay": true}));
        let mut pin = table.pin(first.cursor_id).unwrap();
        let cc = pin.c().unwrap();
        assert_eq!(cc.bookmark(), first.documents.last().and_then(|d| d.get("ts")));
        assert_eq!(cc.pos(), 3);
    }
}
