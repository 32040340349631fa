//! Response build strategies
//!
//! How matching documents become a batch depends on whether the cursor's
//! candidate plans can produce the requested order:
//!
//! - `Ordered`: every plan supplies the order (or none was asked for);
//!   documents stream straight into the batch
//! - `Reorder`: no plan supplies it; everything goes through a
//!   scan-and-order buffer and the batch is cut from the sorted result
//! - `Hybrid`: one in-order plan races out-of-order ones. In-order output
//!   streams while out-of-order output is buffered on the side; whichever
//!   plan finishes decides which of the two is returned

use std::collections::VecDeque;

use serde_json::Value;

use crate::executor::{
    ChunkFilter, DupSet, ExecutorConfig, ExecutorResult, Projection, QueryCursor,
    ScanAndOrderBuffer,
};
use crate::observability::{Event, Logger};

use super::batch::{Batch, BatchLimits};
use super::parsed::ParsedQuery;

/// Per-document shaping applied while filling any batch
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultShape<'a> {
    pub projection: Option<&'a Projection>,
    pub chunk_filter: Option<&'a ChunkFilter>,
}

impl ResultShape<'_> {
    fn owns(&self, document: &Value) -> bool {
        self.chunk_filter.map_or(true, |filter| filter.belongs(document))
    }
}

/// What is left after a batch
pub enum Remainder {
    /// Nothing further to return
    Exhausted,
    /// The cursor is positioned on the next unprocessed document
    Live { limit_remaining: Option<usize> },
    /// Sorted documents not yet sent
    Buffered(VecDeque<Value>),
}

pub struct BatchOutcome {
    pub batch: Batch,
    pub remainder: Remainder,
}

/// Streams in-order matches, applying dedup, chunk ownership, skip and limit
pub struct OrderedBuild {
    skip_remaining: usize,
    limit_remaining: Option<usize>,
    batch: Batch,
}

impl OrderedBuild {
    pub fn new(skip: usize, limit: Option<usize>, limits: BatchLimits) -> Self {
        Self {
            skip_remaining: skip,
            limit_remaining: limit,
            batch: Batch::new(limits),
        }
    }

    fn limit_reached(&self) -> bool {
        self.limit_remaining == Some(0)
    }

    fn enough(&self) -> bool {
        self.limit_reached() || self.batch.is_full()
    }

    fn handle_match(&mut self, cursor: &mut dyn QueryCursor, shape: &ResultShape<'_>) -> ExecutorResult<()> {
        let pk = cursor.curr_pk()?.clone();
        if cursor.getsetdup(&pk) {
            return Ok(());
        }
        let document = cursor.current()?;
        if !shape.owns(document) {
            return Ok(());
        }
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            return Ok(());
        }
        self.batch.push(document, shape.projection);
        if let Some(remaining) = self.limit_remaining.as_mut() {
            *remaining -= 1;
        }
        Ok(())
    }

    fn finish(self, cursor: &dyn QueryCursor) -> BatchOutcome {
        let remainder = if self.limit_reached() || !cursor.ok() {
            Remainder::Exhausted
        } else {
            Remainder::Live {
                limit_remaining: self.limit_remaining,
            }
        };
        BatchOutcome {
            batch: self.batch,
            remainder,
        }
    }

    pub fn into_batch(self) -> Batch {
        self.batch
    }
}

/// Buffers every match, sorts once the scan is exhausted
pub struct ReorderBuild {
    buffer: ScanAndOrderBuffer,
    skip: usize,
    limit: usize,
    limits: BatchLimits,
}

impl ReorderBuild {
    fn handle_match(&mut self, cursor: &mut dyn QueryCursor, shape: &ResultShape<'_>) -> ExecutorResult<()> {
        let pk = cursor.curr_pk()?.clone();
        if cursor.getsetdup(&pk) {
            return Ok(());
        }
        let document = cursor.current()?;
        if !shape.owns(document) {
            return Ok(());
        }
        self.buffer.add(document.clone())
    }

    fn finish(self, shape: &ResultShape<'_>) -> BatchOutcome {
        split_sorted(self.buffer.fill(self.skip, self.limit), self.limits, shape)
    }
}

/// In-order and out-of-order candidates racing under a sort
pub struct HybridBuild {
    ordered: OrderedBuild,
    /// Dropped when out-of-order plans are abandoned
    buffer: Option<ScanAndOrderBuffer>,
    /// Separate from the cursor's set so the in-order plan still returns
    /// documents the out-of-order ones have seen
    out_of_order_dups: DupSet,
    skip: usize,
    limit: usize,
    limits: BatchLimits,
}

impl HybridBuild {
    fn handle_match(&mut self, cursor: &mut dyn QueryCursor, shape: &ResultShape<'_>) -> ExecutorResult<()> {
        if !cursor.current_plan_scan_and_order_required() {
            return self.ordered.handle_match(cursor, shape);
        }
        if self.buffer.is_none() {
            return Ok(());
        }

        let pk = cursor.curr_pk()?.clone();
        if self.out_of_order_dups.getsetdup(&pk) {
            return Ok(());
        }
        let document = cursor.current()?;
        if !shape.owns(document) {
            return Ok(());
        }
        let document = document.clone();
        let added = match self.buffer.as_mut() {
            Some(buffer) => buffer.add(document),
            None => Ok(()),
        };

        match added {
            // A cached plan may have hidden a better in-order candidate;
            // let the caller forget it and run the query again
            Err(err) if err.is_memory_limit() && cursor.has_possibly_excluded_plans() => Err(err),
            Err(err) if err.is_memory_limit() => {
                Logger::warn(
                    Event::ScanAndOrderLimit.as_str(),
                    &[("action", "abort_out_of_order"), ("reason", err.message())],
                );
                cursor.abort_out_of_order_plans();
                self.buffer = None;
                Ok(())
            }
            other => other,
        }
    }

    fn enough(&mut self, cursor: &mut dyn QueryCursor) -> bool {
        if !self.ordered.enough() {
            return false;
        }
        // The in-order batch is about to be sent, so only in-order
        // results may follow it
        if cursor.running_initial_in_order_plan() {
            cursor.abort_out_of_order_plans();
        }
        self.buffer = None;
        true
    }

    fn finish(self, cursor: &dyn QueryCursor, shape: &ResultShape<'_>) -> BatchOutcome {
        match self.buffer {
            Some(buffer) if cursor.complete_plan_of_hybrid_set_scan_and_order_required() => {
                split_sorted(buffer.fill(self.skip, self.limit), self.limits, shape)
            }
            _ => self.ordered.finish(cursor),
        }
    }
}

pub enum ResponseBuildStrategy {
    Ordered(OrderedBuild),
    Reorder(ReorderBuild),
    Hybrid(HybridBuild),
}

impl ResponseBuildStrategy {
    /// Picks the strategy for a freshly opened cursor
    pub fn for_query(
        cursor: &dyn QueryCursor,
        parsed: &ParsedQuery,
        limits: BatchLimits,
        config: &ExecutorConfig,
    ) -> Self {
        let ordered = OrderedBuild::new(parsed.skip, parsed.limit(), limits);
        if parsed.sort.is_empty() {
            return ResponseBuildStrategy::Ordered(ordered);
        }
        let buffer = || {
            ScanAndOrderBuffer::new(
                parsed.ns.clone(),
                parsed.sort.clone(),
                parsed.skip,
                parsed.limit,
                config.scan_and_order_max_bytes,
            )
        };

        let character = cursor.candidate_plan_character();
        match (
            character.may_run_in_order_plan(),
            character.may_run_out_of_order_plan(),
        ) {
            (_, false) => ResponseBuildStrategy::Ordered(ordered),
            (false, true) => ResponseBuildStrategy::Reorder(ReorderBuild {
                buffer: buffer(),
                skip: parsed.skip,
                limit: parsed.limit,
                limits,
            }),
            (true, true) => ResponseBuildStrategy::Hybrid(HybridBuild {
                ordered,
                buffer: Some(buffer()),
                out_of_order_dups: DupSet::new(config.dedup_upgrade_threshold),
                skip: parsed.skip,
                limit: parsed.limit,
                limits,
            }),
        }
    }

    /// Continues a saved cursor: no skip, the remaining limit
    pub fn resume(limit_remaining: Option<usize>, limits: BatchLimits) -> Self {
        ResponseBuildStrategy::Ordered(OrderedBuild::new(0, limit_remaining, limits))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseBuildStrategy::Ordered(_) => "ordered",
            ResponseBuildStrategy::Reorder(_) => "reorder",
            ResponseBuildStrategy::Hybrid(_) => "hybrid",
        }
    }

    /// True once no more documents should be processed for this batch
    fn enough(&mut self, cursor: &mut dyn QueryCursor) -> bool {
        match self {
            ResponseBuildStrategy::Ordered(build) => build.enough(),
            ResponseBuildStrategy::Reorder(_) => false,
            ResponseBuildStrategy::Hybrid(build) => build.enough(cursor),
        }
    }

    fn handle_match(&mut self, cursor: &mut dyn QueryCursor, shape: &ResultShape<'_>) -> ExecutorResult<()> {
        match self {
            ResponseBuildStrategy::Ordered(build) => build.handle_match(cursor, shape),
            ResponseBuildStrategy::Reorder(build) => build.handle_match(cursor, shape),
            ResponseBuildStrategy::Hybrid(build) => build.handle_match(cursor, shape),
        }
    }

    /// Feeds matches until the strategy has enough or the cursor runs out.
    /// The cursor is left on the first document not yet processed.
    pub fn drive(&mut self, cursor: &mut dyn QueryCursor, shape: &ResultShape<'_>) -> ExecutorResult<()> {
        while cursor.ok() && !self.enough(cursor) {
            if cursor.current_matches() {
                self.handle_match(cursor, shape)?;
            }
            // A full hybrid batch abandons the out-of-order plans; that has
            // to happen before the cursor picks the next document
            let done = self.enough(cursor);
            cursor.advance()?;
            if done {
                break;
            }
        }
        Ok(())
    }

    pub fn finish(self, cursor: &dyn QueryCursor, shape: &ResultShape<'_>) -> BatchOutcome {
        match self {
            ResponseBuildStrategy::Ordered(build) => build.finish(cursor),
            ResponseBuildStrategy::Reorder(build) => build.finish(shape),
            ResponseBuildStrategy::Hybrid(build) => build.finish(cursor, shape),
        }
    }
}

/// Cuts the first batch from a sorted result; the rest stays buffered
fn split_sorted(sorted: Vec<Value>, limits: BatchLimits, shape: &ResultShape<'_>) -> BatchOutcome {
    let mut batch = Batch::new(limits);
    let mut rest: VecDeque<Value> = sorted.into();
    while !batch.is_full() {
        let Some(document) = rest.pop_front() else {
            break;
        };
        batch.push(&document, shape.projection);
    }
    let remainder = if rest.is_empty() {
        Remainder::Exhausted
    } else {
        Remainder::Buffered(rest)
    };
    BatchOutcome { batch, remainder }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{new_query_cursor, CursorContext};
    use crate::index::KeyPattern;
    use crate::storage::{write_collection, Catalog};
    use serde_json::json;

    fn context(docs: usize, indexes: &[&str]) -> CursorContext {
        let catalog = Catalog::new();
        let handle = catalog.get_or_create("db.c").unwrap();
        {
            let mut coll = write_collection(&handle);
            for field in indexes {
                coll.create_index(KeyPattern::single(*field), None).unwrap();
            }
            for i in 0..docs {
                coll.insert(json!({"_id": i as i64, "a": (docs - i) as i64, "b": (i % 7) as i64}))
                    .unwrap();
            }
        }
        CursorContext::new(handle, "db.c", ExecutorConfig::default())
    }

    fn run(ctx: &CursorContext, request: serde_json::Value) -> (Vec<Value>, &'static str, bool) {
        let parsed = ParsedQuery::parse(&request).unwrap();
        let mut cursor = new_query_cursor(ctx, &parsed.cursor_request()).unwrap();
        let limits = BatchLimits::first_batch(&parsed, &ctx.config);
        let mut strategy = ResponseBuildStrategy::for_query(cursor.as_ref(), &parsed, limits, &ctx.config);
        let name = strategy.name();
        let shape = ResultShape {
            projection: parsed.projection.as_ref(),
            chunk_filter: parsed.chunk_filter.as_ref(),
        };
        strategy.drive(cursor.as_mut(), &shape).unwrap();
        let first = strategy.finish(cursor.as_ref(), &shape);
        let more = !matches!(first.remainder, Remainder::Exhausted);
        (first.batch.into_docs(), name, more)
    }

    #[test]
    fn test_unsorted_query_is_ordered_and_paged() {
        let ctx = context(30, &[]);
        let (docs, name, more) = run(&ctx, json!({"ns": "db.c", "batchSize": 10}));
        assert_eq!(name, "ordered");
        assert_eq!(docs.len(), 10);
        assert!(more);
    }

    #[test]
    fn test_unindexed_sort_reorders() {
        let ctx = context(20, &[]);
        let (docs, name, more) = run(&ctx, json!({"ns": "db.c", "sort": {"a": 1}, "limit": 5}));
        assert_eq!(name, "reorder");
        let keys: Vec<i64> = docs.iter().map(|d| d["a"].as_i64().unwrap()).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);
        assert!(!more);
    }

    #[test]
    fn test_indexed_sort_with_filter_is_hybrid_and_sorted() {
        let ctx = context(60, &["a", "b"]);
        let (docs, name, _) = run(
            &ctx,
            json!({"ns": "db.c", "filter": {"b": 3, "a": {"$gt": 0}}, "sort": {"a": 1}}),
        );
        assert_eq!(name, "hybrid");
        let keys: Vec<i64> = docs.iter().map(|d| d["a"].as_i64().unwrap()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(docs.iter().all(|d| d["b"] == json!(3)));
        assert_eq!(docs.len(), (0..60).filter(|i| i % 7 == 3).count());
    }

    #[test]
    fn test_hybrid_pages_stay_sorted_after_first_batch() {
        let ctx = context(120, &["a", "b"]);
        let parsed = ParsedQuery::parse(&json!({
            "ns": "db.c",
            "filter": {"a": {"$gt": 0}, "b": {"$gte": 0}},
            "sort": {"a": -1},
            "batchSize": 3
        }))
        .unwrap();
        let mut cursor = new_query_cursor(&ctx, &parsed.cursor_request()).unwrap();
        let shape = ResultShape::default();
        let limits = BatchLimits::first_batch(&parsed, &ctx.config);
        let mut strategy = ResponseBuildStrategy::for_query(cursor.as_ref(), &parsed, limits, &ctx.config);
        assert_eq!(strategy.name(), "hybrid");
        strategy.drive(cursor.as_mut(), &shape).unwrap();
        let mut outcome = strategy.finish(cursor.as_ref(), &shape);

        let mut keys = Vec::new();
        loop {
            let resume_with = match &outcome.remainder {
                Remainder::Live { limit_remaining } => Some(*limit_remaining),
                _ => None,
            };
            keys.extend(outcome.batch.into_docs().iter().map(|d| d["a"].as_i64().unwrap()));
            let Some(limit_remaining) = resume_with else {
                break;
            };
            let page = BatchLimits {
                max_docs: Some(3),
                max_bytes: usize::MAX,
            };
            let mut strategy = ResponseBuildStrategy::resume(limit_remaining, page);
            strategy.drive(cursor.as_mut(), &shape).unwrap();
            outcome = strategy.finish(cursor.as_ref(), &shape);
        }
        assert_eq!(keys, (1..=120).rev().collect::<Vec<i64>>());
    }

    #[test]
    fn test_skip_applies_after_dedup_and_chunk_filter() {
        let ctx = context(10, &[]);
        let (docs, _, _) = run(
            &ctx,
            json!({"ns": "db.c", "skip": 2, "chunkFilter": {"key": "_id", "ranges": [[0, 5]]}}),
        );
        let ids: Vec<i64> = docs.iter().map(|d| d["_id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_split_sorted_buffers_the_rest() {
        let docs: Vec<Value> = (0..5).map(|i| json!({"_id": i})).collect();
        let first = split_sorted(
            docs,
            BatchLimits {
                max_docs: Some(2),
                max_bytes: usize::MAX,
            },
            &ResultShape::default(),
        );
        assert_eq!(first.batch.len(), 2);
        match first.remainder {
            Remainder::Buffered(rest) => assert_eq!(rest.len(), 3),
            _ => panic!("expected buffered remainder"),
        }
    }
}
