//! One resumable server-side iteration
//!
//! A `ClientCursor` is what survives between a query's first batch and
//! the client's later `getMore` calls: the positioned query cursor (or
//! the already sorted remainder of a scan-and-order result) plus
//! everything needed to shape the next batch.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executor::{ChunkFilter, Interrupt, Projection, QueryCursor};

/// Query option flags recorded on the cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Exempt from the idle sweep
    #[serde(default)]
    pub no_cursor_timeout: bool,
    /// Recorded for diagnostics only
    #[serde(default)]
    pub tailable: bool,
    /// Track the `ts` of the last returned document
    #[serde(default)]
    pub oplog_replay: bool,
    /// Recorded for diagnostics only
    #[serde(default)]
    pub exhaust: bool,
}

/// Where the remaining results come from
pub enum CursorSource {
    /// Query cursor positioned on the next unprocessed document
    Live(Box<dyn QueryCursor>),
    /// Sorted, skip/limit-applied documents not yet sent
    Buffered(VecDeque<Value>),
}

impl CursorSource {
    /// Nothing left to return
    pub fn is_exhausted(&self) -> bool {
        match self {
            CursorSource::Live(cursor) => !cursor.ok(),
            CursorSource::Buffered(docs) => docs.is_empty(),
        }
    }

    /// Explain name of the source
    pub fn describe(&self) -> String {
        match self {
            CursorSource::Live(cursor) => cursor.describe(),
            CursorSource::Buffered(_) => "ScanAndOrder".to_string(),
        }
    }
}

/// A query's server-side state between getMore requests
pub struct ClientCursor {
    ns: String,
    source: CursorSource,
    interrupt: Interrupt,
    query: Value,
    options: QueryOptions,
    projection: Option<Projection>,
    chunk_filter: Option<ChunkFilter>,
    pos: u64,
    limit_remaining: Option<usize>,
    bookmark: Option<Value>,
}

impl ClientCursor {
    pub fn new(ns: impl Into<String>, source: CursorSource, interrupt: Interrupt, query: Value) -> Self {
        Self {
            ns: ns.into(),
            source,
            interrupt,
            query,
            options: QueryOptions::default(),
            projection: None,
            chunk_filter: None,
            pos: 0,
            limit_remaining: None,
            bookmark: None,
        }
    }

    /// Sets the query option flags
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_projection(mut self, projection: Option<Projection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_chunk_filter(mut self, filter: Option<ChunkFilter>) -> Self {
        self.chunk_filter = filter;
        self
    }

    /// Documents the client may still receive; `None` is unlimited
    pub fn with_limit_remaining(mut self, remaining: Option<usize>) -> Self {
        self.limit_remaining = remaining;
        self
    }

    pub fn set_limit_remaining(&mut self, remaining: Option<usize>) {
        self.limit_remaining = remaining;
    }

    /// Namespace fixed at creation
    pub fn ns(&self) -> &str {
        &self.ns
    }

    pub fn source(&self) -> &CursorSource {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut CursorSource {
        &mut self.source
    }

    /// The source together with the shaping applied to what it yields
    pub fn source_and_shaping(&mut self) -> (&mut CursorSource, Option<&Projection>, Option<&ChunkFilter>) {
        (&mut self.source, self.projection.as_ref(), self.chunk_filter.as_ref())
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// The original query, kept for diagnostics
    pub fn query(&self) -> &Value {
        &self.query
    }

    /// Query option flags
    pub fn options(&self) -> QueryOptions {
        self.options
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn chunk_filter(&self) -> Option<&ChunkFilter> {
        self.chunk_filter.as_ref()
    }

    /// Documents returned to the client so far
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Documents still allowed by the hard limit
    pub fn limit_remaining(&self) -> Option<usize> {
        self.limit_remaining
    }

    /// Oplog position of the last returned document
    pub fn bookmark(&self) -> Option<&Value> {
        self.bookmark.as_ref()
    }

    /// Base pin value: 1 for no-timeout cursors, else 0
    pub fn pin_base(&self) -> u32 {
        u32::from(self.options.no_cursor_timeout)
    }

    /// Accounts for a batch that was sent; `last_ts` is the `ts` of its
    /// final document
    pub fn record_batch(&mut self, count: usize, last_ts: Option<&Value>) {
        self.pos += count as u64;
        if let Some(remaining) = self.limit_remaining.as_mut() {
            *remaining = remaining.saturating_sub(count);
        }
        if self.options.oplog_replay {
            if let Some(ts) = last_ts {
                self.bookmark = Some(ts.clone());
            }
        }
    }

    /// Nothing further can be returned
    pub fn is_exhausted(&self) -> bool {
        self.limit_remaining == Some(0) || self.source.is_exhausted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn buffered(docs: Vec<Value>) -> ClientCursor {
        ClientCursor::new(
            "db.c",
            CursorSource::Buffered(docs.into()),
            Interrupt::new(),
            json!({"a": 1}),
        )
    }

    #[test]
    fn test_record_batch_tracks_position_and_limit() {
        let mut cc = buffered(vec![json!({"_id": 1}), json!({"_id": 2})]).with_limit_remaining(Some(3));
        cc.record_batch(2, None);
        assert_eq!(cc.pos(), 2);
        assert_eq!(cc.limit_remaining(), Some(1));
        assert!(!cc.is_exhausted());
        cc.record_batch(1, None);
        assert!(cc.is_exhausted());
    }

    #[test]
    fn test_oplog_replay_bookmarks_last_ts() {
        let mut cc = buffered(vec![json!({"_id": 1})]).with_options(QueryOptions {
            oplog_replay: true,
            ..QueryOptions::default()
        });
        cc.record_batch(1, Some(&json!(17)));
        assert_eq!(cc.bookmark(), Some(&json!(17)));
    }

    #[test]
    fn test_pin_base_reflects_no_timeout() {
        let cc = buffered(vec![]);
        assert_eq!(cc.pin_base(), 0);
        let cc = cc.with_options(QueryOptions {
            no_cursor_timeout: true,
            ..QueryOptions::default()
        });
        assert_eq!(cc.pin_base(), 1);
    }

    #[test]
    fn test_options_parse_camel_case() {
        let options: QueryOptions =
            serde_json::from_value(json!({"noCursorTimeout": true, "tailable": true})).unwrap();
        assert!(options.no_cursor_timeout);
        assert!(options.tailable);
        assert!(!options.oplog_replay);
    }
}
