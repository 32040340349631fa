//! Find request parsing
//!
//! ```json
//! {"ns": "db.c", "filter": {"a": {"$gt": 1}}, "sort": {"b": 1},
//!  "hint": "a_1", "projection": {"a": 1}, "skip": 0, "limit": 10,
//!  "batchSize": 5, "singleBatch": false, "requireOrder": false,
//!  "noCursorTimeout": false, "tailable": false, "oplogReplay": false,
//!  "chunkFilter": {"key": "a", "ranges": [[0, 100]]}}
//! ```
//!
//! A negative `limit` means "one batch of at most |limit| documents".

use serde_json::{Map, Value};

use crate::cursor::QueryOptions;
use crate::executor::{ChunkFilter, CursorRequest, Projection};
use crate::index::KeyPattern;
use crate::planner::{parse_sort, Hint, QueryExpr};

use super::errors::{OpsError, OpsResult};

#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub ns: String,
    /// Filter document as sent, kept for diagnostics
    pub filter: Value,
    pub query: QueryExpr,
    pub sort: KeyPattern,
    pub hint: Option<Hint>,
    pub projection: Option<Projection>,
    pub skip: usize,
    /// 0 means no limit
    pub limit: usize,
    pub batch_size: Option<usize>,
    pub single_batch: bool,
    pub require_order: bool,
    pub options: QueryOptions,
    pub chunk_filter: Option<ChunkFilter>,
}

impl ParsedQuery {
    pub fn parse(request: &Value) -> OpsResult<Self> {
        let map = request
            .as_object()
            .ok_or_else(|| OpsError::invalid("find request must be an object"))?;
        let ns = map
            .get("ns")
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| OpsError::invalid("find request needs a non-empty 'ns'"))?
            .to_string();

        let filter = map.get("filter").cloned().unwrap_or_else(|| Value::Object(Map::new()));
        let query = QueryExpr::parse(&filter)?;
        let sort = match map.get("sort") {
            Some(spec) => parse_sort(spec)?,
            None => KeyPattern::empty(),
        };
        let hint = match map.get("hint") {
            Some(spec) => Hint::parse(spec)?,
            None => None,
        };
        let projection = match map.get("projection") {
            Some(spec) => Projection::parse(spec)?,
            None => None,
        };
        let chunk_filter = match map.get("chunkFilter") {
            Some(spec) => ChunkFilter::parse(spec)?,
            None => None,
        };

        let skip = non_negative(map, "skip")?.unwrap_or(0) as usize;
        let raw_limit = integer(map, "limit")?.unwrap_or(0);
        let batch_size = non_negative(map, "batchSize")?.filter(|n| *n > 0).map(|n| n as usize);
        let single_batch = flag(map, "singleBatch")? || raw_limit < 0;

        let options = QueryOptions {
            no_cursor_timeout: flag(map, "noCursorTimeout")?,
            tailable: flag(map, "tailable")?,
            oplog_replay: flag(map, "oplogReplay")?,
            exhaust: flag(map, "exhaust")?,
        };

        Ok(Self {
            ns,
            filter,
            query,
            sort,
            hint,
            projection,
            skip,
            limit: raw_limit.unsigned_abs() as usize,
            batch_size,
            single_batch,
            require_order: flag(map, "requireOrder")?,
            options,
            chunk_filter,
        })
    }

    pub fn cursor_request(&self) -> CursorRequest<'_> {
        CursorRequest {
            query: &self.query,
            sort: &self.sort,
            hint: self.hint.as_ref(),
            require_order: self.require_order,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        (self.limit > 0).then_some(self.limit)
    }
}

fn integer(map: &Map<String, Value>, key: &str) -> OpsResult<Option<i64>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| OpsError::invalid(format!("'{}' must be an integer", key))),
    }
}

fn non_negative(map: &Map<String, Value>, key: &str) -> OpsResult<Option<u64>> {
    match integer(map, key)? {
        Some(n) if n < 0 => Err(OpsError::invalid(format!("'{}' must not be negative", key))),
        other => Ok(other.map(|n| n as u64)),
    }
}

fn flag(map: &Map<String, Value>, key: &str) -> OpsResult<bool> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(OpsError::invalid(format!("'{}' must be a boolean", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_request() {
        let parsed = ParsedQuery::parse(&json!({
            "ns": "db.c",
            "filter": {"a": {"$gt": 1}},
            "sort": {"b": -1},
            "hint": "a_1",
            "projection": {"a": 1},
            "skip": 2,
            "limit": 10,
            "batchSize": 5,
            "noCursorTimeout": true,
            "chunkFilter": {"key": "a", "ranges": [[0, 100]]}
        }))
        .unwrap();
        assert_eq!(parsed.ns, "db.c");
        assert_eq!(parsed.sort.len(), 1);
        assert!(parsed.hint.is_some());
        assert!(parsed.projection.is_some());
        assert_eq!(parsed.skip, 2);
        assert_eq!(parsed.limit(), Some(10));
        assert_eq!(parsed.batch_size, Some(5));
        assert!(parsed.options.no_cursor_timeout);
        assert!(parsed.chunk_filter.is_some());
        assert!(!parsed.single_batch);
    }

    #[test]
    fn test_negative_limit_is_single_batch() {
        let parsed = ParsedQuery::parse(&json!({"ns": "db.c", "limit": -3})).unwrap();
        assert!(parsed.single_batch);
        assert_eq!(parsed.limit(), Some(3));
    }

    #[test]
    fn test_defaults() {
        let parsed = ParsedQuery::parse(&json!({"ns": "db.c"})).unwrap();
        assert!(parsed.query.is_empty());
        assert!(parsed.sort.is_empty());
        assert_eq!(parsed.limit(), None);
        assert_eq!(parsed.batch_size, None);
    }

    #[test]
    fn test_rejects_bad_fields() {
        assert!(ParsedQuery::parse(&json!({"filter": {}})).is_err());
        assert!(ParsedQuery::parse(&json!({"ns": "db.c", "skip": -1})).is_err());
        assert!(ParsedQuery::parse(&json!({"ns": "db.c", "tailable": "yes"})).is_err());
        assert!(ParsedQuery::parse(&json!({"ns": "db.c", "filter": {"a": {"$bogus": 1}}})).is_err());
    }
}
