//! Chunk ownership filter
//!
//! A node that owns only some chunks of a sharded collection returns only
//! documents whose shard key falls in one of its `[min, max)` ranges.

use serde_json::Value;

use crate::index::IndexKey;

use super::errors::{ExecutorError, ExecutorResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFilter {
    key: String,
    ranges: Vec<(IndexKey, IndexKey)>,
}

impl ChunkFilter {
    pub fn new(key: impl Into<String>, ranges: Vec<(IndexKey, IndexKey)>) -> Self {
        Self {
            key: key.into(),
            ranges,
        }
    }

    /// Parses `{"key": "a", "ranges": [[min, max], ...]}`; `null` means none
    pub fn parse(spec: &Value) -> ExecutorResult<Option<Self>> {
        let map = match spec {
            Value::Null => return Ok(None),
            Value::Object(map) => map,
            _ => return Err(ExecutorError::query_invalid("chunk filter must be an object")),
        };
        let key = map
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecutorError::query_invalid("chunk filter needs a string 'key'"))?;
        let raw = map
            .get("ranges")
            .and_then(Value::as_array)
            .ok_or_else(|| ExecutorError::query_invalid("chunk filter needs a 'ranges' array"))?;

        let mut ranges = Vec::with_capacity(raw.len());
        for range in raw {
            match range.as_array().map(Vec::as_slice) {
                Some([min, max]) => ranges.push((IndexKey::from_json(min), IndexKey::from_json(max))),
                _ => {
                    return Err(ExecutorError::query_invalid(
                        "each chunk range must be a [min, max] pair",
                    ))
                }
            }
        }
        Ok(Some(Self::new(key, ranges)))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn belongs(&self, document: &Value) -> bool {
        let value = IndexKey::from_field(document, &self.key);
        self.ranges
            .iter()
            .any(|(min, max)| *min <= value && value < *max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_belongs_is_half_open() {
        let filter = ChunkFilter::parse(&json!({"key": "a", "ranges": [[0, 10], [20, 30]]}))
            .unwrap()
            .unwrap();
        assert!(filter.belongs(&json!({"_id": 1, "a": 0})));
        assert!(filter.belongs(&json!({"_id": 2, "a": 29})));
        assert!(!filter.belongs(&json!({"_id": 3, "a": 10})));
        assert!(!filter.belongs(&json!({"_id": 4, "a": 15})));
    }

    #[test]
    fn test_parse_rejects_malformed_ranges() {
        assert!(ChunkFilter::parse(&json!({"key": "a", "ranges": [[1]]})).is_err());
        assert!(ChunkFilter::parse(&json!({"ranges": []})).is_err());
        assert!(ChunkFilter::parse(&Value::Null).unwrap().is_none());
    }
}
