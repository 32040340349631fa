//! Field projection applied to returned documents
//!
//! Either inclusion (`{a: 1, b: 1}`) or exclusion (`{a: 0}`) of top-level
//! fields. `_id` is returned unless explicitly excluded.

use serde_json::{Map, Value};

use super::errors::{ExecutorError, ExecutorResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<String>,
    include: bool,
    include_id: bool,
}

impl Projection {
    /// Parses a projection; `null` or `{}` means no projection
    pub fn parse(spec: &Value) -> ExecutorResult<Option<Self>> {
        let map = match spec {
            Value::Null => return Ok(None),
            Value::Object(map) if map.is_empty() => return Ok(None),
            Value::Object(map) => map,
            _ => return Err(ExecutorError::query_invalid("projection must be an object")),
        };

        let mut include_id = true;
        let mut mode: Option<bool> = None;
        let mut fields = Vec::new();
        for (field, flag) in map {
            let on = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
                _ => {
                    return Err(ExecutorError::query_invalid(format!(
                        "projection value for '{}' must be 0/1 or a boolean",
                        field
                    )))
                }
            };
            if field == "_id" {
                include_id = on;
                continue;
            }
            match mode {
                Some(m) if m != on => {
                    return Err(ExecutorError::query_invalid(
                        "projection cannot mix inclusion and exclusion",
                    ))
                }
                _ => mode = Some(on),
            }
            fields.push(field.clone());
        }

        Ok(Some(Self {
            fields,
            include: mode.unwrap_or(include_id),
            include_id,
        }))
    }

    pub fn apply(&self, document: &Value) -> Value {
        let Value::Object(source) = document else {
            return document.clone();
        };
        let mut out = Map::new();
        for (key, value) in source {
            let keep = if key == "_id" {
                self.include_id
            } else {
                self.fields.iter().any(|f| f == key) == self.include
            };
            if keep {
                out.insert(key.clone(), value.clone());
            }
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inclusion_keeps_id() {
        let p = Projection::parse(&json!({"a": 1})).unwrap().unwrap();
        assert_eq!(p.apply(&json!({"_id": 1, "a": 2, "b": 3})), json!({"_id": 1, "a": 2}));
    }

    #[test]
    fn test_exclusion() {
        let p = Projection::parse(&json!({"b": 0, "_id": false})).unwrap().unwrap();
        assert_eq!(p.apply(&json!({"_id": 1, "a": 2, "b": 3})), json!({"a": 2}));
    }

    #[test]
    fn test_id_only_exclusion() {
        let p = Projection::parse(&json!({"_id": 0})).unwrap().unwrap();
        assert_eq!(p.apply(&json!({"_id": 1, "a": 2})), json!({"a": 2}));
    }

    #[test]
    fn test_invalid_specs() {
        assert!(Projection::parse(&json!(null)).unwrap().is_none());
        assert!(Projection::parse(&json!({"a": 1, "b": 0})).is_err());
        assert!(Projection::parse(&json!({"a": "yes"})).is_err());
        assert!(Projection::parse(&json!([1])).is_err());
    }
}
