//! Parsed query documents
//!
//! A query document is a conjunction of per-field predicates plus an
//! optional top-level `$or`. Supported field operators:
//! `$eq $ne $gt $gte $lt $lte $in $nin $exists $regex` (`$options`).

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::index::KeyPattern;

use super::errors::{PlannerError, PlannerResult};

/// Compiled `$regex` operand
#[derive(Debug, Clone)]
pub struct RegexPattern {
    source: String,
    options: String,
    compiled: Regex,
}

impl RegexPattern {
    /// Compiles a pattern with Mongo-style option letters (`i`, `m`, `s`, `x`)
    pub fn new(field: &str, source: &str, options: &str) -> PlannerResult<Self> {
        let mut builder = RegexBuilder::new(source);
        for flag in options.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    return Err(PlannerError::invalid_operator(
                        field,
                        &format!("$options '{}'", other),
                    ))
                }
            };
        }
        let compiled = builder
            .build()
            .map_err(|e| PlannerError::query_invalid(format!("bad $regex on '{}': {}", field, e)))?;
        Ok(Self {
            source: source.to_string(),
            options: options.to_string(),
            compiled,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.compiled.is_match(text)
    }
}

impl PartialEq for RegexPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.options == other.options
    }
}

/// Filter operation types
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Equality: field = value
    Eq(Value),
    /// Inequality: field != value
    Ne(Value),
    /// Greater than: field > value
    Gt(Value),
    /// Greater than or equal: field >= value
    Gte(Value),
    /// Less than: field < value
    Lt(Value),
    /// Less than or equal: field <= value
    Lte(Value),
    /// Membership: field in values
    In(Vec<Value>),
    /// Non-membership: field not in values
    Nin(Vec<Value>),
    /// Field presence
    Exists(bool),
    /// String field matches pattern
    Regex(RegexPattern),
}

impl FilterOp {
    /// Returns true if this is an equality operation
    pub fn is_equality(&self) -> bool {
        matches!(self, FilterOp::Eq(_))
    }

    /// Returns true if this is a range operation
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOp::Gte(_) | FilterOp::Gt(_) | FilterOp::Lte(_) | FilterOp::Lt(_)
        )
    }

    /// Returns the operator name as written in a query
    pub fn op_name(&self) -> &'static str {
        match self {
            FilterOp::Eq(_) => "$eq",
            FilterOp::Ne(_) => "$ne",
            FilterOp::Gt(_) => "$gt",
            FilterOp::Gte(_) => "$gte",
            FilterOp::Lt(_) => "$lt",
            FilterOp::Lte(_) => "$lte",
            FilterOp::In(_) => "$in",
            FilterOp::Nin(_) => "$nin",
            FilterOp::Exists(_) => "$exists",
            FilterOp::Regex(_) => "$regex",
        }
    }

    fn parse(field: &str, op: &str, operand: &Value) -> PlannerResult<Self> {
        let list = |operand: &Value| -> PlannerResult<Vec<Value>> {
            operand
                .as_array()
                .cloned()
                .ok_or_else(|| PlannerError::query_invalid(format!("{} on '{}' needs an array", op, field)))
        };
        Ok(match op {
            "$eq" => FilterOp::Eq(operand.clone()),
            "$ne" => FilterOp::Ne(operand.clone()),
            "$gt" => FilterOp::Gt(operand.clone()),
            "$gte" => FilterOp::Gte(operand.clone()),
            "$lt" => FilterOp::Lt(operand.clone()),
            "$lte" => FilterOp::Lte(operand.clone()),
            "$in" => FilterOp::In(list(operand)?),
            "$nin" => FilterOp::Nin(list(operand)?),
            "$exists" => FilterOp::Exists(match operand {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
                Value::Null => false,
                _ => true,
            }),
            _ => return Err(PlannerError::invalid_operator(field, op)),
        })
    }
}

/// A single predicate (field + operation)
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Field path, possibly dotted
    pub field: String,
    /// Filter operation
    pub op: FilterOp,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: FilterOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    /// Create an equality predicate
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq(value))
    }

    /// Create a range predicate (gt)
    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Gt(value))
    }

    /// Create a range predicate (lt)
    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Lt(value))
    }

    /// Returns true if this is a primary key equality predicate
    pub fn is_primary_key(&self) -> bool {
        self.field == "_id" && self.op.is_equality()
    }
}

/// Parsed query document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryExpr {
    predicates: Vec<Predicate>,
    or_clauses: Vec<Vec<Predicate>>,
}

impl QueryExpr {
    pub fn new(predicates: Vec<Predicate>, or_clauses: Vec<Vec<Predicate>>) -> Self {
        Self {
            predicates,
            or_clauses,
        }
    }

    /// Matches every document
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a query document such as `{"a": 1, "b": {"$gt": 2}, "$or": [...]}`.
    ///
    /// `null` parses as the empty query.
    pub fn parse(query: &Value) -> PlannerResult<Self> {
        let map = match query {
            Value::Null => return Ok(Self::empty()),
            Value::Object(map) => map,
            _ => return Err(PlannerError::query_invalid("query must be an object")),
        };

        let mut predicates = Vec::new();
        let mut or_clauses = Vec::new();
        for (key, value) in map {
            if key == "$or" {
                let branches = value
                    .as_array()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| PlannerError::query_invalid("$or needs a non-empty array"))?;
                for branch in branches {
                    let branch = branch
                        .as_object()
                        .ok_or_else(|| PlannerError::query_invalid("$or branches must be objects"))?;
                    or_clauses.push(parse_conjunction(branch)?);
                }
            } else {
                predicates.extend(parse_field(key, value)?);
            }
        }
        Ok(Self::new(predicates, or_clauses))
    }

    /// Top-level conjunction, excluding `$or` branches
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn or_clauses(&self) -> &[Vec<Predicate>] {
        &self.or_clauses
    }

    pub fn has_or(&self) -> bool {
        !self.or_clauses.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty() && self.or_clauses.is_empty()
    }

    /// The query restricted to one `$or` branch
    pub fn clause(&self, index: usize) -> Option<QueryExpr> {
        let branch = self.or_clauses.get(index)?;
        let mut predicates = self.predicates.clone();
        predicates.extend(branch.iter().cloned());
        Some(QueryExpr::new(predicates, Vec::new()))
    }

    /// The `_id` value for queries of the exact form `{_id: <value>}`
    pub fn simple_id_equality(&self) -> Option<&Value> {
        match (self.predicates.as_slice(), self.or_clauses.is_empty()) {
            ([p], true) if p.is_primary_key() => match &p.op {
                FilterOp::Eq(v) if !v.is_object() && !v.is_array() => Some(v),
                _ => None,
            },
            _ => None,
        }
    }
}

fn parse_conjunction(map: &Map<String, Value>) -> PlannerResult<Vec<Predicate>> {
    let mut predicates = Vec::new();
    for (key, value) in map {
        predicates.extend(parse_field(key, value)?);
    }
    Ok(predicates)
}

fn parse_field(field: &str, value: &Value) -> PlannerResult<Vec<Predicate>> {
    if field.is_empty() {
        return Err(PlannerError::query_invalid("empty field name"));
    }
    if field.starts_with('$') {
        return Err(PlannerError::invalid_operator(field, field));
    }

    let operators = match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
            return Err(PlannerError::query_invalid(format!(
                "field '{}' mixes operators and plain keys",
                field
            )))
        }
        _ => return Ok(vec![Predicate::eq(field, value.clone())]),
    };

    let mut predicates = Vec::with_capacity(operators.len());
    for (op, operand) in operators {
        match op.as_str() {
            "$regex" => {
                let source = operand.as_str().ok_or_else(|| {
                    PlannerError::query_invalid(format!("$regex on '{}' needs a string", field))
                })?;
                let options = operators.get("$options").and_then(Value::as_str).unwrap_or("");
                let pattern = RegexPattern::new(field, source, options)?;
                predicates.push(Predicate::new(field, FilterOp::Regex(pattern)));
            }
            "$options" if operators.contains_key("$regex") => {}
            _ => predicates.push(Predicate::new(field, FilterOp::parse(field, op, operand)?)),
        }
    }
    Ok(predicates)
}

/// Index hint supplied with a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    /// `{"$natural": 1}`: force a table scan
    Natural,
    /// Index by name
    Name(String),
    /// Index by key pattern
    Pattern(KeyPattern),
}

impl Hint {
    /// Parses a hint; `null` means no hint
    pub fn parse(value: &Value) -> PlannerResult<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::String(name) if !name.is_empty() => Ok(Some(Hint::Name(name.clone()))),
            Value::Object(map) if map.contains_key("$natural") => Ok(Some(Hint::Natural)),
            Value::Object(_) => KeyPattern::from_json(value)
                .map(|p| Some(Hint::Pattern(p)))
                .map_err(|e| PlannerError::query_invalid(format!("bad hint: {}", e.message()))),
            _ => Err(PlannerError::query_invalid("hint must be an index name or key pattern")),
        }
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hint::Natural => write!(f, "{{\"$natural\":1}}"),
            Hint::Name(name) => write!(f, "'{}'", name),
            Hint::Pattern(pattern) => write!(f, "{}", pattern),
        }
    }
}

/// Parses a sort specification such as `{"a": 1, "b": -1}`; `null` is no sort
pub fn parse_sort(value: &Value) -> PlannerResult<KeyPattern> {
    match value {
        Value::Null => Ok(KeyPattern::empty()),
        _ => KeyPattern::from_json(value)
            .map_err(|e| PlannerError::query_invalid(format!("bad sort: {}", e.message()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_values_are_equality() {
        let q = QueryExpr::parse(&json!({"a": 1, "b": {"x": 2}})).unwrap();
        assert_eq!(q.predicates().len(), 2);
        assert!(q.predicates().iter().all(|p| p.op.is_equality()));
    }

    #[test]
    fn test_operator_objects() {
        let q = QueryExpr::parse(&json!({"a": {"$gt": 1, "$lte": 9}, "b": {"$in": [1, 2]}})).unwrap();
        let ops: Vec<_> = q.predicates().iter().map(|p| p.op.op_name()).collect();
        assert_eq!(ops, vec!["$gt", "$lte", "$in"]);
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = QueryExpr::parse(&json!({"a": {"$where": "x"}})).unwrap_err();
        assert_eq!(err.field(), Some("a"));
        assert!(QueryExpr::parse(&json!({"$and": []})).is_err());
        assert!(QueryExpr::parse(&json!({"a": {"$gt": 1, "b": 2}})).is_err());
        assert!(QueryExpr::parse(&json!([1])).is_err());
    }

    #[test]
    fn test_or_clauses_include_top_level() {
        let q = QueryExpr::parse(&json!({"c": 5, "$or": [{"a": 1}, {"b": 1}]})).unwrap();
        assert!(q.has_or());
        let clause = q.clause(1).unwrap();
        let fields: Vec<_> = clause.predicates().iter().map(|p| p.field.as_str()).collect();
        assert_eq!(fields, vec!["c", "b"]);
        assert!(q.clause(2).is_none());
        assert!(QueryExpr::parse(&json!({"$or": []})).is_err());
    }

    #[test]
    fn test_regex_with_options() {
        let q = QueryExpr::parse(&json!({"name": {"$regex": "^al", "$options": "i"}})).unwrap();
        match &q.predicates()[0].op {
            FilterOp::Regex(r) => assert!(r.is_match("Alice")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(QueryExpr::parse(&json!({"name": {"$regex": "("}})).is_err());
        assert!(QueryExpr::parse(&json!({"name": {"$regex": "a", "$options": "q"}})).is_err());
    }

    #[test]
    fn test_simple_id_equality() {
        let q = QueryExpr::parse(&json!({"_id": 7})).unwrap();
        assert_eq!(q.simple_id_equality(), Some(&json!(7)));
        let q = QueryExpr::parse(&json!({"_id": 7, "a": 1})).unwrap();
        assert_eq!(q.simple_id_equality(), None);
        let q = QueryExpr::parse(&json!({"_id": {"$gt": 7}})).unwrap();
        assert_eq!(q.simple_id_equality(), None);
    }

    #[test]
    fn test_hint_forms() {
        assert_eq!(Hint::parse(&json!(null)).unwrap(), None);
        assert_eq!(Hint::parse(&json!("a_1")).unwrap(), Some(Hint::Name("a_1".into())));
        assert_eq!(Hint::parse(&json!({"$natural": 1})).unwrap(), Some(Hint::Natural));
        assert_eq!(
            Hint::parse(&json!({"a": 1})).unwrap(),
            Some(Hint::Pattern(KeyPattern::single("a")))
        );
        assert!(Hint::parse(&json!(3)).is_err());
    }

    #[test]
    fn test_parse_sort() {
        assert!(parse_sort(&json!(null)).unwrap().is_empty());
        assert_eq!(parse_sort(&json!({"a": -1})).unwrap().len(), 1);
        assert!(parse_sort(&json!({"a": "up"})).is_err());
    }
}
