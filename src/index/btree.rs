//! Ordered index keys and in-memory index trees
//!
//! Every value maps onto one total order:
//! MinKey < Null < Number < String < Object < Array < Bool < MaxKey.
//! Numbers compare by value, so `1` and `1.0` are the same key.
//!
//! An index tree is a `BTreeSet` of `(key parts, primary key)` pairs, which
//! keeps duplicate keys ordered by primary key and makes every entry unique.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use super::errors::{IndexError, IndexResult};

/// Index key representing a single field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    /// Lower than every value
    MinKey,
    /// JSON null, also used for missing fields
    Null,
    /// Any number (f64 bits remapped for total ordering)
    Number(u64),
    /// String value
    String(String),
    /// Object, canonical JSON text
    Object(String),
    /// Array, canonical JSON text
    Array(String),
    /// Boolean value (false < true)
    Bool(bool),
    /// Higher than every value
    MaxKey,
}

impl IndexKey {
    /// Create a key from a float.
    ///
    /// Uses bit representation for total ordering; `-0.0` folds onto `0.0`.
    pub fn from_f64(v: f64) -> Self {
        let v = if v == 0.0 { 0.0 } else { v };
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        IndexKey::Number(ordered)
    }

    /// Create a key from a JSON value
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => IndexKey::Null,
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => IndexKey::from_f64(f),
                None => IndexKey::Null,
            },
            Value::String(s) => IndexKey::String(s.clone()),
            Value::Object(_) => IndexKey::Object(value.to_string()),
            Value::Array(_) => IndexKey::Array(value.to_string()),
        }
    }

    /// Key for a document field; a missing field is `Null`.
    pub fn from_field(document: &Value, path: &str) -> Self {
        lookup_path(document, path)
            .map(IndexKey::from_json)
            .unwrap_or(IndexKey::Null)
    }

    /// Decodes a number key back to its float value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            IndexKey::Number(ordered) => {
                let bits = if (ordered >> 63) == 1 {
                    ordered ^ (1 << 63)
                } else {
                    !ordered
                };
                Some(f64::from_bits(bits))
            }
            _ => None,
        }
    }

    /// Converts back into JSON for explain output and diagnostics
    pub fn to_json(&self) -> Value {
        match self {
            IndexKey::MinKey => serde_json::json!({ "$minKey": 1 }),
            IndexKey::MaxKey => serde_json::json!({ "$maxKey": 1 }),
            IndexKey::Null => Value::Null,
            IndexKey::Bool(b) => Value::Bool(*b),
            IndexKey::Number(_) => {
                let f = self.as_f64().unwrap_or(0.0);
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    Value::from(f as i64)
                } else {
                    serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            IndexKey::String(s) => Value::String(s.clone()),
            IndexKey::Object(s) | IndexKey::Array(s) => {
                serde_json::from_str(s).unwrap_or(Value::Null)
            }
        }
    }

    /// Rank of the value's type in the canonical order
    pub fn type_rank(&self) -> u8 {
        match self {
            IndexKey::MinKey => 0,
            IndexKey::Null => 1,
            IndexKey::Number(_) => 2,
            IndexKey::String(_) => 3,
            IndexKey::Object(_) => 4,
            IndexKey::Array(_) => 5,
            IndexKey::Bool(_) => 6,
            IndexKey::MaxKey => 7,
        }
    }

    /// Smallest key of the same type as `self`
    pub fn type_min(&self) -> IndexKey {
        match self {
            IndexKey::Number(_) => IndexKey::Number(0),
            IndexKey::String(_) => IndexKey::String(String::new()),
            IndexKey::Object(_) => IndexKey::Object(String::new()),
            IndexKey::Array(_) => IndexKey::Array(String::new()),
            IndexKey::Bool(_) => IndexKey::Bool(false),
            other => other.clone(),
        }
    }

    /// Upper bound covering every key of the same type as `self`.
    ///
    /// Returned as `(key, inclusive)`.
    pub fn type_max(&self) -> (IndexKey, bool) {
        match self {
            IndexKey::Number(_) => (IndexKey::Number(u64::MAX), true),
            IndexKey::String(_) => (IndexKey::Object(String::new()), false),
            IndexKey::Object(_) => (IndexKey::Array(String::new()), false),
            IndexKey::Array(_) => (IndexKey::Bool(false), false),
            IndexKey::Bool(_) => (IndexKey::Bool(true), true),
            other => (other.clone(), true),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Resolves a dotted path (`a.b.c`) inside a document
pub fn lookup_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Direction of one field inside a key pattern or sort spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_i32(&self) -> i32 {
        match self {
            Direction::Ascending => 1,
            Direction::Descending => -1,
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            Direction::Ascending => Direction::Descending,
            Direction::Descending => Direction::Ascending,
        }
    }
}

/// One component of a stored compound key.
///
/// Descending components compare in reverse. `Bottom` and `Top` are seek
/// sentinels that sort below and above every real component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Bottom,
    Asc(IndexKey),
    Desc(IndexKey),
    Top,
}

impl KeyPart {
    pub fn new(key: IndexKey, direction: Direction) -> Self {
        match direction {
            Direction::Ascending => KeyPart::Asc(key),
            Direction::Descending => KeyPart::Desc(key),
        }
    }

    /// The wrapped value, if this is not a sentinel
    pub fn key(&self) -> Option<&IndexKey> {
        match self {
            KeyPart::Asc(k) | KeyPart::Desc(k) => Some(k),
            KeyPart::Bottom | KeyPart::Top => None,
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Bottom, KeyPart::Bottom) | (KeyPart::Top, KeyPart::Top) => Ordering::Equal,
            (KeyPart::Bottom, _) | (_, KeyPart::Top) => Ordering::Less,
            (_, KeyPart::Bottom) | (KeyPart::Top, _) => Ordering::Greater,
            (KeyPart::Asc(a), KeyPart::Asc(b)) => a.cmp(b),
            (KeyPart::Desc(a), KeyPart::Desc(b)) => b.cmp(a),
            (KeyPart::Asc(_), KeyPart::Desc(_)) => Ordering::Less,
            (KeyPart::Desc(_), KeyPart::Asc(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered list of `(field, direction)` pairs.
///
/// Used both for index definitions and for sort specifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    fields: Vec<(String, Direction)>,
}

impl KeyPattern {
    pub fn new(fields: Vec<(String, Direction)>) -> Self {
        Self { fields }
    }

    /// Pattern with no fields (table scans, unsorted queries)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Single ascending field
    pub fn single(field: impl Into<String>) -> Self {
        Self::new(vec![(field.into(), Direction::Ascending)])
    }

    /// The primary key pattern `{_id: 1}`
    pub fn id() -> Self {
        Self::single("_id")
    }

    /// Parses `{"a": 1, "b": -1}`.
    pub fn from_json(value: &Value) -> IndexResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| IndexError::invalid_key_pattern("key pattern must be an object"))?;
        let mut fields = Vec::with_capacity(map.len());
        for (field, dir) in map {
            if field.is_empty() || field.starts_with('$') {
                return Err(IndexError::invalid_key_pattern(format!(
                    "invalid field name '{}'",
                    field
                )));
            }
            let direction = match dir.as_f64() {
                Some(d) if d > 0.0 => Direction::Ascending,
                Some(d) if d < 0.0 => Direction::Descending,
                _ => {
                    return Err(IndexError::invalid_key_pattern(format!(
                        "direction for '{}' must be a non-zero number",
                        field
                    )))
                }
            };
            fields.push((field.clone(), direction));
        }
        Ok(Self { fields })
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (field, dir) in &self.fields {
            map.insert(field.clone(), Value::from(dir.as_i32()));
        }
        Value::Object(map)
    }

    pub fn fields(&self) -> &[(String, Direction)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn first_field(&self) -> Option<&str> {
        self.fields.first().map(|(f, _)| f.as_str())
    }

    pub fn reversed(&self) -> Self {
        Self::new(
            self.fields
                .iter()
                .map(|(f, d)| (f.clone(), d.reverse()))
                .collect(),
        )
    }

    /// Conventional index name, e.g. `a_1_b_-1`
    pub fn default_name(&self) -> String {
        self.fields
            .iter()
            .map(|(f, d)| format!("{}_{}", f, d.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Extracts the stored key for a document
    pub fn extract_key(&self, document: &Value) -> Vec<KeyPart> {
        self.fields
            .iter()
            .map(|(field, dir)| KeyPart::new(IndexKey::from_field(document, field), *dir))
            .collect()
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// An index entry: stored key plus the document's primary key
pub type IndexEntry = (Vec<KeyPart>, IndexKey);

/// A single index over one collection.
#[derive(Debug, Clone)]
pub struct IndexTree {
    name: String,
    pattern: KeyPattern,
    entries: BTreeSet<IndexEntry>,
}

impl IndexTree {
    /// Creates a new empty index tree
    pub fn new(name: impl Into<String>, pattern: KeyPattern) -> Self {
        Self {
            name: name.into(),
            pattern,
            entries: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &KeyPattern {
        &self.pattern
    }

    /// Index a document under its primary key
    pub fn insert(&mut self, document: &Value, pk: &IndexKey) {
        let key = self.pattern.extract_key(document);
        self.entries.insert((key, pk.clone()));
    }

    /// Remove a document's entry
    pub fn remove(&mut self, document: &Value, pk: &IndexKey) {
        let key = self.pattern.extract_key(document);
        self.entries.remove(&(key, pk.clone()));
    }

    pub fn entries(&self) -> &BTreeSet<IndexEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_compare_by_value() {
        assert_eq!(IndexKey::from_json(&json!(1)), IndexKey::from_json(&json!(1.0)));
        assert!(IndexKey::from_json(&json!(-5)) < IndexKey::from_json(&json!(-1.5)));
        assert!(IndexKey::from_json(&json!(2)) < IndexKey::from_json(&json!(10)));
        assert_eq!(IndexKey::from_f64(-0.0), IndexKey::from_f64(0.0));
    }

    #[test]
    fn test_cross_type_order() {
        let keys = vec![
            IndexKey::MinKey,
            IndexKey::Null,
            IndexKey::from_json(&json!(100)),
            IndexKey::from_json(&json!("a")),
            IndexKey::from_json(&json!({"x": 1})),
            IndexKey::from_json(&json!([1])),
            IndexKey::from_json(&json!(false)),
            IndexKey::MaxKey,
        ];
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_type_max_covers_type() {
        let (upper, inclusive) = IndexKey::from_json(&json!("m")).type_max();
        assert!(!inclusive);
        assert!(IndexKey::from_json(&json!("zzzz")) < upper);
        assert!(IndexKey::from_json(&json!({})) >= upper);
    }

    #[test]
    fn test_number_round_trip_to_json() {
        assert_eq!(IndexKey::from_json(&json!(42)).to_json(), json!(42));
        assert_eq!(IndexKey::from_json(&json!(-2.5)).to_json(), json!(-2.5));
    }

    #[test]
    fn test_lookup_path() {
        let doc = json!({"a": {"b": [10, {"c": 3}]}});
        assert_eq!(lookup_path(&doc, "a.b.0"), Some(&json!(10)));
        assert_eq!(lookup_path(&doc, "a.b.1.c"), Some(&json!(3)));
        assert_eq!(lookup_path(&doc, "a.z"), None);
    }

    #[test]
    fn test_descending_parts_reverse() {
        let lo = KeyPart::Desc(IndexKey::from_json(&json!(1)));
        let hi = KeyPart::Desc(IndexKey::from_json(&json!(2)));
        assert!(hi < lo);
        assert!(KeyPart::Bottom < hi);
        assert!(lo < KeyPart::Top);
    }

    #[test]
    fn test_key_pattern_parse_keeps_field_order() {
        let pattern = KeyPattern::from_json(&json!({"b": 1, "a": -1})).unwrap();
        assert_eq!(pattern.first_field(), Some("b"));
        assert_eq!(pattern.default_name(), "b_1_a_-1");
        assert!(KeyPattern::from_json(&json!({"a": 0})).is_err());
        assert!(KeyPattern::from_json(&json!([1])).is_err());
    }

    #[test]
    fn test_index_tree_orders_duplicates_by_pk() {
        let mut tree = IndexTree::new("a_1", KeyPattern::single("a"));
        tree.insert(&json!({"_id": 2, "a": 5}), &IndexKey::from_json(&json!(2)));
        tree.insert(&json!({"_id": 1, "a": 5}), &IndexKey::from_json(&json!(1)));
        tree.insert(&json!({"_id": 3, "a": 1}), &IndexKey::from_json(&json!(3)));

        let pks: Vec<_> = tree.entries().iter().map(|(_, pk)| pk.to_json()).collect();
        assert_eq!(pks, vec![json!(3), json!(1), json!(2)]);

        tree.remove(&json!({"_id": 1, "a": 5}), &IndexKey::from_json(&json!(1)));
        assert_eq!(tree.len(), 2);
    }
}
