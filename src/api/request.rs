//! API request types
//!
//! One JSON object per request, discriminated by `op`:
//!
//! ```json
//! {"op": "find", "ns": "db.c", "filter": {"a": 1}, "batchSize": 10}
//! {"op": "getMore", "ns": "db.c", "cursorId": 4294967297, "batchSize": 10}
//! {"op": "killCursors", "ids": [4294967297]}
//! ```
//!
//! Any request may carry `"databases": [...]` to act as a principal
//! limited to those databases.

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::cursor::CursorId;
use crate::ops::Principal;

use super::errors::{ApiError, ApiResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// The whole request document is the find request
    Find(Value),
    GetMore {
        ns: String,
        cursor_id: CursorId,
        batch_size: usize,
    },
    KillCursors { ids: Vec<CursorId> },
    KillOp { op_id: Uuid },
    CurrentOp,
    Insert { ns: String, documents: Vec<Value> },
    Remove { ns: String, filter: Value },
    Drop { ns: String },
    DropDatabase { db: String },
    CreateIndex {
        ns: String,
        key: Value,
        name: Option<String>,
    },
    DropIndex { ns: String, name: String },
    CursorInfo,
    Explain(Value),
    Metrics,
}

/// Raw request for parsing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    op: String,
    #[serde(default)]
    ns: Option<String>,
    #[serde(default)]
    db: Option<String>,
    #[serde(default)]
    cursor_id: Option<CursorId>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    ids: Option<Vec<CursorId>>,
    #[serde(default)]
    op_id: Option<Uuid>,
    #[serde(default)]
    documents: Option<Vec<Value>>,
    #[serde(default)]
    document: Option<Value>,
    #[serde(default)]
    filter: Option<Value>,
    #[serde(default)]
    key: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    databases: Option<Vec<String>>,
}

fn required<T>(value: Option<T>, field: &str) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::invalid_request(format!("Missing {}", field)))
}

impl Request {
    /// Parses a request and the principal it acts as
    pub fn parse(json: &str) -> ApiResult<(Self, Principal)> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ApiError::invalid_request(format!("Invalid JSON: {}", e)))?;
        let raw: RawRequest = serde_json::from_value(value.clone())
            .map_err(|e| ApiError::invalid_request(format!("Invalid request: {}", e)))?;

        let principal = match raw.databases {
            Some(databases) => Principal::for_databases(databases),
            None => Principal::all(),
        };

        let request = match raw.op.as_str() {
            "find" => Request::Find(value),
            "explain" => Request::Explain(value),
            "getMore" => Request::GetMore {
                ns: required(raw.ns, "ns")?,
                cursor_id: required(raw.cursor_id, "cursorId")?,
                batch_size: raw.batch_size.unwrap_or(0),
            },
            "killCursors" => Request::KillCursors {
                ids: required(raw.ids, "ids")?,
            },
            "killOp" => Request::KillOp {
                op_id: required(raw.op_id, "opId")?,
            },
            "currentOp" => Request::CurrentOp,
            "insert" => {
                let documents = match (raw.documents, raw.document) {
                    (Some(documents), _) => documents,
                    (None, Some(document)) => vec![document],
                    (None, None) => return Err(ApiError::invalid_request("Missing documents")),
                };
                Request::Insert {
                    ns: required(raw.ns, "ns")?,
                    documents,
                }
            }
            "remove" => Request::Remove {
                ns: required(raw.ns, "ns")?,
                filter: raw.filter.unwrap_or_else(|| Value::Object(Default::default())),
            },
            "drop" => Request::Drop {
                ns: required(raw.ns, "ns")?,
            },
            "dropDatabase" => Request::DropDatabase {
                db: required(raw.db, "db")?,
            },
            "createIndex" => Request::CreateIndex {
                ns: required(raw.ns, "ns")?,
                key: required(raw.key, "key")?,
                name: raw.name,
            },
            "dropIndex" => Request::DropIndex {
                ns: required(raw.ns, "ns")?,
                name: required(raw.name, "name")?,
            },
            "cursorInfo" => Request::CursorInfo,
            "metrics" => Request::Metrics,
            other => return Err(ApiError::unknown_operation(other)),
        };
        Ok((request, principal))
    }

    /// Operation name as sent
    pub fn op(&self) -> &'static str {
        match self {
            Request::Find(_) => "find",
            Request::GetMore { .. } => "getMore",
            Request::KillCursors { .. } => "killCursors",
            Request::KillOp { .. } => "killOp",
            Request::CurrentOp => "currentOp",
            Request::Insert { .. } => "insert",
            Request::Remove { .. } => "remove",
            Request::Drop { .. } => "drop",
            Request::DropDatabase { .. } => "dropDatabase",
            Request::CreateIndex { .. } => "createIndex",
            Request::DropIndex { .. } => "dropIndex",
            Request::CursorInfo => "cursorInfo",
            Request::Explain(_) => "explain",
            Request::Metrics => "metrics",
        }
    }
}
