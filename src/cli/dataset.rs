//! Dataset files
//!
//! ```json
//! {"collections": [
//!   {"ns": "db.c", "indexes": [{"a": 1}], "documents": [{"_id": 1, "a": 2}]}
//! ]}
//! ```
//!
//! Indexes are built before documents are inserted.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::observability::{Event, Logger};
use crate::ops::QueryEngine;

use super::errors::{CliError, CliResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub collections: Vec<CollectionSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSpec {
    pub ns: String,
    #[serde(default)]
    pub indexes: Vec<Value>,
    #[serde(default)]
    pub documents: Vec<Value>,
}

impl Dataset {
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::dataset_error(format!("Failed to read dataset: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| CliError::dataset_error(format!("Invalid dataset JSON: {}", e)))
    }

    /// Creates every collection in `engine`; returns the documents inserted
    pub fn apply(&self, engine: &QueryEngine) -> CliResult<usize> {
        let mut total = 0;
        for spec in &self.collections {
            for key in &spec.indexes {
                engine
                    .create_index(&spec.ns, key, None)
                    .map_err(|e| CliError::dataset_error(format!("{}: {}", spec.ns, e)))?;
            }
            total += engine
                .insert(&spec.ns, spec.documents.clone())
                .map_err(|e| CliError::dataset_error(format!("{}: {}", spec.ns, e)))?;
        }
        Logger::info(
            Event::DatasetLoaded.as_str(),
            &[
                ("collections", self.collections.len().to_string().as_str()),
                ("documents", total.to_string().as_str()),
            ],
        );
        Ok(total)
    }
}
