//! Who is asking
//!
//! Authorization is by database: a principal either may act on every
//! namespace or only on the collections of a fixed set of databases.

use std::collections::BTreeSet;

use crate::storage::split_namespace;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// `None` means every database
    databases: Option<BTreeSet<String>>,
}

impl Principal {
    pub fn all() -> Self {
        Self { databases: None }
    }

    pub fn for_databases<I, S>(databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            databases: Some(databases.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_authorized(&self, ns: &str) -> bool {
        match &self.databases {
            None => true,
            Some(allowed) => split_namespace(ns).is_some_and(|(db, _)| allowed.contains(db)),
        }
    }
}
