//! The index scan capability consumed by query cursors
//!
//! A scan is positioned on its first entry when constructed. `advance()`
//! moves to the next entry inside the scan's bounds and reports whether the
//! scan is still positioned. The document, stored key and primary key of the
//! current entry stay readable until the next `advance()`.

use serde_json::Value;

use super::bounds::IndexBounds;
use super::btree::{IndexKey, KeyPart, KeyPattern};

/// Direction in which a scan walks its index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

impl ScanDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanDirection::Forward => "forward",
            ScanDirection::Backward => "backward",
        }
    }
}

/// Positionable iterator over one index (or the table itself)
pub trait IndexScan: Send {
    /// True while positioned on an entry
    fn ok(&self) -> bool;

    /// Moves to the next entry; returns `ok()`
    fn advance(&mut self) -> bool;

    /// Document at the current position
    fn current(&self) -> Option<&Value>;

    /// Stored key at the current position (empty for table scans)
    fn curr_key(&self) -> Option<&[KeyPart]>;

    /// Primary key at the current position
    fn curr_pk(&self) -> Option<&IndexKey>;

    /// Key pattern of the scanned index (empty for table scans)
    fn key_pattern(&self) -> &KeyPattern;

    /// Bounds the scan is restricted to, if any
    fn bounds(&self) -> Option<&IndexBounds>;

    /// Keys examined so far
    fn nscanned(&self) -> u64;

    /// Documents loaded so far
    fn nscanned_objects(&self) -> u64;

    /// Short description, e.g. `BtreeCursor a_1 reverse`
    fn describe(&self) -> String;
}
