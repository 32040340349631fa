//! Client cursors for aerocursor
//!
//! A client cursor keeps a query resumable across `getMore` requests. All
//! live cursors sit in one `ClientCursorTable` owned by the engine and
//! shared by reference; there is no ambient global.
//!
//! # Invariants
//!
//! - A cursor is reachable by id only while it is in the table
//! - At most one request holds a cursor at a time; a second pin fails
//!   immediately with `InUse`
//! - The idle sweep never erases a pinned or no-timeout cursor
//! - Ids are positive and unique among live cursors; 0 and -1 are reserved
//! - A cursor's namespace never changes after registration

mod client_cursor;
mod config;
mod errors;
mod id;
mod monitor;
mod pin;
mod stats;
mod table;

pub use client_cursor::{ClientCursor, CursorSource, QueryOptions};
pub use config::CursorConfig;
pub use errors::{CursorError, CursorResult};
pub use id::{CursorId, CursorIdAllocator, INVALID_CURSOR_ID, NO_CURSOR_ID};
pub use monitor::CursorMonitor;
pub use pin::{ClientCursorHolder, ClientCursorPin};
pub use stats::CursorStats;
pub use table::{ClientCursorTable, CursorSummary};
