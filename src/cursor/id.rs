//! Cursor id allocation
//!
//! An id is `(millis since the allocator started) << 32 | random32`. The
//! millisecond half is masked to 31 bits so ids are never negative; 0 and
//! -1 are reserved and never handed out.

use std::time::Instant;

/// Wire handle a client uses to resume a scan
pub type CursorId = i64;

/// "No more data": returned in place of an id when a query is exhausted
pub const NO_CURSOR_ID: CursorId = 0;

/// Uninitialized / invalid handle
pub const INVALID_CURSOR_ID: CursorId = -1;

#[derive(Debug)]
pub struct CursorIdAllocator {
    epoch: Instant,
}

impl CursorIdAllocator {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Draws ids until one is positive and not `in_use`
    pub fn allocate(&self, mut in_use: impl FnMut(CursorId) -> bool) -> CursorId {
        loop {
            let millis = self.epoch.elapsed().as_millis() as u64 & 0x7fff_ffff;
            let low = u64::from(rand::random::<u32>());
            let id = ((millis << 32) | low) as CursorId;
            if id > NO_CURSOR_ID && !in_use(id) {
                return id;
            }
        }
    }
}

impl Default for CursorIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
