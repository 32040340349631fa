//! Scoped guards over client cursors
//!
//! `ClientCursorPin` gives one request exclusive use of a cursor and puts
//! it back when dropped, on every exit path. `ClientCursorHolder` owns a
//! cursor that has not been handed to a client yet: dropping it erases
//! the cursor unless `release()` was called.

use super::client_cursor::ClientCursor;
use super::id::CursorId;
use super::table::ClientCursorTable;

pub struct ClientCursorPin<'a> {
    table: &'a ClientCursorTable,
    id: CursorId,
    cursor: Option<ClientCursor>,
}

impl<'a> ClientCursorPin<'a> {
    pub(super) fn new(table: &'a ClientCursorTable, id: CursorId, cursor: ClientCursor) -> Self {
        Self {
            table,
            id,
            cursor: Some(cursor),
        }
    }

    pub fn id(&self) -> CursorId {
        self.id
    }

    /// The pinned cursor; `None` once `delete()` has run
    pub fn c(&mut self) -> Option<&mut ClientCursor> {
        self.cursor.as_mut()
    }

    /// Erases the cursor now instead of returning it on drop
    pub fn delete(&mut self) {
        if self.cursor.take().is_some() {
            self.table.erase_pinned(self.id);
        }
    }
}

impl Drop for ClientCursorPin<'_> {
    fn drop(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.table.unpin(self.id, cursor);
        }
    }
}

pub struct ClientCursorHolder<'a> {
    table: &'a ClientCursorTable,
    id: CursorId,
    released: bool,
}

impl<'a> ClientCursorHolder<'a> {
    /// Registers `cursor` and takes ownership of its entry
    pub fn register(table: &'a ClientCursorTable, cursor: ClientCursor) -> Self {
        let id = table.register(cursor);
        Self {
            table,
            id,
            released: false,
        }
    }

    pub fn id(&self) -> CursorId {
        self.id
    }

    /// Keeps the cursor in the table; returns its id
    pub fn release(mut self) -> CursorId {
        self.released = true;
        self.id
    }
}

impl Drop for ClientCursorHolder<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.table.discard(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::client_cursor::CursorSource;
    use crate::cursor::config::CursorConfig;
    use crate::executor::Interrupt;
    use serde_json::json;

    fn cursor() -> ClientCursor {
        ClientCursor::new(
            "db.c",
            CursorSource::Buffered(vec![json!({"_id": 1})].into()),
            Interrupt::new(),
            json!({}),
        )
    }

    #[test]
    fn test_pin_delete_clears_c() {
        let table = ClientCursorTable::new(CursorConfig::default());
        let id = table.register(cursor());
        let mut pin = table.pin(id).unwrap();
        assert!(pin.c().is_some());
        pin.delete();
        assert!(pin.c().is_none());
        assert!(!table.contains(id));
        drop(pin);
        assert!(!table.contains(id));
    }

    #[test]
    fn test_pin_released_on_panic() {
        let table = ClientCursorTable::new(CursorConfig::default());
        let id = table.register(cursor());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _pin = table.pin(id).unwrap();
            panic!("request failed");
        }));
        assert!(result.is_err());
        assert!(table.pin(id).is_ok());
    }

    #[test]
    fn test_holder_erases_unless_released() {
        let table = ClientCursorTable::new(CursorConfig::default());
        let dropped = {
            let holder = ClientCursorHolder::register(&table, cursor());
            holder.id()
        };
        assert!(!table.contains(dropped));

        let holder = ClientCursorHolder::register(&table, cursor());
        let kept = holder.release();
        assert!(table.contains(kept));
    }

    #[test]
    fn test_holder_dropped_while_pinned_erases_on_unpin() {
        let table = ClientCursorTable::new(CursorConfig::default());
        let holder = ClientCursorHolder::register(&table, cursor());
        let id = holder.id();
        let pin = table.pin(id).unwrap();
        drop(holder);
        assert!(table.contains(id));
        drop(pin);
        assert!(!table.contains(id));
    }
}
