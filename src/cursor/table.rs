//! Process-wide map from cursor id to client cursor
//!
//! One mutex guards every entry. A cursor's body is moved out of its entry
//! while a request holds it (see `ClientCursorPin`) so scans never run
//! under the table lock; the entry stays behind carrying the namespace,
//! pin value and interrupt so kills and invalidations can still reach it.
//!
//! Pin values compose additively: 0 is timeout-eligible, 1 is no-timeout,
//! +100 while pinned.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::executor::Interrupt;
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::storage::{split_namespace, Catalog};

use super::client_cursor::ClientCursor;
use super::config::CursorConfig;
use super::errors::{CursorError, CursorResult};
use super::id::{CursorId, CursorIdAllocator};
use super::pin::ClientCursorPin;
use super::stats::CursorStats;

pub(super) const PINNED: u32 = 100;

struct Entry {
    ns: String,
    pin_value: u32,
    idle_age_ms: u64,
    interrupt: Interrupt,
    /// Erase as soon as the current pin is released
    doomed: bool,
    /// `None` while pinned
    body: Option<ClientCursor>,
}

impl Entry {
    fn is_pinned(&self) -> bool {
        self.pin_value >= PINNED
    }
}

#[derive(Default)]
struct TableState {
    entries: BTreeMap<CursorId, Entry>,
    timed_out: u64,
}

/// Read-only view of one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorSummary {
    pub id: CursorId,
    pub ns: String,
    pub pin_value: u32,
    pub idle_age_ms: u64,
}

/// Open client cursors by id
pub struct ClientCursorTable {
    state: Mutex<TableState>,
    ids: CursorIdAllocator,
    config: CursorConfig,
    metrics: Option<Arc<MetricsRegistry>>,
    catalog: Option<Arc<Catalog>>,
}

impl ClientCursorTable {
    pub fn new(config: CursorConfig) -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            ids: CursorIdAllocator::new(),
            config,
            metrics: None,
            catalog: None,
        }
    }

    /// Timed-out cursors are torn down under this catalog's scope
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Counts timeouts, kills and invalidations into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &CursorConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts `cursor` under a fresh id; visible to getMore immediately
    pub fn register(&self, cursor: ClientCursor) -> CursorId {
        let ns = cursor.ns().to_string();
        let (id, open) = {
            let mut state = self.lock();
            let id = self.ids.allocate(|candidate| state.entries.contains_key(&candidate));
            state.entries.insert(
                id,
                Entry {
                    ns: ns.clone(),
                    pin_value: cursor.pin_base(),
                    idle_age_ms: 0,
                    interrupt: cursor.interrupt().clone(),
                    doomed: false,
                    body: Some(cursor),
                },
            );
            (id, state.entries.len())
        };

        Logger::trace(
            Event::CursorRegistered.as_str(),
            &[("cursor_id", id.to_string().as_str()), ("ns", ns.as_str())],
        );
        if open == self.config.large_table_warning + 1 {
            Logger::warn(
                Event::CursorTableLarge.as_str(),
                &[("open", open.to_string().as_str())],
            );
        }
        id
    }

    /// Number of open cursors, pinned or not
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, id: CursorId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    /// Bare lookup. Only valid for a cursor some request has pinned.
    ///
    /// # Panics
    ///
    /// If the cursor exists but is not pinned.
    pub fn find(&self, id: CursorId) -> Option<CursorSummary> {
        let state = self.lock();
        let entry = state.entries.get(&id)?;
        assert!(
            entry.is_pinned(),
            "cursor {} looked up without being pinned",
            id
        );
        Some(CursorSummary {
            id,
            ns: entry.ns.clone(),
            pin_value: entry.pin_value,
            idle_age_ms: entry.idle_age_ms,
        })
    }

    /// Namespace the cursor was opened on
    pub fn ns_of(&self, id: CursorId) -> Option<String> {
        self.lock().entries.get(&id).map(|entry| entry.ns.clone())
    }

    /// Takes exclusive use of a cursor. A second pin fails, it never waits.
    pub fn pin(&self, id: CursorId) -> CursorResult<ClientCursorPin<'_>> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(&id).ok_or(CursorError::NotFound(id))?;
        if entry.is_pinned() || entry.doomed {
            return Err(CursorError::InUse(id));
        }
        let body = entry.body.take().ok_or(CursorError::InUse(id))?;
        entry.pin_value += PINNED;
        Ok(ClientCursorPin::new(self, id, body))
    }

    /// Returns a pinned cursor's body, or drops it if the entry was doomed
    pub(super) fn unpin(&self, id: CursorId, body: ClientCursor) {
        let mut state = self.lock();
        let doomed = match state.entries.get_mut(&id) {
            Some(entry) if entry.doomed => true,
            Some(entry) => {
                entry.pin_value = entry.pin_value.saturating_sub(PINNED);
                entry.idle_age_ms = 0;
                entry.body = Some(body);
                false
            }
            None => false,
        };
        if doomed {
            state.entries.remove(&id);
            drop(state);
            Logger::trace(
                Event::CursorErased.as_str(),
                &[("cursor_id", id.to_string().as_str()), ("reason", "doomed")],
            );
        }
    }

    /// Removes the entry of a cursor held by the caller's own pin
    pub(super) fn erase_pinned(&self, id: CursorId) {
        if self.lock().entries.remove(&id).is_some() {
            Logger::trace(
                Event::CursorErased.as_str(),
                &[("cursor_id", id.to_string().as_str())],
            );
        }
    }

    /// Erases an idle cursor; false if the id is unknown.
    ///
    /// # Panics
    ///
    /// If the cursor is pinned by some request.
    pub fn erase(&self, id: CursorId) -> bool {
        let mut state = self.lock();
        let Some(pinned) = state.entries.get(&id).map(Entry::is_pinned) else {
            return false;
        };
        assert!(!pinned, "erase of in-use cursor {}", id);
        state.entries.remove(&id);
        drop(state);
        Logger::trace(
            Event::CursorErased.as_str(),
            &[("cursor_id", id.to_string().as_str())],
        );
        true
    }

    /// Erases unless pinned; a pinned cursor is doomed instead
    pub(super) fn discard(&self, id: CursorId) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(&id) else {
            return;
        };
        if entry.is_pinned() {
            entry.doomed = true;
        } else {
            state.entries.remove(&id);
        }
    }

    /// Client-requested kill. The namespace is looked up, checked with
    /// `is_authorized` outside the lock, then re-validated.
    ///
    /// A pinned cursor is interrupted and erased when its pin is released;
    /// that does not count as erased here.
    pub fn erase_if_authorized(&self, id: CursorId, is_authorized: impl Fn(&str) -> bool) -> bool {
        let Some(ns) = self.ns_of(id) else {
            return false;
        };
        if !is_authorized(&ns) {
            Logger::warn(
                Event::CursorKilled.as_str(),
                &[
                    ("cursor_id", id.to_string().as_str()),
                    ("ns", ns.as_str()),
                    ("outcome", "unauthorized"),
                ],
            );
            return false;
        }

        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(&id) else {
            return false;
        };
        if entry.ns != ns {
            return false;
        }
        if entry.is_pinned() {
            entry.interrupt.kill();
            entry.doomed = true;
            drop(state);
            Logger::info(
                Event::CursorKilled.as_str(),
                &[
                    ("cursor_id", id.to_string().as_str()),
                    ("ns", ns.as_str()),
                    ("outcome", "interrupted"),
                ],
            );
            return false;
        }
        state.entries.remove(&id);
        drop(state);

        if let Some(metrics) = &self.metrics {
            metrics.add_cursors_killed(1);
        }
        Logger::info(
            Event::CursorKilled.as_str(),
            &[
                ("cursor_id", id.to_string().as_str()),
                ("ns", ns.as_str()),
                ("outcome", "erased"),
            ],
        );
        true
    }

    /// Erases every cursor on `ns`; returns how many were affected
    pub fn invalidate_namespace(&self, ns: &str) -> usize {
        self.invalidate_where(ns, |cursor_ns| cursor_ns == ns)
    }

    /// Erases every cursor on any collection of `db`
    pub fn invalidate_database(&self, db: &str) -> usize {
        self.invalidate_where(db, |cursor_ns| {
            split_namespace(cursor_ns).is_some_and(|(cursor_db, _)| cursor_db == db)
        })
    }

    fn invalidate_where(&self, scope: &str, matches: impl Fn(&str) -> bool) -> usize {
        let mut affected = 0;
        {
            let mut state = self.lock();
            state.entries.retain(|_, entry| {
                if !matches(&entry.ns) {
                    return true;
                }
                affected += 1;
                if entry.is_pinned() {
                    entry.interrupt.kill();
                    entry.doomed = true;
                    return true;
                }
                false
            });
        }

        if affected > 0 {
            if let Some(metrics) = &self.metrics {
                metrics.add_cursors_invalidated(affected as u64);
            }
            Logger::info(
                Event::CursorsInvalidated.as_str(),
                &[("scope", scope), ("count", affected.to_string().as_str())],
            );
        }
        affected
    }

    /// Ages unpinned cursors by `elapsed_ms` and erases timeout-eligible
    /// ones past the idle limit. Returns how many were erased.
    pub fn sweep_idle(&self, elapsed_ms: u64) -> usize {
        let timeout = self.config.idle_timeout_ms;
        let candidates: Vec<CursorId> = {
            let mut state = self.lock();
            state
                .entries
                .iter_mut()
                .filter(|(_, entry)| !entry.is_pinned())
                .filter_map(|(id, entry)| {
                    entry.idle_age_ms = entry.idle_age_ms.saturating_add(elapsed_ms);
                    (entry.pin_value == 0 && entry.idle_age_ms > timeout).then_some(*id)
                })
                .collect()
        };
        if candidates.is_empty() {
            return 0;
        }

        // A getMore may have pinned a candidate since it was marked
        let mut erased = Vec::with_capacity(candidates.len());
        {
            let _scope = self.catalog.as_ref().map(|catalog| catalog.read_scope());
            let mut state = self.lock();
            for id in candidates {
                let still_idle = state
                    .entries
                    .get(&id)
                    .is_some_and(|entry| entry.pin_value == 0 && entry.idle_age_ms > timeout);
                if still_idle {
                    if let Some(entry) = state.entries.remove(&id) {
                        erased.push((id, entry.ns, entry.idle_age_ms));
                    }
                }
            }
            state.timed_out += erased.len() as u64;
        }

        for (id, ns, idle) in &erased {
            Logger::info(
                Event::CursorTimedOut.as_str(),
                &[
                    ("cursor_id", id.to_string().as_str()),
                    ("idle_ms", idle.to_string().as_str()),
                    ("ns", ns.as_str()),
                ],
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.add_cursors_timed_out(erased.len() as u64);
        }
        erased.len()
    }

    /// Counts for `cursorInfo`
    pub fn cursor_info(&self) -> CursorStats {
        let state = self.lock();
        CursorStats {
            total_open: state.entries.len(),
            pinned: state.entries.values().filter(|e| e.is_pinned()).count(),
            total_no_timeout: state
                .entries
                .values()
                .filter(|e| e.pin_value % PINNED == 1)
                .count(),
            timed_out: state.timed_out,
        }
    }
}
