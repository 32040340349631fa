//! Running operations and the kill-op signal
//!
//! Every find, getMore and explain registers itself here for as long as
//! it runs. `kill` raises the operation's interrupt; the operation fails
//! at its next `advance()`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::executor::Interrupt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OpKind {
    Query,
    GetMore,
    Explain,
}

/// Snapshot of one running operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentOp {
    pub op_id: Uuid,
    pub op: OpKind,
    pub ns: String,
    pub started_at: DateTime<Utc>,
    pub killed: bool,
}

struct Running {
    info: CurrentOp,
    interrupt: Interrupt,
}

#[derive(Default)]
pub struct CurrentOpRegistry {
    ops: Mutex<HashMap<Uuid, Running>>,
}

impl CurrentOpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Running>> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an operation until the returned guard is dropped
    pub fn register(&self, op: OpKind, ns: &str, interrupt: Interrupt) -> OpGuard<'_> {
        let op_id = Uuid::new_v4();
        self.lock().insert(
            op_id,
            Running {
                info: CurrentOp {
                    op_id,
                    op,
                    ns: ns.to_string(),
                    started_at: Utc::now(),
                    killed: false,
                },
                interrupt,
            },
        );
        OpGuard {
            registry: self,
            op_id,
        }
    }

    /// Raises the operation's interrupt; false if no such operation runs
    pub fn kill(&self, op_id: Uuid) -> bool {
        match self.lock().get(&op_id) {
            Some(running) => {
                running.interrupt.kill();
                true
            }
            None => false,
        }
    }

    /// Running operations, oldest first
    pub fn list(&self) -> Vec<CurrentOp> {
        let mut ops: Vec<CurrentOp> = self
            .lock()
            .values()
            .map(|running| CurrentOp {
                killed: running.interrupt.is_killed(),
                ..running.info.clone()
            })
            .collect();
        ops.sort_by_key(|op| op.started_at);
        ops
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct OpGuard<'a> {
    registry: &'a CurrentOpRegistry,
    op_id: Uuid,
}

impl OpGuard<'_> {
    pub fn op_id(&self) -> Uuid {
        self.op_id
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.op_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_unregisters_on_drop() {
        let registry = CurrentOpRegistry::new();
        {
            let guard = registry.register(OpKind::Query, "db.c", Interrupt::new());
            assert_eq!(registry.len(), 1);
            assert_eq!(registry.list()[0].op_id, guard.op_id());
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_kill_raises_interrupt() {
        let registry = CurrentOpRegistry::new();
        let interrupt = Interrupt::new();
        let guard = registry.register(OpKind::GetMore, "db.c", interrupt.clone());
        assert!(registry.kill(guard.op_id()));
        assert!(interrupt.is_killed());
        assert!(registry.list()[0].killed);
        drop(guard);
        assert!(!registry.kill(Uuid::new_v4()));
    }

    #[test]
    fn test_current_op_serializes_camel_case() {
        let registry = CurrentOpRegistry::new();
        let _guard = registry.register(OpKind::GetMore, "db.c", Interrupt::new());
        let value = serde_json::to_value(&registry.list()[0]).unwrap();
        assert_eq!(value["op"], "getMore");
        assert_eq!(value["ns"], "db.c");
        assert!(value.get("opId").is_some());
        assert!(value.get("startedAt").is_some());
    }
}
