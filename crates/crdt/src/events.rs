// SPDX-License-Identifier: MIT

//! Observability events (§4.6): `change`, `conflict`, `gc`, `restore`.
//! Handler registration mirrors the mailbox's `on_message` (registration
//! order, panics caught and logged, never stop the remaining handlers).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::op::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Del,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: Vec<Value>,
    pub value: Option<Value>,
    pub op: Op,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    ParentTombstone,
    TombstoneWins,
}

#[derive(Debug, Clone)]
pub struct ConflictEvent {
    pub kind: ConflictKind,
    pub path: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcKind {
    Log,
    Pending,
    Tombstones,
}

#[derive(Debug, Clone, Copy)]
pub struct GcEvent {
    pub kind: GcKind,
    pub removed: usize,
    pub current_size: usize,
}

type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;
type ConflictHandler = Arc<dyn Fn(&ConflictEvent) + Send + Sync>;
type GcHandler = Arc<dyn Fn(&GcEvent) + Send + Sync>;
type RestoreHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct EventHandlers {
    change: Vec<ChangeHandler>,
    conflict: Vec<ConflictHandler>,
    gc: Vec<GcHandler>,
    restore: Vec<RestoreHandler>,
}

impl EventHandlers {
    pub fn on_change<F>(&mut self, handler: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.change.push(Arc::new(handler));
    }

    pub fn on_conflict<F>(&mut self, handler: F)
    where
        F: Fn(&ConflictEvent) + Send + Sync + 'static,
    {
        self.conflict.push(Arc::new(handler));
    }

    pub fn on_gc<F>(&mut self, handler: F)
    where
        F: Fn(&GcEvent) + Send + Sync + 'static,
    {
        self.gc.push(Arc::new(handler));
    }

    pub fn on_restore<F>(&mut self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.restore.push(Arc::new(handler));
    }

    pub fn emit_change(&self, event: ChangeEvent) {
        for handler in &self.change {
            invoke(|| handler(&event));
        }
    }

    pub fn emit_conflict(&self, event: ConflictEvent) {
        for handler in &self.conflict {
            invoke(|| handler(&event));
        }
    }

    pub fn emit_gc(&self, event: GcEvent) {
        for handler in &self.gc {
            invoke(|| handler(&event));
        }
    }

    pub fn emit_restore(&self) {
        for handler in &self.restore {
            invoke(|| handler());
        }
    }
}

fn invoke<F: FnOnce()>(f: F) {
    if std::panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("crdt event handler panicked");
    }
}
