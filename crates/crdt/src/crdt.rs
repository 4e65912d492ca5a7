// SPDX-License-Identifier: MIT

//! The replicated JSON document (§4.6): causal delivery over HLC+VC,
//! LWW-per-path conflict resolution, tombstones, and GC.

use std::collections::{HashMap, VecDeque};

use meshnode_core::{Clock, Hlc, ReplicaId, VectorClock};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::error::CrdtError;
use crate::events::{ChangeEvent, ChangeKind, ConflictEvent, ConflictKind, EventHandlers, GcEvent, GcKind};
use crate::introspect::{CausalEdge, CausalGraph, Inspect, InspectOptions, Metrics, Stats};
use crate::op::{Op, OpKind};
use crate::options::CrdtOptions;
use crate::path::{self, path_key, remove_subtree, validate, write_at};
use crate::snapshot::{self, Snapshot, SnapshotDiff};

struct PendingOp {
    op: Op,
    received_at_ms: u64,
}

struct State {
    doc: Value,
    vc: VectorClock,
    hlc: Hlc,
    op_seq: u64,
    log: VecDeque<Op>,
    lww: HashMap<String, Hlc>,
    tombstones: HashMap<String, Hlc>,
    pending: Vec<PendingOp>,
    metrics: Metrics,
}

enum EffectOutcome {
    Applied,
    RejectedTombstoneWins,
}

/// One replica of the document. Cheap to share behind an `Arc` — every
/// method takes `&self` and locks internally, the same shape as
/// `meshnode_mailbox::Mailbox`.
pub struct Crdt {
    replica_id: ReplicaId,
    wall_clock: Box<dyn Clock>,
    options: CrdtOptions,
    state: Mutex<State>,
    handlers: Mutex<EventHandlers>,
}

impl Crdt {
    pub fn new(replica_id: ReplicaId, wall_clock: Box<dyn Clock>, options: CrdtOptions) -> Self {
        let hlc = Hlc::zero(replica_id.clone());
        Self {
            replica_id,
            wall_clock,
            options,
            state: Mutex::new(State {
                doc: Value::Null,
                vc: VectorClock::new(),
                hlc,
                op_seq: 0,
                log: VecDeque::new(),
                lww: HashMap::new(),
                tombstones: HashMap::new(),
                pending: Vec::new(),
                metrics: Metrics::default(),
            }),
            handlers: Mutex::new(EventHandlers::default()),
        }
    }

    pub fn get_replica_id(&self) -> ReplicaId {
        self.replica_id.clone()
    }

    /// `set(path, value)` (§4.6): advance HLC, tick the VC, apply locally,
    /// append to the log, emit `change{set}` (and any `conflict`s).
    pub fn set(&self, path: &[Value], value: Value) -> Result<Op, CrdtError> {
        validate(path)?;
        let now = self.wall_clock.now_ms();
        let mut state = self.state.lock();

        let hlc = state.hlc.tick_local(now);
        state.vc.tick(&self.replica_id);
        let deps = state.vc.clone();
        let seq = state.op_seq;
        state.op_seq += 1;
        let id = Op::make_id(&self.replica_id, &hlc, seq);

        let op = Op { id, src: self.replica_id.clone(), path: path.to_vec(), kind: OpKind::Set, value: Some(value), hlc, deps };

        let parent_conflicts: Vec<ConflictEvent> = path::prefixes(path)
            .into_iter()
            .filter(|prefix_key| state.tombstones.contains_key(prefix_key))
            .map(|_| ConflictEvent { kind: ConflictKind::ParentTombstone, path: path.to_vec() })
            .collect();

        let (outcome, mut conflicts) = apply_effect(&mut state, &op);
        conflicts.extend(parent_conflicts);
        state.log.push_back(op.clone());
        if matches!(outcome, EffectOutcome::RejectedTombstoneWins) {
            state.metrics.rejected_sets += 1;
        }
        state.metrics.applied += 1;
        state.metrics.conflicts += conflicts.len() as u64;
        drop(state);

        self.emit_change_and_conflicts(ChangeKind::Set, &op, conflicts);
        self.maybe_auto_gc();
        Ok(op)
    }

    /// `del(path)` (§4.6): same bookkeeping as `set`, with `kind = tombstone`.
    pub fn del(&self, path: &[Value]) -> Result<Op, CrdtError> {
        validate(path)?;
        let now = self.wall_clock.now_ms();
        let mut state = self.state.lock();

        let hlc = state.hlc.tick_local(now);
        state.vc.tick(&self.replica_id);
        let deps = state.vc.clone();
        let seq = state.op_seq;
        state.op_seq += 1;
        let id = Op::make_id(&self.replica_id, &hlc, seq);

        let op = Op { id, src: self.replica_id.clone(), path: path.to_vec(), kind: OpKind::Tombstone, value: None, hlc, deps };

        let (_, conflicts) = apply_effect(&mut state, &op);
        state.log.push_back(op.clone());
        state.metrics.applied += 1;
        state.metrics.conflicts += conflicts.len() as u64;
        drop(state);

        self.emit_change_and_conflicts(ChangeKind::Del, &op, conflicts);
        self.maybe_auto_gc();
        Ok(op)
    }

    /// `receive(op)` (§4.6): dedup against the VC, apply if causally ready,
    /// otherwise buffer; draining pending repeatedly until no progress.
    pub fn receive(&self, op: Op) -> bool {
        let mut state = self.state.lock();
        let src = op.src.clone();
        if state.vc.get(&src) >= op.deps.get(&src) {
            return false;
        }

        if !is_ready(&state.vc, &op) {
            let now = self.wall_clock.now_ms();
            state.pending.push(PendingOp { op, received_at_ms: now });
            return true;
        }

        let mut to_emit = Vec::new();
        self.apply_remote(&mut state, op, &mut to_emit);
        loop {
            let ready_idx = state.pending.iter().position(|pending| is_ready(&state.vc, &pending.op));
            match ready_idx {
                Some(idx) => {
                    let ready_op = state.pending.remove(idx).op;
                    self.apply_remote(&mut state, ready_op, &mut to_emit);
                }
                None => break,
            }
        }
        drop(state);

        for (kind, op, conflicts) in to_emit {
            self.emit_change_and_conflicts(kind, &op, conflicts);
        }
        self.maybe_auto_gc();
        true
    }

    fn apply_remote(&self, state: &mut State, op: Op, out: &mut Vec<(ChangeKind, Op, Vec<ConflictEvent>)>) {
        let (outcome, conflicts) = apply_effect(state, &op);
        state.log.push_back(op.clone());
        state.vc.merge(&op.deps);
        let now = self.wall_clock.now_ms();
        state.hlc.merge_remote(&op.hlc, now);
        state.metrics.applied += 1;
        state.metrics.conflicts += conflicts.len() as u64;
        if matches!(outcome, EffectOutcome::RejectedTombstoneWins) {
            state.metrics.rejected_sets += 1;
        }
        let kind = match op.kind {
            OpKind::Set => ChangeKind::Set,
            OpKind::Tombstone => ChangeKind::Del,
        };
        out.push((kind, op, conflicts));
    }

    fn emit_change_and_conflicts(&self, kind: ChangeKind, op: &Op, conflicts: Vec<ConflictEvent>) {
        let handlers = self.handlers.lock();
        handlers.emit_change(ChangeEvent { kind, path: op.path.clone(), value: op.value.clone(), op: op.clone() });
        for conflict in conflicts {
            handlers.emit_conflict(conflict);
        }
    }

    /// `diffSince(remoteVC)` (§4.6): log ops this replica has that `remoteVC`
    /// hasn't seen yet, per originating replica.
    pub fn diff_since(&self, remote_vc: &VectorClock) -> Vec<Op> {
        let state = self.state.lock();
        state.log.iter().filter(|op| op.deps.get(&op.src) > remote_vc.get(&op.src)).cloned().collect()
    }

    pub fn clock(&self) -> VectorClock {
        self.state.lock().vc.clone()
    }

    pub fn value(&self) -> Value {
        self.state.lock().doc.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            doc: state.doc.clone(),
            vc: state.vc.clone(),
            hlc: state.hlc.clone(),
            lww: state.lww.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            tombstones: state.tombstones.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            replica_id: self.replica_id.clone(),
        }
    }

    /// `restore(snapshot)` (§4.6): replace in-memory state, clear the log
    /// and pending buffer, emit `restore`.
    pub fn restore(&self, snapshot: Snapshot) {
        let mut state = self.state.lock();
        state.doc = snapshot.doc;
        state.vc = snapshot.vc;
        state.hlc = snapshot.hlc;
        state.lww = snapshot.lww.into_iter().collect();
        state.tombstones = snapshot.tombstones.into_iter().collect();
        state.log.clear();
        state.pending.clear();
        drop(state);
        self.handlers.lock().emit_restore();
    }

    /// `gcLog(keepLastN?)`, default `keep = maxLogSize`.
    pub fn gc_log(&self, keep: Option<usize>) {
        let keep = keep.unwrap_or(self.options.max_log_size);
        let mut state = self.state.lock();
        let removed = state.log.len().saturating_sub(keep);
        for _ in 0..removed {
            state.log.pop_front();
        }
        let current_size = state.log.len();
        if removed > 0 {
            state.metrics.gcs += 1;
        }
        drop(state);
        if removed > 0 {
            self.handlers.lock().emit_gc(GcEvent { kind: GcKind::Log, removed, current_size });
        }
    }

    /// `gcTombstones()`: drop tombstones older than `tombstoneGracePeriodMs`.
    pub fn gc_tombstones(&self) {
        let now = self.wall_clock.now_ms();
        let grace = self.options.tombstone_grace_period_ms;
        let mut state = self.state.lock();
        let before = state.tombstones.len();
        state.tombstones.retain(|_, hlc| now.saturating_sub(hlc.t) < grace);
        let removed = before - state.tombstones.len();
        let current_size = state.tombstones.len();
        if removed > 0 {
            state.metrics.gcs += 1;
        }
        drop(state);
        if removed > 0 {
            self.handlers.lock().emit_gc(GcEvent { kind: GcKind::Tombstones, removed, current_size });
        }
    }

    /// `cleanPendingBuffer()`: drop pending ops older than `pendingTimeoutMs`,
    /// then drop the oldest entries above `maxPendingSize` (§5 backpressure).
    pub fn clean_pending_buffer(&self) {
        let now = self.wall_clock.now_ms();
        let timeout = self.options.pending_timeout_ms;
        let max_size = self.options.max_pending_size;
        let mut state = self.state.lock();
        let before = state.pending.len();
        state.pending.retain(|pending| now.saturating_sub(pending.received_at_ms) < timeout);
        while state.pending.len() > max_size {
            state.pending.remove(0);
        }
        let removed = before - state.pending.len();
        let current_size = state.pending.len();
        if removed > 0 {
            state.metrics.gcs += 1;
        }
        drop(state);
        if removed > 0 {
            self.handlers.lock().emit_gc(GcEvent { kind: GcKind::Pending, removed, current_size });
        }
    }

    /// Auto-GC (§4.6): triggers on `log.size > 2*maxLogSize` or
    /// `pending.size > maxPendingSize/2`; opportunistically GCs tombstones
    /// whenever either fires. Never evicts LWW entries, only warns.
    fn maybe_auto_gc(&self) {
        if !self.options.enable_auto_gc {
            return;
        }
        let (log_len, pending_len, lww_len) = {
            let state = self.state.lock();
            (state.log.len(), state.pending.len(), state.lww.len())
        };

        let mut did_gc = false;
        if log_len > 2 * self.options.max_log_size {
            self.gc_log(None);
            did_gc = true;
        }
        if pending_len > self.options.max_pending_size / 2 {
            self.clean_pending_buffer();
            did_gc = true;
        }
        if did_gc {
            self.gc_tombstones();
        }
        if lww_len > self.options.max_lww_size {
            warn!(size = lww_len, limit = self.options.max_lww_size, "lww index exceeds max_lww_size");
        }
    }

    pub fn get_metrics(&self) -> Metrics {
        self.state.lock().metrics
    }

    pub fn get_stats(&self) -> Stats {
        let state = self.state.lock();
        Stats {
            log_size: state.log.len(),
            pending_size: state.pending.len(),
            lww_size: state.lww.len(),
            tombstone_size: state.tombstones.len(),
        }
    }

    pub fn inspect(&self, opts: InspectOptions) -> Inspect {
        let state = self.state.lock();
        let stats = Stats {
            log_size: state.log.len(),
            pending_size: state.pending.len(),
            lww_size: state.lww.len(),
            tombstone_size: state.tombstones.len(),
        };
        let log_sample: Vec<Op> =
            state.log.iter().rev().take(opts.log_sample_size).cloned().collect::<Vec<_>>().into_iter().rev().collect();
        let pending_sample: Vec<Op> = state.pending.iter().take(opts.pending_sample_size).map(|p| p.op.clone()).collect();
        let causal_graph = if opts.include_causal_graph { Some(causal_graph_from(&state.log)) } else { None };
        Inspect { stats, log_sample, pending_sample, causal_graph }
    }

    pub fn get_causal_graph(&self) -> CausalGraph {
        causal_graph_from(&self.state.lock().log)
    }

    /// `replay({fromIndex, toIndex, onOp})`: addresses the current
    /// in-memory log, so indices shift meaning across a `gcLog` call.
    pub fn replay(&self, from_index: usize, to_index: usize, mut on_op: impl FnMut(&Op)) {
        let state = self.state.lock();
        let end = to_index.min(state.log.len());
        for op in state.log.iter().skip(from_index).take(end.saturating_sub(from_index)) {
            on_op(op);
        }
    }

    pub fn diff_snapshots(a: &Snapshot, b: &Snapshot) -> SnapshotDiff {
        snapshot::diff_snapshots(a, b)
    }

    pub fn encode_op(op: &Op) -> String {
        crate::op::encode_op(op)
    }

    pub fn decode_op(encoded: &str) -> Result<Op, CrdtError> {
        crate::op::decode_op(encoded)
    }

    pub fn on_change<F>(&self, handler: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.handlers.lock().on_change(handler);
    }

    pub fn on_conflict<F>(&self, handler: F)
    where
        F: Fn(&ConflictEvent) + Send + Sync + 'static,
    {
        self.handlers.lock().on_conflict(handler);
    }

    pub fn on_gc<F>(&self, handler: F)
    where
        F: Fn(&GcEvent) + Send + Sync + 'static,
    {
        self.handlers.lock().on_gc(handler);
    }

    pub fn on_restore<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers.lock().on_restore(handler);
    }
}

fn causal_graph_from(log: &VecDeque<Op>) -> CausalGraph {
    CausalGraph {
        edges: log.iter().map(|op| CausalEdge { replica: op.src.clone(), hlc: op.hlc.clone(), deps: op.deps.clone() }).collect(),
    }
}

/// Causal readiness (§4.6): `deps[src] == local[src] + 1` for the
/// originating replica, and `deps[k] <= local[k]` for every other `k`.
fn is_ready(local: &VectorClock, op: &Op) -> bool {
    let src = &op.src;
    if op.deps.get(src) != local.get(src) + 1 {
        return false;
    }
    op.deps.iter().all(|(replica, &count)| replica == src || count <= local.get(replica))
}

/// Apply the effect (document mutation, LWW/tombstone bookkeeping) of an
/// op already known to be causally ready. Does not touch the log, VC, or
/// HLC — callers handle that bookkeeping since it differs for local vs.
/// received ops (§4.6 "Apply algorithm").
fn apply_effect(state: &mut State, op: &Op) -> (EffectOutcome, Vec<ConflictEvent>) {
    let key = path_key(&op.path);
    let mut conflicts = Vec::new();

    let outcome = match op.kind {
        OpKind::Tombstone => {
            let replace = match state.tombstones.get(&key) {
                None => true,
                Some(existing) => op.hlc > *existing,
            };
            if replace {
                state.tombstones.insert(key, op.hlc.clone());
                remove_subtree(&mut state.doc, &op.path);
            }
            EffectOutcome::Applied
        }
        OpKind::Set => {
            if let Some(tomb) = state.tombstones.get(&key) {
                if *tomb > op.hlc {
                    conflicts.push(ConflictEvent { kind: ConflictKind::TombstoneWins, path: op.path.clone() });
                    EffectOutcome::RejectedTombstoneWins
                } else {
                    apply_set_effect(state, op, &key);
                    EffectOutcome::Applied
                }
            } else {
                apply_set_effect(state, op, &key);
                EffectOutcome::Applied
            }
        }
    };

    (outcome, conflicts)
}

fn apply_set_effect(state: &mut State, op: &Op, key: &str) {
    let should_write = match state.lww.get(key) {
        None => true,
        Some(existing) => op.hlc > *existing,
    };
    if should_write {
        write_at(&mut state.doc, &op.path, op.value.clone().unwrap_or(Value::Null));
        state.lww.insert(key.to_string(), op.hlc.clone());
    }
}

#[cfg(test)]
#[path = "crdt_tests.rs"]
mod tests;
