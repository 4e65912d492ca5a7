// SPDX-License-Identifier: MIT

//! Replicated JSON document (§4.6): causal delivery, LWW-per-path
//! conflict resolution, tombstones, GC, and observability hooks.

mod crdt;
mod error;
mod events;
mod introspect;
mod op;
mod options;
mod path;
mod snapshot;

pub use crdt::Crdt;
pub use error::CrdtError;
pub use events::{ChangeEvent, ChangeKind, ConflictEvent, ConflictKind, GcEvent, GcKind};
pub use introspect::{CausalEdge, CausalGraph, Inspect, InspectOptions, Metrics, Stats};
pub use op::{decode_op, encode_op, Op, OpKind};
pub use options::CrdtOptions;
pub use path::path_key;
pub use snapshot::{diff_snapshots, Snapshot, SnapshotDiff};
