// SPDX-License-Identifier: MIT

//! Observability reads (§4.6 "Metrics and inspection"): `getMetrics` is
//! cumulative counters, `getStats` is current sizes, `inspect`/
//! `getCausalGraph` sample the log for debugging.

use meshnode_core::{Hlc, ReplicaId, VectorClock};

use crate::op::Op;

/// Cumulative counters, never reset except by process restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub applied: u64,
    pub conflicts: u64,
    pub rejected_sets: u64,
    pub gcs: u64,
}

/// Current sizes of the in-memory structures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub log_size: usize,
    pub pending_size: usize,
    pub lww_size: usize,
    pub tombstone_size: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InspectOptions {
    pub log_sample_size: usize,
    pub pending_sample_size: usize,
    pub include_causal_graph: bool,
}

#[derive(Debug, Clone)]
pub struct Inspect {
    pub stats: Stats,
    pub log_sample: Vec<Op>,
    pub pending_sample: Vec<Op>,
    pub causal_graph: Option<CausalGraph>,
}

#[derive(Debug, Clone)]
pub struct CausalEdge {
    pub replica: ReplicaId,
    pub hlc: Hlc,
    pub deps: VectorClock,
}

#[derive(Debug, Clone, Default)]
pub struct CausalGraph {
    pub edges: Vec<CausalEdge>,
}
