// SPDX-License-Identifier: MIT

//! Vector Clock (§3): `ReplicaID -> counter`, non-negative.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node_id::ReplicaId;

/// `BTreeMap` keeps replica iteration order deterministic, which matters
/// for `encode_op`/`diff_since` producing stable output across replicas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<ReplicaId, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, replica: &ReplicaId) -> u64 {
        self.0.get(replica).copied().unwrap_or(0)
    }

    /// Advance this replica's own counter by one and return the new value.
    pub fn tick(&mut self, replica: &ReplicaId) -> u64 {
        let entry = self.0.entry(replica.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Pointwise max-merge with another vector clock (§3 invariant: after
    /// applying an Op, `local VC[k] >= op.deps[k]` for all k).
    pub fn merge(&mut self, other: &VectorClock) {
        for (replica, &count) in other.0.iter() {
            let entry = self.0.entry(replica.clone()).or_insert(0);
            if count > *entry {
                *entry = count;
            }
        }
    }

    /// `true` iff `self[k] >= other[k]` for every `k` in `other` — i.e.
    /// `self` has already seen everything `other` has.
    pub fn covers(&self, other: &VectorClock) -> bool {
        other.0.iter().all(|(replica, &count)| self.get(replica) >= count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, &u64)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq<BTreeMap<ReplicaId, u64>> for VectorClock {
    fn eq(&self, other: &BTreeMap<ReplicaId, u64>) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> ReplicaId {
        ReplicaId::from(s)
    }

    #[test]
    fn tick_starts_at_one() {
        let mut vc = VectorClock::new();
        assert_eq!(vc.tick(&r("a")), 1);
        assert_eq!(vc.get(&r("a")), 1);
    }

    #[test]
    fn merge_takes_pointwise_max() {
        let mut vc = VectorClock::new();
        vc.tick(&r("a"));
        vc.tick(&r("a"));

        let mut other = VectorClock::new();
        other.tick(&r("a"));
        other.tick(&r("b"));
        other.tick(&r("b"));
        other.tick(&r("b"));

        vc.merge(&other);
        assert_eq!(vc.get(&r("a")), 2);
        assert_eq!(vc.get(&r("b")), 3);
    }

    #[test]
    fn covers_checks_every_replica_in_other() {
        let mut vc = VectorClock::new();
        vc.tick(&r("a"));
        vc.tick(&r("a"));
        vc.tick(&r("b"));

        let mut other = VectorClock::new();
        other.tick(&r("a"));

        assert!(vc.covers(&other));

        other.tick(&r("c"));
        assert!(!vc.covers(&other));
    }
}
