// SPDX-License-Identifier: MIT

//! `snapshot()`/`restore()` payload and the static `diffSnapshots` helper.

use meshnode_core::{Hlc, ReplicaId, VectorClock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub doc: Value,
    pub vc: VectorClock,
    pub hlc: Hlc,
    pub lww: Vec<(String, Hlc)>,
    pub tombstones: Vec<(String, Hlc)>,
    pub replica_id: ReplicaId,
}

/// Paths whose LWW timestamp differs and tombstones added/removed between
/// two snapshots — a coarse diff, not a document-level deep diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub changed_paths: Vec<String>,
    pub added_tombstones: Vec<String>,
    pub removed_tombstones: Vec<String>,
}

pub fn diff_snapshots(a: &Snapshot, b: &Snapshot) -> SnapshotDiff {
    let a_lww: std::collections::HashMap<_, _> = a.lww.iter().cloned().collect();
    let b_lww: std::collections::HashMap<_, _> = b.lww.iter().cloned().collect();

    let mut changed_paths: Vec<String> = b_lww
        .iter()
        .filter(|(key, hlc)| a_lww.get(*key).map(|existing| existing != *hlc).unwrap_or(true))
        .map(|(key, _)| key.clone())
        .collect();
    changed_paths.sort();

    let a_tombstones: std::collections::HashSet<_> = a.tombstones.iter().map(|(k, _)| k.clone()).collect();
    let b_tombstones: std::collections::HashSet<_> = b.tombstones.iter().map(|(k, _)| k.clone()).collect();

    let mut added_tombstones: Vec<String> = b_tombstones.difference(&a_tombstones).cloned().collect();
    added_tombstones.sort();
    let mut removed_tombstones: Vec<String> = a_tombstones.difference(&b_tombstones).cloned().collect();
    removed_tombstones.sort();

    SnapshotDiff { changed_paths, added_tombstones, removed_tombstones }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(lww: Vec<(&str, u64)>, tombstones: Vec<&str>) -> Snapshot {
        let replica = ReplicaId::from("r");
        Snapshot {
            doc: Value::Null,
            vc: VectorClock::new(),
            hlc: Hlc::zero(replica.clone()),
            lww: lww.into_iter().map(|(k, t)| (k.to_string(), Hlc { t, c: 0, r: replica.clone() })).collect(),
            tombstones: tombstones.into_iter().map(|k| (k.to_string(), Hlc::zero(replica.clone()))).collect(),
            replica_id: replica,
        }
    }

    #[test]
    fn diff_reports_changed_paths_and_tombstone_deltas() {
        let a = snap(vec![("x", 1), ("y", 1)], vec!["t1"]);
        let b = snap(vec![("x", 1), ("y", 2), ("z", 1)], vec!["t2"]);

        let diff = diff_snapshots(&a, &b);
        assert_eq!(diff.changed_paths, vec!["y".to_string(), "z".to_string()]);
        assert_eq!(diff.added_tombstones, vec!["t2".to_string()]);
        assert_eq!(diff.removed_tombstones, vec!["t1".to_string()]);
    }
}
