// SPDX-License-Identifier: MIT

//! Hybrid Logical Clock (§3, §4.6).

use serde::{Deserialize, Serialize};

use crate::node_id::ReplicaId;

/// `{t: ms, c: counter, r: ReplicaID}`. Total order: compare `t`, then `c`,
/// then `r` lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hlc {
    pub t: u64,
    pub c: u64,
    pub r: ReplicaId,
}

impl Hlc {
    pub fn zero(replica: ReplicaId) -> Self {
        Self { t: 0, c: 0, r: replica }
    }

    /// Advance the clock for a locally originated op (§4.6 "HLC update on
    /// local op"). Mutates `self` in place and returns the resulting value
    /// to stamp onto the op.
    pub fn tick_local(&mut self, now_ms: u64) -> Hlc {
        if now_ms > self.t {
            self.t = now_ms;
            self.c = 0;
        } else {
            self.c += 1;
        }
        self.clone()
    }

    /// Merge in a remote HLC on receipt of an op (§4.6 "HLC merge on
    /// apply"): `t' = max(t, remote.t)`; counter increments on tie per the
    /// standard HLC merge rule (Kulkarni et al.).
    pub fn merge_remote(&mut self, remote: &Hlc, now_ms: u64) -> Hlc {
        let new_t = self.t.max(remote.t).max(now_ms);
        self.c = if new_t == self.t && new_t == remote.t {
            self.c.max(remote.c) + 1
        } else if new_t == self.t {
            self.c + 1
        } else if new_t == remote.t {
            remote.c + 1
        } else {
            0
        };
        self.t = new_t;
        self.clone()
    }
}

impl PartialOrd for Hlc {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hlc {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.t, self.c, self.r.as_str()).cmp(&(other.t, other.c, other.r.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> ReplicaId {
        ReplicaId::from(s)
    }

    #[test]
    fn tick_local_advances_time_and_resets_counter() {
        let mut hlc = Hlc::zero(r("a"));
        let stamped = hlc.tick_local(100);
        assert_eq!(stamped.t, 100);
        assert_eq!(stamped.c, 0);
    }

    #[test]
    fn tick_local_bumps_counter_when_time_does_not_advance() {
        let mut hlc = Hlc::zero(r("a"));
        hlc.tick_local(100);
        let second = hlc.tick_local(100);
        assert_eq!(second.t, 100);
        assert_eq!(second.c, 1);
    }

    #[test]
    fn ordering_compares_t_then_c_then_replica() {
        let a = Hlc { t: 1, c: 0, r: r("a") };
        let b = Hlc { t: 2, c: 0, r: r("a") };
        assert!(a < b);

        let c = Hlc { t: 1, c: 1, r: r("a") };
        assert!(a < c);

        let d = Hlc { t: 1, c: 0, r: r("b") };
        assert!(a < d);
    }

    #[test]
    fn merge_remote_picks_max_time_and_increments_on_tie() {
        let mut local = Hlc { t: 100, c: 2, r: r("a") };
        let remote = Hlc { t: 100, c: 5, r: r("b") };
        let merged = local.merge_remote(&remote, 50);
        assert_eq!(merged.t, 100);
        assert_eq!(merged.c, 6);
    }

    #[test]
    fn merge_remote_advances_to_physical_now_when_larger() {
        let mut local = Hlc { t: 10, c: 2, r: r("a") };
        let remote = Hlc { t: 10, c: 2, r: r("b") };
        let merged = local.merge_remote(&remote, 1000);
        assert_eq!(merged.t, 1000);
        assert_eq!(merged.c, 0);
    }
}
