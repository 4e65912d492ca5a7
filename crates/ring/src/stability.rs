// SPDX-License-Identifier: MIT

//! Stability state machine (§4.7): `STABLE`/`UNSTABLE`, driven by
//! membership-count changes (not by anti-entropy heartbeats).

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::RingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    Unstable,
}

struct State {
    status: Stability,
    last_topology_change_ms: u64,
    last_member_count: Option<usize>,
}

/// Tracks `lastTopologyChange` and exposes `waitForStable` via a
/// `tokio::sync::watch` channel, which (unlike `Notify::notify_waiters`)
/// never drops a transition that happens between a waiter's initial check
/// and it starting to listen.
pub struct StabilityTracker {
    state: Mutex<State>,
    stable_tx: watch::Sender<bool>,
}

impl StabilityTracker {
    pub fn new(now_ms: u64) -> Self {
        let (stable_tx, _rx) = watch::channel(false);
        Self {
            state: Mutex::new(State { status: Stability::Unstable, last_topology_change_ms: now_ms, last_member_count: None }),
            stable_tx,
        }
    }

    pub fn status(&self) -> Stability {
        self.state.lock().status
    }

    /// Call on every membership read; only an actual count change resets
    /// the topology-change timer and can flip `STABLE` back to `UNSTABLE`.
    /// Returns `true` if this call transitioned `STABLE -> UNSTABLE`.
    pub fn observe_member_count(&self, count: usize, now_ms: u64) -> bool {
        let mut state = self.state.lock();
        if state.last_member_count == Some(count) {
            return false;
        }
        state.last_member_count = Some(count);
        state.last_topology_change_ms = now_ms;

        let became_unstable = state.status == Stability::Stable;
        state.status = Stability::Unstable;
        drop(state);

        if became_unstable {
            let _ = self.stable_tx.send(false);
        }
        became_unstable
    }

    /// Periodic check (§4.7): transitions to `STABLE` once
    /// `memberCount >= replicationFactor` and the topology has been
    /// unchanged for `requiredStableTimeMs`. Returns `true` on transition.
    pub fn check(&self, member_count: usize, replication_factor: usize, required_stable_time_ms: u64, now_ms: u64) -> bool {
        let mut state = self.state.lock();
        if state.status == Stability::Stable {
            return false;
        }
        let elapsed = now_ms.saturating_sub(state.last_topology_change_ms);
        if member_count >= replication_factor && elapsed >= required_stable_time_ms {
            state.status = Stability::Stable;
            drop(state);
            let _ = self.stable_tx.send(true);
            return true;
        }
        false
    }

    pub async fn wait_for_stable(&self, timeout: Duration) -> Result<(), RingError> {
        let mut rx = self.stable_tx.subscribe();
        if *rx.borrow() {
            return Ok(());
        }
        tokio::time::timeout(timeout, async {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|_| RingError::Timeout)
    }
}
