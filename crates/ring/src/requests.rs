// SPDX-License-Identifier: MIT

//! Generic request/response correlation (§4.7 "Request/response pattern"),
//! shared by `DHT_GET` and `STABILIZE_REQUEST`/`NOTIFY`-adjacent RPCs: the
//! messaging layer is fire-and-forget, so every reply-expecting op
//! correlates via a `requestId` and an outstanding map of oneshot senders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// `"<alias>-<counter>-<wallMs>"` (§4.7).
pub fn next_request_id(prefix: &str, counter: &AtomicU64, now_ms: u64) -> String {
    format!("{prefix}-{}-{now_ms}", counter.fetch_add(1, Ordering::SeqCst))
}

pub struct PendingRequests<T> {
    inner: Mutex<HashMap<String, oneshot::Sender<T>>>,
}

impl<T> PendingRequests<T> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, request_id: String) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(request_id, tx);
        rx
    }

    /// Deliver `value` to the waiting request, if any. Returns `false` if
    /// there was nothing outstanding for `request_id` (e.g. it already
    /// timed out).
    pub fn resolve(&self, request_id: &str, value: T) -> bool {
        match self.inner.lock().remove(request_id) {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn remove(&self, request_id: &str) {
        self.inner.lock().remove(request_id);
    }

    /// Shutdown (§5): drop every outstanding sender so waiters observe a
    /// closed channel rather than hanging until their timeout.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self::new()
    }
}
