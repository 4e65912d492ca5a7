// SPDX-License-Identifier: MIT

//! Tunables and their defaults (§4.6 "Options").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrdtOptions {
    pub max_log_size: usize,
    pub max_pending_size: usize,
    pub max_lww_size: usize,
    pub pending_timeout_ms: u64,
    pub tombstone_grace_period_ms: u64,
    pub enable_auto_gc: bool,
}

impl Default for CrdtOptions {
    fn default() -> Self {
        Self {
            max_log_size: 1000,
            max_pending_size: 10_000,
            max_lww_size: 100_000,
            pending_timeout_ms: 60_000,
            tombstone_grace_period_ms: 3_600_000,
            enable_auto_gc: true,
        }
    }
}
