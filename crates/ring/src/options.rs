// SPDX-License-Identifier: MIT

//! Tunables and their defaults (§4.7).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingOptions {
    pub replication_factor: usize,
    pub anti_entropy_interval: Duration,
    pub stability_check_interval: Duration,
    pub required_stable_time_ms: u64,
    pub stabilize_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self {
            replication_factor: 3,
            anti_entropy_interval: Duration::from_secs(2),
            stability_check_interval: Duration::from_secs(1),
            required_stable_time_ms: 5_000,
            stabilize_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}
