// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the PMD crate.

use std::path::PathBuf;
use std::time::Duration;

/// Default PMD control port (§5 config reference, §7.3 CLI surface).
pub const DEFAULT_PORT: u16 = 4369;

/// Default auto-shutdown delay after the registry becomes empty (§4.3, §5).
pub const DEFAULT_AUTO_SHUTDOWN_MS: u64 = 30_000;

pub fn port() -> u16 {
    std::env::var("MESHNODE_PMD_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT)
}

pub fn auto_shutdown_delay() -> Duration {
    std::env::var("MESHNODE_PMD_AUTO_SHUTDOWN_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(DEFAULT_AUTO_SHUTDOWN_MS))
}

/// Resolve the directory holding the daemon's lock file:
/// `MESHNODE_STATE_DIR` > `XDG_STATE_HOME/meshnode` > `~/.local/state/meshnode`.
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("MESHNODE_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("meshnode"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/meshnode"))
}

pub fn lock_path(port: u16) -> Option<PathBuf> {
    state_dir().map(|dir| dir.join(format!("pmd-{port}.pid")))
}
