// SPDX-License-Identifier: MIT

//! The PMD's own process-singleton lock file: acquire, stamp with this
//! process's PID, release on drop.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::PmdError;

/// Holds the exclusive lock for as long as it's alive; the lock releases on
/// drop.
pub struct LockFile {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl LockFile {
    /// Acquire the exclusive lock at `path`, creating parent directories and
    /// the file if needed, then overwrite it with this process's PID.
    ///
    /// Returns `AlreadyRunning` if another process holds the lock.
    pub fn acquire(path: &Path) -> Result<Self, PmdError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(path)?;
        file.try_lock_exclusive().map_err(|_| PmdError::AlreadyRunning)?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Self { path: path.to_path_buf(), file })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
