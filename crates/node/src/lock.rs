// SPDX-License-Identifier: MIT

//! Process-singleton lock file under the OS temp directory, named by
//! process identity (§6 "Environment").

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use fs2::FileExt;
use meshnode_core::{ErrorKind, MeshError};

pub struct ProcessLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl ProcessLock {
    /// Acquire the exclusive lock for `identity`. Fails with
    /// `ErrorKind::AlreadyRunning` if a live node instance already holds it.
    pub fn acquire(identity: &str) -> Result<Self, MeshError> {
        let path = std::env::temp_dir().join(format!("meshnode-{identity}.lock"));
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| MeshError::new(ErrorKind::AlreadyRunning, err.to_string()))?;

        file.try_lock_exclusive().map_err(|_| {
            MeshError::new(
                ErrorKind::AlreadyRunning,
                format!("a node instance is already running for '{identity}'"),
            )
        })?;

        file.set_len(0).map_err(|err| MeshError::new(ErrorKind::AlreadyRunning, err.to_string()))?;
        writeln!(&file, "{}", std::process::id())
            .map_err(|err| MeshError::new(ErrorKind::AlreadyRunning, err.to_string()))?;

        Ok(Self { path, file })
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
