// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PmdError {
    #[error("PMD already running on this port")]
    AlreadyRunning,

    #[error("failed to bind PMD listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] meshnode_wire::ProtocolError),
}
