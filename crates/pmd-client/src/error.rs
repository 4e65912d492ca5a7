// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not connected")]
    NotConnected,

    #[error("request timed out")]
    Timeout,

    #[error(transparent)]
    Protocol(#[from] meshnode_wire::ProtocolError),

    #[error("pmd returned an error: {0}")]
    Remote(String),
}
