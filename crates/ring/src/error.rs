// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("request timed out")]
    Timeout,

    #[error("ring node stopped")]
    Stopped,

    #[error(transparent)]
    Mesh(#[from] meshnode_core::MeshError),
}
