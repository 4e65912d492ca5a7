// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrdtError {
    #[error("invalid path segment: {0}")]
    InvalidPath(String),

    #[error("failed to decode op: {0}")]
    Decode(#[from] serde_json::Error),
}
