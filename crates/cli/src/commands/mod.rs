// SPDX-License-Identifier: MIT

//! CLI command implementations (§4.7 / §7.3 admin surface).

pub mod kill;
pub mod list;
pub mod resolve;
pub mod status;

use anyhow::{Context, Result};
use meshnode_pmd_client::PmdClient;

/// Open a connection to the PMD, wrapping the connect failure with the
/// `host:port` that was tried so the user can tell which daemon didn't
/// answer.
pub(crate) async fn connect(host: &str, port: u16) -> Result<PmdClient> {
    let client = PmdClient::new();
    client.connect(host, port).await.with_context(|| format!("failed to connect to pmd at {host}:{port}"))?;
    Ok(client)
}
