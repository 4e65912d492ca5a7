// SPDX-License-Identifier: MIT

//! `meshctl list`: every node currently registered with the PMD.

use anyhow::Result;

use crate::output::{self, OutputFormat};

pub async fn handle(host: &str, port: u16, format: OutputFormat) -> Result<()> {
    let client = super::connect(host, port).await?;
    let nodes = client.list().await?;
    client.disconnect().await;

    output::print_nodes(format, &nodes);
    Ok(())
}
