// SPDX-License-Identifier: MIT

//! `meshctl resolve <alias-or-node-id>`.

use anyhow::{anyhow, Result};

use crate::output::{self, OutputFormat};

pub async fn handle(host: &str, port: u16, target: &str, format: OutputFormat) -> Result<()> {
    let client = super::connect(host, port).await?;
    let result = client.resolve(target).await.map_err(|err| anyhow!("{err}"));
    client.disconnect().await;

    let node = result?;
    output::print_node(format, &node);
    Ok(())
}
