// SPDX-License-Identifier: MIT

//! `meshctl kill <alias-or-node-id>`: force-unregister a node from the PMD.
//!
//! The control protocol has no remote-process-signal primitive (§1
//! Non-goals exclude transport auth, and nothing in §4.3 defines one), so
//! "kill" here means evicting the node's registry entry — the PMD process
//! itself doesn't reach out and terminate anything.

use anyhow::{anyhow, Result};

use crate::output::OutputFormat;

pub async fn handle(host: &str, port: u16, target: &str, format: OutputFormat) -> Result<()> {
    let client = super::connect(host, port).await?;

    let result = async {
        let node = client.resolve(target).await.map_err(|err| anyhow!("{err}"))?;
        client.unregister(node.node_id.clone()).await.map_err(|err| anyhow!("{err}"))?;
        Ok(node)
    }
    .await;
    client.disconnect().await;

    let node = result?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({"killed": node.node_id.as_str()})),
        OutputFormat::Text => println!("killed {} ({target})", node.node_id.as_str()),
    }
    Ok(())
}
