// SPDX-License-Identifier: MIT

//! `meshctl status`: is the PMD reachable, and how many nodes does it know
//! about.

use anyhow::Result;

use crate::output::OutputFormat;

pub async fn handle(host: &str, port: u16, format: OutputFormat) -> Result<()> {
    let client = super::connect(host, port).await?;
    let nodes = client.list().await?;
    client.disconnect().await;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({"reachable": true, "nodeCount": nodes.len()}));
        }
        OutputFormat::Text => {
            println!("pmd at {host}:{port} is reachable, {} node(s) registered", nodes.len());
        }
    }
    Ok(())
}
