// SPDX-License-Identifier: MIT

//! Text/JSON output formatting, shared by every command handler.

use clap::ValueEnum;
use meshnode_core::NodeInfo;
use serde_json::json;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn print_node(format: OutputFormat, node: &NodeInfo) {
    match format {
        OutputFormat::Json => println!("{}", node_json(node)),
        OutputFormat::Text => println!("{}", format_node_line(node)),
    }
}

pub fn print_nodes(format: OutputFormat, nodes: &[NodeInfo]) {
    match format {
        OutputFormat::Json => {
            let list: Vec<_> = nodes.iter().map(node_json).collect();
            println!("{}", serde_json::to_string_pretty(&list).unwrap_or_else(|_| "[]".to_string()));
        }
        OutputFormat::Text => {
            if nodes.is_empty() {
                println!("No nodes registered");
                return;
            }
            for node in nodes {
                println!("{}", format_node_line(node));
            }
        }
    }
}

fn format_node_line(node: &NodeInfo) -> String {
    let alias = node.alias.as_ref().map(|a| a.as_str()).unwrap_or("-");
    format!("{}  {:<20}  {}:{}", node.node_id.as_str(), alias, node.host, node.port)
}

fn node_json(node: &NodeInfo) -> serde_json::Value {
    json!({
        "nodeId": node.node_id.as_str(),
        "alias": node.alias.as_ref().map(|a| a.as_str()),
        "host": node.host,
        "port": node.port,
        "registeredAt": node.registered_at,
    })
}
