// SPDX-License-Identifier: MIT

use std::time::Duration;

use meshnode_core::SystemClock;
use meshnode_node::{Node, NodeConfig};
use meshnode_pmd::Server as PmdServer;
use tokio::net::TcpListener;

use super::*;

async fn spawn_pmd() -> u16 {
    let server = PmdServer::new(Box::new(SystemClock), Duration::from_secs(30));
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move { server.serve(listener).await });
    port
}

fn config_for(pmd_port: u16, alias: &str) -> NodeConfig {
    NodeConfig {
        alias: Some(meshnode_core::Alias::new(alias)),
        pmd_host: "127.0.0.1".to_string(),
        pmd_port,
        ..NodeConfig::default()
    }
}

fn fast_options() -> RingOptions {
    RingOptions {
        replication_factor: 2,
        anti_entropy_interval: Duration::from_millis(50),
        stability_check_interval: Duration::from_millis(30),
        required_stable_time_ms: 100,
        stabilize_interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn two_ring_nodes_converge_on_each_others_membership() {
    let pmd_port = spawn_pmd().await;
    let node_a = Node::start(config_for(pmd_port, "ring-a")).await.expect("start a");
    let node_b = Node::start(config_for(pmd_port, "ring-b")).await.expect("start b");

    let ring_a = RingNode::start(node_a, fast_options()).await;
    let ring_b = RingNode::start(node_b, fast_options()).await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(ring_a.members().len(), 2);
    assert_eq!(ring_b.members().len(), 2);

    ring_a.shutdown().await;
    ring_b.shutdown().await;
}

#[tokio::test]
async fn put_and_get_round_trip_across_nodes() {
    let pmd_port = spawn_pmd().await;
    let node_a = Node::start(config_for(pmd_port, "ring-c")).await.expect("start a");
    let node_b = Node::start(config_for(pmd_port, "ring-d")).await.expect("start b");

    let ring_a = RingNode::start(node_a, fast_options()).await;
    let ring_b = RingNode::start(node_b, fast_options()).await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    ring_a.put("k1".to_string(), serde_json::json!("v1")).await.expect("put from a");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let via_a = ring_a.get("k1").await.expect("get from a");
    let via_b = ring_b.get("k1").await.expect("get from b");
    assert_eq!(via_a, Some(serde_json::json!("v1")));
    assert_eq!(via_b, Some(serde_json::json!("v1")));

    ring_a.shutdown().await;
    ring_b.shutdown().await;
}

#[tokio::test]
async fn get_of_missing_key_returns_none() {
    let pmd_port = spawn_pmd().await;
    let node_a = Node::start(config_for(pmd_port, "ring-e")).await.expect("start a");
    let ring_a = RingNode::start(node_a, fast_options()).await;

    assert_eq!(ring_a.get("missing").await.expect("get"), None);

    ring_a.shutdown().await;
}

#[tokio::test]
async fn single_node_ring_becomes_stable_once_replication_factor_is_met() {
    let pmd_port = spawn_pmd().await;
    let node_a = Node::start(config_for(pmd_port, "ring-f")).await.expect("start a");

    let options = RingOptions {
        replication_factor: 1,
        stability_check_interval: Duration::from_millis(20),
        required_stable_time_ms: 30,
        ..fast_options()
    };
    let ring_a = RingNode::start(node_a, options).await;

    ring_a.wait_for_stable(Duration::from_secs(2)).await.expect("should become stable");
    assert_eq!(ring_a.stability(), Stability::Stable);

    ring_a.shutdown().await;
}

#[tokio::test]
async fn ring_neighbors_and_find_responsible_node_reflect_current_membership() {
    let pmd_port = spawn_pmd().await;
    let node_a = Node::start(config_for(pmd_port, "ring-g")).await.expect("start a");
    let node_b = Node::start(config_for(pmd_port, "ring-h")).await.expect("start b");

    let ring_a = RingNode::start(node_a, fast_options()).await;
    let ring_b = RingNode::start(node_b, fast_options()).await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    let neighbors = ring_a.ring_neighbors();
    assert_eq!(neighbors.ring.len(), 2);
    assert_eq!(neighbors.successor.as_ref(), Some(ring_b.node_id()));

    let responsible = ring_a.find_responsible_node("some-key");
    assert!(responsible.is_some());

    ring_a.shutdown().await;
    ring_b.shutdown().await;
}

#[tokio::test]
async fn shutdown_rejects_outstanding_dht_get_requests() {
    let pmd_port = spawn_pmd().await;
    let node_a = Node::start(config_for(pmd_port, "ring-i")).await.expect("start a");
    let ring_a = RingNode::start(node_a, fast_options()).await;

    let request_id = ring_a.next_request_id();
    let rx = ring_a.dht_pending.register(request_id);
    ring_a.shutdown().await;

    assert!(rx.await.is_err());
}
