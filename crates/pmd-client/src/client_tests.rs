// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshnode_core::{Alias, NodeId, SystemClock};
use meshnode_pmd::Server;
use tokio::net::TcpListener;

use super::*;

async fn spawn_pmd() -> u16 {
    let server = Server::new(Box::new(SystemClock), Duration::from_secs(30));
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move { server.serve(listener).await });
    port
}

#[tokio::test]
async fn register_resolve_and_list_roundtrip() {
    let port = spawn_pmd().await;
    let client = PmdClient::new();
    client.connect("127.0.0.1", port).await.expect("connect");

    client
        .register(NodeId::from("n1"), Some(Alias::new("a")), "localhost".to_string(), 1234)
        .await
        .expect("register");

    let node = client.resolve("a").await.expect("resolve");
    assert_eq!(node.node_id, NodeId::from("n1"));
    assert_eq!(node.port, 1234);

    let nodes = client.list().await.expect("list");
    assert_eq!(nodes.len(), 1);

    client.unregister(NodeId::from("n1")).await.expect("unregister");
    assert!(client.list().await.expect("list").is_empty());
}

#[tokio::test]
async fn resolve_unknown_token_is_remote_error() {
    let port = spawn_pmd().await;
    let client = PmdClient::new();
    client.connect("127.0.0.1", port).await.expect("connect");

    let err = client.resolve("ghost").await.expect_err("should fail");
    assert!(matches!(err, ClientError::Remote(_)));
}

#[tokio::test]
async fn watch_dispatches_peer_join_and_leave_events() {
    let port = spawn_pmd().await;
    let watcher = PmdClient::new();
    watcher.connect("127.0.0.1", port).await.expect("connect");
    watcher.watch().await.expect("watch");

    let events = Arc::new(std::sync::Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    watcher.on_event(move |kind, peer| {
        events_clone.lock().unwrap().push((kind, peer.node_id));
    });

    let peer = PmdClient::new();
    peer.connect("127.0.0.1", port).await.expect("connect");
    peer.register(NodeId::from("n1"), None, "localhost".to_string(), 1).await.expect("register");

    tokio::time::sleep(Duration::from_millis(100)).await;
    peer.disconnect().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = events.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (meshnode_wire::PeerEventKind::Join, NodeId::from("n1")));
    assert_eq!(seen[1], (meshnode_wire::PeerEventKind::Leave, NodeId::from("n1")));
}

#[tokio::test]
async fn requests_fail_with_not_connected_before_connect() {
    let client = PmdClient::new();
    let err = client.list().await.expect_err("should fail");
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn disconnect_fires_disconnect_handler_and_fails_in_flight_requests() {
    let port = spawn_pmd().await;
    let client = PmdClient::new();
    client.connect("127.0.0.1", port).await.expect("connect");

    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = Arc::clone(&fired);
    client.on_disconnect(move || {
        fired_clone.store(true, Ordering::SeqCst);
    });

    client.disconnect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fired.load(Ordering::SeqCst));

    let err = client.list().await.expect_err("should fail after disconnect");
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn concurrent_requests_are_correlated_by_request_id() {
    let port = spawn_pmd().await;
    let client = PmdClient::new();
    client.connect("127.0.0.1", port).await.expect("connect");

    let count = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for i in 0..5 {
        let client = client.clone();
        let count = Arc::clone(&count);
        handles.push(tokio::spawn(async move {
            client
                .register(NodeId::from(format!("n{i}").as_str()), None, "h".to_string(), i as u16)
                .await
                .expect("register");
            count.fetch_add(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.expect("join");
    }
    assert_eq!(count.load(Ordering::SeqCst), 5);
    assert_eq!(client.list().await.expect("list").len(), 5);
}
