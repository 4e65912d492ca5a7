// SPDX-License-Identifier: MIT

use std::time::Duration;

use meshnode_core::{Alias, NodeId, SystemClock};
use meshnode_wire::{read_message, write_message};
use tokio::net::TcpStream;

use super::*;

async fn spawn_server(auto_shutdown_delay: Duration) -> u16 {
    let server = Server::new(Box::new(SystemClock), auto_shutdown_delay);
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move { server.serve(listener).await });
    port
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port)).await.expect("connect")
}

async fn roundtrip(stream: &mut TcpStream, envelope: &Envelope) -> Envelope {
    let bytes = meshnode_wire::encode(envelope).expect("encode");
    write_message(stream, &bytes).await.expect("write");
    let response_bytes = read_message(stream).await.expect("read");
    meshnode_wire::decode(&response_bytes).expect("decode")
}

fn register(node_id: &str, alias: Option<&str>, port: u16) -> Envelope {
    Envelope::new(
        ControlMessage::Register {
            node_id: NodeId::from(node_id),
            alias: alias.map(Alias::new),
            host: "localhost".to_string(),
            port,
        },
        Some("req_1".to_string()),
    )
}

#[tokio::test]
async fn register_resolve_and_list_roundtrip() {
    let port = spawn_server(Duration::from_secs(30)).await;
    let mut client = connect(port).await;

    let response = roundtrip(&mut client, &register("n1", Some("a"), 5000)).await;
    assert_eq!(response.message, ControlMessage::Response(ControlResult::Success { success: true }));

    let resolve =
        Envelope::new(ControlMessage::Resolve { alias: "a".to_string() }, Some("req_2".to_string()));
    let response = roundtrip(&mut client, &resolve).await;
    match response.message {
        ControlMessage::Response(ControlResult::Node { node }) => {
            assert_eq!(node.node_id, NodeId::from("n1"));
            assert_eq!(node.port, 5000);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    let list = Envelope::new(ControlMessage::List, Some("req_3".to_string()));
    let response = roundtrip(&mut client, &list).await;
    match response.message {
        ControlMessage::Response(ControlResult::Nodes { nodes }) => assert_eq!(nodes.len(), 1),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn register_alias_conflict_is_rejected() {
    let port = spawn_server(Duration::from_secs(30)).await;
    let mut a = connect(port).await;
    let mut b = connect(port).await;

    roundtrip(&mut a, &register("n1", Some("shared"), 1)).await;
    let response = roundtrip(&mut b, &register("n2", Some("shared"), 2)).await;
    match response.message {
        ControlMessage::Response(ControlResult::Error { error }) => {
            assert_eq!(error, "Alias 'shared' already in use");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn unregister_unknown_node_returns_not_found() {
    let port = spawn_server(Duration::from_secs(30)).await;
    let mut client = connect(port).await;
    let envelope =
        Envelope::new(ControlMessage::Unregister { node_id: NodeId::from("ghost") }, None);
    let response = roundtrip(&mut client, &envelope).await;
    match response.message {
        ControlMessage::Response(ControlResult::Error { error }) => assert_eq!(error, "Node not found"),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_message_type_is_reported() {
    let port = spawn_server(Duration::from_secs(30)).await;
    let mut client = connect(port).await;
    let raw = serde_json::json!({"type": "bogus", "payload": {}, "requestId": "req_9"});
    let bytes = serde_json::to_vec(&raw).expect("to_vec");
    write_message(&mut client, &bytes).await.expect("write");
    let response_bytes = read_message(&mut client).await.expect("read");
    let response: Envelope = meshnode_wire::decode(&response_bytes).expect("decode");
    assert_eq!(response.request_id.as_deref(), Some("req_9"));
    match response.message {
        ControlMessage::Response(ControlResult::Error { error }) => {
            assert_eq!(error, "Unknown message type")
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn watch_receives_peer_join_and_leave() {
    let port = spawn_server(Duration::from_secs(30)).await;
    let mut watcher = connect(port).await;
    let watch = Envelope::new(ControlMessage::Watch, Some("req_1".to_string()));
    let response = roundtrip(&mut watcher, &watch).await;
    assert_eq!(response.message, ControlMessage::Response(ControlResult::Success { success: true }));

    let mut peer = connect(port).await;
    roundtrip(&mut peer, &register("n1", None, 1)).await;

    let event_bytes = tokio::time::timeout(Duration::from_millis(500), read_message(&mut watcher))
        .await
        .expect("timed out waiting for peer:join")
        .expect("read");
    let event: Envelope = meshnode_wire::decode(&event_bytes).expect("decode");
    match event.message {
        ControlMessage::Event { event: PeerEventKind::Join, peer } => {
            assert_eq!(peer.node_id, NodeId::from("n1"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    drop(peer);

    let event_bytes = tokio::time::timeout(Duration::from_millis(500), read_message(&mut watcher))
        .await
        .expect("timed out waiting for peer:leave")
        .expect("read");
    let event: Envelope = meshnode_wire::decode(&event_bytes).expect("decode");
    match event.message {
        ControlMessage::Event { event: PeerEventKind::Leave, peer } => {
            assert_eq!(peer.node_id, NodeId::from("n1"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn socket_close_without_unregister_removes_node_and_fires_leave() {
    let port = spawn_server(Duration::from_secs(30)).await;
    let mut watcher = connect(port).await;
    roundtrip(&mut watcher, &Envelope::new(ControlMessage::Watch, None)).await;

    let mut peer = connect(port).await;
    roundtrip(&mut peer, &register("n1", None, 1)).await;
    // Drain the peer:join event before dropping the connection.
    read_message(&mut watcher).await.expect("join event");

    drop(peer);

    let event_bytes = tokio::time::timeout(Duration::from_millis(500), read_message(&mut watcher))
        .await
        .expect("timed out")
        .expect("read");
    let event: Envelope = meshnode_wire::decode(&event_bytes).expect("decode");
    assert!(matches!(event.message, ControlMessage::Event { event: PeerEventKind::Leave, .. }));

    let mut client = connect(port).await;
    let list = roundtrip(&mut client, &Envelope::new(ControlMessage::List, None)).await;
    match list.message {
        ControlMessage::Response(ControlResult::Nodes { nodes }) => assert!(nodes.is_empty()),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn auto_shutdown_fires_after_registry_stays_empty() {
    let port = spawn_server(Duration::from_millis(50)).await;
    let mut client = connect(port).await;
    roundtrip(&mut client, &register("n1", None, 1)).await;
    roundtrip(
        &mut client,
        &Envelope::new(ControlMessage::Unregister { node_id: NodeId::from("n1") }, None),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(150)).await;

    let mut probe = TcpStream::connect(("127.0.0.1", port)).await;
    assert!(probe.is_err() || {
        let stream = probe.as_mut().unwrap();
        let bytes = meshnode_wire::encode(&Envelope::new(ControlMessage::List, None)).unwrap();
        write_message(stream, &bytes).await.is_err()
    });
}
