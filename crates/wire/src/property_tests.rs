// SPDX-License-Identifier: MIT

//! Property tests for protocol serde roundtrips, covering every
//! `ControlMessage` and `RingPayload` variant with minimal fixed field
//! values.

use meshnode_core::{Alias, NodeId, NodeInfo};
use proptest::prelude::*;

use crate::control::{ControlMessage, ControlResult, Envelope, PeerEventKind};
use crate::framing::{decode, encode};
use crate::node_message::RingPayload;

fn peer() -> NodeInfo {
    NodeInfo {
        node_id: NodeId::from("n"),
        alias: Some(Alias::new("a")),
        host: "localhost".to_string(),
        port: 1,
        registered_at: 0,
    }
}

fn all_control_messages() -> Vec<ControlMessage> {
    vec![
        ControlMessage::Register {
            node_id: NodeId::from("n"),
            alias: None,
            host: "localhost".to_string(),
            port: 0,
        },
        ControlMessage::Unregister { node_id: NodeId::from("n") },
        ControlMessage::Resolve { alias: "a".to_string() },
        ControlMessage::List,
        ControlMessage::Watch,
        ControlMessage::Shutdown,
        ControlMessage::Response(ControlResult::Success { success: true }),
        ControlMessage::Response(ControlResult::Error { error: "x".to_string() }),
        ControlMessage::Response(ControlResult::Node { node: peer() }),
        ControlMessage::Response(ControlResult::Nodes { nodes: vec![peer()] }),
        ControlMessage::Event { event: PeerEventKind::Join, peer: peer() },
        ControlMessage::Event { event: PeerEventKind::Leave, peer: peer() },
    ]
}

fn all_ring_payloads() -> Vec<RingPayload> {
    vec![
        RingPayload::CrdtSyncRequest {
            clock: serde_json::json!({}),
            from: NodeId::from("a"),
            node_id: NodeId::from("a"),
        },
        RingPayload::CrdtSyncResponse { ops: vec![], clock: serde_json::json!({}) },
        RingPayload::CrdtOp { op: "{}".to_string() },
        RingPayload::Token { round: 0, hop: 1, initiator: NodeId::from("a") },
        RingPayload::DhtPut { key: "k".to_string(), value: serde_json::Value::Null },
        RingPayload::DhtPutAck { key: "k".to_string() },
        RingPayload::DhtGet { key: "k".to_string(), request_id: "r".to_string(), from: NodeId::from("a") },
        RingPayload::DhtGetResponse { request_id: "r".to_string(), value: None },
        RingPayload::StabilizeRequest { request_id: "r".to_string() },
        RingPayload::StabilizeResponse { request_id: "r".to_string(), predecessor: None },
        RingPayload::Notify { node_id: NodeId::from("a"), hash: "1".to_string() },
        RingPayload::Ping { request_id: "r".to_string() },
        RingPayload::Pong { request_id: "r".to_string() },
    ]
}

proptest! {
    #[test]
    fn control_message_roundtrip(msg in proptest::sample::select(all_control_messages())) {
        let env = Envelope::new(msg.clone(), Some("req_1".to_string()));
        let encoded = encode(&env).expect("encode");
        let decoded: Envelope = decode(&encoded).expect("decode");
        prop_assert_eq!(decoded.message, msg);
    }

    #[test]
    fn ring_payload_roundtrip(payload in proptest::sample::select(all_ring_payloads())) {
        let encoded = encode(&payload).expect("encode");
        let decoded: RingPayload = decode(&encoded).expect("decode");
        prop_assert_eq!(decoded, payload);
    }
}
