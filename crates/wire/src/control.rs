// SPDX-License-Identifier: MIT

//! PMD control protocol (§3, §4.3, §6).
//!
//! On the wire this is `{type, payload, requestId?}`. We model `type` +
//! `payload` as an adjacently tagged enum and flatten it alongside
//! `request_id` so the JSON shape matches §3 exactly while Rust callers get
//! exhaustive matching on `ControlMessage`.

use meshnode_core::{Alias, NodeId, NodeInfo};
use serde::{Deserialize, Serialize};

/// One PMD protocol message: `type` + `payload`, per the table in §4.3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ControlMessage {
    #[serde(rename = "register")]
    Register {
        node_id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<Alias>,
        host: String,
        port: u16,
    },

    #[serde(rename = "unregister")]
    Unregister { node_id: NodeId },

    #[serde(rename = "resolve")]
    Resolve { alias: String },

    #[serde(rename = "list")]
    List,

    #[serde(rename = "watch")]
    Watch,

    #[serde(rename = "shutdown")]
    Shutdown,

    #[serde(rename = "response")]
    Response(ControlResult),

    #[serde(rename = "event")]
    Event { event: PeerEventKind, peer: NodeInfo },
}

/// Reply payload shapes from §4.3's table. `#[serde(untagged)]` picks the
/// first variant whose field names match, which is unambiguous here since
/// every variant uses a distinct field name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ControlResult {
    Success { success: bool },
    Error { error: String },
    Node { node: NodeInfo },
    Nodes { nodes: Vec<NodeInfo> },
}

/// Envelope with the `requestId` every request/response carries so replies
/// correlate to their originating request (§4.3: "All responses carry the
/// originating `requestId`").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: ControlMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Envelope {
    pub fn new(message: ControlMessage, request_id: Option<String>) -> Self {
        Self { message, request_id }
    }
}

/// `peer:join` / `peer:leave` (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PeerEventKind {
    #[serde(rename = "peer:join")]
    Join,
    #[serde(rename = "peer:leave")]
    Leave,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{decode, encode};

    #[test]
    fn register_roundtrips_with_request_id() {
        let env = Envelope::new(
            ControlMessage::Register {
                node_id: NodeId::from("abc123"),
                alias: Some(Alias::new("svc")),
                host: "localhost".to_string(),
                port: 9000,
            },
            Some("req_1".to_string()),
        );
        let bytes = encode(&env).expect("encode");
        let decoded: Envelope = decode(&bytes).expect("decode");
        assert_eq!(decoded, env);
    }

    #[test]
    fn wire_shape_matches_spec() {
        let env = Envelope::new(
            ControlMessage::Resolve { alias: "svc".to_string() },
            Some("req_2".to_string()),
        );
        let bytes = encode(&env).expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");
        assert_eq!(value["type"], "resolve");
        assert_eq!(value["payload"]["alias"], "svc");
        assert_eq!(value["requestId"], "req_2");
    }

    #[test]
    fn response_success_shape() {
        let env = Envelope::new(
            ControlMessage::Response(ControlResult::Success { success: true }),
            Some("req_3".to_string()),
        );
        let bytes = encode(&env).expect("encode");
        let decoded: Envelope = decode(&bytes).expect("decode");
        assert_eq!(decoded, env);
    }

    #[test]
    fn response_error_shape() {
        let env = Envelope::new(
            ControlMessage::Response(ControlResult::Error { error: "Node not found".to_string() }),
            Some("req_4".to_string()),
        );
        let bytes = encode(&env).expect("encode");
        let decoded: Envelope = decode(&bytes).expect("decode");
        assert_eq!(decoded, env);
    }

    #[test]
    fn event_peer_join_shape() {
        let peer = NodeInfo {
            node_id: NodeId::from("n1"),
            alias: None,
            host: "localhost".to_string(),
            port: 1,
            registered_at: 0,
        };
        let env =
            Envelope::new(ControlMessage::Event { event: PeerEventKind::Join, peer }, None);
        let bytes = encode(&env).expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");
        assert_eq!(value["type"], "event");
        assert_eq!(value["payload"]["event"], "peer:join");
    }
}
