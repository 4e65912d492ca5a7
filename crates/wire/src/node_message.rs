// SPDX-License-Identifier: MIT

//! Inter-node messages (§3, §6) and the ring-node wire subtypes (§4.7).

use meshnode_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{from, to, payload, timestamp}` (§3). `payload` is application-opaque
/// except for the ring subtypes below, which the ring crate decodes out of
/// it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeMessage {
    pub from: NodeId,
    pub to: NodeId,
    pub payload: Value,
    pub timestamp: u64,
}

impl NodeMessage {
    pub fn new(from: NodeId, to: NodeId, payload: Value, timestamp: u64) -> Self {
        Self { from, to, payload, timestamp }
    }
}

/// Ring-node message subtypes (§4.7 "Message dispatch"). Each Op carried on
/// the wire is the `encode_op` string produced by the CRDT crate — this
/// crate doesn't depend on the CRDT's `Op` type, keeping the layering
/// clean (transport below CRDT, not beside it).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RingPayload {
    #[serde(rename = "CRDT_SYNC_REQUEST")]
    CrdtSyncRequest { clock: serde_json::Value, from: NodeId, node_id: NodeId },

    #[serde(rename = "CRDT_SYNC_RESPONSE")]
    CrdtSyncResponse { ops: Vec<String>, clock: serde_json::Value },

    #[serde(rename = "CRDT_OP")]
    CrdtOp { op: String },

    #[serde(rename = "TOKEN")]
    Token { round: u64, hop: u32, initiator: NodeId },

    #[serde(rename = "DHT_PUT")]
    DhtPut { key: String, value: Value },

    #[serde(rename = "DHT_PUT_ACK")]
    DhtPutAck { key: String },

    #[serde(rename = "DHT_GET")]
    DhtGet { key: String, request_id: String, from: NodeId },

    #[serde(rename = "DHT_GET_RESPONSE")]
    DhtGetResponse { request_id: String, value: Option<Value> },

    #[serde(rename = "STABILIZE_REQUEST")]
    StabilizeRequest { request_id: String },

    #[serde(rename = "STABILIZE_RESPONSE")]
    StabilizeResponse { request_id: String, predecessor: Option<NodeId> },

    #[serde(rename = "NOTIFY")]
    Notify { node_id: NodeId, hash: String },

    #[serde(rename = "PING")]
    Ping { request_id: String },

    #[serde(rename = "PONG")]
    Pong { request_id: String },
}
