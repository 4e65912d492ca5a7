// SPDX-License-Identifier: MIT

//! The ring membership document lives at `doc["members"][nodeId]` in the
//! CRDT (§4.7): `insert_self`/`remove_member` mutate it, `members_from_doc`
//! reads a consistent snapshot back out.

use meshnode_core::{Alias, NodeId};
use meshnode_crdt::Crdt;
use serde_json::Value;

use crate::hash::{sort_members, RingMember};

fn member_path(node_id: &NodeId) -> Vec<Value> {
    vec![Value::String("members".to_string()), Value::String(node_id.as_str().to_string())]
}

/// Insert or refresh a member record. Used both for self-registration at
/// startup and for auto-adopting a peer discovered via anti-entropy.
pub fn insert_member(crdt: &Crdt, node_id: &NodeId, alias: Option<&Alias>, joined_at: u64) {
    let record = serde_json::json!({
        "alias": alias.map(|a| a.as_str().to_string()),
        "nodeId": node_id.as_str(),
        "joinedAt": joined_at,
    });
    if let Err(err) = crdt.set(&member_path(node_id), record) {
        tracing::warn!(error = %err, "failed to insert ring member");
    }
}

pub fn remove_member(crdt: &Crdt, node_id: &NodeId) {
    if let Err(err) = crdt.del(&member_path(node_id)) {
        tracing::warn!(error = %err, "failed to remove ring member");
    }
}

pub fn members_from_doc(doc: &Value) -> Vec<RingMember> {
    let Some(members) = doc.get("members").and_then(Value::as_object) else {
        return Vec::new();
    };

    let parsed = members
        .iter()
        .map(|(node_id_str, record)| {
            let node_id = NodeId::from(node_id_str.as_str());
            let alias = record.get("alias").and_then(Value::as_str).map(Alias::from);
            let joined_at = record.get("joinedAt").and_then(Value::as_u64).unwrap_or(0);
            RingMember::new(node_id, alias, joined_at)
        })
        .collect();

    sort_members(parsed)
}
