// SPDX-License-Identifier: MIT

//! Consistent hash ring (§4.7): SHA-256 token, `(token asc, nodeId asc)`
//! member order, and the ring-geometric queries.

use meshnode_core::{Alias, NodeId};
use sha2::{Digest, Sha256};

/// First 8 bytes of `SHA-256(input)` as a big-endian `u64`.
pub fn hash_token(input: &str) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is at least 8 bytes"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingMember {
    pub node_id: NodeId,
    pub alias: Option<Alias>,
    pub joined_at: u64,
    pub token: u64,
}

impl RingMember {
    pub fn new(node_id: NodeId, alias: Option<Alias>, joined_at: u64) -> Self {
        let token = hash_token(node_id.as_str());
        Self { node_id, alias, joined_at, token }
    }
}

/// Sort members by `(token asc, nodeId asc)` (§4.7).
pub fn sort_members(mut members: Vec<RingMember>) -> Vec<RingMember> {
    members.sort_by(|a, b| a.token.cmp(&b.token).then_with(|| a.node_id.as_str().cmp(b.node_id.as_str())));
    members
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RingNeighbors {
    pub successor: Option<NodeId>,
    pub predecessor: Option<NodeId>,
    pub successor_list: Vec<NodeId>,
    pub ring: Vec<NodeId>,
}

/// `getRingNeighbors()` (§4.7): empty neighbors (but a populated `ring`)
/// when the membership is smaller than the replication factor, or when
/// `self_id` isn't (yet) a member.
pub fn ring_neighbors(members: &[RingMember], self_id: &NodeId, replication_factor: usize) -> RingNeighbors {
    let ring: Vec<NodeId> = members.iter().map(|m| m.node_id.clone()).collect();
    if members.len() < replication_factor {
        return RingNeighbors { ring, ..Default::default() };
    }
    let Some(self_idx) = members.iter().position(|m| &m.node_id == self_id) else {
        return RingNeighbors { ring, ..Default::default() };
    };

    let n = members.len();
    let successor = ring[(self_idx + 1) % n].clone();
    let predecessor = ring[(self_idx + n - 1) % n].clone();
    let successor_list =
        (1..=replication_factor.min(n.saturating_sub(1))).map(|offset| ring[(self_idx + offset) % n].clone()).collect();

    RingNeighbors { successor: Some(successor), predecessor: Some(predecessor), successor_list, ring }
}

/// `findResponsibleNode(key)` (§4.7): the first member whose token is
/// `>= keyHash`, wrapping to the first member if none qualifies.
pub fn find_responsible_node(members: &[RingMember], key_hash: u64) -> Option<NodeId> {
    members.iter().find(|m| m.token >= key_hash).or_else(|| members.first()).map(|m| m.node_id.clone())
}

/// Whether `x` lies strictly between `a` and `b` going clockwise around the
/// ring, used by stabilize/notify to decide whether to adopt a new
/// successor/predecessor.
pub fn strictly_between(x: u64, a: u64, b: u64) -> bool {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => x > a && x < b,
        std::cmp::Ordering::Greater => x > a || x < b,
        std::cmp::Ordering::Equal => false,
    }
}
