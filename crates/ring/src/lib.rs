// SPDX-License-Identifier: MIT

//! Consistent-hash DHT ring with Chord-style stabilization (§4.7): a thin
//! overlay on top of a [`meshnode_node::Node`] that maintains ring
//! membership in a CRDT, answers `put`/`get` by consistent hashing, and
//! keeps successor/predecessor pointers fresh via periodic stabilize/notify.

mod error;
mod hash;
mod membership;
mod options;
mod requests;
mod ring;
mod stability;

pub use error::RingError;
pub use hash::{find_responsible_node, hash_token, ring_neighbors, strictly_between, RingMember, RingNeighbors};
pub use options::RingOptions;
pub use ring::RingNode;
pub use stability::Stability;
