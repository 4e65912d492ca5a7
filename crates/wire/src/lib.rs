// SPDX-License-Identifier: MIT

//! Wire protocol for the mesh: length-prefixed JSON framing (§6), the PMD
//! control protocol (§4.3), and inter-node messages (§4.7, §6).
//!
//! Wire format: `u32` big-endian length prefix + UTF-8 JSON bytes, used
//! identically for PMD control messages and inter-node messages.

mod control;
mod framing;
mod node_message;

pub use control::{ControlMessage, ControlResult, Envelope, PeerEventKind};
pub use framing::{decode, encode, read_message, write_message, ProtocolError};
pub use node_message::{NodeMessage, RingPayload};

#[cfg(test)]
mod property_tests;
