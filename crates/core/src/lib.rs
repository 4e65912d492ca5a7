// SPDX-License-Identifier: MIT

//! meshnode-core: shared identifiers, clocks, and error kinds for the mesh
//! runtime, the PMD, the JSON-CRDT, and the ring node.

pub mod clock;
pub mod error;
pub mod hlc;
pub mod node_id;
pub mod vc;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{ErrorKind, MeshError};
pub use hlc::Hlc;
pub use node_id::{Alias, NodeId, NodeInfo, ReplicaId};
pub use vc::VectorClock;
