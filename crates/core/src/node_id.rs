// SPDX-License-Identifier: MIT

//! NodeID, Alias, and NodeInfo (§3).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

/// Opaque, 16-hex-character identifier, unique within a PMD's scope.
///
/// Derived once at node construction from host name, process identity, and
/// random bytes (§3). Two nodes on the same host at the same instant still
/// get distinct ids because of the random component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(SmolStr);

impl NodeId {
    /// Generate a new NodeID from the local hostname, this process's pid,
    /// and 16 random bytes.
    pub fn generate() -> Self {
        let host = hostname();
        let pid = std::process::id();
        let mut rand_bytes = [0u8; 16];
        getrandom(&mut rand_bytes);
        Self::derive(&host, pid, &rand_bytes)
    }

    /// Deterministic derivation, split out for testability.
    pub fn derive(host: &str, pid: u32, random: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(host.as_bytes());
        hasher.update(b":");
        hasher.update(pid.to_be_bytes());
        hasher.update(b":");
        hasher.update(random);
        let digest = hasher.finalize();
        let hex: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
        Self(SmolStr::new(hex))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(SmolStr::new(s)))
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(SmolStr::new(s))
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

/// `ReplicaID` in the CRDT (§3) is just the identity of the node producing
/// ops; we reuse `NodeId` rather than invent a second identifier.
pub type ReplicaId = NodeId;

/// Optional human-readable name, unique across the registry at any moment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alias(SmolStr);

impl Alias {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(SmolStr::new(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Alias {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Alias {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Alias {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl std::borrow::Borrow<str> for Alias {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

/// `{nodeId, alias?, host, port, registeredAt}` (§3). Owned by the PMD;
/// mutated only by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<Alias>,
    pub host: String,
    pub port: u16,
    pub registered_at: u64,
}

fn hostname() -> String {
    // The fallback is stable on a given host (env var), which is all §3
    // requires of this input.
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

fn getrandom(buf: &mut [u8]) {
    let id = nanoid::nanoid!(buf.len());
    let bytes = id.as_bytes();
    buf.copy_from_slice(&bytes[..buf.len()]);
}
