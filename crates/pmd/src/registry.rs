// SPDX-License-Identifier: MIT

//! Pure registry state machine (§4.3): NodeID/alias bookkeeping with no I/O,
//! so the protocol semantics are testable without a socket.

use std::collections::HashMap;

use meshnode_core::{Alias, Clock, NodeId, NodeInfo};

/// Outcome of a `register` call the server needs to act on (fire
/// `peer:join`, cancel the auto-shutdown timer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOutcome {
    pub is_new: bool,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Alias '{0}' already in use")]
    AliasInUse(String),

    #[error("Node not found")]
    NotFound,
}

/// `registry: NodeID → NodeInfo` plus `aliasIndex: alias → NodeID` (§4.3).
pub struct Registry {
    clock: Box<dyn Clock>,
    nodes: HashMap<NodeId, NodeInfo>,
    aliases: HashMap<Alias, NodeId>,
}

impl Registry {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self { clock, nodes: HashMap::new(), aliases: HashMap::new() }
    }

    /// Insert or replace a `NodeInfo`. Rebinding the same NodeID to the same
    /// alias is idempotent; binding an alias already owned by another NodeID
    /// is rejected.
    pub fn register(
        &mut self,
        node_id: NodeId,
        alias: Option<Alias>,
        host: String,
        port: u16,
    ) -> Result<RegisterOutcome, RegistryError> {
        if let Some(ref alias) = alias {
            if let Some(owner) = self.aliases.get(alias) {
                if owner != &node_id {
                    return Err(RegistryError::AliasInUse(alias.as_str().to_string()));
                }
            }
        }

        let is_new = !self.nodes.contains_key(&node_id);

        if let Some(existing) = self.nodes.get(&node_id) {
            if let Some(old_alias) = &existing.alias {
                if alias.as_ref() != Some(old_alias) {
                    self.aliases.remove(old_alias);
                }
            }
        }

        let info = NodeInfo {
            node_id: node_id.clone(),
            alias: alias.clone(),
            host,
            port,
            registered_at: self.clock.now_ms(),
        };
        self.nodes.insert(node_id.clone(), info);
        if let Some(alias) = alias {
            self.aliases.insert(alias, node_id);
        }

        Ok(RegisterOutcome { is_new })
    }

    /// Remove a NodeInfo and its alias binding, if any.
    pub fn unregister(&mut self, node_id: &NodeId) -> Result<NodeInfo, RegistryError> {
        let info = self.nodes.remove(node_id).ok_or(RegistryError::NotFound)?;
        if let Some(alias) = &info.alias {
            self.aliases.remove(alias);
        }
        Ok(info)
    }

    /// Alias lookup first; if absent, try the token as a NodeID (§4.3).
    pub fn resolve(&self, token: &str) -> Option<NodeInfo> {
        if let Some(node_id) = self.aliases.get(token) {
            return self.nodes.get(node_id).cloned();
        }
        self.nodes.get(token).cloned()
    }

    pub fn list(&self) -> Vec<NodeInfo> {
        self.nodes.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshnode_core::FakeClock;

    fn registry() -> Registry {
        Registry::new(Box::new(FakeClock::new(1000)))
    }

    #[test]
    fn register_is_new_on_first_call_and_not_on_rebind() {
        let mut reg = registry();
        let node = NodeId::from("n1");
        let first = reg.register(node.clone(), None, "localhost".to_string(), 1).unwrap();
        assert!(first.is_new);
        let second = reg.register(node, None, "localhost".to_string(), 2).unwrap();
        assert!(!second.is_new);
    }

    #[test]
    fn register_rejects_alias_owned_by_another_node() {
        let mut reg = registry();
        reg.register(NodeId::from("n1"), Some(Alias::new("a")), "h".to_string(), 1).unwrap();
        let err = reg
            .register(NodeId::from("n2"), Some(Alias::new("a")), "h".to_string(), 2)
            .unwrap_err();
        assert_eq!(err, RegistryError::AliasInUse("a".to_string()));
    }

    #[test]
    fn register_rebinding_same_node_to_same_alias_is_idempotent() {
        let mut reg = registry();
        let node = NodeId::from("n1");
        reg.register(node.clone(), Some(Alias::new("a")), "h".to_string(), 1).unwrap();
        reg.register(node.clone(), Some(Alias::new("a")), "h".to_string(), 1).unwrap();
        assert_eq!(reg.resolve("a").unwrap().node_id, node);
    }

    #[test]
    fn unregister_removes_node_and_alias() {
        let mut reg = registry();
        let node = NodeId::from("n1");
        reg.register(node.clone(), Some(Alias::new("a")), "h".to_string(), 1).unwrap();
        reg.unregister(&node).unwrap();
        assert!(reg.resolve("a").is_none());
        assert!(reg.resolve(node.as_str()).is_none());
    }

    #[test]
    fn unregister_unknown_node_is_not_found() {
        let mut reg = registry();
        let err = reg.unregister(&NodeId::from("ghost")).unwrap_err();
        assert_eq!(err, RegistryError::NotFound);
    }

    #[test]
    fn resolve_falls_back_to_node_id_when_not_an_alias() {
        let mut reg = registry();
        let node = NodeId::from("n1");
        reg.register(node.clone(), None, "h".to_string(), 1).unwrap();
        assert_eq!(reg.resolve(node.as_str()).unwrap().node_id, node);
    }

    #[test]
    fn list_snapshots_all_nodes() {
        let mut reg = registry();
        reg.register(NodeId::from("n1"), None, "h".to_string(), 1).unwrap();
        reg.register(NodeId::from("n2"), None, "h".to_string(), 2).unwrap();
        assert_eq!(reg.list().len(), 2);
    }

    #[test]
    fn changing_alias_on_rebind_frees_the_old_one() {
        let mut reg = registry();
        let node = NodeId::from("n1");
        reg.register(node.clone(), Some(Alias::new("a")), "h".to_string(), 1).unwrap();
        reg.register(node.clone(), Some(Alias::new("b")), "h".to_string(), 1).unwrap();
        assert!(reg.resolve("a").is_none());
        assert_eq!(reg.resolve("b").unwrap().node_id, node);
    }
}
