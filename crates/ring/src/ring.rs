// SPDX-License-Identifier: MIT

//! `RingNode` (§4.7): the I/O orchestrator tying the membership CRDT, the
//! underlying node transport, the DHT store, and the Chord-style
//! stabilize/notify and token-passing loops together. The pure-logic pieces
//! (hash ring geometry, stability machine, request correlation) live in
//! sibling modules with no I/O of their own; this file is the one place that
//! actually sends and receives messages.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use meshnode_core::{NodeId, SystemClock, VectorClock};
use meshnode_crdt::{Crdt, CrdtOptions};
use meshnode_node::Node;
use meshnode_wire::{PeerEventKind, RingPayload};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::RingError;
use crate::hash::{self, RingMember, RingNeighbors};
use crate::membership;
use crate::options::RingOptions;
use crate::requests::{self, PendingRequests};
use crate::stability::{Stability, StabilityTracker};

const TOKEN_HOP_DELAY: Duration = Duration::from_millis(50);

/// A ring peer, discoverable by every other ring peer through the PMD and
/// addressable over the node transport (§4.7).
pub struct RingNode {
    node: Arc<Node>,
    crdt: Crdt,
    options: RingOptions,
    stability: StabilityTracker,
    dht_store: Mutex<HashMap<String, Value>>,
    dht_pending: PendingRequests<Option<Value>>,
    stabilize_pending: PendingRequests<Option<NodeId>>,
    request_seq: AtomicU64,
    successor: Mutex<Option<NodeId>>,
    predecessor: Mutex<Option<NodeId>>,
    shutdown: CancellationToken,
}

impl RingNode {
    /// Bring up a ring peer on top of an already-started [`Node`]: insert
    /// self into the membership CRDT, wire message/peer-event dispatch, and
    /// spawn the anti-entropy, stability-check, and stabilize background
    /// loops.
    ///
    /// Peer discovery only considers nodes registered with a `ring-`
    /// prefixed alias (§4.7); the caller is responsible for starting `node`
    /// with such an alias if it should be discoverable by other ring peers.
    pub async fn start(node: Arc<Node>, options: RingOptions) -> Arc<Self> {
        let crdt = Crdt::new(node.node_id().clone(), Box::new(SystemClock), CrdtOptions::default());
        let now = SystemClock.now_ms();
        membership::insert_member(&crdt, node.node_id(), node.alias(), now);

        let ring = Arc::new(Self {
            node: Arc::clone(&node),
            crdt,
            options,
            stability: StabilityTracker::new(now),
            dht_store: Mutex::new(HashMap::new()),
            dht_pending: PendingRequests::new(),
            stabilize_pending: PendingRequests::new(),
            request_seq: AtomicU64::new(0),
            successor: Mutex::new(None),
            predecessor: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });

        let dispatch_ring = Arc::clone(&ring);
        node.on_message(move |payload, metadata| {
            if let Ok(ring_payload) = serde_json::from_value::<RingPayload>(payload.clone()) {
                let ring = Arc::clone(&dispatch_ring);
                let from = metadata.from.clone();
                tokio::spawn(async move { ring.dispatch(ring_payload, from).await });
            } else {
                tracing::debug!("ignoring non-ring message on ring node");
            }
        });

        let leave_ring = Arc::clone(&ring);
        node.on_peer_event(move |kind, peer| {
            if matches!(kind, PeerEventKind::Leave) {
                membership::remove_member(&leave_ring.crdt, &peer.node_id);
            }
        });

        ring.re_evaluate_topology();
        ring.spawn_background_tasks();
        ring
    }

    pub fn node_id(&self) -> &NodeId {
        self.node.node_id()
    }

    pub fn stability(&self) -> Stability {
        self.stability.status()
    }

    pub async fn wait_for_stable(&self, timeout: Duration) -> Result<(), RingError> {
        self.stability.wait_for_stable(timeout).await
    }

    /// `getRingNeighbors()` (§4.7), computed fresh from the current
    /// membership document.
    pub fn ring_neighbors(&self) -> RingNeighbors {
        hash::ring_neighbors(&self.members(), self.node.node_id(), self.options.replication_factor)
    }

    /// `findResponsibleNode(key)` (§4.7).
    pub fn find_responsible_node(&self, key: &str) -> Option<NodeId> {
        hash::find_responsible_node(&self.members(), hash::hash_token(key))
    }

    fn members(&self) -> Vec<RingMember> {
        membership::members_from_doc(&self.crdt.value())
    }

    /// `put(key, value)` (§4.7): store locally if this node is responsible,
    /// otherwise forward to the responsible node. With no members yet this
    /// node treats itself as responsible for everything.
    pub async fn put(&self, key: String, value: Value) -> Result<(), RingError> {
        let responsible = self.find_responsible_node(&key).unwrap_or_else(|| self.node.node_id().clone());
        if responsible == *self.node.node_id() {
            self.dht_store.lock().insert(key, value);
            return Ok(());
        }

        let payload = serde_json::to_value(RingPayload::DhtPut { key, value }).unwrap_or_default();
        self.node.send(responsible.as_str(), payload).await?;
        Ok(())
    }

    /// `get(key)` (§4.7): read locally if responsible, otherwise round-trip
    /// a `DHT_GET`/`DHT_GET_RESPONSE` exchange, timing out after
    /// [`RingOptions::request_timeout`].
    pub async fn get(&self, key: &str) -> Result<Option<Value>, RingError> {
        let responsible = self.find_responsible_node(key).unwrap_or_else(|| self.node.node_id().clone());
        if responsible == *self.node.node_id() {
            return Ok(self.dht_store.lock().get(key).cloned());
        }

        let request_id = self.next_request_id();
        let rx = self.dht_pending.register(request_id.clone());
        let payload = serde_json::to_value(RingPayload::DhtGet {
            key: key.to_string(),
            request_id: request_id.clone(),
            from: self.node.node_id().clone(),
        })
        .unwrap_or_default();
        self.node.send(responsible.as_str(), payload).await?;

        match tokio::time::timeout(self.options.request_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(RingError::Stopped),
            Err(_) => {
                self.dht_pending.remove(&request_id);
                Err(RingError::Timeout)
            }
        }
    }

    fn next_request_id(&self) -> String {
        let prefix = self.node.alias().map(|alias| alias.as_str()).unwrap_or_else(|| self.node.node_id().as_str());
        requests::next_request_id(prefix, &self.request_seq, SystemClock.now_ms())
    }

    /// Initiate a round of illustrative token-passing (§4.7), sending to the
    /// current Chord successor if one has been established.
    pub async fn initiate_token_round(&self) {
        let Some(successor) = self.successor.lock().clone() else { return };
        let round = self.next_token_round();
        let payload = serde_json::to_value(RingPayload::Token { round, hop: 1, initiator: self.node.node_id().clone() })
            .unwrap_or_default();
        let _ = self.node.send(successor.as_str(), payload).await;
    }

    fn next_token_round(&self) -> u64 {
        self.crdt
            .value()
            .get("token")
            .and_then(|token| token.get("round"))
            .and_then(Value::as_u64)
            .map(|round| round + 1)
            .unwrap_or(1)
    }

    /// Reject every outstanding request, stop the background loops, and
    /// remove this node from the membership document.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.dht_pending.clear();
        self.stabilize_pending.clear();
        membership::remove_member(&self.crdt, self.node.node_id());
    }

    // -- message dispatch -------------------------------------------------

    async fn dispatch(self: Arc<Self>, payload: RingPayload, from: NodeId) {
        match payload {
            RingPayload::CrdtSyncRequest { clock, node_id, .. } => self.handle_sync_request(clock, node_id).await,
            RingPayload::CrdtSyncResponse { ops, .. } => self.handle_sync_response(ops),
            RingPayload::CrdtOp { op } => self.handle_remote_op(op),
            RingPayload::Token { round, hop, initiator } => self.handle_token(round, hop, initiator).await,
            RingPayload::DhtPut { key, value } => self.handle_dht_put(key, value, from).await,
            RingPayload::DhtPutAck { key } => tracing::debug!(key, "dht put ack received"),
            RingPayload::DhtGet { key, request_id, from: reply_to } => self.handle_dht_get(key, request_id, reply_to).await,
            RingPayload::DhtGetResponse { request_id, value } => {
                self.dht_pending.resolve(&request_id, value);
            }
            RingPayload::StabilizeRequest { request_id } => self.handle_stabilize_request(&from, request_id).await,
            RingPayload::StabilizeResponse { request_id, predecessor } => {
                self.stabilize_pending.resolve(&request_id, predecessor);
            }
            RingPayload::Notify { node_id, .. } => self.handle_notify(node_id),
            RingPayload::Ping { request_id } => self.handle_ping(request_id, from).await,
            RingPayload::Pong { request_id } => tracing::debug!(request_id, "pong received"),
        }
    }

    async fn handle_sync_request(&self, clock: Value, sender: NodeId) {
        let remote_vc: VectorClock = serde_json::from_value(clock).unwrap_or_default();
        let ops: Vec<String> = self.crdt.diff_since(&remote_vc).iter().map(Crdt::encode_op).collect();
        let local_clock = serde_json::to_value(self.crdt.clock()).unwrap_or_default();
        let response =
            serde_json::to_value(RingPayload::CrdtSyncResponse { ops, clock: local_clock }).unwrap_or_default();
        let _ = self.node.send(sender.as_str(), response).await;

        let already_known = self.members().iter().any(|m| m.node_id == sender);
        if !already_known {
            if let Ok(peers) = self.node.discover().await {
                if let Some(peer) = peers.into_iter().find(|p| p.node_id == sender) {
                    membership::insert_member(&self.crdt, &peer.node_id, peer.alias.as_ref(), SystemClock.now_ms());
                }
            }
        }
        self.re_evaluate_topology();
    }

    fn handle_sync_response(&self, ops: Vec<String>) {
        for encoded in ops {
            match Crdt::decode_op(&encoded) {
                Ok(op) => {
                    self.crdt.receive(op);
                }
                Err(err) => tracing::warn!(error = %err, "failed to decode crdt sync op"),
            }
        }
        self.re_evaluate_topology();
    }

    fn handle_remote_op(&self, encoded: String) {
        match Crdt::decode_op(&encoded) {
            Ok(op) => {
                self.crdt.receive(op);
                self.re_evaluate_topology();
            }
            Err(err) => tracing::warn!(error = %err, "failed to decode crdt op"),
        }
    }

    async fn handle_token(self: Arc<Self>, round: u64, hop: u32, initiator: NodeId) {
        tokio::time::sleep(TOKEN_HOP_DELAY).await;
        let ring_size = self.members().len().max(1) as u32;
        let new_hop = hop + 1;

        if new_hop >= ring_size {
            let record = serde_json::json!({"round": round, "lastHolder": self.node.node_id().as_str()});
            if let Err(err) = self.crdt.set(&[Value::String("token".to_string())], record) {
                tracing::warn!(error = %err, "failed to record token round completion");
            }
            let ring = Arc::clone(&self);
            let delay = ring.options.stabilize_interval;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                ring.initiate_token_round().await;
            });
        } else if let Some(successor) = self.successor.lock().clone() {
            let payload = serde_json::to_value(RingPayload::Token { round, hop: new_hop, initiator }).unwrap_or_default();
            let _ = self.node.send(successor.as_str(), payload).await;
        }
    }

    async fn handle_dht_put(&self, key: String, value: Value, from: NodeId) {
        self.dht_store.lock().insert(key.clone(), value);
        let ack = serde_json::to_value(RingPayload::DhtPutAck { key }).unwrap_or_default();
        let _ = self.node.send(from.as_str(), ack).await;
    }

    async fn handle_dht_get(&self, key: String, request_id: String, reply_to: NodeId) {
        let value = self.dht_store.lock().get(&key).cloned();
        let response = serde_json::to_value(RingPayload::DhtGetResponse { request_id, value }).unwrap_or_default();
        let _ = self.node.send(reply_to.as_str(), response).await;
    }

    async fn handle_stabilize_request(&self, from: &NodeId, request_id: String) {
        let predecessor = self.predecessor.lock().clone();
        let response = serde_json::to_value(RingPayload::StabilizeResponse { request_id, predecessor }).unwrap_or_default();
        let _ = self.node.send(from.as_str(), response).await;
    }

    fn handle_notify(&self, sender: NodeId) {
        let mut predecessor = self.predecessor.lock();
        let accept = match predecessor.as_ref() {
            None => true,
            Some(current) => {
                let current_token = hash::hash_token(current.as_str());
                let self_token = hash::hash_token(self.node.node_id().as_str());
                let sender_token = hash::hash_token(sender.as_str());
                hash::strictly_between(sender_token, current_token, self_token)
            }
        };
        if accept {
            *predecessor = Some(sender);
        }
    }

    async fn handle_ping(&self, request_id: String, from: NodeId) {
        let pong = serde_json::to_value(RingPayload::Pong { request_id }).unwrap_or_default();
        let _ = self.node.send(from.as_str(), pong).await;
    }

    // -- background loops --------------------------------------------------

    fn spawn_background_tasks(self: &Arc<Self>) {
        self.spawn_loop(self.options.anti_entropy_interval, |ring| ring.run_anti_entropy());
        self.spawn_loop(self.options.stability_check_interval, |ring| ring.run_stability_check());
        self.spawn_loop(self.options.stabilize_interval, |ring| ring.stabilize());
    }

    fn spawn_loop<F, Fut>(self: &Arc<Self>, interval: Duration, tick: F)
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let ring = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => tick(Arc::clone(&ring)).await,
                }
            }
        });
    }

    /// Anti-entropy (§4.7): periodically push a `CRDT_SYNC_REQUEST` to every
    /// discoverable `ring-` peer.
    async fn run_anti_entropy(self: Arc<Self>) {
        let Ok(peers) = self.node.discover().await else { return };
        let ring_peers = peers.into_iter().filter(|p| p.alias.as_ref().is_some_and(|a| a.as_str().starts_with("ring-")));
        let clock = serde_json::to_value(self.crdt.clock()).unwrap_or_default();

        for peer in ring_peers {
            let request = serde_json::to_value(RingPayload::CrdtSyncRequest {
                clock: clock.clone(),
                from: self.node.node_id().clone(),
                node_id: self.node.node_id().clone(),
            })
            .unwrap_or_default();
            let _ = self.node.send(peer.node_id.as_str(), request).await;
        }
    }

    async fn run_stability_check(self: Arc<Self>) {
        let member_count = self.members().len();
        let now = SystemClock.now_ms();
        if self.stability.check(member_count, self.options.replication_factor, self.options.required_stable_time_ms, now) {
            tracing::info!("ring became stable");
        }
    }

    /// Chord-style stabilize/notify (§4.7).
    async fn stabilize(self: Arc<Self>) {
        let Some(successor) = self.successor.lock().clone() else { return };

        let request_id = self.next_request_id();
        let rx = self.stabilize_pending.register(request_id.clone());
        let request = serde_json::to_value(RingPayload::StabilizeRequest { request_id: request_id.clone() }).unwrap_or_default();
        if self.node.send(successor.as_str(), request).await.is_err() {
            self.stabilize_pending.remove(&request_id);
            return;
        }

        let predecessor_of_successor = match tokio::time::timeout(self.options.request_timeout, rx).await {
            Ok(Ok(value)) => value,
            _ => {
                self.stabilize_pending.remove(&request_id);
                None
            }
        };

        if let Some(candidate) = predecessor_of_successor {
            if candidate != *self.node.node_id() {
                let self_token = hash::hash_token(self.node.node_id().as_str());
                let successor_token = hash::hash_token(successor.as_str());
                let candidate_token = hash::hash_token(candidate.as_str());
                if hash::strictly_between(candidate_token, self_token, successor_token) {
                    *self.successor.lock() = Some(candidate);
                }
            }
        }

        let new_successor = self.successor.lock().clone().unwrap_or(successor);
        let hash_hex = format!("{:016x}", hash::hash_token(self.node.node_id().as_str()));
        let notify = serde_json::to_value(RingPayload::Notify { node_id: self.node.node_id().clone(), hash: hash_hex }).unwrap_or_default();
        let _ = self.node.send(new_successor.as_str(), notify).await;
    }

    /// Refresh the stability tracker and, if not yet overridden by a Chord
    /// stabilize/notify exchange, seed successor/predecessor from the
    /// consistent-hash neighbors.
    fn re_evaluate_topology(&self) {
        let members = self.members();
        let now = SystemClock.now_ms();
        self.stability.observe_member_count(members.len(), now);

        let neighbors = hash::ring_neighbors(&members, self.node.node_id(), self.options.replication_factor);
        if let Some(successor) = neighbors.successor {
            let mut current = self.successor.lock();
            if current.is_none() {
                *current = Some(successor);
            }
        }
        if let Some(predecessor) = neighbors.predecessor {
            let mut current = self.predecessor.lock();
            if current.is_none() {
                *current = Some(predecessor);
            }
        }
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
