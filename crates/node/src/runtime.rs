// SPDX-License-Identifier: MIT

//! The node runtime (§4.5): singleton process wiring transport, PMD client,
//! and mailbox together, with `send`/`discover`/`on_message`/`shutdown`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use meshnode_core::{Alias, Clock, ErrorKind, MeshError, NodeId, NodeInfo, SystemClock};
use meshnode_mailbox::{Mailbox, MailboxEntry, MessageMetadata};
use meshnode_pmd_client::PmdClient;
use meshnode_transport::Transport;
use meshnode_wire::PeerEventKind;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::config::NodeConfig;
use crate::lock::ProcessLock;
use crate::spawn;

const PMD_CONNECT_ATTEMPTS: u32 = 5;
const PMD_CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

type PeerEventHandler = Arc<dyn Fn(PeerEventKind, NodeInfo) + Send + Sync>;

/// Process-wide table of live singleton instances, keyed by the same
/// identity string as `ProcessLock` (§4.5 "a second `start()` in the same
/// process returns the existing instance").
fn instances() -> &'static Mutex<HashMap<String, Arc<Node>>> {
    static INSTANCES: OnceLock<Mutex<HashMap<String, Arc<Node>>>> = OnceLock::new();
    INSTANCES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// One node runtime per process (§4.5).
pub struct Node {
    node_id: NodeId,
    config: NodeConfig,
    transport: Transport,
    pmd_client: PmdClient,
    mailbox: Mailbox,
    clock: Arc<dyn Clock>,
    lock: Mutex<Option<ProcessLock>>,
    port: u16,
    peer_event_handlers: Mutex<Vec<PeerEventHandler>>,
    shutdown_started: AtomicBool,
    identity: String,
}

impl Node {
    /// Run the full startup sequence (§4.5 steps 1-8): singleton lock,
    /// NodeID generation, PMD probe/auto-spawn, transport listen, PMD
    /// connect/register/watch, and wiring transport into the mailbox.
    pub async fn start(config: NodeConfig) -> Result<Arc<Self>, MeshError> {
        let identity = config
            .alias
            .as_ref()
            .map(|alias| alias.as_str().to_string())
            .unwrap_or_else(|| "default".to_string());
        let lock_key = format!("{identity}-{}", config.pmd_port);

        if let Some(existing) = instances().lock().get(&lock_key) {
            return Ok(Arc::clone(existing));
        }

        let lock = ProcessLock::acquire(&lock_key)?;

        let node_id = NodeId::generate();

        spawn::probe_or_spawn(&config.pmd_host, config.pmd_port).await?;

        let transport = Transport::new();
        let port = transport
            .listen()
            .await
            .map_err(|err| MeshError::new(ErrorKind::ConnectionError, err.to_string()))?;

        let pmd_client = PmdClient::new();
        connect_with_retry(&pmd_client, &config.pmd_host, config.pmd_port).await?;

        pmd_client
            .register(node_id.clone(), config.alias.clone(), "localhost".to_string(), port)
            .await
            .map_err(|err| MeshError::new(ErrorKind::PmdUnavailable, err.to_string()))?;

        pmd_client
            .watch()
            .await
            .map_err(|err| MeshError::new(ErrorKind::PmdUnavailable, err.to_string()))?;

        let mailbox = Mailbox::new(config.mailbox_max_size);

        let node = Arc::new(Self {
            node_id,
            config,
            transport,
            pmd_client,
            mailbox,
            clock: Arc::new(SystemClock),
            lock: Mutex::new(Some(lock)),
            port,
            peer_event_handlers: Mutex::new(Vec::new()),
            shutdown_started: AtomicBool::new(false),
            identity: lock_key.clone(),
        });

        instances().lock().insert(lock_key, Arc::clone(&node));

        let events_node = Arc::clone(&node);
        node.pmd_client.on_event(move |kind, peer| {
            let handlers = events_node.peer_event_handlers.lock().clone();
            for handler in handlers {
                handler(kind, peer.clone());
            }
        });

        let mailbox = node.mailbox.clone();
        node.transport.on_message(move |payload, metadata| {
            mailbox.push(MailboxEntry {
                payload,
                metadata: MessageMetadata {
                    from: metadata.from,
                    to: metadata.to,
                    timestamp: metadata.timestamp,
                },
            });
        });

        Ok(node)
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn alias(&self) -> Option<&Alias> {
        self.config.alias.as_ref()
    }

    /// Resolve `target` (alias or NodeID) via the PMD, then send `payload`
    /// over the transport.
    pub async fn send(&self, target: &str, payload: Value) -> Result<(), MeshError> {
        let info = self
            .pmd_client
            .resolve(target)
            .await
            .map_err(|err| MeshError::new(ErrorKind::NotFound, format!("Failed to resolve target: {target}: {err}")))?;

        self.transport
            .send(&info.host, info.port, self.node_id.clone(), info.node_id, payload, self.clock.now_ms())
            .await
            .map_err(|err| MeshError::new(ErrorKind::ConnectionError, err.to_string()))
    }

    /// `pmdClient.list()` filtered to exclude self.
    pub async fn discover(&self) -> Result<Vec<NodeInfo>, MeshError> {
        let nodes = self
            .pmd_client
            .list()
            .await
            .map_err(|err| MeshError::new(ErrorKind::PmdUnavailable, err.to_string()))?;
        Ok(nodes.into_iter().filter(|node| node.node_id != self.node_id).collect())
    }

    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Value, &MessageMetadata) + Send + Sync + 'static,
    {
        self.mailbox.on_message(handler);
    }

    pub fn on_peer_event<F>(&self, handler: F)
    where
        F: Fn(PeerEventKind, NodeInfo) + Send + Sync + 'static,
    {
        self.peer_event_handlers.lock().push(Arc::new(handler));
    }

    /// Idempotent: unregister (tolerating "Node not found" / a disconnected
    /// PMD as non-fatal), disconnect the client, close the transport, and
    /// release the singleton lock.
    pub async fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(err) = self.pmd_client.unregister(self.node_id.clone()).await {
            debug!(error = %err, "unregister during shutdown failed, tolerated");
        }
        self.pmd_client.disconnect().await;
        self.transport.close().await;
        self.lock.lock().take();
        instances().lock().remove(&self.identity);
    }
}

async fn connect_with_retry(client: &PmdClient, host: &str, port: u16) -> Result<(), MeshError> {
    let mut last_error = None;
    for attempt in 0..PMD_CONNECT_ATTEMPTS {
        match client.connect(host, port).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_error = Some(err);
                if attempt + 1 < PMD_CONNECT_ATTEMPTS {
                    tokio::time::sleep(PMD_CONNECT_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(MeshError::new(
        ErrorKind::PmdUnavailable,
        format!(
            "failed to connect to pmd at {host}:{port} after {PMD_CONNECT_ATTEMPTS} attempts: {}",
            last_error.expect("loop runs at least once")
        ),
    ))
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
