// SPDX-License-Identifier: MIT

//! Framed TCP transport (§4.1): one listener per node, pooled outbound
//! connections keyed by `host:port`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use meshnode_core::NodeId;
use meshnode_wire::{read_message, write_message, NodeMessage, ProtocolError};
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use thiserror::Error;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("dial error connecting to {host}:{port}: {source}")]
    Dial { host: String, port: u16, #[source] source: std::io::Error },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("transport is closed")]
    Closed,
}

/// `{from, to, timestamp}` delivered to the message handler alongside the
/// payload. Mirrors `meshnode_mailbox::MessageMetadata`'s shape without a
/// dependency on the mailbox crate — transport sits below it.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageMetadata {
    pub from: NodeId,
    pub to: NodeId,
    pub timestamp: u64,
}

type Handler = Arc<dyn Fn(Value, MessageMetadata) + Send + Sync>;

struct Inner {
    handler: SyncMutex<Option<Handler>>,
    connections: AsyncMutex<HashMap<String, Arc<AsyncMutex<OwnedWriteHalf>>>>,
    listener_task: SyncMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Length-prefixed JSON transport over TCP (§4.1). The node runtime
/// consumes only `listen`/`send`/`on_message`/`close` — substituting an
/// in-memory transport for deterministic tests means implementing the same
/// surface, not subclassing this type.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                handler: SyncMutex::new(None),
                connections: AsyncMutex::new(HashMap::new()),
                listener_task: SyncMutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register the handler invoked with `(payload, metadata)` for every
    /// complete inbound frame. Only one handler is kept; registering again
    /// replaces the previous one.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(Value, MessageMetadata) + Send + Sync + 'static,
    {
        *self.inner.handler.lock() = Some(Arc::new(handler));
    }

    /// Bind to an ephemeral port and start accepting connections. Returns
    /// the bound port.
    pub async fn listen(&self) -> Result<u16, TransportError> {
        let listener =
            TcpListener::bind(("0.0.0.0", 0)).await.map_err(TransportError::Bind)?;
        let port = listener.local_addr().map_err(TransportError::Bind)?.port();

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { accept_loop(listener, inner).await });
        *self.inner.listener_task.lock() = Some(task);
        Ok(port)
    }

    /// Serialize `payload` into a `NodeMessage` and write it to `host:port`,
    /// reusing a pooled connection or establishing one on first use (§4.1).
    pub async fn send(
        &self,
        host: &str,
        port: u16,
        from: NodeId,
        to: NodeId,
        payload: Value,
        timestamp: u64,
    ) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let key = format!("{host}:{port}");
        let conn = self.connection_for(&key, host, port).await?;
        let msg = NodeMessage::new(from, to, payload, timestamp);
        let bytes = meshnode_wire::encode(&msg)?;

        let mut guard = conn.lock().await;
        if let Err(err) = write_message(&mut *guard, &bytes).await {
            drop(guard);
            self.inner.connections.lock().await.remove(&key);
            return Err(err.into());
        }
        Ok(())
    }

    async fn connection_for(
        &self,
        key: &str,
        host: &str,
        port: u16,
    ) -> Result<Arc<AsyncMutex<OwnedWriteHalf>>, TransportError> {
        if let Some(conn) = self.inner.connections.lock().await.get(key) {
            return Ok(Arc::clone(conn));
        }

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| TransportError::Dial { host: host.to_string(), port, source })?;
        let (read_half, write_half) = stream.into_split();
        let write_half = Arc::new(AsyncMutex::new(write_half));

        self.inner.connections.lock().await.insert(key.to_string(), Arc::clone(&write_half));

        let inner = Arc::clone(&self.inner);
        let key_owned = key.to_string();
        tokio::spawn(async move {
            read_inbound(read_half, Arc::clone(&inner)).await;
            inner.connections.lock().await.remove(&key_owned);
        });

        Ok(write_half)
    }

    /// Close the listener and every pooled outbound connection.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.inner.listener_task.lock().take() {
            task.abort();
        }
        self.inner.connections.lock().await.clear();
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_loop(listener: TcpListener, inner: Arc<Inner>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(peer = %addr, "accepted inbound connection");
                let (read_half, _write_half) = stream.into_split();
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    read_inbound(read_half, inner).await;
                });
            }
            Err(err) => {
                warn!(error = %err, "accept error, listener stopping");
                return;
            }
        }
    }
}

/// Accumulate inbound frames and dispatch each complete `NodeMessage` to the
/// registered handler. Malformed frames are logged and the socket stays
/// open (§4.1); a read error or clean close just ends the loop, discarding
/// any partial buffer.
async fn read_inbound<R>(mut reader: R, inner: Arc<Inner>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let bytes = match read_message(&mut reader).await {
            Ok(bytes) => bytes,
            Err(ProtocolError::ConnectionClosed) => return,
            Err(err) => {
                warn!(error = %err, "transport read error, dropping connection");
                return;
            }
        };

        match meshnode_wire::decode::<NodeMessage>(&bytes) {
            Ok(msg) => {
                let handler = inner.handler.lock().clone();
                if let Some(handler) = handler {
                    let metadata =
                        MessageMetadata { from: msg.from, to: msg.to, timestamp: msg.timestamp };
                    handler(msg.payload, metadata);
                }
            }
            Err(err) => {
                warn!(error = %err, "malformed frame, keeping connection open");
            }
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
