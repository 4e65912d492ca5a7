// SPDX-License-Identifier: MIT

//! PMD client (§4.4): a persistent session with the daemon exposing
//! register/unregister/resolve/list/watch as request/response, plus an
//! event stream for `peer:join`/`peer:leave` and `disconnect`.

mod error;

pub use error::ClientError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshnode_core::{Alias, NodeId, NodeInfo};
use meshnode_wire::{
    read_message, write_message, ControlMessage, ControlResult, Envelope, PeerEventKind,
};
use parking_lot::Mutex;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default request/response timeout (§4.4).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

type EventHandler = Arc<dyn Fn(PeerEventKind, NodeInfo) + Send + Sync>;
type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    cancel: Mutex<Option<CancellationToken>>,
    pending: Mutex<HashMap<String, oneshot::Sender<ControlResult>>>,
    seq: AtomicU64,
    event_handlers: Mutex<Vec<EventHandler>>,
    disconnect_handlers: Mutex<Vec<DisconnectHandler>>,
    connected: AtomicBool,
}

/// A persistent connection to a PMD, request/response over `requestId`
/// correlation plus a pushed event stream.
#[derive(Clone)]
pub struct PmdClient {
    inner: Arc<Inner>,
}

impl PmdClient {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                writer: AsyncMutex::new(None),
                cancel: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(0),
                event_handlers: Mutex::new(Vec::new()),
                disconnect_handlers: Mutex::new(Vec::new()),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Open one TCP connection to `host:port` and set TCP keepalive.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), ClientError> {
        let stream = TcpStream::connect((host, port)).await.map_err(meshnode_wire::ProtocolError::from)?;
        let sock_ref = socket2::SockRef::from(&stream);
        if let Err(err) = sock_ref.set_keepalive(true) {
            warn!(error = %err, "failed to set tcp keepalive");
        }

        let (read_half, write_half) = stream.into_split();
        let cancel = CancellationToken::new();
        *self.inner.writer.lock().await = Some(write_half);
        *self.inner.cancel.lock() = Some(cancel.clone());
        self.inner.connected.store(true, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { read_loop(read_half, inner, cancel).await });
        Ok(())
    }

    /// Close the connection gracefully. No reconnect is attempted; the
    /// caller owns reconnection policy.
    pub async fn disconnect(&self) {
        if let Some(cancel) = self.inner.cancel.lock().take() {
            cancel.cancel();
        }
    }

    pub async fn register(
        &self,
        node_id: NodeId,
        alias: Option<Alias>,
        host: String,
        port: u16,
    ) -> Result<(), ClientError> {
        let message = ControlMessage::Register { node_id, alias, host, port };
        expect_success(self.request(message).await?)
    }

    pub async fn unregister(&self, node_id: NodeId) -> Result<(), ClientError> {
        let message = ControlMessage::Unregister { node_id };
        expect_success(self.request(message).await?)
    }

    pub async fn resolve(&self, token: &str) -> Result<NodeInfo, ClientError> {
        let message = ControlMessage::Resolve { alias: token.to_string() };
        match self.request(message).await? {
            ControlResult::Node { node } => Ok(node),
            ControlResult::Error { error } => Err(ClientError::Remote(error)),
            other => Err(ClientError::Remote(format!("unexpected response: {other:?}"))),
        }
    }

    pub async fn list(&self) -> Result<Vec<NodeInfo>, ClientError> {
        match self.request(ControlMessage::List).await? {
            ControlResult::Nodes { nodes } => Ok(nodes),
            ControlResult::Error { error } => Err(ClientError::Remote(error)),
            other => Err(ClientError::Remote(format!("unexpected response: {other:?}"))),
        }
    }

    /// One-shot subscription: after success, every pushed `event` message
    /// dispatches to handlers registered via [`PmdClient::on_event`].
    pub async fn watch(&self) -> Result<(), ClientError> {
        expect_success(self.request(ControlMessage::Watch).await?)
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        expect_success(self.request(ControlMessage::Shutdown).await?)
    }

    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(PeerEventKind, NodeInfo) + Send + Sync + 'static,
    {
        self.inner.event_handlers.lock().push(Arc::new(handler));
    }

    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.disconnect_handlers.lock().push(Arc::new(handler));
    }

    async fn request(&self, message: ControlMessage) -> Result<ControlResult, ClientError> {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }

        let request_id = format!("req_{}", self.inner.seq.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(request_id.clone(), tx);

        let envelope = Envelope::new(message, Some(request_id.clone()));
        let bytes = meshnode_wire::encode(&envelope)?;

        {
            let mut writer_guard = self.inner.writer.lock().await;
            let Some(writer) = writer_guard.as_mut() else {
                self.inner.pending.lock().remove(&request_id);
                return Err(ClientError::NotConnected);
            };
            if let Err(err) = write_message(writer, &bytes).await {
                drop(writer_guard);
                self.inner.pending.lock().remove(&request_id);
                return Err(err.into());
            }
        }

        match tokio::time::timeout(DEFAULT_TIMEOUT, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(ClientError::NotConnected),
            Err(_) => {
                self.inner.pending.lock().remove(&request_id);
                Err(ClientError::Timeout)
            }
        }
    }
}

impl Default for PmdClient {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_success(result: ControlResult) -> Result<(), ClientError> {
    match result {
        ControlResult::Success { success: true } => Ok(()),
        ControlResult::Error { error } => Err(ClientError::Remote(error)),
        other => Err(ClientError::Remote(format!("unexpected response: {other:?}"))),
    }
}

async fn read_loop(mut reader: OwnedReadHalf, inner: Arc<Inner>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = read_message(&mut reader) => {
                match result {
                    Ok(bytes) => handle_frame(&inner, &bytes),
                    Err(_) => break,
                }
            }
        }
    }
    finish_disconnect(&inner).await;
}

fn handle_frame(inner: &Arc<Inner>, bytes: &[u8]) {
    let envelope: Envelope = match meshnode_wire::decode(bytes) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "malformed pmd-client frame, ignoring");
            return;
        }
    };

    match envelope.message {
        ControlMessage::Response(result) => {
            if let Some(request_id) = envelope.request_id {
                if let Some(tx) = inner.pending.lock().remove(&request_id) {
                    let _ = tx.send(result);
                }
            }
        }
        ControlMessage::Event { event, peer } => {
            let handlers = inner.event_handlers.lock().clone();
            for handler in handlers {
                handler(event, peer.clone());
            }
        }
        other => {
            warn!(?other, "unexpected message on pmd-client connection, ignoring");
        }
    }
}

/// Mark the connection dead: fail pending requests with "Not connected" and
/// fire `disconnect` handlers (§4.4).
async fn finish_disconnect(inner: &Arc<Inner>) {
    inner.connected.store(false, Ordering::SeqCst);
    *inner.writer.lock().await = None;
    inner.pending.lock().clear();

    let handlers = inner.disconnect_handlers.lock().clone();
    for handler in handlers {
        handler();
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
