// SPDX-License-Identifier: MIT

//! PMD control-protocol server (§4.3): binds the registry's pure state
//! machine to TCP connections, tracks per-socket liveness and watcher
//! subscriptions, and arms/cancels the auto-shutdown timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshnode_core::{Clock, NodeId};
use meshnode_wire::{
    read_message, write_message, ControlMessage, ControlResult, Envelope, PeerEventKind,
    ProtocolError,
};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::registry::Registry;

const KNOWN_TYPES: &[&str] = &["register", "unregister", "resolve", "list", "watch", "shutdown"];

struct ServerCtx {
    registry: Mutex<Registry>,
    watchers: Mutex<HashMap<u64, mpsc::UnboundedSender<Envelope>>>,
    next_watcher_id: AtomicU64,
    shutdown_notify: Notify,
    auto_shutdown_delay: Duration,
    auto_shutdown_epoch: AtomicU64,
}

impl ServerCtx {
    fn broadcast_event(&self, event: PeerEventKind, peer: meshnode_core::NodeInfo) {
        let envelope = Envelope::new(ControlMessage::Event { event, peer }, None);
        // A watcher too slow or gone to accept the event is dropped
        // silently rather than buffered or retried (§9 open question).
        self.watchers.lock().retain(|_, tx| tx.send(envelope.clone()).is_ok());
    }

    fn cancel_auto_shutdown(&self) {
        self.auto_shutdown_epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn arm_auto_shutdown(self: &Arc<Self>) {
        let epoch = self.auto_shutdown_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = Arc::clone(self);
        let delay = self.auto_shutdown_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_due = ctx.auto_shutdown_epoch.load(Ordering::SeqCst) == epoch;
            if still_due && ctx.registry.lock().is_empty() {
                info!(?delay, "registry idle, pmd shutting down");
                ctx.shutdown_notify.notify_waiters();
            }
        });
    }
}

/// The PMD control-protocol server.
pub struct Server {
    ctx: Arc<ServerCtx>,
}

impl Server {
    pub fn new(clock: Box<dyn Clock>, auto_shutdown_delay: Duration) -> Self {
        Self {
            ctx: Arc::new(ServerCtx {
                registry: Mutex::new(Registry::new(clock)),
                watchers: Mutex::new(HashMap::new()),
                next_watcher_id: AtomicU64::new(0),
                shutdown_notify: Notify::new(),
                auto_shutdown_delay,
                auto_shutdown_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Accept connections on `listener` until a `shutdown` request arrives
    /// or the auto-shutdown timer fires.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(peer = %addr, "pmd accepted connection");
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move { handle_connection(stream, ctx).await; });
                        }
                        Err(err) => {
                            warn!(error = %err, "pmd accept error, listener stopping");
                            return;
                        }
                    }
                }
                _ = self.ctx.shutdown_notify.notified() => {
                    info!("pmd shutting down");
                    return;
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, ctx: Arc<ServerCtx>) {
    let (mut reader, mut writer) = stream.into_split();
    let mut owned_node: Option<NodeId> = None;
    let watcher_id = ctx.next_watcher_id.fetch_add(1, Ordering::SeqCst);
    let mut watcher_rx: Option<mpsc::UnboundedReceiver<Envelope>> = None;

    loop {
        tokio::select! {
            read_result = read_message(&mut reader) => {
                match read_result {
                    Ok(bytes) => {
                        if let Some(response) =
                            handle_frame(&ctx, &mut owned_node, watcher_id, &mut watcher_rx, &bytes).await
                        {
                            if send(&mut writer, &response).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(ProtocolError::ConnectionClosed) => break,
                    Err(err) => {
                        warn!(error = %err, "pmd connection read error");
                        break;
                    }
                }
            }
            Some(event) = recv_watcher(&mut watcher_rx) => {
                if send(&mut writer, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    ctx.watchers.lock().remove(&watcher_id);
    if let Some(node_id) = owned_node {
        let outcome = {
            let mut registry = ctx.registry.lock();
            registry.unregister(&node_id).ok().map(|info| (info, registry.is_empty()))
        };
        if let Some((info, empty)) = outcome {
            ctx.broadcast_event(PeerEventKind::Leave, info);
            if empty {
                ctx.arm_auto_shutdown();
            }
        }
    }
}

async fn recv_watcher(rx: &mut Option<mpsc::UnboundedReceiver<Envelope>>) -> Option<Envelope> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send<W>(writer: &mut W, envelope: &Envelope) -> Result<(), ProtocolError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let bytes = meshnode_wire::encode(envelope)?;
    write_message(writer, &bytes).await
}

/// Parse one frame and dispatch it. Malformed JSON is logged and ignored
/// (no reply); an unrecognized `type` gets an explicit error reply (§4.3).
async fn handle_frame(
    ctx: &Arc<ServerCtx>,
    owned_node: &mut Option<NodeId>,
    watcher_id: u64,
    watcher_rx: &mut Option<mpsc::UnboundedReceiver<Envelope>>,
    bytes: &[u8],
) -> Option<Envelope> {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "malformed pmd frame, ignoring");
            return None;
        }
    };
    let request_id = value.get("requestId").and_then(|v| v.as_str()).map(str::to_string);
    let type_str = value.get("type").and_then(|v| v.as_str());

    if !type_str.map(|t| KNOWN_TYPES.contains(&t)).unwrap_or(false) {
        let error = ControlMessage::Response(ControlResult::Error {
            error: "Unknown message type".to_string(),
        });
        return Some(Envelope::new(error, request_id));
    }

    let envelope: Envelope = match serde_json::from_value(value) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "malformed pmd frame, ignoring");
            return None;
        }
    };

    let response = dispatch(ctx, owned_node, watcher_id, watcher_rx, envelope.message).await;
    Some(Envelope::new(response, envelope.request_id))
}

async fn dispatch(
    ctx: &Arc<ServerCtx>,
    owned_node: &mut Option<NodeId>,
    watcher_id: u64,
    watcher_rx: &mut Option<mpsc::UnboundedReceiver<Envelope>>,
    message: ControlMessage,
) -> ControlMessage {
    match message {
        ControlMessage::Register { node_id, alias, host, port } => {
            let mut registry = ctx.registry.lock();
            match registry.register(node_id.clone(), alias, host, port) {
                Ok(outcome) => {
                    *owned_node = Some(node_id.clone());
                    ctx.cancel_auto_shutdown();
                    if outcome.is_new {
                        let peer = registry.resolve(node_id.as_str());
                        drop(registry);
                        if let Some(peer) = peer {
                            ctx.broadcast_event(PeerEventKind::Join, peer);
                        }
                    }
                    ControlMessage::Response(ControlResult::Success { success: true })
                }
                Err(err) => {
                    ControlMessage::Response(ControlResult::Error { error: err.to_string() })
                }
            }
        }
        ControlMessage::Unregister { node_id } => {
            let mut registry = ctx.registry.lock();
            match registry.unregister(&node_id) {
                Ok(info) => {
                    *owned_node = None;
                    let empty = registry.is_empty();
                    drop(registry);
                    ctx.broadcast_event(PeerEventKind::Leave, info);
                    if empty {
                        ctx.arm_auto_shutdown();
                    }
                    ControlMessage::Response(ControlResult::Success { success: true })
                }
                Err(err) => {
                    ControlMessage::Response(ControlResult::Error { error: err.to_string() })
                }
            }
        }
        ControlMessage::Resolve { alias } => {
            let registry = ctx.registry.lock();
            match registry.resolve(&alias) {
                Some(node) => ControlMessage::Response(ControlResult::Node { node }),
                None => ControlMessage::Response(ControlResult::Error {
                    error: format!("'{alias}' not found"),
                }),
            }
        }
        ControlMessage::List => {
            let nodes = ctx.registry.lock().list();
            ControlMessage::Response(ControlResult::Nodes { nodes })
        }
        ControlMessage::Watch => {
            let (tx, rx) = mpsc::unbounded_channel();
            ctx.watchers.lock().insert(watcher_id, tx);
            *watcher_rx = Some(rx);
            ControlMessage::Response(ControlResult::Success { success: true })
        }
        ControlMessage::Shutdown => {
            ctx.shutdown_notify.notify_waiters();
            ControlMessage::Response(ControlResult::Success { success: true })
        }
        ControlMessage::Response(_) | ControlMessage::Event { .. } => {
            ControlMessage::Response(ControlResult::Error {
                error: "Unknown message type".to_string(),
            })
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
