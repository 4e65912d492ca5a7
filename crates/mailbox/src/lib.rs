// SPDX-License-Identifier: MIT

//! Bounded FIFO mailbox (§4.2) sitting between the transport and
//! application handlers.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use meshnode_core::NodeId;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

/// `{from, to, timestamp}` delivered alongside the payload (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct MessageMetadata {
    pub from: NodeId,
    pub to: NodeId,
    pub timestamp: u64,
}

/// One queued entry: an opaque payload plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MailboxEntry {
    pub payload: Value,
    pub metadata: MessageMetadata,
}

type Handler = Arc<dyn Fn(&Value, &MessageMetadata) + Send + Sync>;

/// Overflow policy. The spec defines exactly one (§4.2): drop the newest
/// (incoming) entry when full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    DropNewest,
}

impl Default for Overflow {
    fn default() -> Self {
        Overflow::DropNewest
    }
}

pub const DEFAULT_MAX_SIZE: usize = 1000;

struct Inner {
    queue: VecDeque<MailboxEntry>,
    handlers: Vec<Handler>,
    max_size: usize,
}

/// Bounded FIFO: `push` appends-then-drains; drained entries fan out to
/// every registered handler in registration order, in registration order,
/// with one handler's panic never affecting its siblings.
#[derive(Clone)]
pub struct Mailbox {
    inner: Arc<Mutex<Inner>>,
}

impl Mailbox {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                handlers: Vec::new(),
                max_size,
            })),
        }
    }

    /// Register a handler invoked for every drained entry. Handlers are
    /// called in registration order; a panic inside one is caught and
    /// logged, and does not prevent the remaining handlers from running.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Value, &MessageMetadata) + Send + Sync + 'static,
    {
        self.inner.lock().handlers.push(Arc::new(handler));
    }

    /// Push one entry. Returns `true` iff accepted (queue had room), `false`
    /// if dropped (drop-newest overflow policy). Accepted entries are
    /// drained to handlers before this call returns.
    pub fn push(&self, entry: MailboxEntry) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.queue.len() >= inner.max_size {
                return false;
            }
            inner.queue.push_back(entry);
        }
        self.drain();
        true
    }

    /// Deliver every queued entry to every handler, in FIFO/registration
    /// order, then empty the queue.
    fn drain(&self) {
        loop {
            let (entry, handlers) = {
                let mut inner = self.inner.lock();
                let Some(entry) = inner.queue.pop_front() else { return };
                // Clone the Arc pointers (not the closures) so dispatch
                // happens without holding the lock — a handler that calls
                // back into the mailbox (e.g. to push a reply) won't
                // deadlock.
                (entry, inner.handlers.clone())
            };
            for handler in &handlers {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    handler(&entry.payload, &entry.metadata);
                }));
                if result.is_err() {
                    warn!("mailbox handler panicked; continuing with remaining handlers");
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

#[cfg(test)]
#[path = "mailbox_tests.rs"]
mod tests;
