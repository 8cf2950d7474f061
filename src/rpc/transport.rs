//! Transport abstraction over any bidirectional message channel.
//!
//! Implementations in this crate:
//! - [`LocalBridge`](super::bridge::LocalBridge): in-memory pair, same process
//! - [`FramedTransport`](super::framed::FramedTransport): length-prefixed
//!   JSON frames over any byte sink
//!
//! The session is generic over `Transport`, so adding a new transport
//! requires zero changes to the protocol logic. Delivery is best effort
//! and in order; the core adds no reliability on top.

use std::sync::Arc;

use super::message::Message;
use crate::error::TransportError;
use crate::sync::{Shared, Unsubscribe};

/// Receives every inbound message, already validated.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Bidirectional message channel.
pub trait Transport: Send + Sync {
    /// Hand `message` to the channel. Fire-and-forget: `Ok` does not mean
    /// the peer received it.
    fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Register `handler` for inbound messages until the returned handle
    /// is called.
    fn subscribe(&self, handler: MessageHandler) -> Unsubscribe;
}

/// A null transport that discards all sends and never delivers.
/// Useful as a placeholder when no peer is attached.
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _message: Message) -> Result<(), TransportError> {
        Ok(())
    }

    fn subscribe(&self, _handler: MessageHandler) -> Unsubscribe {
        Unsubscribe::noop()
    }
}

// ── Handler registry for adapters ────────────────────────────

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, MessageHandler)>,
}

/// Inbound handler list shared by transport implementations.
///
/// Delivery snapshots the list first, so handlers may subscribe or
/// unsubscribe while a message is being delivered.
#[derive(Clone, Default)]
pub struct Subscribers {
    registry: Arc<Shared<Registry>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: MessageHandler) -> Unsubscribe {
        let id = self.registry.with(|r| {
            let id = r.next_id;
            r.next_id += 1;
            r.handlers.push((id, handler));
            id
        });
        let registry = Arc::clone(&self.registry);
        Unsubscribe::new(move || {
            registry.with(|r| r.handlers.retain(|(hid, _)| *hid != id));
        })
    }

    /// Hand `message` to every current handler. Returns how many saw it.
    pub fn deliver(&self, message: Message) -> usize {
        let handlers: Vec<MessageHandler> = self
            .registry
            .with(|r| r.handlers.iter().map(|(_, h)| h.clone()).collect());
        if let Some((last, rest)) = handlers.split_last() {
            for handler in rest {
                handler(message.clone());
            }
            last(message);
        }
        handlers.len()
    }

    pub fn len(&self) -> usize {
        self.registry.with(|r| r.handlers.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
