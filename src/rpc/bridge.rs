//! In-memory transport pair.
//!
//! ```text
//!   BridgeEnd A ── send ──▶ B's handlers     (same call stack)
//!   BridgeEnd B ── send ──▶ A's handlers
//! ```
//!
//! Delivery is synchronous: a send returns after every handler on the
//! other end has run. Messages sent while the other end has no handler
//! are lost, as on any best-effort channel.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::trace;

use super::message::Message;
use super::transport::{MessageHandler, Subscribers, Transport};
use crate::error::TransportError;
use crate::sync::Unsubscribe;

pub struct LocalBridge;

impl LocalBridge {
    /// Two transports joined back to back.
    pub fn pair() -> (BridgeEnd, BridgeEnd) {
        let left = Subscribers::new();
        let right = Subscribers::new();
        let connected = Arc::new(AtomicBool::new(true));
        (
            BridgeEnd {
                inbox: left.clone(),
                peer: right.clone(),
                connected: connected.clone(),
            },
            BridgeEnd {
                inbox: right,
                peer: left,
                connected,
            },
        )
    }
}

/// One side of a [`LocalBridge`].
pub struct BridgeEnd {
    inbox: Subscribers,
    peer: Subscribers,
    connected: Arc<AtomicBool>,
}

impl BridgeEnd {
    /// Cut the bridge for both ends. Later sends fail with
    /// [`TransportError::Closed`].
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Transport for BridgeEnd {
    fn send(&self, message: Message) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        let kind = message.kind();
        if self.peer.deliver(message) == 0 {
            trace!("bridge: {kind} had no receiver");
        }
        Ok(())
    }

    fn subscribe(&self, handler: MessageHandler) -> Unsubscribe {
        self.inbox.add(handler)
    }
}
