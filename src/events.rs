//! Local multicast registries and the event broadcaster.
//!
//! Inbound events are fanned out to every handler registered for the
//! event's exact name at the moment of dispatch. Outbound events go straight
//! into the session outbox; there is no correlation, acknowledgement or
//! backpressure.
//!
//! ```text
//! ┌────────────┐  Event{name,data}  ┌──────────────┐     ┌───────────┐
//! │ Transport  │───────────────────▶│  Listeners   │────▶│ handler 1 │
//! │  (peer)    │                    │  [name] ──▶ N│────▶│ handler N │
//! └────────────┘                    └──────────────┘     └───────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::rpc::Outbox;
use crate::rpc::message::Message;
use crate::sync::{Shared, Unsubscribe};

/// Receives one delivered value.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registration inside a [`Listeners`] registry.
pub type ListenerId = u64;

/// Outcome of removing a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The id was not registered (already removed).
    Missing,
    /// Removed; other handlers for the name remain.
    Removed,
    /// Removed the last handler for the name.
    Emptied,
}

/// Per-name multicast registry.
#[derive(Default)]
pub struct Listeners {
    next_id: ListenerId,
    by_name: HashMap<String, Vec<(ListenerId, Handler)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. The flag is `true` when this is the
    /// first handler for the name.
    pub fn add(&mut self, name: &str, handler: Handler) -> (ListenerId, bool) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let entries = self.by_name.entry(name.to_owned()).or_default();
        entries.push((id, handler));
        (id, entries.len() == 1)
    }

    pub fn remove(&mut self, name: &str, id: ListenerId) -> Removal {
        let Some(entries) = self.by_name.get_mut(name) else {
            return Removal::Missing;
        };
        let Some(pos) = entries.iter().position(|(eid, _)| *eid == id) else {
            return Removal::Missing;
        };
        entries.remove(pos);
        if entries.is_empty() {
            self.by_name.remove(name);
            Removal::Emptied
        } else {
            Removal::Removed
        }
    }

    /// Handlers registered for `name` right now, in registration order.
    pub fn snapshot(&self, name: &str) -> Vec<Handler> {
        self.by_name
            .get(name)
            .map(|entries| entries.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, name: &str) -> usize {
        self.by_name.get(name).map_or(0, Vec::len)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }
}

// ── Event broadcaster ────────────────────────────────────────

/// Emits outbound events and dispatches inbound ones.
#[derive(Default)]
pub struct EventBroadcaster {
    listeners: Arc<Shared<Listeners>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `data` as event `name`. Queued behind earlier traffic while the
    /// handshake is pending.
    pub(crate) fn emit(&self, outbox: &dyn Outbox, name: &str, data: Value) {
        outbox.enqueue(Message::event(name, data));
        outbox.flush();
    }

    /// Register a handler for inbound events named `name`.
    pub fn on(&self, name: &str, handler: Handler) -> Unsubscribe {
        let (id, _) = self.listeners.with(|l| l.add(name, handler));
        let listeners = Arc::clone(&self.listeners);
        let name = name.to_owned();
        Unsubscribe::new(move || {
            listeners.with(|l| l.remove(&name, id));
        })
    }

    /// Deliver an inbound event. Returns how many handlers saw it.
    pub fn dispatch(&self, name: &str, data: &Value) -> usize {
        let handlers = self.listeners.with(|l| l.snapshot(name));
        for handler in &handlers {
            handler(data);
        }
        handlers.len()
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.listeners.with(|l| l.count(name))
    }
}
