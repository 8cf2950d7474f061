//! Observation multiplexer.
//!
//! Both directions of observable traffic are reference counted by name, so
//! any number of local subscribers share one wire subscription and one
//! running provider.
//!
//! ```text
//!  consuming side                         providing side
//!  ─────────────                          ──────────────
//!  watch(h1) 0→1 ── Watch/Subscribe ────▶ entry{count 1} ─ provider(emit)
//!  watch(h2) 1→2    (nothing)
//!  h1 stop   2→1    (nothing)
//!  h2 stop   1→0 ── Watch/Unsubscribe ──▶ count 0 ─ teardown()
//!            ◀────────── Watch/Value ──── emit(v)
//! ```
//!
//! Providing entries carry a generation tag. The provider runs outside the
//! critical section; when it returns, its teardown is attached only if the
//! entry it was started for still exists, otherwise it is run at once. A
//! subscribe/unsubscribe pair racing the provider call can therefore
//! neither start a second provider nor tear one down twice.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use log::{debug, warn};
use serde_json::Value;

use super::Outbox;
use super::capability::{Emitter, Provider};
use super::message::{Message, Watch};
use super::path::CapabilityTree;
use crate::events::{Handler, Listeners, Removal};
use crate::sync::{Shared, Unsubscribe};

// ═══════════════════════════════════════════════════════════════
//  Providing half
// ═══════════════════════════════════════════════════════════════

struct Entry {
    refcount: usize,
    generation: u64,
    teardown: Option<Unsubscribe>,
}

#[derive(Default)]
struct ProvidedState {
    next_generation: u64,
    entries: HashMap<String, Entry>,
    /// Set by `unsubscribe_all`; no provider starts afterwards.
    closed: bool,
}

/// Local observables currently watched by the peer.
#[derive(Default)]
pub struct Provided {
    state: Shared<ProvidedState>,
}

impl Provided {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle an inbound `Watch/Subscribe`.
    ///
    /// The first subscription for `name` starts the provider with the
    /// emitter built by `emitter`; later ones only bump the count. Names
    /// that do not resolve to a provider are logged and ignored, as is
    /// everything after [`unsubscribe_all`](Self::unsubscribe_all).
    pub fn subscribe(
        &self,
        observables: &CapabilityTree<Provider>,
        name: &str,
        emitter: impl FnOnce() -> Emitter,
    ) {
        let Some(provider) = observables.resolve(name).cloned() else {
            warn!("observe: path \"{name}\" not found or not an observable");
            return;
        };

        let generation = self.state.with(|s| {
            if s.closed {
                return None;
            }
            if let Some(entry) = s.entries.get_mut(name) {
                entry.refcount += 1;
                return None;
            }
            let generation = s.next_generation;
            s.next_generation = s.next_generation.wrapping_add(1);
            s.entries.insert(
                name.to_owned(),
                Entry {
                    refcount: 1,
                    generation,
                    teardown: None,
                },
            );
            Some(generation)
        });
        let Some(generation) = generation else {
            return;
        };

        debug!("observe: starting \"{name}\"");
        let teardown = provider(emitter());

        let stale = self.state.with(|s| match s.entries.get_mut(name) {
            Some(entry) if entry.generation == generation => {
                entry.teardown = Some(teardown);
                None
            }
            _ => Some(teardown),
        });
        if let Some(teardown) = stale {
            debug!("observe: \"{name}\" ended while starting");
            teardown.call();
        }
    }

    /// Handle an inbound `Watch/Unsubscribe`. Unknown names are ignored.
    pub fn unsubscribe(&self, name: &str) {
        let teardown = self.state.with(|s| {
            let entry = s.entries.get_mut(name)?;
            entry.refcount -= 1;
            if entry.refcount > 0 {
                return None;
            }
            s.entries.remove(name).and_then(|e| e.teardown)
        });
        if let Some(teardown) = teardown {
            debug!("observe: stopping \"{name}\"");
            teardown.call();
        }
    }

    /// Tear down every entry regardless of its count and refuse later
    /// subscriptions. A provider still starting is torn down when it returns.
    pub fn unsubscribe_all(&self) {
        let entries = self.state.with(|s| {
            s.closed = true;
            core::mem::take(&mut s.entries)
        });
        for (name, entry) in entries {
            debug!("observe: stopping \"{name}\"");
            if let Some(teardown) = entry.teardown {
                teardown.call();
            }
        }
    }

    pub fn refcount(&self, name: &str) -> usize {
        self.state
            .with(|s| s.entries.get(name).map_or(0, |e| e.refcount))
    }

    /// Names with a running provider, sorted.
    pub fn active(&self) -> Vec<String> {
        let mut names = self.state.with(|s| s.entries.keys().cloned().collect::<Vec<_>>());
        names.sort();
        names
    }
}

/// Build the emitter a provider pushes values through.
pub fn value_emitter(outbox: Weak<dyn Outbox>, name: &str) -> Emitter {
    let name = name.to_owned();
    Arc::new(move |value: Value| {
        if let Some(outbox) = outbox.upgrade() {
            outbox.enqueue(Message::watch(name.as_str(), Watch::Value { value }));
            outbox.flush();
        }
    })
}

// ═══════════════════════════════════════════════════════════════
//  Consuming half
// ═══════════════════════════════════════════════════════════════

/// Remote observables watched by local handlers.
#[derive(Default)]
pub struct Watched {
    listeners: Arc<Shared<Listeners>>,
}

impl Watched {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handler` to the remote observable `name`.
    ///
    /// The first handler for a name sends `Watch/Subscribe`; detaching the
    /// last one sends `Watch/Unsubscribe`.
    pub fn watch(&self, outbox: Weak<dyn Outbox>, name: &str, handler: Handler) -> Unsubscribe {
        let id = self.listeners.with(|l| {
            let (id, first) = l.add(name, handler);
            if first {
                if let Some(outbox) = outbox.upgrade() {
                    outbox.enqueue(Message::watch(name, Watch::Subscribe));
                }
            }
            id
        });
        if let Some(outbox) = outbox.upgrade() {
            outbox.flush();
        }

        let listeners = Arc::clone(&self.listeners);
        let name = name.to_owned();
        Unsubscribe::new(move || {
            let outbox = outbox.upgrade();
            listeners.with(|l| {
                if l.remove(&name, id) == Removal::Emptied {
                    if let Some(outbox) = &outbox {
                        outbox.enqueue(Message::watch(name.as_str(), Watch::Unsubscribe));
                    }
                }
            });
            if let Some(outbox) = outbox {
                outbox.flush();
            }
        })
    }

    /// Deliver an inbound `Watch/Value` to the handlers registered now.
    pub fn dispatch(&self, name: &str, value: &Value) -> usize {
        let handlers = self.listeners.with(|l| l.snapshot(name));
        for handler in &handlers {
            handler(value);
        }
        handlers.len()
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.listeners.with(|l| l.count(name))
    }

    /// Names with at least one local handler, sorted.
    pub fn names(&self) -> Vec<String> {
        self.listeners.with(|l| l.names())
    }
}
