//! Session orchestrator: one peer pairing over one transport.
//!
//! ```text
//!            ┌─────────── Pending ───────────┐        ┌──── Ready ────┐
//!  new() ──▶ │ backoff: Hello, Hello, Hello… │──Ack──▶│ outbox flushed│
//!            │ outbox: held                  │        │ sends direct  │
//!            └───────────────────────────────┘        └───────────────┘
//!                    │ destroy()                             │ destroy()
//!                    ▼                                       ▼
//!                 closed: timer cancelled, providers torn down,
//!                 transport unsubscribed, nothing sent
//! ```
//!
//! Inbound dispatch is never gated: requests, events and watch traffic are
//! handled in either state. Every received `Hello` is answered with a
//! forced `Ack`. Requests run as detached tasks on the host [`Spawner`],
//! so slow methods never block dispatch and responses may complete out of
//! order.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_lite::future;
use log::{debug, info, trace};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::Outbox;
use super::capability::Capabilities;
use super::correlator::{self, Correlator, PendingCall};
use super::gate::SendGate;
use super::message::{Command, CorrelationId, HandshakeStatus, Message, Watch};
use super::observe::{self, Provided, Watched};
use super::path;
use super::transport::Transport;
use crate::config::SessionConfig;
use crate::diagnostics::{HandshakeState, SessionDiagnostics};
use crate::error::{Error, Result};
use crate::events::EventBroadcaster;
use crate::ports::{Spawner, spawn_detached};
use crate::scheduler::{self, CancelHandle};
use crate::sync::{Shared, Unsubscribe};

struct Inner {
    label: String,
    capabilities: Capabilities,
    gate: Arc<SendGate>,
    correlator: Correlator,
    provided: Provided,
    watched: Watched,
    events: EventBroadcaster,
    spawner: Arc<dyn Spawner>,
    subscription: Shared<Option<Unsubscribe>>,
    handshake: Shared<Option<CancelHandle>>,
    destroyed: AtomicBool,
}

/// Both ends of the protocol for one transport.
///
/// Dropping the session destroys it. Share it behind an `Arc` when several
/// tasks need to call through it.
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Connect with the default configuration.
    pub fn new(
        transport: Arc<dyn Transport>,
        spawner: Arc<dyn Spawner>,
        capabilities: Capabilities,
    ) -> Result<Self> {
        Self::with_config(transport, spawner, capabilities, SessionConfig::default())
    }

    /// Subscribe to `transport` and start the handshake.
    pub fn with_config(
        transport: Arc<dyn Transport>,
        spawner: Arc<dyn Spawner>,
        capabilities: Capabilities,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;

        let inner = Arc::new(Inner {
            label: config.label.clone(),
            capabilities,
            gate: Arc::new(SendGate::new(transport.clone(), config.label.clone())),
            correlator: Correlator::new(),
            provided: Provided::new(),
            watched: Watched::new(),
            events: EventBroadcaster::new(),
            spawner,
            subscription: Shared::new(None),
            handshake: Shared::new(None),
            destroyed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = transport.subscribe(Arc::new(move |message: Message| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(message);
            }
        }));
        inner.subscription.with(|s| *s = Some(subscription));

        let gate = Arc::downgrade(&inner.gate);
        let timer = scheduler::start(&*inner.spawner, &config.handshake, move || {
            if let Some(gate) = gate.upgrade() {
                gate.force(Message::hello());
            }
        });
        inner.handshake.with(|h| *h = Some(timer));
        // An Ack that landed before the handle was stored found nothing to cancel.
        if inner.gate.is_ready() {
            if let Some(timer) = inner.handshake.with(Option::take) {
                timer.cancel();
            }
        }

        info!("{}: session created", inner.label);
        Ok(Self { inner })
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Completes when the handshake does. Fails with [`Error::Closed`] if
    /// the session is destroyed first.
    pub async fn ready(&self) -> Result<()> {
        future::poll_fn(|cx| self.inner.gate.poll_ready(cx)).await
    }

    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_ready()
    }

    // ── Methods ──────────────────────────────────────────────

    /// Call the remote method at `path`.
    ///
    /// The request is queued immediately (held until the handshake
    /// completes). The returned future yields the peer's value, or
    /// [`Error::Remote`] with the peer's error payload.
    pub fn call(&self, path: &str, args: Vec<Value>) -> PendingCall {
        if self.is_destroyed() {
            return PendingCall::failed(Error::Closed);
        }
        let (id, pending) = self.inner.correlator.register();
        self.inner.post(Message::request(id, path, args));
        pending
    }

    /// Typed form of [`call`](Self::call). `args` is usually a tuple and is
    /// sent as the argument array; `()` sends no arguments.
    pub async fn call_with<R, A>(&self, path: &str, args: A) -> Result<R>
    where
        R: DeserializeOwned,
        A: Serialize,
    {
        let args = encode_args(&args)?;
        let value = self.call(path, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    // ── Events ───────────────────────────────────────────────

    /// Fire event `name` at the peer.
    pub fn emit(&self, name: &str, data: Value) {
        if self.is_destroyed() {
            return;
        }
        self.inner.events.emit(&*self.inner.gate, name, data);
    }

    /// Handle events named `name` fired by the peer.
    pub fn on<F>(&self, name: &str, handler: F) -> Unsubscribe
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.events.on(name, Arc::new(handler))
    }

    // ── Observables ──────────────────────────────────────────

    /// Watch the peer's observable `name`.
    pub fn watch<F>(&self, name: &str, handler: F) -> Unsubscribe
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner
            .watched
            .watch(self.inner.outbox(), name, Arc::new(handler))
    }

    // ── Misc ─────────────────────────────────────────────────

    /// Accessor for capabilities under `prefix`.
    pub fn scope(&self, prefix: &str) -> Scope<'_> {
        Scope {
            session: self,
            prefix: prefix.to_owned(),
        }
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let inner = &self.inner;
        let state = if self.is_destroyed() {
            HandshakeState::Destroyed
        } else if inner.gate.is_ready() {
            HandshakeState::Ready
        } else {
            HandshakeState::Pending
        };
        SessionDiagnostics {
            label: inner.label.clone(),
            state,
            outstanding_requests: inner.correlator.outstanding(),
            provided: inner.provided.active(),
            watched: inner.watched.names(),
            queued_messages: inner.gate.queued(),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Shut the session down. Idempotent.
    ///
    /// Cancels the handshake timer, tears down every observable the peer
    /// is watching and leaves the transport. Nothing is sent afterwards.
    /// Calls still in flight are not completed.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(timer) = inner.handshake.with(Option::take) {
            timer.cancel();
        }
        inner.gate.close();
        inner.provided.unsubscribe_all();
        if let Some(subscription) = inner.subscription.with(Option::take) {
            subscription.call();
        }
        info!("{}: session destroyed", inner.label);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("label", &self.inner.label)
            .field("ready", &self.is_ready())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn encode_args<A: Serialize>(args: &A) -> Result<Vec<Value>> {
    Ok(match serde_json::to_value(args)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    })
}

// ── Inbound dispatch ─────────────────────────────────────────

impl Inner {
    fn outbox(&self) -> Weak<dyn Outbox> {
        let gate: Arc<dyn Outbox> = self.gate.clone();
        Arc::downgrade(&gate)
    }

    fn post(&self, message: Message) {
        self.gate.enqueue(message);
        self.gate.flush();
    }

    fn receive(&self, message: Message) {
        if self.destroyed.load(Ordering::Acquire) {
            trace!("{}: destroyed, dropping {}", self.label, message.kind());
            return;
        }
        trace!("{}: received {}", self.label, message.kind());

        match message {
            Message::Handshake {
                status: HandshakeStatus::Hello,
                ..
            } => self.gate.force(Message::ack()),
            Message::Handshake {
                status: HandshakeStatus::Ack,
                ..
            } => {
                if self.gate.open() {
                    if let Some(timer) = self.handshake.with(Option::take) {
                        timer.cancel();
                    }
                }
            }
            Message::Command {
                id,
                command: Command::Request { name, args },
                ..
            } => self.serve(id, name, args),
            Message::Command {
                id,
                command: Command::Response { result, .. },
                ..
            } => {
                if !self.correlator.resolve(id, result) {
                    debug!("{}: response for unknown id {id}", self.label);
                }
            }
            Message::Event { name, data, .. } => {
                self.events.dispatch(&name, &data);
            }
            Message::Watch { name, watch, .. } => match watch {
                Watch::Subscribe => {
                    let outbox = self.outbox();
                    self.provided
                        .subscribe(&self.capabilities.observables, &name, || {
                            observe::value_emitter(outbox, &name)
                        });
                }
                Watch::Unsubscribe => self.provided.unsubscribe(&name),
                Watch::Value { value } => {
                    self.watched.dispatch(&name, &value);
                }
            },
        }
    }

    fn serve(&self, id: CorrelationId, name: String, args: Vec<Value>) {
        let run = correlator::invoke(&self.capabilities.methods, &name, args);
        let outbox = self.outbox();
        spawn_detached(&*self.spawner, async move {
            let outcome = run.await;
            if let Some(outbox) = outbox.upgrade() {
                outbox.enqueue(Message::response(id, name, outcome));
                outbox.flush();
            }
        });
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scoped accessor
// ═══════════════════════════════════════════════════════════════

/// Addresses the peer's capabilities below a path prefix.
///
/// `session.scope("nested").call("bar", args)` sends exactly what
/// `session.call("nested.bar", args)` sends.
pub struct Scope<'a> {
    session: &'a Session,
    prefix: String,
}

impl<'a> Scope<'a> {
    pub fn path(&self, name: &str) -> String {
        path::join(&self.prefix, name)
    }

    pub fn scope(&self, name: &str) -> Scope<'a> {
        Scope {
            session: self.session,
            prefix: self.path(name),
        }
    }

    pub fn call(&self, name: &str, args: Vec<Value>) -> PendingCall {
        self.session.call(&self.path(name), args)
    }

    pub async fn call_with<R, A>(&self, name: &str, args: A) -> Result<R>
    where
        R: DeserializeOwned,
        A: Serialize,
    {
        self.session.call_with(&self.path(name), args).await
    }

    pub fn emit(&self, name: &str, data: Value) {
        self.session.emit(&self.path(name), data);
    }

    pub fn on<F>(&self, name: &str, handler: F) -> Unsubscribe
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.session.on(&self.path(name), handler)
    }

    pub fn watch<F>(&self, name: &str, handler: F) -> Unsubscribe
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.session.watch(&self.path(name), handler)
    }
}
