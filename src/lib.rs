//! peerlink: transport-agnostic RPC, events and observables for two peers.
//!
//! A [`Session`] pairs with exactly one remote session over any
//! [`Transport`]. Each side exposes a [`Capabilities`] tree of methods and
//! observable providers; the other side addresses them by dotted path.
//!
//! ```text
//!   host                                   worker
//!   ┌─────────┐   Transport (bridge,       ┌─────────┐
//!   │ Session │◀──────── framed, ... ─────▶│ Session │
//!   └─────────┘                            └─────────┘
//!   call("nested.bar", [2])  ──────────▶  methods["nested"]["bar"]
//!   watch("time", h)         ──────────▶  observables["time"]
//!   on("progress", h)        ◀──────────  emit("progress", v)
//! ```
//!
//! The core owns no executor and no clock beyond what it is handed: method
//! invocations and the handshake timer run on the host's [`Spawner`].
//! Logging goes through the `log` facade; no logger is installed here.

#![deny(unused_must_use)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod ports;
pub mod rpc;
pub mod scheduler;
pub mod sync;

pub use config::{BackoffConfig, SessionConfig};
pub use diagnostics::{HandshakeState, SessionDiagnostics};
pub use error::{Error, RemoteError, Result, TransportError};
pub use ports::{ExecutorSpawner, Spawner};
pub use rpc::capability::{
    Capabilities, Emitter, Method, Provider, method, provider, sync_method, typed_method,
};
pub use rpc::message::Message;
pub use rpc::path::CapabilityTree;
pub use rpc::session::{Scope, Session};
pub use rpc::transport::Transport;
pub use sync::Unsubscribe;
