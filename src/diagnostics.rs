//! Session diagnostics.
//!
//! A point-in-time snapshot of one session's protocol state, collected
//! on demand by [`Session::diagnostics`](crate::rpc::session::Session::diagnostics).
//! Serializable so a host can expose it over its own RPC or logs.
//!
//! Outstanding requests are never timed out, so a count that only grows is
//! the visible sign of a peer that stopped answering.

use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    Pending,
    Ready,
    Destroyed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Destroyed => "destroyed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDiagnostics {
    pub label: String,
    pub state: HandshakeState,
    /// Requests sent and not yet answered.
    pub outstanding_requests: usize,
    /// Local observables the peer is watching.
    pub provided: Vec<String>,
    /// Remote observables watched by local handlers.
    pub watched: Vec<String>,
    /// Messages held back until the handshake completes.
    pub queued_messages: usize,
}

impl fmt::Display for SessionDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} | outstanding={} queued={} provided=[{}] watched=[{}]",
            self.label,
            self.state,
            self.outstanding_requests,
            self.queued_messages,
            self.provided.join(","),
            self.watched.join(","),
        )
    }
}
