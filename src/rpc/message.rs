//! Wire-level data model.
//!
//! Four envelope kinds share one tagged enum:
//!
//! ```text
//! Message
//! ├─ Handshake { status: hello | ack }
//! ├─ Command   { id, command: request{name,args} | response{name,result} }
//! ├─ Event     { name, data }
//! └─ Watch     { name, watch: subscribe | unsubscribe | value{value} }
//! ```
//!
//! Every envelope carries a millisecond `timestamp`. Opaque payloads are
//! `serde_json::Value`s. Receivers decode with [`Message::from_value`],
//! which turns any shape error into `None` so the caller can drop it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;

/// Pairs a request with its response. Unique only among one session's
/// outstanding requests.
pub type CorrelationId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStatus {
    Hello,
    Ack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Handshake {
        status: HandshakeStatus,
        timestamp: u64,
    },
    Command {
        id: CorrelationId,
        timestamp: u64,
        command: Command,
    },
    Event {
        name: String,
        timestamp: u64,
        #[serde(default)]
        data: Value,
    },
    Watch {
        name: String,
        timestamp: u64,
        watch: Watch,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    Request { name: String, args: Vec<Value> },
    Response { name: String, result: Outcome },
}

/// Result of a remote invocation, as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        #[serde(default)]
        value: Value,
    },
    Failure {
        error: RemoteError,
    },
}

impl Outcome {
    pub fn into_result(self) -> Result<Value, RemoteError> {
        match self {
            Self::Success { value } => Ok(value),
            Self::Failure { error } => Err(error),
        }
    }
}

impl From<Result<Value, RemoteError>> for Outcome {
    fn from(result: Result<Value, RemoteError>) -> Self {
        match result {
            Ok(value) => Self::Success { value },
            Err(error) => Self::Failure { error },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Watch {
    Subscribe,
    Unsubscribe,
    Value {
        #[serde(default)]
        value: Value,
    },
}

// ── Constructors ─────────────────────────────────────────────

impl Message {
    pub fn hello() -> Self {
        Self::Handshake {
            status: HandshakeStatus::Hello,
            timestamp: now_ms(),
        }
    }

    pub fn ack() -> Self {
        Self::Handshake {
            status: HandshakeStatus::Ack,
            timestamp: now_ms(),
        }
    }

    pub fn request(id: CorrelationId, name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Command {
            id,
            timestamp: now_ms(),
            command: Command::Request {
                name: name.into(),
                args,
            },
        }
    }

    pub fn response(id: CorrelationId, name: impl Into<String>, result: Outcome) -> Self {
        Self::Command {
            id,
            timestamp: now_ms(),
            command: Command::Response {
                name: name.into(),
                result,
            },
        }
    }

    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self::Event {
            name: name.into(),
            timestamp: now_ms(),
            data,
        }
    }

    pub fn watch(name: impl Into<String>, watch: Watch) -> Self {
        Self::Watch {
            name: name.into(),
            timestamp: now_ms(),
            watch,
        }
    }

    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake { .. })
    }

    /// Short kind tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake {
                status: HandshakeStatus::Hello,
                ..
            } => "hello",
            Self::Handshake {
                status: HandshakeStatus::Ack,
                ..
            } => "ack",
            Self::Command {
                command: Command::Request { .. },
                ..
            } => "request",
            Self::Command {
                command: Command::Response { .. },
                ..
            } => "response",
            Self::Event { .. } => "event",
            Self::Watch { .. } => "watch",
        }
    }

    /// Validate an untrusted value. Anything that is not a well-formed
    /// message yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

/// Milliseconds since the Unix epoch (0 if the clock is before it).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
