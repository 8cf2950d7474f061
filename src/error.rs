//! Unified error types for the peerlink runtime.
//!
//! A single [`Error`] enum that every subsystem converts into, plus the
//! [`RemoteError`] payload that crosses the wire inside a `Failure`
//! result. Peers never share error types; they only share this data.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The remote peer answered a request with a `Failure`.
    Remote(RemoteError),
    /// The transport refused or lost a message.
    Transport(TransportError),
    /// A value could not be encoded or decoded.
    Codec(String),
    /// A capability was inserted below an existing leaf (or over a subtree).
    PathConflict(String),
    /// Configuration is invalid.
    Config(&'static str),
    /// The session has been destroyed.
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(e) => write!(f, "remote: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::PathConflict(path) => write!(f, "path conflict at \"{path}\""),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Closed => write!(f, "session closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        Self::Remote(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel is closed or the peer is gone.
    Closed,
    /// The encoded frame exceeds the maximum frame size.
    FrameTooLarge(usize),
    /// Any other adapter-specific failure.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "channel closed"),
            Self::FrameTooLarge(len) => write!(f, "frame too large ({len} bytes)"),
            Self::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

// ---------------------------------------------------------------------------
// Remote error payload
// ---------------------------------------------------------------------------

/// Error carried by a `Failure` result.
///
/// `message` is always present; `data` holds optional structured fields
/// (error codes, cause chains) chosen by the failing side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The failure returned when a request names no callable.
    pub fn method_not_found(name: &str) -> Self {
        Self::new(format!("Method \"{name}\" not found"))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}

impl From<anyhow::Error> for RemoteError {
    /// A `RemoteError` wrapped in the `anyhow::Error` is recovered as-is;
    /// anything else keeps its display string and its cause chain.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<RemoteError>() {
            Ok(remote) => remote,
            Err(err) => {
                let causes: Vec<Value> = err
                    .chain()
                    .skip(1)
                    .map(|cause| Value::String(cause.to_string()))
                    .collect();
                let remote = Self::new(err.to_string());
                if causes.is_empty() {
                    remote
                } else {
                    remote.with_data(serde_json::json!({ "causes": causes }))
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
