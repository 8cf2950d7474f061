//! Session configuration parameters.
//!
//! All tunable parameters for a [`Session`](crate::rpc::session::Session).
//! Plain serde data, so hosts can load it from whatever config source they use.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Core session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefix for every log line this session emits (e.g. "host", "worker").
    pub label: String,
    /// Handshake retransmission schedule.
    pub handshake: BackoffConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            label: String::from("peerlink"),
            handshake: BackoffConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Reject schedules that would spin or never grow.
    pub fn validate(&self) -> Result<()> {
        self.handshake.validate()
    }
}

/// Growing-interval timer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first firing (milliseconds).
    pub initial_delay_ms: u64,
    /// Upper bound for any delay (milliseconds).
    pub max_delay_ms: u64,
    /// Multiplier applied after each firing.
    pub growth_factor: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 50,
            max_delay_ms: 300_000, // 5 min
            growth_factor: 2,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 {
            return Err(Error::Config("initial delay must be non-zero"));
        }
        if self.growth_factor == 0 {
            return Err(Error::Config("growth factor must be at least 1"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(Error::Config("max delay below initial delay"));
        }
        Ok(())
    }
}
