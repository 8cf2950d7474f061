//! Mock adapters for integration tests.
//!
//! `RecordingTransport` keeps every outbound message so tests can assert on
//! the exact wire history, and lets tests inject inbound traffic as if the
//! peer had sent it. `ManualSpawner` holds spawned tasks until the test
//! polls them, so method completion order is under test control.

use std::sync::{Arc, Mutex};

use futures_lite::future::{block_on, poll_once};
use peerlink::ports::{Spawner, Task};
use peerlink::rpc::message::{Command, CorrelationId, Message, Outcome, Watch};
use peerlink::rpc::transport::{MessageHandler, Subscribers, Transport};
use peerlink::{BackoffConfig, Capabilities, Session, SessionConfig, TransportError, Unsubscribe};
use serde_json::Value;

// ── RecordingTransport ────────────────────────────────────────

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Message>>,
    subscribers: Subscribers,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `message` as if the peer sent it.
    pub fn inject(&self, message: Message) -> usize {
        self.subscribers.deliver(message)
    }

    /// Deliver raw JSON; malformed values are dropped like a real adapter
    /// would. Returns whether the value was a valid message.
    pub fn inject_value(&self, value: Value) -> bool {
        match Message::from_value(value) {
            Some(message) => {
                self.inject(message);
                true
            }
            None => false,
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(Message::kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn requests(&self) -> Vec<(CorrelationId, String, Vec<Value>)> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Message::Command {
                    id,
                    command: Command::Request { name, args },
                    ..
                } => Some((id, name, args)),
                _ => None,
            })
            .collect()
    }

    pub fn responses(&self) -> Vec<(CorrelationId, Outcome)> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Message::Command {
                    id,
                    command: Command::Response { result, .. },
                    ..
                } => Some((id, result)),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Message::Event { name, data, .. } => Some((name, data)),
                _ => None,
            })
            .collect()
    }

    pub fn watches(&self) -> Vec<(String, Watch)> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Message::Watch { name, watch, .. } => Some((name, watch)),
                _ => None,
            })
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, message: Message) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn subscribe(&self, handler: MessageHandler) -> Unsubscribe {
        self.subscribers.add(handler)
    }
}

// ── ManualSpawner ─────────────────────────────────────────────

#[derive(Default)]
pub struct ManualSpawner {
    tasks: Mutex<Vec<Task>>,
}

#[allow(dead_code)]
impl ManualSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Poll every held task until none makes progress. Returns how many
    /// tasks completed.
    pub fn run_until_stalled(&self) -> usize {
        let mut completed = 0;
        loop {
            let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
            if tasks.is_empty() {
                break;
            }
            let mut pending = Vec::new();
            let mut progressed = false;
            for mut task in tasks {
                if block_on(poll_once(&mut task)).is_some() {
                    completed += 1;
                    progressed = true;
                } else {
                    pending.push(task);
                }
            }
            let mut held = self.tasks.lock().unwrap();
            let spawned_more = !held.is_empty();
            held.extend(pending);
            if !progressed && !spawned_more {
                break;
            }
        }
        completed
    }

    pub fn held(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

impl Spawner for ManualSpawner {
    fn spawn(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }
}

// ── Harness ───────────────────────────────────────────────────

/// Handshake timer far enough out that it never fires during a test.
pub fn quiet_config() -> SessionConfig {
    SessionConfig {
        label: "test".into(),
        handshake: BackoffConfig {
            initial_delay_ms: 3_600_000,
            max_delay_ms: 3_600_000,
            growth_factor: 2,
        },
    }
}

pub struct Harness {
    pub transport: Arc<RecordingTransport>,
    pub spawner: Arc<ManualSpawner>,
    pub session: Session,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(capabilities: Capabilities) -> Self {
        let transport = RecordingTransport::new();
        let spawner = ManualSpawner::new();
        let session = Session::with_config(
            transport.clone(),
            spawner.clone(),
            capabilities,
            quiet_config(),
        )
        .unwrap();
        Self {
            transport,
            spawner,
            session,
        }
    }

    pub fn empty() -> Self {
        Self::new(Capabilities::new())
    }

    /// Complete the handshake from the peer's side.
    pub fn ready(self) -> Self {
        self.transport.inject(Message::ack());
        assert!(self.session.is_ready());
        self
    }
}
