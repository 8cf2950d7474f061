//! Handshake-aware send gate.
//!
//! ```text
//!   force(Hello/Ack) ──▶ [forced] ─┐
//!                                  ├─▶ single drainer ──▶ Transport::send
//!   enqueue(other)   ──▶ [outbox] ─┘        ▲
//!                          (held while      │
//!                           Pending)   open() on Ack
//! ```
//!
//! Forced messages leave as soon as the drainer reaches them. Everything
//! else waits in the outbox until [`SendGate::open`] and then leaves in
//! enqueue order. Only one caller drains at a time; a flush that arrives
//! while another is draining (re-entrant delivery, another thread) leaves
//! its work to the running drainer. After [`SendGate::close`] nothing is
//! sent.

use core::task::{Context, Poll, Waker};
use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace, warn};

use super::Outbox;
use super::message::Message;
use super::transport::Transport;
use crate::error::{Error, Result};
use crate::sync::Shared;

#[derive(Default)]
struct GateState {
    ready: bool,
    closed: bool,
    draining: bool,
    forced: VecDeque<Message>,
    outbox: VecDeque<Message>,
    waiters: Vec<Waker>,
}

impl GateState {
    fn next(&mut self) -> Option<Message> {
        if self.closed {
            return None;
        }
        match self.forced.pop_front() {
            Some(m) => Some(m),
            None if self.ready => self.outbox.pop_front(),
            None => None,
        }
    }
}

pub struct SendGate {
    state: Shared<GateState>,
    transport: Arc<dyn Transport>,
    label: String,
}

impl SendGate {
    pub fn new(transport: Arc<dyn Transport>, label: impl Into<String>) -> Self {
        Self {
            state: Shared::new(GateState::default()),
            transport,
            label: label.into(),
        }
    }

    /// Send `message` regardless of the handshake state.
    pub fn force(&self, message: Message) {
        self.state.with(|s| {
            if !s.closed {
                s.forced.push_back(message);
            }
        });
        self.flush();
    }

    /// Pending → Ready. Returns `true` only for the call that made the
    /// transition.
    pub fn open(&self) -> bool {
        let waiters = self.state.with(|s| {
            if s.ready || s.closed {
                return None;
            }
            s.ready = true;
            Some(core::mem::take(&mut s.waiters))
        });
        let Some(waiters) = waiters else {
            return false;
        };
        debug!("{}: handshake complete", self.label);
        waiters.into_iter().for_each(Waker::wake);
        self.flush();
        true
    }

    /// Stop sending for good. Queued messages are discarded and readiness
    /// waiters fail with [`Error::Closed`].
    pub fn close(&self) {
        let waiters = self.state.with(|s| {
            s.closed = true;
            s.forced.clear();
            s.outbox.clear();
            core::mem::take(&mut s.waiters)
        });
        waiters.into_iter().for_each(Waker::wake);
    }

    pub fn is_ready(&self) -> bool {
        self.state.with(|s| s.ready)
    }

    pub fn is_closed(&self) -> bool {
        self.state.with(|s| s.closed)
    }

    /// Messages waiting for the handshake.
    pub fn queued(&self) -> usize {
        self.state.with(|s| s.outbox.len())
    }

    pub fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.state.with(|s| {
            if s.ready {
                Poll::Ready(Ok(()))
            } else if s.closed {
                Poll::Ready(Err(Error::Closed))
            } else {
                if !s.waiters.iter().any(|w| w.will_wake(cx.waker())) {
                    s.waiters.push(cx.waker().clone());
                }
                Poll::Pending
            }
        })
    }
}

impl Outbox for SendGate {
    fn enqueue(&self, message: Message) {
        self.state.with(|s| {
            if s.closed {
                trace!("{}: closed, dropping {}", self.label, message.kind());
            } else {
                s.outbox.push_back(message);
            }
        });
    }

    fn flush(&self) {
        let claimed = self.state.with(|s| {
            if s.draining || s.closed {
                false
            } else {
                s.draining = true;
                true
            }
        });
        if !claimed {
            return;
        }

        loop {
            let next = self.state.with(|s| {
                let next = s.next();
                if next.is_none() {
                    s.draining = false;
                }
                next
            });
            let Some(message) = next else {
                break;
            };
            let kind = message.kind();
            trace!("{}: send {}", self.label, kind);
            if let Err(e) = self.transport.send(message) {
                warn!("{}: send {} failed: {}", self.label, kind, e);
            }
        }
    }
}
