//! Framed transports joined by in-process frame lanes.
//!
//! Each direction is an unbounded [`FrameLane`] of encoded frames with a
//! pump task on the receiving side, the shape of a worker thread talking
//! to its owner.
//!
//! ```text
//! ┌──────────────┐   a→b frames   ┌──────────────┐
//! │ Framed end A │───────────────▶│ pump ─▶ B    │
//! │ A ◀─ pump    │◀───────────────│ Framed end B │
//! └──────────────┘   b→a frames   └──────────────┘
//! ```
//!
//! Sending never blocks and never drops: a burst flushed by the handshake
//! gate queues in full until the pump catches up.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::debug;

use super::framed::{FrameSink, FramedTransport};
use crate::error::TransportError;
use crate::ports::{Spawner, spawn_detached};
use crate::sync::Shared;

/// One direction of frames: a queue plus a wakeup for its pump.
#[derive(Default)]
pub struct FrameLane {
    frames: Shared<VecDeque<Vec<u8>>>,
    arrived: Signal<CriticalSectionRawMutex, ()>,
}

impl FrameLane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Vec<u8>) {
        self.frames.with(|q| q.push_back(frame));
        self.arrived.signal(());
    }

    /// Frames waiting for the pump.
    pub fn len(&self) -> usize {
        self.frames.with(|q| q.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least one frame is queued, then take them all.
    pub async fn drain(&self) -> VecDeque<Vec<u8>> {
        loop {
            let batch = self.frames.with(core::mem::take);
            if !batch.is_empty() {
                return batch;
            }
            self.arrived.wait().await;
        }
    }
}

/// Writes frames into a [`FrameLane`] without waiting.
#[derive(Clone)]
pub struct ChannelSink {
    lane: Arc<FrameLane>,
}

impl ChannelSink {
    pub fn new(lane: Arc<FrameLane>) -> Self {
        Self { lane }
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.lane.push(frame);
        Ok(())
    }
}

pub type ChannelTransport = FramedTransport<ChannelSink>;

/// Feed every frame arriving on `lane` into `receiver`.
///
/// Ends at the first batch that arrives after `receiver` is gone.
pub async fn pump<S: FrameSink>(lane: Arc<FrameLane>, receiver: Weak<FramedTransport<S>>) {
    loop {
        let batch = lane.drain().await;
        let Some(receiver) = receiver.upgrade() else {
            break;
        };
        for frame in batch {
            receiver.feed(&frame);
        }
    }
    debug!("channels: pump stopped");
}

/// Two connected framed transports, with both pumps spawned on `spawner`.
pub fn frame_channel_pair(spawner: &dyn Spawner) -> (Arc<ChannelTransport>, Arc<ChannelTransport>) {
    let a_to_b = Arc::new(FrameLane::new());
    let b_to_a = Arc::new(FrameLane::new());

    let a = Arc::new(FramedTransport::new(ChannelSink::new(a_to_b.clone())));
    let b = Arc::new(FramedTransport::new(ChannelSink::new(b_to_a.clone())));

    spawn_detached(spawner, pump(a_to_b, Arc::downgrade(&b)));
    spawn_detached(spawner, pump(b_to_a, Arc::downgrade(&a)));

    (a, b)
}
