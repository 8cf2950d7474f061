//! Message transport over a byte-frame channel.
//!
//! ```text
//!   send(Message) ─▶ encode_envelope ─▶ encode_frame ─▶ FrameSink
//!   feed(bytes)   ─▶ FrameDecoder ─▶ decode_envelope ─▶ handlers
//! ```
//!
//! The sink side is whatever moves bytes (a channel, a pipe, a socket);
//! the receive side is driven by the owner calling [`FramedTransport::feed`]
//! with whatever bytes arrive. Frames that are not ours (no marker) or not
//! valid messages are dropped without a trace beyond the log.

use log::trace;

use super::codec::{FrameDecoder, decode_envelope, encode_envelope, encode_frame};
use super::message::Message;
use super::transport::{MessageHandler, Subscribers, Transport};
use crate::error::{Error, TransportError};
use crate::sync::{Shared, Unsubscribe};

/// Outbound half of a byte channel.
pub trait FrameSink: Send + Sync {
    /// Accept one complete frame (length prefix included).
    fn send_frame(&self, frame: Vec<u8>) -> Result<(), TransportError>;
}

pub struct FramedTransport<S> {
    sink: S,
    decoder: Shared<FrameDecoder>,
    subscribers: Subscribers,
}

impl<S: FrameSink> FramedTransport<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            decoder: Shared::new(FrameDecoder::new()),
            subscribers: Subscribers::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Push received bytes through the decoder. Returns the number of
    /// messages delivered.
    pub fn feed(&self, bytes: &[u8]) -> usize {
        let frames = self.decoder.with(|d| d.feed(bytes));
        let mut delivered = 0;
        for frame in frames {
            match decode_envelope(&frame) {
                Some(message) => {
                    self.subscribers.deliver(message);
                    delivered += 1;
                }
                None => trace!("framed: dropped foreign frame ({} bytes)", frame.len()),
            }
        }
        delivered
    }
}

impl<S: FrameSink> Transport for FramedTransport<S> {
    fn send(&self, message: Message) -> Result<(), TransportError> {
        let payload = encode_envelope(&message).map_err(|e| match e {
            Error::Transport(t) => t,
            other => TransportError::Io(other.to_string()),
        })?;
        self.sink.send_frame(encode_frame(&payload)?)
    }

    fn subscribe(&self, handler: MessageHandler) -> Unsubscribe {
        self.subscribers.add(handler)
    }
}
