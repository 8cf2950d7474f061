//! Length-prefix frame codec and the framed-transport envelope.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────────────────────────┐
//! │ Length (4B)│ JSON envelope (N B)                          │
//! │ LE u32     │ {".peerlink.transport":"framed", ...message} │
//! └────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! The decoder accumulates incoming bytes and yields complete frames. This
//! handles partial reads gracefully: a single read may return part of the
//! header, part of the payload, or several frames concatenated.
//!
//! The marker field lets a framed transport share a byte channel with
//! unrelated traffic. Frames without it are someone else's and are dropped.

use serde_json::{Map, Value};

use super::message::Message;
use crate::error::{Error, Result, TransportError};

/// Maximum frame payload size (protects against memory exhaustion).
pub const MAX_FRAME_SIZE: usize = 1 << 20;

/// Frame header size (4-byte little-endian length).
const HEADER_SIZE: usize = 4;

/// Envelope marker key and value.
pub const MARKER_KEY: &str = ".peerlink.transport";
pub const MARKER_VALUE: &str = "framed";

/// Decoder state machine.
enum DecoderState {
    /// Waiting for header bytes.
    ReadingHeader { collected: usize },
    /// Header received, reading payload.
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload_buf: Vec<u8>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload_buf: Vec::new(),
        }
    }

    /// Feed bytes into the decoder and collect every frame they complete.
    ///
    /// A header announcing an empty or oversized frame is discarded and
    /// the decoder resynchronises on the following bytes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let needed = HEADER_SIZE - *collected;
                    let to_copy = needed.min(data.len() - offset);

                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);

                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        let expected = u32::from_le_bytes(self.header_buf) as usize;

                        if expected == 0 || expected > MAX_FRAME_SIZE {
                            // Bad length; resynchronise on the next header.
                            self.state = DecoderState::ReadingHeader { collected: 0 };
                            continue;
                        }

                        self.payload_buf = Vec::with_capacity(expected);
                        self.state = DecoderState::ReadingPayload { expected };
                    }
                }

                DecoderState::ReadingPayload { expected } => {
                    let needed = *expected - self.payload_buf.len();
                    let to_copy = needed.min(data.len() - offset);

                    self.payload_buf
                        .extend_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    if self.payload_buf.len() == *expected {
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        frames.push(core::mem::take(&mut self.payload_buf));
                    }
                }
            }
        }

        frames
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload_buf.clear();
    }
}

/// Encode a payload into a length-prefixed frame.
pub fn encode_frame(payload: &[u8]) -> core::result::Result<Vec<u8>, TransportError> {
    if payload.is_empty() || payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

// ── Envelope ─────────────────────────────────────────────────

/// Serialize `message` with the transport marker added.
pub fn encode_envelope(message: &Message) -> Result<Vec<u8>> {
    let Value::Object(mut fields) = serde_json::to_value(message)? else {
        return Err(Error::Codec("message is not an object".into()));
    };
    fields.insert(MARKER_KEY.into(), Value::String(MARKER_VALUE.into()));
    Ok(serde_json::to_vec(&Value::Object(fields))?)
}

/// Parse one frame. `None` for foreign or malformed frames.
pub fn decode_envelope(frame: &[u8]) -> Option<Message> {
    let Value::Object(mut fields) = serde_json::from_slice::<Value>(frame).ok()? else {
        return None;
    };
    if !has_marker(&fields) {
        return None;
    }
    fields.remove(MARKER_KEY);
    Message::from_value(Value::Object(fields))
}

fn has_marker(fields: &Map<String, Value>) -> bool {
    fields.get(MARKER_KEY).and_then(Value::as_str) == Some(MARKER_VALUE)
}
