//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder, once
//! whole and once split at a fuzzer-chosen point, and asserts that it never
//! panics, never yields an empty or oversized payload, and that splitting
//! the input does not change the frames it produces.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerlink::rpc::codec::{FrameDecoder, MAX_FRAME_SIZE};

fuzz_target!(|data: &[u8]| {
    let mut whole = FrameDecoder::new();
    let frames = whole.feed(data);
    for payload in &frames {
        assert!(payload.len() <= MAX_FRAME_SIZE, "payload exceeds MAX_FRAME_SIZE");
        assert!(!payload.is_empty(), "decoder must not yield empty payload");
    }

    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let mut chunked = FrameDecoder::new();
    let mut rejoined = chunked.feed(&data[..split]);
    rejoined.extend(chunked.feed(&data[split..]));
    assert_eq!(frames, rejoined, "chunking changed the decoded frames");

    // After a reset the decoder must accept bytes cleanly again.
    whole.reset();
    let _ = whole.feed(data);
});
