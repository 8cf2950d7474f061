//! Fuzz target: `decode_envelope`
//!
//! Arbitrary frame payloads must never panic the envelope decoder, and
//! anything it accepts must re-encode into a frame it accepts again.
//!
//! cargo fuzz run fuzz_envelope

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerlink::rpc::codec::{decode_envelope, encode_envelope};

fuzz_target!(|data: &[u8]| {
    if let Some(message) = decode_envelope(data) {
        let bytes = encode_envelope(&message).expect("decoded message re-encodes");
        assert!(decode_envelope(&bytes).is_some(), "re-encoded envelope rejected");
    }
});
