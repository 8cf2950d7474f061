//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that drives one [`peerlink::Session`]
//! against a recording transport. The test plays the remote peer by
//! injecting messages and asserting on the exact wire history; spawned
//! method invocations run only when the test polls them.

mod handshake_tests;
mod mock_transport;
mod request_tests;
