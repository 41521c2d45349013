//! Cross-crate scenario tests for SoundMaster
//!
//! The tests live in `routing_integration.rs` and drive the resolver through
//! the source store actor, the detection poller and the state file.
