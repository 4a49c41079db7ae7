//! Test helper modules for keyvibe-audio integration tests
//!
//! - fixtures: WAV samples and sound pack directories in temp dirs
//! - sinks: in-memory `AudioSink` implementations

#![allow(dead_code)]

pub mod fixtures;
pub mod sinks;

pub use fixtures::{ramp_samples, write_descriptor, write_ramp_wav, FIXTURE_RATE};
pub use sinks::{FailingSink, GatedSink, RecordedStream, RecordingSink};
