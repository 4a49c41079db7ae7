//! Audio subsystem
//!
//! Sample decoding (symphonia), volume scaling and device output (cpal).

pub mod decoder;
pub mod output;
pub mod volume;

pub use decoder::{PcmClip, SampleDecoder, SampleInfo};
pub use output::{AudioSink, CpalSink, SinkStream, StreamSpec};
pub use volume::{scale_samples, volume_fraction};
