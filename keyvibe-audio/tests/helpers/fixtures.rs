//! Deterministic sample files and sound pack layouts

use hound::{WavSpec, WavWriter};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Sample rate of generated fixtures
pub const FIXTURE_RATE: u32 = 8000;

/// Sample values of a ramp fixture: frame `i`, channel `c` holds
/// `(i % 3000) * 10 + c + 1`, so every sample is non-zero and positioned.
pub fn ramp_samples(frames: usize, channels: u16) -> Vec<i16> {
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for frame in 0..frames {
        for channel in 0..channels {
            samples.push(((frame % 3000) * 10) as i16 + channel as i16 + 1);
        }
    }
    samples
}

/// Write a 16-bit ramp WAV file at `FIXTURE_RATE`
pub fn write_ramp_wav(path: &Path, frames: usize, channels: u16) {
    let spec = WavSpec {
        channels,
        sample_rate: FIXTURE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut writer = WavWriter::create(path, spec).unwrap();
    for sample in ramp_samples(frames, channels) {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

/// Write `descriptor` as `<dir>/config.json` and return its path
pub fn write_descriptor(dir: &Path, descriptor: &Value) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join("config.json");
    fs::write(&path, serde_json::to_string_pretty(descriptor).unwrap()).unwrap();
    path
}
