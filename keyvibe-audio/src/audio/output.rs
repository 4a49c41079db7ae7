//! Audio output
//!
//! Every render opens its own output stream, writes the clip in chunks and
//! drains it before the stream is dropped. `AudioSink` abstracts the device
//! so tests can substitute an in-memory sink.
//!
//! `CpalSink` feeds a cpal output stream through a ringbuf ring buffer. The
//! audio callback pops samples and outputs silence when the buffer is empty.

use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Format of the PCM handed to a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Source of playback streams
pub trait AudioSink: Send + Sync {
    /// Open a stream accepting interleaved i16 samples in `spec`'s format
    fn open(&self, spec: StreamSpec) -> Result<Box<dyn SinkStream>>;
}

/// One open playback stream
pub trait SinkStream {
    /// Queue interleaved samples, blocking while the stream is full
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Block until everything written has been played
    fn drain(&mut self) -> Result<()>;
}

/// Ring buffer length in milliseconds of audio
const RING_BUFFER_MS: u32 = 250;

/// Sleep between checks while the ring buffer is full or draining
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Allowance on top of the queued duration before a drain gives up
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Tail kept after the ring buffer empties so the device plays its own buffer out
const DEVICE_TAIL: Duration = Duration::from_millis(50);

/// Default output device via cpal
pub struct CpalSink {
    device_name: String,
}

impl CpalSink {
    /// Check that the host has a default output device.
    ///
    /// # Errors
    /// `Error::Sink` when no output device is available.
    pub fn new() -> Result<Self> {
        let device = default_device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using default audio device: {}", device_name);
        Ok(Self { device_name })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn default_device() -> Result<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Sink("No default output device found".to_string()))
}

/// Pick a device configuration for `spec`.
///
/// Prefers the exact channel count, then any channel count at the same rate
/// (channels are remapped in the callback). I16 is preferred over F32.
fn select_config(device: &Device, spec: StreamSpec) -> Result<(StreamConfig, SampleFormat)> {
    let configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::Sink(format!("Failed to get device configs: {}", e)))?
        .filter(|c| {
            c.min_sample_rate().0 <= spec.sample_rate && c.max_sample_rate().0 >= spec.sample_rate
        })
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .collect();

    let rank = |c: &cpal::SupportedStreamConfigRange| {
        (
            c.channels() != spec.channels,
            c.sample_format() != SampleFormat::I16,
        )
    };

    let best = configs
        .into_iter()
        .min_by_key(|c| rank(c))
        .ok_or_else(|| {
            Error::Sink(format!(
                "No output configuration for {} Hz / {} channels",
                spec.sample_rate, spec.channels
            ))
        })?;

    let sample_format = best.sample_format();
    let config = best
        .with_sample_rate(cpal::SampleRate(spec.sample_rate))
        .config();
    Ok((config, sample_format))
}

impl AudioSink for CpalSink {
    fn open(&self, spec: StreamSpec) -> Result<Box<dyn SinkStream>> {
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(Error::Sink(format!("Invalid stream format {:?}", spec)));
        }

        let device = default_device()?;
        let (config, sample_format) = select_config(&device, spec)?;
        debug!(
            "Opening stream: sample_rate={}, device_channels={}, source_channels={}, format={:?}",
            config.sample_rate.0, config.channels, spec.channels, sample_format
        );

        let capacity =
            (spec.sample_rate * RING_BUFFER_MS / 1000) as usize * spec.channels as usize;
        let (producer, consumer) = HeapRb::<i16>::new(capacity.max(1)).split();
        let error_flag = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(
                &device,
                &config,
                consumer,
                spec.channels,
                Arc::clone(&error_flag),
            )?,
            SampleFormat::F32 => build_stream::<f32>(
                &device,
                &config,
                consumer,
                spec.channels,
                Arc::clone(&error_flag),
            )?,
            other => {
                return Err(Error::Sink(format!("Unsupported sample format: {:?}", other)));
            }
        };

        stream
            .play()
            .map_err(|e| Error::Sink(format!("Failed to start stream: {}", e)))?;

        Ok(Box::new(CpalStream {
            _stream: stream,
            producer,
            error_flag,
            spec,
        }))
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<i16>,
    source_channels: u16,
    error_flag: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let device_channels = config.channels as usize;
    let source_channels = source_channels as usize;
    let mut frame = vec![0i16; source_channels];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.chunks_mut(device_channels) {
                    let filled = consumer.pop_slice(&mut frame) == source_channels;
                    for (ch, sample) in out.iter_mut().enumerate() {
                        *sample = if filled {
                            T::from_sample(frame[ch.min(source_channels - 1)])
                        } else {
                            T::EQUILIBRIUM
                        };
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::Sink(format!("Failed to build stream: {}", e)))
}

struct CpalStream {
    _stream: Stream,
    producer: HeapProd<i16>,
    error_flag: Arc<AtomicBool>,
    spec: StreamSpec,
}

impl CpalStream {
    fn check_error(&self) -> Result<()> {
        if self.error_flag.load(Ordering::SeqCst) {
            Err(Error::Sink("Output stream reported an error".to_string()))
        } else {
            Ok(())
        }
    }

    fn queued_duration(&self) -> Duration {
        let frames = self.producer.occupied_len() / self.spec.channels as usize;
        Duration::from_millis(frames as u64 * 1000 / u64::from(self.spec.sample_rate))
    }
}

impl SinkStream for CpalStream {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        // Whole frames only, so the callback never sees a partial frame
        let channels = self.spec.channels as usize;
        let mut pending = samples;
        while !pending.is_empty() {
            self.check_error()?;
            let room = self.producer.vacant_len() / channels * channels;
            if room == 0 {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            let take = room.min(pending.len());
            let pushed = self.producer.push_slice(&pending[..take]);
            pending = &pending[pushed..];
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.queued_duration() + DRAIN_GRACE;
        while self.producer.occupied_len() > 0 {
            self.check_error()?;
            if Instant::now() >= deadline {
                return Err(Error::Sink("Timed out draining output stream".to_string()));
            }
            thread::sleep(POLL_INTERVAL);
        }
        thread::sleep(DEVICE_TAIL);
        self.check_error()
    }
}
