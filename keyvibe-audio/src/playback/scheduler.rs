//! Playback scheduler
//!
//! Gates each input edge against the runtime flags, resolves it against the
//! device's sound pack and renders it on a blocking task that holds an
//! execution slot for its whole lifetime.
//!
//! Gating order:
//! 1. global mute
//! 2. device classification (272-274 mouse, everything else keyboard)
//! 3. device disabled
//! 4. device muted
//! 5. nothing to play for the edge
//!
//! Render failures are logged and end only that render. Nothing is retried.

use crate::audio::decoder::SampleDecoder;
use crate::audio::output::{AudioSink, StreamSpec};
use crate::audio::volume::{scale_samples, volume_fraction};
use crate::error::{Error, Result};
use crate::feed::PlaybackRequest;
use crate::playback::slots::{SlotGuard, SlotPool};
use crate::playback::state::PackSet;
use crate::soundpack::PlayableSegment;
use keyvibe_common::{DeviceClass, RuntimeFlags};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Frames written to the sink per call
pub const CHUNK_FRAMES: usize = 2048;

/// Why an event produced no sound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    GlobalMute,
    DeviceDisabled(DeviceClass),
    DeviceMuted(DeviceClass),
    NoSound,
}

/// Result of submitting one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A render task was started
    Rendered,
    Suppressed(Suppression),
    /// Every execution slot was busy
    Dropped,
}

/// Bounded-concurrency renderer
pub struct PlaybackScheduler {
    sink: Arc<dyn AudioSink>,
    slots: SlotPool,
    dropped: AtomicU64,
    rendered: AtomicU64,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn AudioSink>, capacity: usize) -> Self {
        Self {
            sink,
            slots: SlotPool::new(capacity),
            dropped: AtomicU64::new(0),
            rendered: AtomicU64::new(0),
        }
    }

    /// Gate, resolve and start rendering one event.
    ///
    /// Must be called from within a tokio runtime; the render runs on
    /// `spawn_blocking` so the caller never waits for audio.
    ///
    /// # Arguments
    /// - `request`: Input edge
    /// - `packs`: Sound packs in effect
    /// - `flags`: Runtime flags read for this loop iteration
    pub fn submit(
        &self,
        request: PlaybackRequest,
        packs: &PackSet,
        flags: &RuntimeFlags,
    ) -> SubmitOutcome {
        if flags.global_mute {
            debug!("Event {:?} suppressed: global mute", request);
            return SubmitOutcome::Suppressed(Suppression::GlobalMute);
        }

        let device = DeviceClass::for_code(request.code);

        if !flags.enabled(device) {
            debug!("Event {:?} suppressed: {} disabled", request, device);
            return SubmitOutcome::Suppressed(Suppression::DeviceDisabled(device));
        }
        if flags.muted(device) {
            debug!("Event {:?} suppressed: {} muted", request, device);
            return SubmitOutcome::Suppressed(Suppression::DeviceMuted(device));
        }

        let Some(segment) = packs.get(device).resolve(request.code, request.pressed) else {
            debug!("Event {:?} suppressed: no sound mapped", request);
            return SubmitOutcome::Suppressed(Suppression::NoSound);
        };

        let guard = match self.slots.try_acquire() {
            Ok(guard) => guard,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Event {:?} dropped: {}", request, e);
                return SubmitOutcome::Dropped;
            }
        };

        let volume = flags.volume(device);
        let sink = Arc::clone(&self.sink);
        self.rendered.fetch_add(1, Ordering::Relaxed);

        tokio::task::spawn_blocking(move || render_task(guard, sink, segment, volume));

        SubmitOutcome::Rendered
    }

    /// Events dropped because every slot was busy
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Render tasks started
    pub fn rendered_count(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }

    pub fn busy_slots(&self) -> usize {
        self.slots.busy()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Wait until no render holds a slot. Unbounded; callers add a timeout.
    pub async fn wait_idle(&self) {
        self.slots.wait_idle().await
    }
}

fn render_task(guard: SlotGuard, sink: Arc<dyn AudioSink>, segment: PlayableSegment, volume: u8) {
    let slot = guard.index();
    match render(sink.as_ref(), &segment, volume) {
        Ok(frames) => debug!(
            "Slot {} played {} frames of {}",
            slot,
            frames,
            segment.file.display()
        ),
        Err(Error::Decode(e)) => {
            warn!("Slot {}: {}", slot, e);
        }
        Err(e) => error!("Slot {}: render of {} failed: {}", slot, segment.file.display(), e),
    }
    drop(guard);
}

/// Decode, scale and stream one segment. Returns the frames played.
fn render(sink: &dyn AudioSink, segment: &PlayableSegment, volume: u8) -> Result<usize> {
    let mut clip = SampleDecoder::decode(&segment.file, segment.span)?;
    if clip.samples.is_empty() {
        return Ok(0);
    }

    scale_samples(&mut clip.samples, volume_fraction(volume));

    let mut stream = sink.open(StreamSpec {
        sample_rate: clip.sample_rate,
        channels: clip.channels,
    })?;

    for chunk in clip.samples.chunks(CHUNK_FRAMES * clip.channels.max(1) as usize) {
        stream.write(chunk)?;
    }
    stream.drain()?;

    Ok(clip.frames())
}
