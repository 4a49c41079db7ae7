//! Playback scheduler integration tests
//!
//! Renders go through in-memory sinks; sample files are ramp WAV fixtures
//! so the rendered PCM can be compared sample for sample.

mod helpers;

use helpers::{ramp_samples, write_descriptor, write_ramp_wav, FailingSink, GatedSink, RecordingSink, FIXTURE_RATE};
use keyvibe_audio::audio::StreamSpec;
use keyvibe_audio::playback::scheduler::CHUNK_FRAMES;
use keyvibe_audio::playback::{PackSet, PlaybackScheduler, SubmitOutcome, Suppression};
use keyvibe_audio::{PlaybackRequest, SoundPack};
use keyvibe_common::{DeviceClass, RuntimeFlags};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Keyboard: single pack over a 1 s mono ramp, code 30 = [250 ms, +100 ms],
/// code 31 = [900 ms, +500 ms] (runs past the end).
/// Mouse: multi pack, left button plays a stereo ramp, right button a missing file.
fn fixture_packs(dir: &Path) -> PackSet {
    write_ramp_wav(&dir.join("keyboard/all.wav"), FIXTURE_RATE as usize, 1);
    let keyboard = write_descriptor(
        &dir.join("keyboard"),
        &json!({"sound": "all.wav", "defines": {"30": [250, 100], "31": [900, 500], "32": [2000, 10]}}),
    );

    write_ramp_wav(&dir.join("mouse/left.wav"), 5000, 2);
    let mouse = write_descriptor(
        &dir.join("mouse"),
        &json!({
            "key_define_type": "multi",
            "defines": {"MouseLeft": "left.wav", "MouseRight": "missing.wav"}
        }),
    );

    PackSet::new(
        SoundPack::load(&keyboard).unwrap(),
        SoundPack::load(&mouse).unwrap(),
    )
}

#[tokio::test]
async fn test_single_segment_render() {
    let temp = tempfile::tempdir().unwrap();
    let packs = fixture_packs(temp.path());
    let sink = Arc::new(RecordingSink::new());
    let scheduler = PlaybackScheduler::new(sink.clone(), 10);

    let outcome = scheduler.submit(PlaybackRequest::press(30), &packs, &RuntimeFlags::default());
    assert_eq!(outcome, SubmitOutcome::Rendered);
    scheduler.wait_idle().await;

    let streams = sink.streams();
    assert_eq!(streams.len(), 1);
    assert_eq!(
        streams[0].spec,
        StreamSpec {
            sample_rate: FIXTURE_RATE,
            channels: 1
        }
    );
    // 250 ms and 100 ms at 8 kHz
    let ramp = ramp_samples(FIXTURE_RATE as usize, 1);
    assert_eq!(streams[0].samples, ramp[2000..2800].to_vec());
    assert!(streams[0].drained);
}

#[tokio::test]
async fn test_segment_past_end_plays_available_frames() {
    let temp = tempfile::tempdir().unwrap();
    let packs = fixture_packs(temp.path());
    let sink = Arc::new(RecordingSink::new());
    let scheduler = PlaybackScheduler::new(sink.clone(), 10);

    scheduler.submit(PlaybackRequest::press(31), &packs, &RuntimeFlags::default());
    scheduler.submit(PlaybackRequest::press(32), &packs, &RuntimeFlags::default());
    scheduler.wait_idle().await;

    // Code 32 starts beyond the file and produces no stream at all
    let streams = sink.streams();
    assert_eq!(streams.len(), 1);
    let ramp = ramp_samples(FIXTURE_RATE as usize, 1);
    assert_eq!(streams[0].samples, ramp[7200..].to_vec());
}

#[tokio::test]
async fn test_whole_file_render_in_chunks() {
    let temp = tempfile::tempdir().unwrap();
    let packs = fixture_packs(temp.path());
    let sink = Arc::new(RecordingSink::new());
    let scheduler = PlaybackScheduler::new(sink.clone(), 10);

    scheduler.submit(PlaybackRequest::press(272), &packs, &RuntimeFlags::default());
    scheduler.wait_idle().await;

    let streams = sink.streams();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].spec.channels, 2);
    assert_eq!(streams[0].samples, ramp_samples(5000, 2));
    // 5000 frames in chunks of 2048
    assert_eq!(streams[0].writes, (5000 + CHUNK_FRAMES - 1) / CHUNK_FRAMES);
}

#[tokio::test]
async fn test_volume_scaling() {
    let temp = tempfile::tempdir().unwrap();
    let packs = fixture_packs(temp.path());
    let ramp = ramp_samples(FIXTURE_RATE as usize, 1)[2000..2800].to_vec();

    for (volume, expected) in [
        (100u8, ramp.clone()),
        (0u8, vec![0i16; ramp.len()]),
        (50u8, ramp.iter().map(|&s| (s as f32 * 0.5) as i16).collect()),
    ] {
        let sink = Arc::new(RecordingSink::new());
        let scheduler = PlaybackScheduler::new(sink.clone(), 10);
        let flags = RuntimeFlags {
            keyboard_volume: volume,
            ..RuntimeFlags::default()
        };

        scheduler.submit(PlaybackRequest::press(30), &packs, &flags);
        scheduler.wait_idle().await;

        assert_eq!(sink.streams()[0].samples, expected, "volume {}", volume);
    }
}

#[tokio::test]
async fn test_global_mute_takes_precedence() {
    let temp = tempfile::tempdir().unwrap();
    let packs = fixture_packs(temp.path());
    let sink = Arc::new(RecordingSink::new());
    let scheduler = PlaybackScheduler::new(sink.clone(), 10);

    let everything_off = RuntimeFlags {
        global_mute: true,
        keyboard_mute: true,
        keyboard_enabled: false,
        mouse_mute: true,
        mouse_enabled: false,
        ..RuntimeFlags::default()
    };
    let only_global = RuntimeFlags {
        global_mute: true,
        ..RuntimeFlags::default()
    };

    for flags in [everything_off, only_global] {
        for request in [
            PlaybackRequest::press(30),
            PlaybackRequest::press(272),
            PlaybackRequest::release(273),
        ] {
            assert_eq!(
                scheduler.submit(request, &packs, &flags),
                SubmitOutcome::Suppressed(Suppression::GlobalMute)
            );
        }
    }
    scheduler.wait_idle().await;
    assert!(sink.streams().is_empty());
}

#[tokio::test]
async fn test_device_gating_order() {
    let temp = tempfile::tempdir().unwrap();
    let packs = fixture_packs(temp.path());
    let sink = Arc::new(RecordingSink::new());
    let scheduler = PlaybackScheduler::new(sink.clone(), 10);

    let keyboard_off = RuntimeFlags {
        keyboard_enabled: false,
        keyboard_mute: true,
        ..RuntimeFlags::default()
    };
    assert_eq!(
        scheduler.submit(PlaybackRequest::press(30), &packs, &keyboard_off),
        SubmitOutcome::Suppressed(Suppression::DeviceDisabled(DeviceClass::Keyboard))
    );
    // The mouse is unaffected by keyboard flags
    assert_eq!(
        scheduler.submit(PlaybackRequest::press(272), &packs, &keyboard_off),
        SubmitOutcome::Rendered
    );

    let mouse_muted = RuntimeFlags {
        mouse_mute: true,
        ..RuntimeFlags::default()
    };
    assert_eq!(
        scheduler.submit(PlaybackRequest::press(274), &packs, &mouse_muted),
        SubmitOutcome::Suppressed(Suppression::DeviceMuted(DeviceClass::Mouse))
    );

    // Releases never play from a single pack; unmapped mouse buttons resolve to nothing
    let flags = RuntimeFlags::default();
    assert_eq!(
        scheduler.submit(PlaybackRequest::release(30), &packs, &flags),
        SubmitOutcome::Suppressed(Suppression::NoSound)
    );
    assert_eq!(
        scheduler.submit(PlaybackRequest::press(274), &packs, &flags),
        SubmitOutcome::Suppressed(Suppression::NoSound)
    );

    scheduler.wait_idle().await;
    assert_eq!(sink.streams().len(), 1);
}

#[tokio::test]
async fn test_slot_accounting_with_capacity_plus_one() {
    let temp = tempfile::tempdir().unwrap();
    let packs = fixture_packs(temp.path());
    let sink = Arc::new(GatedSink::new());
    let capacity = 10;
    let scheduler = PlaybackScheduler::new(sink.clone(), capacity);
    let flags = RuntimeFlags::default();

    for _ in 0..capacity {
        assert_eq!(
            scheduler.submit(PlaybackRequest::press(30), &packs, &flags),
            SubmitOutcome::Rendered
        );
    }
    assert_eq!(
        scheduler.submit(PlaybackRequest::press(30), &packs, &flags),
        SubmitOutcome::Dropped
    );
    assert_eq!(scheduler.busy_slots(), capacity);
    assert_eq!(scheduler.dropped_count(), 1);

    sink.open_gate();
    scheduler.wait_idle().await;
    assert_eq!(scheduler.busy_slots(), 0);
    assert_eq!(sink.opened(), capacity);

    // Freed slots are usable again
    assert_eq!(
        scheduler.submit(PlaybackRequest::press(30), &packs, &flags),
        SubmitOutcome::Rendered
    );
    scheduler.wait_idle().await;
    assert_eq!(scheduler.rendered_count(), capacity as u64 + 1);
    assert_eq!(scheduler.dropped_count(), 1);
}

#[tokio::test]
async fn test_failed_renders_release_slots() {
    let temp = tempfile::tempdir().unwrap();
    let packs = fixture_packs(temp.path());

    // Decode failure: the right button file does not exist
    let recording = Arc::new(RecordingSink::new());
    let scheduler = PlaybackScheduler::new(recording.clone(), 1);
    assert_eq!(
        scheduler.submit(PlaybackRequest::press(273), &packs, &RuntimeFlags::default()),
        SubmitOutcome::Rendered
    );
    scheduler.wait_idle().await;
    assert!(recording.streams().is_empty());

    // Sink failure
    let failing = Arc::new(FailingSink::default());
    let scheduler = PlaybackScheduler::new(failing.clone(), 1);
    for _ in 0..3 {
        assert_eq!(
            scheduler.submit(PlaybackRequest::press(30), &packs, &RuntimeFlags::default()),
            SubmitOutcome::Rendered
        );
        scheduler.wait_idle().await;
    }
    assert_eq!(failing.attempts(), 3);
    assert_eq!(scheduler.busy_slots(), 0);
}

#[tokio::test]
async fn test_wait_idle_returns_when_renders_finish() {
    let temp = tempfile::tempdir().unwrap();
    let packs = fixture_packs(temp.path());
    let sink = Arc::new(GatedSink::new());
    let scheduler = PlaybackScheduler::new(sink.clone(), 4);

    // Nothing running
    tokio::time::timeout(Duration::from_millis(100), scheduler.wait_idle())
        .await
        .unwrap();

    scheduler.submit(PlaybackRequest::press(30), &packs, &RuntimeFlags::default());
    scheduler.submit(PlaybackRequest::press(272), &packs, &RuntimeFlags::default());
    assert!(
        tokio::time::timeout(Duration::from_millis(100), scheduler.wait_idle())
            .await
            .is_err()
    );

    sink.open_gate();
    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
        .await
        .unwrap();
    assert_eq!(scheduler.busy_slots(), 0);
    assert_eq!(sink.opened(), 2);
}
