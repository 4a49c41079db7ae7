//! Sample decoding using symphonia
//!
//! Decodes WAV, FLAC, Vorbis, MP3 and AAC sample files to interleaved i16 PCM.
//! Segments are cut with decode-and-skip: decoding always starts at the
//! beginning of the file and frames before the segment start are discarded.

use crate::error::{Error, Result};
use crate::soundpack::Segment;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decoded interleaved PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmClip {
    /// Number of whole frames in the clip
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Stream parameters reported by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Total frames when the container reports it
    pub frames: Option<u64>,
}

/// Frame range `[start, end)` covered by a segment at `sample_rate`
pub fn segment_frames(segment: Segment, sample_rate: u32) -> (u64, u64) {
    let start = u64::from(segment.start_ms) * u64::from(sample_rate) / 1000;
    let length = u64::from(segment.duration_ms) * u64::from(sample_rate) / 1000;
    (start, start + length)
}

struct OpenedTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: SampleInfo,
}

/// Sample decoder using symphonia
pub struct SampleDecoder;

impl SampleDecoder {
    /// Open a sample file and report its stream parameters without decoding.
    pub fn probe(path: &Path) -> Result<SampleInfo> {
        Ok(Self::open(path)?.info)
    }

    /// Decode a sample file, or only the frames covered by `span`.
    ///
    /// # Arguments
    /// - `path`: Sample file
    /// - `span`: Segment to keep; `None` keeps the whole file
    ///
    /// # Returns
    /// Interleaved i16 samples. A segment running past the end of the file
    /// yields the frames that exist, possibly none.
    ///
    /// # Errors
    /// `Error::Decode` when the file cannot be opened, has no audio track or
    /// reports no sample rate.
    pub fn decode(path: &Path, span: Option<Segment>) -> Result<PcmClip> {
        let OpenedTrack {
            mut format,
            mut decoder,
            track_id,
            info,
        } = Self::open(path)?;

        let channels = info.channels as usize;
        let (start_frame, end_frame) = match span {
            Some(segment) => segment_frames(segment, info.sample_rate),
            None => (0, u64::MAX),
        };

        let mut samples: Vec<i16> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<i16>> = None;
        let mut frame_pos: u64 = 0;

        while frame_pos < end_frame {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet from {}: {}", path.display(), e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet in {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => {
                    warn!("Decode error in {}: {}", path.display(), e);
                    break;
                }
            };

            let buf = sample_buf.get_or_insert_with(|| {
                SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec())
            });
            if (buf.capacity() as u64) < decoded.capacity() as u64 * channels as u64 {
                *buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
            }
            buf.copy_interleaved_ref(decoded);

            let packet_samples = buf.samples();
            let packet_frames = (packet_samples.len() / channels) as u64;
            let packet_end = frame_pos + packet_frames;

            let keep_from = start_frame.max(frame_pos);
            let keep_to = end_frame.min(packet_end);
            if keep_from < keep_to {
                let from = ((keep_from - frame_pos) as usize) * channels;
                let to = ((keep_to - frame_pos) as usize) * channels;
                samples.extend_from_slice(&packet_samples[from..to]);
            }

            frame_pos = packet_end;
        }

        debug!(
            "Decoded {} frames from {}",
            samples.len() / channels.max(1),
            path.display()
        );

        Ok(PcmClip {
            samples,
            sample_rate: info.sample_rate,
            channels: info.channels,
        })
    }

    fn open(path: &Path) -> Result<OpenedTrack> {
        let file = File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                Error::Decode(format!("Failed to probe {}: {}", path.display(), e))
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                Error::Decode(format!("No audio track found in {}", path.display()))
            })?;

        let params = &track.codec_params;
        let sample_rate = params.sample_rate.ok_or_else(|| {
            Error::Decode(format!("Sample rate not found in {}", path.display()))
        })?;
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(1);
        let info = SampleInfo {
            sample_rate,
            channels,
            frames: params.n_frames,
        };
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| {
                Error::Decode(format!(
                    "Failed to create decoder for {}: {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(OpenedTrack {
            format,
            decoder,
            track_id,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_frames_truncate() {
        let segment = Segment {
            start_ms: 1500,
            duration_ms: 33,
        };
        // 1500 * 44100 / 1000 = 66150, 33 * 44100 / 1000 = 1455.3
        assert_eq!(segment_frames(segment, 44100), (66150, 66150 + 1455));
    }

    #[test]
    fn test_clip_frames() {
        let clip = PcmClip {
            samples: vec![0; 10],
            sample_rate: 8000,
            channels: 2,
        };
        assert_eq!(clip.frames(), 5);
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let err = SampleDecoder::probe(Path::new("/nonexistent/click.wav")).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
