//! Sound pack model
//!
//! A sound pack maps input codes to something playable. Two layouts exist:
//!
//! - **Single**: one long sample file sliced into hit sounds by per-code
//!   `(start_ms, duration_ms)` bounds. Only key presses play.
//! - **Multi**: one file per code and edge, with up to five generic press
//!   files and one generic release file as fallbacks.
//!
//! A `SoundPack` is built once from its descriptor and never mutated
//! afterwards. Reloads build a new pack and swap the `Arc` holding it, so
//! renders that already resolved a sample keep using the old one.

mod loader;

use keyvibe_common::device::KEY_CODE_LIMIT;
use keyvibe_common::KeyCode;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::audio::decoder::SampleDecoder;
use crate::error::{Error, Result};

/// Maximum number of generic press files a multi pack discovers
pub const MAX_GENERIC_PRESS_FILES: usize = 5;

/// Descriptor layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackMode {
    Single,
    Multi,
}

/// Slice of the shared sample of a single-mode pack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start_ms: u32,
    pub duration_ms: u32,
}

/// Result of resolving an input event against a pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableSegment {
    /// Sample file to open
    pub file: PathBuf,
    /// Slice of `file` to play; `None` plays the whole file
    pub span: Option<Segment>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SingleLayout {
    pub(crate) sound_file: Option<PathBuf>,
    pub(crate) segments: HashMap<KeyCode, Segment>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MultiLayout {
    pub(crate) press: HashMap<KeyCode, PathBuf>,
    pub(crate) release: HashMap<KeyCode, PathBuf>,
    pub(crate) generic_press: Vec<PathBuf>,
    pub(crate) generic_release: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub(crate) enum Layout {
    Single(SingleLayout),
    Multi(MultiLayout),
}

/// In-memory sound pack
#[derive(Debug, Clone)]
pub struct SoundPack {
    descriptor: Option<PathBuf>,
    layout: Layout,
}

impl SoundPack {
    /// Load a pack from its descriptor file.
    ///
    /// Relative file names inside the descriptor resolve against the
    /// descriptor's directory.
    ///
    /// # Errors
    /// `Error::Config` when the descriptor cannot be read or is not valid JSON.
    pub fn load(descriptor_path: &Path) -> Result<Self> {
        let layout = loader::load_layout(descriptor_path)?;
        Ok(Self {
            descriptor: Some(descriptor_path.to_path_buf()),
            layout,
        })
    }

    /// Pack that resolves nothing (device without a configured pack)
    pub fn empty() -> Self {
        Self {
            descriptor: None,
            layout: Layout::Single(SingleLayout::default()),
        }
    }

    pub(crate) fn from_layout(descriptor: Option<PathBuf>, layout: Layout) -> Self {
        Self { descriptor, layout }
    }

    pub fn mode(&self) -> PackMode {
        match self.layout {
            Layout::Single(_) => PackMode::Single,
            Layout::Multi(_) => PackMode::Multi,
        }
    }

    /// Descriptor this pack was loaded from (`None` for the empty pack)
    pub fn descriptor(&self) -> Option<&Path> {
        self.descriptor.as_deref()
    }

    /// Shared sample of a single-mode pack
    pub fn sound_file(&self) -> Option<&Path> {
        match &self.layout {
            Layout::Single(single) => single.sound_file.as_deref(),
            Layout::Multi(_) => None,
        }
    }

    /// Segment bound to `code` in a single-mode pack
    pub fn segment(&self, code: KeyCode) -> Option<Segment> {
        match &self.layout {
            Layout::Single(single) => single.segments.get(&code).copied(),
            Layout::Multi(_) => None,
        }
    }

    /// Generic press files discovered for a multi-mode pack, in index order
    pub fn generic_press_files(&self) -> &[PathBuf] {
        match &self.layout {
            Layout::Multi(multi) => &multi.generic_press,
            Layout::Single(_) => &[],
        }
    }

    /// Shared release file of a multi-mode pack
    pub fn generic_release_file(&self) -> Option<&Path> {
        match &self.layout {
            Layout::Multi(multi) => multi.generic_release.as_deref(),
            Layout::Single(_) => None,
        }
    }

    /// Number of codes with at least one binding
    pub fn mapped_codes(&self) -> usize {
        match &self.layout {
            Layout::Single(single) => single.segments.len(),
            Layout::Multi(multi) => multi
                .press
                .keys()
                .chain(multi.release.keys())
                .collect::<std::collections::HashSet<_>>()
                .len(),
        }
    }

    /// Select what to play for an input edge.
    ///
    /// Multi mode prefers the exact per-code file for the edge, then falls
    /// back to a uniformly random generic press file (press) or the shared
    /// release file (release). Single mode never plays releases and only
    /// plays codes with a non-zero segment.
    pub fn resolve(&self, code: KeyCode, pressed: bool) -> Option<PlayableSegment> {
        if code >= KEY_CODE_LIMIT {
            return None;
        }

        match &self.layout {
            Layout::Multi(multi) => {
                let file = if pressed {
                    multi.press.get(&code).cloned().or_else(|| {
                        multi
                            .generic_press
                            .choose(&mut rand::thread_rng())
                            .cloned()
                    })
                } else {
                    multi
                        .release
                        .get(&code)
                        .cloned()
                        .or_else(|| multi.generic_release.clone())
                };
                file.map(|file| PlayableSegment { file, span: None })
            }
            Layout::Single(single) => {
                if !pressed {
                    return None;
                }
                let segment = single.segments.get(&code).filter(|s| s.duration_ms > 0)?;
                let file = single.sound_file.clone()?;
                Some(PlayableSegment {
                    file,
                    span: Some(*segment),
                })
            }
        }
    }

    /// Startup check: a single-mode pack must name a sample that can be
    /// opened and probed. Multi-mode files are checked lazily per render.
    pub fn verify(&self) -> Result<()> {
        match &self.layout {
            Layout::Single(single) => {
                let file = single.sound_file.as_ref().ok_or_else(|| {
                    Error::Config("No sound file specified in sound pack".to_string())
                })?;
                let info = SampleDecoder::probe(file)?;
                debug!(
                    "Sound file info: {} frames, {} channels, {} Hz",
                    info.frames.map_or_else(|| "unknown".to_string(), |f| f.to_string()),
                    info.channels,
                    info.sample_rate
                );
                Ok(())
            }
            Layout::Multi(_) => Ok(()),
        }
    }
}
