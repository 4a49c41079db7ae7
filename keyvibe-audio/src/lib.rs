//! # keyvibe playback engine (keyvibe-audio)
//!
//! Turns keyboard and mouse input events into short sound effects.
//!
//! **Purpose:** Load sound packs, gate events against the runtime flags the
//! controller writes, and render accepted events on a bounded pool of
//! blocking tasks.
//!
//! **Architecture:** symphonia decoding, integer PCM volume scaling, cpal
//! output fed through a ringbuf ring buffer; packs swapped in place on reload.

pub mod audio;
pub mod config;
pub mod error;
pub mod feed;
pub mod playback;
pub mod reload;
pub mod soundpack;

pub use error::{Error, Result};
pub use feed::PlaybackRequest;
pub use soundpack::{PackMode, PlayableSegment, Segment, SoundPack};
