//! # keyvibe Common Library
//!
//! Shared code for the keyvibe controller and playback engine:
//! - Error types
//! - Device classes and the shared input code space
//! - User configuration loading and saving
//! - Sound pack location
//! - Runtime flag files (cross-process mute/enable/volume state)

pub mod config;
pub mod device;
pub mod error;
pub mod runtime;

pub use device::{DeviceClass, KeyCode};
pub use error::{Error, Result};
pub use runtime::{RuntimeFlag, RuntimeFlags, RuntimeStateChannel, VolumeFallback};
