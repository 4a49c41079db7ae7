//! Launch arguments of the playback engine
//!
//! Positional, in a fixed order shared with the controller:
//!
//! ```text
//! keyvibe-audio <keyboard_config> [keyboard_volume=100] [verbose=0] [mute=0]
//!               [mouse_config] [mouse_volume=100] [keyboard_mute=0]
//!               [mouse_mute=0] [keyboard_enabled=1] [mouse_enabled=1]
//! ```
//!
//! Volumes are clamped to 0-100 and become the fallback while a volume flag
//! file is missing. The mute and enabled arguments keep the argument order
//! stable; the runtime flag files decide those for every event.

use clap::Parser;
use keyvibe_common::device::clamp_volume;
use keyvibe_common::runtime::VolumeFallback;
use std::path::{Path, PathBuf};

/// Command-line arguments for keyvibe-audio
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "keyvibe-audio")]
#[command(about = "Plays keyboard and mouse sounds for input events read from stdin")]
#[command(version)]
#[command(allow_negative_numbers = true)]
pub struct EngineArgs {
    /// Keyboard sound pack descriptor (config.json)
    pub keyboard_config: PathBuf,

    /// Keyboard volume, 0-100
    #[arg(default_value_t = 100)]
    pub keyboard_volume: i64,

    /// Non-zero enables debug logging
    #[arg(default_value_t = 0)]
    pub verbose: i64,

    /// Global mute at launch, superseded by the flag file
    #[arg(default_value_t = 0)]
    pub mute: i64,

    /// Mouse sound pack descriptor (config.json); empty for none
    pub mouse_config: Option<String>,

    /// Mouse volume, 0-100
    #[arg(default_value_t = 100)]
    pub mouse_volume: i64,

    /// Keyboard mute at launch
    #[arg(default_value_t = 0)]
    pub keyboard_mute: i64,

    /// Mouse mute at launch
    #[arg(default_value_t = 0)]
    pub mouse_mute: i64,

    /// Keyboard enabled at launch
    #[arg(default_value_t = 1)]
    pub keyboard_enabled: i64,

    /// Mouse enabled at launch
    #[arg(default_value_t = 1)]
    pub mouse_enabled: i64,
}

impl EngineArgs {
    /// Arguments with defaults for everything but the keyboard descriptor
    pub fn new(keyboard_config: impl Into<PathBuf>) -> Self {
        Self {
            keyboard_config: keyboard_config.into(),
            keyboard_volume: 100,
            verbose: 0,
            mute: 0,
            mouse_config: None,
            mouse_volume: 100,
            keyboard_mute: 0,
            mouse_mute: 0,
            keyboard_enabled: 1,
            mouse_enabled: 1,
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose != 0
    }

    /// Mouse descriptor, ignoring an empty argument
    pub fn mouse_config(&self) -> Option<&Path> {
        self.mouse_config
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(Path::new)
    }

    pub fn volumes(&self) -> VolumeFallback {
        VolumeFallback {
            keyboard: clamp_volume(self.keyboard_volume),
            mouse: clamp_volume(self.mouse_volume),
        }
    }

    /// Render back to the positional argument list (without the program name)
    pub fn to_args(&self) -> Vec<String> {
        vec![
            self.keyboard_config.display().to_string(),
            self.keyboard_volume.to_string(),
            self.verbose.to_string(),
            self.mute.to_string(),
            self.mouse_config.clone().unwrap_or_default(),
            self.mouse_volume.to_string(),
            self.keyboard_mute.to_string(),
            self.mouse_mute.to_string(),
            self.keyboard_enabled.to_string(),
            self.mouse_enabled.to_string(),
        ]
    }
}
