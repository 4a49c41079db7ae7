//! Runtime flag files
//!
//! Mute, enable and volume state is shared between the controller and the
//! playback process through one small file per flag:
//!
//! ```text
//! <runtime dir>/keyvibe-<flag>-<uid>
//! ```
//!
//! Each file holds a single decimal integer. Writers rewrite the whole file;
//! the last writer wins. Readers fall back to a default when a file is
//! missing or unparsable, so the playback process works even when nothing
//! has been written yet. External tools may write these files directly.

use crate::device::{clamp_volume, DeviceClass};
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Prefix of every runtime flag file name
pub const TOOL_NAME: &str = "keyvibe";

/// One runtime flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFlag {
    GlobalMute,
    KeyboardMute,
    MouseMute,
    KeyboardEnabled,
    MouseEnabled,
    KeyboardVolume,
    MouseVolume,
}

impl RuntimeFlag {
    pub const ALL: [RuntimeFlag; 7] = [
        RuntimeFlag::GlobalMute,
        RuntimeFlag::KeyboardMute,
        RuntimeFlag::MouseMute,
        RuntimeFlag::KeyboardEnabled,
        RuntimeFlag::MouseEnabled,
        RuntimeFlag::KeyboardVolume,
        RuntimeFlag::MouseVolume,
    ];

    /// Name used in the flag file name
    pub fn file_name(&self) -> &'static str {
        match self {
            RuntimeFlag::GlobalMute => "mute",
            RuntimeFlag::KeyboardMute => "kbd-mute",
            RuntimeFlag::MouseMute => "mouse-mute",
            RuntimeFlag::KeyboardEnabled => "kbd-enabled",
            RuntimeFlag::MouseEnabled => "mouse-enabled",
            RuntimeFlag::KeyboardVolume => "kbd-volume",
            RuntimeFlag::MouseVolume => "mouse-volume",
        }
    }

    pub fn mute_for(device: DeviceClass) -> Self {
        match device {
            DeviceClass::Keyboard => RuntimeFlag::KeyboardMute,
            DeviceClass::Mouse => RuntimeFlag::MouseMute,
        }
    }

    pub fn enabled_for(device: DeviceClass) -> Self {
        match device {
            DeviceClass::Keyboard => RuntimeFlag::KeyboardEnabled,
            DeviceClass::Mouse => RuntimeFlag::MouseEnabled,
        }
    }

    pub fn volume_for(device: DeviceClass) -> Self {
        match device {
            DeviceClass::Keyboard => RuntimeFlag::KeyboardVolume,
            DeviceClass::Mouse => RuntimeFlag::MouseVolume,
        }
    }
}

/// Snapshot of every runtime flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeFlags {
    pub global_mute: bool,
    pub keyboard_mute: bool,
    pub mouse_mute: bool,
    pub keyboard_enabled: bool,
    pub mouse_enabled: bool,
    /// 0-100
    pub keyboard_volume: u8,
    /// 0-100
    pub mouse_volume: u8,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            global_mute: false,
            keyboard_mute: false,
            mouse_mute: false,
            keyboard_enabled: true,
            mouse_enabled: true,
            keyboard_volume: 100,
            mouse_volume: 100,
        }
    }
}

impl RuntimeFlags {
    pub fn muted(&self, device: DeviceClass) -> bool {
        match device {
            DeviceClass::Keyboard => self.keyboard_mute,
            DeviceClass::Mouse => self.mouse_mute,
        }
    }

    pub fn enabled(&self, device: DeviceClass) -> bool {
        match device {
            DeviceClass::Keyboard => self.keyboard_enabled,
            DeviceClass::Mouse => self.mouse_enabled,
        }
    }

    pub fn volume(&self, device: DeviceClass) -> u8 {
        match device {
            DeviceClass::Keyboard => self.keyboard_volume,
            DeviceClass::Mouse => self.mouse_volume,
        }
    }
}

/// Volumes used when no volume file exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeFallback {
    pub keyboard: u8,
    pub mouse: u8,
}

/// File-backed flag channel shared by independent processes
#[derive(Debug, Clone)]
pub struct RuntimeStateChannel {
    dir: PathBuf,
    uid: u32,
}

impl RuntimeStateChannel {
    /// Channel rooted at an explicit directory, for an explicit user id
    pub fn new(dir: impl Into<PathBuf>, uid: u32) -> Self {
        Self {
            dir: dir.into(),
            uid,
        }
    }

    /// Channel in `$XDG_RUNTIME_DIR` (or `/tmp`) for the current user
    pub fn for_current_user() -> Self {
        Self::new(runtime_dir(), current_uid())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `flag`
    pub fn flag_path(&self, flag: RuntimeFlag) -> PathBuf {
        self.dir
            .join(format!("{}-{}-{}", TOOL_NAME, flag.file_name(), self.uid))
    }

    /// Rewrite one flag file with `value`
    pub fn write(&self, flag: RuntimeFlag, value: i64) -> Result<()> {
        let path = self.flag_path(flag);
        fs::write(&path, format!("{}\n", value))?;
        debug!("Wrote runtime flag {} = {}", flag.file_name(), value);
        Ok(())
    }

    /// Convenience for boolean flags (written as 0/1)
    pub fn write_bool(&self, flag: RuntimeFlag, value: bool) -> Result<()> {
        self.write(flag, i64::from(value))
    }

    /// Read one flag; `None` when the file is absent or does not hold an integer
    pub fn read(&self, flag: RuntimeFlag) -> Option<i64> {
        let path = self.flag_path(flag);
        let text = fs::read_to_string(&path).ok()?;
        let value = parse_leading_int(&text);
        if value.is_none() {
            trace!("Ignoring malformed runtime flag file {}", path.display());
        }
        value
    }

    fn read_bool(&self, flag: RuntimeFlag, default: bool) -> bool {
        self.read(flag).map(|v| v != 0).unwrap_or(default)
    }

    fn read_volume(&self, flag: RuntimeFlag, default: u8) -> u8 {
        self.read(flag).map(clamp_volume).unwrap_or(default)
    }

    /// Read every flag. Missing or malformed files give mute=false,
    /// enabled=true, and the fallback volume for the device.
    pub fn read_all(&self, fallback: VolumeFallback) -> RuntimeFlags {
        self.read_with_defaults(&RuntimeFlags {
            keyboard_volume: fallback.keyboard,
            mouse_volume: fallback.mouse,
            ..RuntimeFlags::default()
        })
    }

    /// Read every flag, taking the value in `defaults` for each missing or
    /// malformed file.
    pub fn read_with_defaults(&self, defaults: &RuntimeFlags) -> RuntimeFlags {
        RuntimeFlags {
            global_mute: self.read_bool(RuntimeFlag::GlobalMute, defaults.global_mute),
            keyboard_mute: self.read_bool(RuntimeFlag::KeyboardMute, defaults.keyboard_mute),
            mouse_mute: self.read_bool(RuntimeFlag::MouseMute, defaults.mouse_mute),
            keyboard_enabled: self
                .read_bool(RuntimeFlag::KeyboardEnabled, defaults.keyboard_enabled),
            mouse_enabled: self.read_bool(RuntimeFlag::MouseEnabled, defaults.mouse_enabled),
            keyboard_volume: self
                .read_volume(RuntimeFlag::KeyboardVolume, defaults.keyboard_volume),
            mouse_volume: self.read_volume(RuntimeFlag::MouseVolume, defaults.mouse_volume),
        }
    }
}

/// Leading decimal integer of a flag file, ignoring surrounding whitespace
fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

/// `$XDG_RUNTIME_DIR`, or `/tmp` when unset or empty
pub fn runtime_dir() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("/tmp"),
    }
}

/// Real user id of the calling process
pub fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}
