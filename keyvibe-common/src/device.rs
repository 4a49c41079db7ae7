//! Device classes and the shared input code space
//!
//! Keyboard scan codes and mouse buttons share one 512-entry code space.
//! Mouse buttons use fixed synthetic codes that never collide with the
//! keyboard codes a sound pack maps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Input code as delivered by the event feed
pub type KeyCode = u32;

/// Number of addressable input codes (valid codes are `0..KEY_CODE_LIMIT`)
pub const KEY_CODE_LIMIT: KeyCode = 512;

/// Synthetic code for the left mouse button
pub const MOUSE_LEFT: KeyCode = 272;

/// Synthetic code for the right mouse button
pub const MOUSE_RIGHT: KeyCode = 273;

/// Synthetic code for the middle mouse button
pub const MOUSE_MIDDLE: KeyCode = 274;

/// Input device class. Each class owns its own sound pack, volume and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Keyboard,
    Mouse,
}

impl DeviceClass {
    /// All device classes, keyboard first
    pub const ALL: [DeviceClass; 2] = [DeviceClass::Keyboard, DeviceClass::Mouse];

    /// Classify an input code: the three mouse button codes belong to the
    /// mouse, everything else to the keyboard.
    pub fn for_code(code: KeyCode) -> Self {
        match code {
            MOUSE_LEFT | MOUSE_RIGHT | MOUSE_MIDDLE => DeviceClass::Mouse,
            _ => DeviceClass::Keyboard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Keyboard => "keyboard",
            DeviceClass::Mouse => "mouse",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyboard" => Ok(DeviceClass::Keyboard),
            "mouse" => Ok(DeviceClass::Mouse),
            other => Err(Error::InvalidInput(format!(
                "Unknown device '{}' (expected keyboard or mouse)",
                other
            ))),
        }
    }
}

/// Map a named button from a sound pack descriptor to its synthetic code
pub fn named_code(name: &str) -> Option<KeyCode> {
    match name {
        "MouseLeft" => Some(MOUSE_LEFT),
        "MouseRight" => Some(MOUSE_RIGHT),
        "MouseMiddle" => Some(MOUSE_MIDDLE),
        _ => None,
    }
}

/// Clamp a volume percentage into 0-100
pub fn clamp_volume(volume: i64) -> u8 {
    volume.clamp(0, 100) as u8
}
