//! User configuration and sound pack location
//!
//! The user configuration lives in `~/.keyvibe.json`. Two layouts are read:
//!
//! ```json
//! { "keyboard": { "enabled": true, "keyboard_sound": "eg-oreo", "volume": 50 },
//!   "mouse":    { "enabled": true, "mouse_sound": "ping", "volume": 50 } }
//! ```
//!
//! and the legacy flat layout `{ "sound": "eg-oreo", "volume": 50 }`, in which
//! the mouse pack defaults to `ping` and both devices share the volume.
//! Only the current layout is ever written.
//!
//! Sound packs are looked up in the per-user data directory first, then in the
//! system data directory.

use crate::device::{clamp_volume, DeviceClass};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keyboard pack used when the configuration names none
pub const DEFAULT_KEYBOARD_PACK: &str = "eg-oreo";

/// Mouse pack used when the configuration names none
pub const DEFAULT_MOUSE_PACK: &str = "ping";

/// Volume used when the configuration names none
pub const DEFAULT_VOLUME: u8 = 50;

/// File name of the user configuration, relative to the home directory
pub const USER_CONFIG_FILE: &str = ".keyvibe.json";

/// File name of a sound pack descriptor inside its pack directory
pub const PACK_DESCRIPTOR_FILE: &str = "config.json";

/// Per-device part of the user configuration.
///
/// `sound` and `volume` are optional: an absent field means "keep whatever
/// is currently running" when the configuration is re-read on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub sound: Option<String>,
    pub volume: Option<u8>,
    pub enabled: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            sound: None,
            volume: None,
            enabled: true,
        }
    }
}

/// Parsed `~/.keyvibe.json`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserConfig {
    pub keyboard: DeviceSettings,
    pub mouse: DeviceSettings,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawUserConfig {
    Current {
        keyboard: RawKeyboard,
        mouse: RawMouse,
    },
    Legacy {
        sound: Option<String>,
        volume: Option<i64>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct RawKeyboard {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keyboard_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawMouse {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mouse_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume: Option<i64>,
}

#[derive(Debug, Serialize)]
struct RawCurrent<'a> {
    keyboard: &'a RawKeyboard,
    mouse: &'a RawMouse,
}

fn default_enabled() -> bool {
    true
}

impl UserConfig {
    /// Settings for one device class
    pub fn device(&self, device: DeviceClass) -> &DeviceSettings {
        match device {
            DeviceClass::Keyboard => &self.keyboard,
            DeviceClass::Mouse => &self.mouse,
        }
    }

    /// Mutable settings for one device class
    pub fn device_mut(&mut self, device: DeviceClass) -> &mut DeviceSettings {
        match device {
            DeviceClass::Keyboard => &mut self.keyboard,
            DeviceClass::Mouse => &mut self.mouse,
        }
    }

    /// Parse a configuration document (current or legacy layout)
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawUserConfig = serde_json::from_str(text)?;

        let config = match raw {
            RawUserConfig::Current { keyboard, mouse } => UserConfig {
                keyboard: DeviceSettings {
                    sound: keyboard.keyboard_sound,
                    volume: keyboard.volume.map(clamp_volume),
                    enabled: keyboard.enabled,
                },
                mouse: DeviceSettings {
                    sound: mouse.mouse_sound,
                    volume: mouse.volume.map(clamp_volume),
                    enabled: mouse.enabled,
                },
            },
            RawUserConfig::Legacy { sound, volume } => {
                // A legacy file only names the keyboard pack; the mouse pack
                // follows it with the stock default.
                let mouse_sound = sound.as_ref().map(|_| DEFAULT_MOUSE_PACK.to_string());
                let volume = volume.map(clamp_volume);
                UserConfig {
                    keyboard: DeviceSettings {
                        sound,
                        volume,
                        enabled: true,
                    },
                    mouse: DeviceSettings {
                        sound: mouse_sound,
                        volume,
                        enabled: true,
                    },
                }
            }
        };

        Ok(config)
    }

    /// Load the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_json(&text)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))?;
        debug!("Loaded user config from {}", path.display());
        Ok(config)
    }

    /// Write the configuration in the current layout
    pub fn save(&self, path: &Path) -> Result<()> {
        let keyboard = RawKeyboard {
            enabled: self.keyboard.enabled,
            keyboard_sound: self.keyboard.sound.clone(),
            volume: self.keyboard.volume.map(i64::from),
        };
        let mouse = RawMouse {
            enabled: self.mouse.enabled,
            mouse_sound: self.mouse.sound.clone(),
            volume: self.mouse.volume.map(i64::from),
        };
        let mut text = serde_json::to_string_pretty(&RawCurrent {
            keyboard: &keyboard,
            mouse: &mouse,
        })?;
        text.push('\n');
        fs::write(path, text)?;
        debug!("Saved user config to {}", path.display());
        Ok(())
    }
}

/// Path of the user configuration file (`~/.keyvibe.json`)
pub fn user_config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(USER_CONFIG_FILE))
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
}

/// Files making up one located sound pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackPaths {
    /// Pack descriptor (`<pack dir>/config.json`)
    pub descriptor: PathBuf,
    /// Pack directory, also the working directory of the playback process
    pub dir: PathBuf,
}

/// Which root a listed pack was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackOrigin {
    User,
    System,
}

impl fmt::Display for PackOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackOrigin::User => f.write_str("user"),
            PackOrigin::System => f.write_str("system"),
        }
    }
}

/// Finds sound packs by name.
///
/// Search order per device:
/// 1. `<user root>/<device>/<name>/config.json`
/// 2. `<system root>/<device>/<name>/config.json`
#[derive(Debug, Clone)]
pub struct SoundPackLocator {
    user_root: Option<PathBuf>,
    system_root: PathBuf,
}

impl SoundPackLocator {
    pub fn new(user_root: Option<PathBuf>, system_root: PathBuf) -> Self {
        Self {
            user_root,
            system_root,
        }
    }

    /// Locator for the installed layout:
    /// `~/.local/share/keyvibe/soundpacks` then `<data dir>/soundpacks`, where
    /// the data dir is `KEYVIBE_DATA_DIR` at build time or `/usr/share/keyvibe`.
    pub fn system_default() -> Self {
        let user_root = dirs::home_dir().map(|home| {
            home.join(".local")
                .join("share")
                .join("keyvibe")
                .join("soundpacks")
        });
        let data_dir = option_env!("KEYVIBE_DATA_DIR").unwrap_or("/usr/share/keyvibe");
        Self::new(user_root, PathBuf::from(data_dir).join("soundpacks"))
    }

    /// Locate a pack; `None` when neither root holds a readable descriptor
    pub fn locate(&self, device: DeviceClass, name: &str) -> Option<PackPaths> {
        if name.is_empty() {
            return None;
        }

        self.user_root
            .iter()
            .chain(std::iter::once(&self.system_root))
            .map(|root| root.join(device.as_str()).join(name))
            .find_map(|dir| {
                let descriptor = dir.join(PACK_DESCRIPTOR_FILE);
                if fs::File::open(&descriptor).is_ok() {
                    Some(PackPaths { descriptor, dir })
                } else {
                    None
                }
            })
    }

    /// Names of the packs installed for `device`, user packs first.
    ///
    /// A name present in both roots is listed once, as a user pack. Only
    /// directories holding a descriptor count.
    pub fn list(&self, device: DeviceClass) -> Vec<(String, PackOrigin)> {
        let mut found: Vec<(String, PackOrigin)> = Vec::new();
        let roots = self
            .user_root
            .iter()
            .map(|root| (root, PackOrigin::User))
            .chain(std::iter::once((&self.system_root, PackOrigin::System)));

        for (root, origin) in roots {
            let Ok(entries) = fs::read_dir(root.join(device.as_str())) else {
                continue;
            };
            let mut names: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().join(PACK_DESCRIPTOR_FILE).is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| !found.iter().any(|(n, _)| n == name))
                .collect();
            names.sort();
            found.extend(names.into_iter().map(|name| (name, origin)));
        }
        found
    }

    /// Like [`locate`](Self::locate) but reports a missing pack as an error
    pub fn require(&self, device: DeviceClass, name: &str) -> Result<PackPaths> {
        self.locate(device, name).ok_or_else(|| {
            Error::NotFound(format!(
                "{} sound pack '{}' not found in user or system dirs",
                device, name
            ))
        })
    }
}
