//! Reload coordinator
//!
//! On a pending reload the coordinator re-reads the user configuration,
//! compares the pack names and volumes with the running selection and, when
//! something changed, validates both candidate packs before handing them to
//! its `ReloadTarget`. A failed reload leaves the running configuration and
//! the recorded selection untouched.

use super::signal::ReloadSignal;
use crate::error::Result;
use crate::playback::state::{EngineState, PackSet};
use crate::soundpack::SoundPack;
use keyvibe_common::config::{
    SoundPackLocator, UserConfig, DEFAULT_KEYBOARD_PACK, DEFAULT_MOUSE_PACK,
};
use keyvibe_common::runtime::VolumeFallback;
use keyvibe_common::DeviceClass;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Pack names and volumes the running configuration was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSelection {
    pub keyboard_pack: String,
    pub mouse_pack: String,
    pub keyboard_volume: u8,
    pub mouse_volume: u8,
}

impl PackSelection {
    /// Selection a fresh start would use for `config`
    pub fn from_config(config: &UserConfig, default_volume: u8) -> Self {
        Self {
            keyboard_pack: config
                .keyboard
                .sound
                .clone()
                .unwrap_or_else(|| DEFAULT_KEYBOARD_PACK.to_string()),
            mouse_pack: config
                .mouse
                .sound
                .clone()
                .unwrap_or_else(|| DEFAULT_MOUSE_PACK.to_string()),
            keyboard_volume: config.keyboard.volume.unwrap_or(default_volume),
            mouse_volume: config.mouse.volume.unwrap_or(default_volume),
        }
    }

    /// This selection updated with the fields `config` sets; absent fields
    /// keep their current value.
    pub fn merged(&self, config: &UserConfig) -> Self {
        Self {
            keyboard_pack: config
                .keyboard
                .sound
                .clone()
                .unwrap_or_else(|| self.keyboard_pack.clone()),
            mouse_pack: config
                .mouse
                .sound
                .clone()
                .unwrap_or_else(|| self.mouse_pack.clone()),
            keyboard_volume: config.keyboard.volume.unwrap_or(self.keyboard_volume),
            mouse_volume: config.mouse.volume.unwrap_or(self.mouse_volume),
        }
    }

    pub fn pack(&self, device: DeviceClass) -> &str {
        match device {
            DeviceClass::Keyboard => &self.keyboard_pack,
            DeviceClass::Mouse => &self.mouse_pack,
        }
    }

    pub fn volumes(&self) -> VolumeFallback {
        VolumeFallback {
            keyboard: self.keyboard_volume,
            mouse: self.mouse_volume,
        }
    }
}

/// Receiver of a validated configuration
pub trait ReloadTarget {
    /// Put `packs` into service. An error keeps the previous selection.
    fn apply(&mut self, selection: &PackSelection, packs: PackSet) -> Result<()>;
}

impl ReloadTarget for Arc<EngineState> {
    fn apply(&mut self, selection: &PackSelection, packs: PackSet) -> Result<()> {
        self.swap(packs, selection.volumes());
        Ok(())
    }
}

/// What a poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// No reload was pending
    Idle,
    /// Configuration read but nothing changed
    Unchanged,
    /// New packs are in service
    Applied,
    /// A candidate pack failed validation or the target refused it
    Rejected,
    /// The user configuration could not be read
    ConfigUnreadable,
}

/// Locate, load and verify the packs named by `selection`
pub fn load_selection(locator: &SoundPackLocator, selection: &PackSelection) -> Result<PackSet> {
    let load = |device: DeviceClass| -> Result<SoundPack> {
        let paths = locator.require(device, selection.pack(device))?;
        let pack = SoundPack::load(&paths.descriptor)?;
        pack.verify()?;
        Ok(pack)
    };
    Ok(PackSet::new(
        load(DeviceClass::Keyboard)?,
        load(DeviceClass::Mouse)?,
    ))
}

/// Applies user configuration changes to a running target
pub struct ReloadCoordinator<T: ReloadTarget> {
    config_path: PathBuf,
    locator: SoundPackLocator,
    current: PackSelection,
    target: T,
    signal: ReloadSignal,
}

impl<T: ReloadTarget> ReloadCoordinator<T> {
    /// # Arguments
    /// - `config_path`: User configuration file to re-read
    /// - `locator`: Where pack names resolve
    /// - `current`: Selection the target is running with
    /// - `target`: What receives validated packs
    pub fn new(
        config_path: PathBuf,
        locator: SoundPackLocator,
        current: PackSelection,
        target: T,
    ) -> Self {
        Self {
            config_path,
            locator,
            current,
            target,
            signal: ReloadSignal::new(),
        }
    }

    /// Handle for watchers and signal handlers
    pub fn signal(&self) -> ReloadSignal {
        self.signal.clone()
    }

    pub fn current(&self) -> &PackSelection {
        &self.current
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Run a reload if one is pending
    pub fn poll(&mut self) -> ReloadOutcome {
        if self.signal.take() {
            self.reload_now()
        } else {
            ReloadOutcome::Idle
        }
    }

    /// Re-read the configuration and apply any change
    pub fn reload_now(&mut self) -> ReloadOutcome {
        info!("Reloading configuration from {}", self.config_path.display());

        let config = match UserConfig::load(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!("Keeping current configuration: {}", e);
                return ReloadOutcome::ConfigUnreadable;
            }
        };

        let candidate = self.current.merged(&config);
        if candidate == self.current {
            debug!("Configuration unchanged");
            return ReloadOutcome::Unchanged;
        }

        info!(
            "Configuration changed: keyboard '{}' ({}%), mouse '{}' ({}%)",
            candidate.keyboard_pack,
            candidate.keyboard_volume,
            candidate.mouse_pack,
            candidate.mouse_volume
        );

        let packs = match load_selection(&self.locator, &candidate) {
            Ok(packs) => packs,
            Err(e) => {
                error!("Rejected new configuration: {}", e);
                return ReloadOutcome::Rejected;
            }
        };

        if let Err(e) = self.target.apply(&candidate, packs) {
            error!("Failed to apply new configuration: {}", e);
            return ReloadOutcome::Rejected;
        }

        self.current = candidate;
        info!("Configuration reloaded");
        ReloadOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyvibe_common::config::DeviceSettings;

    fn selection() -> PackSelection {
        PackSelection {
            keyboard_pack: "cream".to_string(),
            mouse_pack: "ping".to_string(),
            keyboard_volume: 80,
            mouse_volume: 40,
        }
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let config = UserConfig {
            keyboard: DeviceSettings {
                sound: Some("oreo".to_string()),
                ..DeviceSettings::default()
            },
            mouse: DeviceSettings {
                volume: Some(10),
                ..DeviceSettings::default()
            },
        };

        let merged = selection().merged(&config);
        assert_eq!(merged.keyboard_pack, "oreo");
        assert_eq!(merged.mouse_pack, "ping");
        assert_eq!(merged.keyboard_volume, 80);
        assert_eq!(merged.mouse_volume, 10);
    }

    #[test]
    fn test_from_config_defaults() {
        let selection = PackSelection::from_config(&UserConfig::default(), 50);
        assert_eq!(selection.keyboard_pack, DEFAULT_KEYBOARD_PACK);
        assert_eq!(selection.mouse_pack, DEFAULT_MOUSE_PACK);
        assert_eq!(selection.volumes(), VolumeFallback { keyboard: 50, mouse: 50 });
    }
}
