//! One-shot control commands and startup helpers
//!
//! Mute state lives only in the runtime flag files. Enabled state and volume
//! are also written to the user configuration so they survive a restart.

use crate::cli::{DeviceTarget, RunArgs};
use keyvibe_audio::reload::PackSelection;
use keyvibe_common::config::{SoundPackLocator, UserConfig, DEFAULT_VOLUME};
use keyvibe_common::device::clamp_volume;
use keyvibe_common::{DeviceClass, Result, RuntimeFlag, RuntimeFlags, RuntimeStateChannel};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// `mute` / `unmute`. Without a device the global flag is used.
pub fn set_mute(
    channel: &RuntimeStateChannel,
    target: Option<DeviceTarget>,
    muted: bool,
) -> Result<()> {
    match target {
        None => channel.write_bool(RuntimeFlag::GlobalMute, muted)?,
        Some(target) => {
            for &device in target.devices() {
                channel.write_bool(RuntimeFlag::mute_for(device), muted)?;
            }
        }
    }
    Ok(())
}

/// `enable` / `disable`
pub fn set_enabled(
    channel: &RuntimeStateChannel,
    config_path: &Path,
    target: DeviceTarget,
    enabled: bool,
) -> Result<()> {
    for &device in target.devices() {
        channel.write_bool(RuntimeFlag::enabled_for(device), enabled)?;
    }
    update_config(config_path, |config| {
        for &device in target.devices() {
            config.device_mut(device).enabled = enabled;
        }
    })
}

/// `volume`; returns the clamped level that was written
pub fn set_volume(
    channel: &RuntimeStateChannel,
    config_path: &Path,
    target: DeviceTarget,
    level: i64,
) -> Result<u8> {
    let level = clamp_volume(level);
    for &device in target.devices() {
        channel.write(RuntimeFlag::volume_for(device), i64::from(level))?;
    }
    update_config(config_path, |config| {
        for &device in target.devices() {
            config.device_mut(device).volume = Some(level);
        }
    })?;
    Ok(level)
}

/// Rewrite the user configuration. A missing file is created; a file that
/// exists but cannot be parsed is left alone and reported.
fn update_config(path: &Path, change: impl FnOnce(&mut UserConfig)) -> Result<()> {
    let mut config = if path.exists() {
        UserConfig::load(path)?
    } else {
        UserConfig::default()
    };
    change(&mut config);
    config.save(path)
}

/// `list`: installed packs per device
pub fn list_packs(locator: &SoundPackLocator, out: &mut impl Write) -> std::io::Result<()> {
    for device in DeviceClass::ALL {
        writeln!(out, "Available {} sound packs:", device)?;
        let packs = locator.list(device);
        if packs.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for (name, origin) in packs {
            writeln!(out, "  {} ({})", name, origin)?;
        }
    }
    Ok(())
}

/// User configuration and pack selection for a foreground run.
///
/// A missing file is created from the resolved selection. A file that
/// exists but cannot be read is left alone and the defaults are used.
pub fn startup_config(path: &Path, args: &RunArgs) -> (UserConfig, PackSelection) {
    match UserConfig::load(path) {
        Ok(config) => {
            let base = PackSelection::from_config(&config, DEFAULT_VOLUME);
            let selection = args.apply(&base, true);
            (config, selection)
        }
        Err(e) => {
            let base = PackSelection::from_config(&UserConfig::default(), DEFAULT_VOLUME);
            let selection = args.apply(&base, false);
            if path.exists() {
                warn!("Ignoring user configuration: {}", e);
                return (UserConfig::default(), selection);
            }

            let config = config_for(&selection);
            match config.save(path) {
                Ok(()) => info!("Created default configuration {}", path.display()),
                Err(e) => warn!("Failed to write {}: {}", path.display(), e),
            }
            (config, selection)
        }
    }
}

/// Configuration naming every field of `selection`
pub fn config_for(selection: &PackSelection) -> UserConfig {
    let mut config = UserConfig::default();
    config.keyboard.sound = Some(selection.keyboard_pack.clone());
    config.keyboard.volume = Some(selection.keyboard_volume);
    config.mouse.sound = Some(selection.mouse_pack.clone());
    config.mouse.volume = Some(selection.mouse_volume);
    config
}

/// Flag files at the start of a run: unmuted, enabled per the user
/// configuration, volumes per the selection.
pub fn initial_flags(config: &UserConfig, selection: &PackSelection) -> RuntimeFlags {
    RuntimeFlags {
        global_mute: false,
        keyboard_mute: false,
        mouse_mute: false,
        keyboard_enabled: config.keyboard.enabled,
        mouse_enabled: config.mouse.enabled,
        keyboard_volume: selection.keyboard_volume,
        mouse_volume: selection.mouse_volume,
    }
}

/// Write every flag file from `flags`
pub fn write_flags(channel: &RuntimeStateChannel, flags: &RuntimeFlags) -> Result<()> {
    std::fs::create_dir_all(channel.dir())?;
    for device in DeviceClass::ALL {
        channel.write_bool(RuntimeFlag::mute_for(device), flags.muted(device))?;
        channel.write_bool(RuntimeFlag::enabled_for(device), flags.enabled(device))?;
        channel.write(RuntimeFlag::volume_for(device), i64::from(flags.volume(device)))?;
    }
    channel.write_bool(RuntimeFlag::GlobalMute, flags.global_mute)
}
