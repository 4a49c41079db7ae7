//! Command line of the keyvibe controller
//!
//! Without a subcommand the controller runs in the foreground, the same as
//! `keyvibe run`. The remaining subcommands change a running instance through
//! the runtime flag files and exit.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use keyvibe_audio::reload::PackSelection;
use keyvibe_common::device::clamp_volume;
use keyvibe_common::DeviceClass;

#[derive(Parser, Debug)]
#[command(name = "keyvibe")]
#[command(about = "Mechanical keyboard and mouse sound simulator")]
#[command(version, disable_version_flag = true)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Print version (`-V` sets the volume)
    #[arg(long, action = ArgAction::Version)]
    version: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// The subcommand to execute, `run` when none was given
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run(self.run))
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Play sounds until interrupted (default)
    Run(RunArgs),

    /// List installed sound packs
    List,

    /// Mute sounds; without a device every sound is muted
    Mute { device: Option<DeviceTarget> },

    /// Undo `mute`
    Unmute { device: Option<DeviceTarget> },

    /// Enable sounds for a device and remember it in the user configuration
    Enable {
        #[arg(default_value = "both")]
        device: DeviceTarget,
    },

    /// Disable sounds for a device and remember it in the user configuration
    Disable {
        #[arg(default_value = "both")]
        device: DeviceTarget,
    },

    /// Set the volume of a device, 0-100
    Volume {
        device: DeviceTarget,
        #[arg(allow_negative_numbers = true)]
        level: i64,
    },
}

/// Device argument of the control subcommands
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTarget {
    Keyboard,
    Mouse,
    Both,
}

impl DeviceTarget {
    pub fn devices(&self) -> &'static [DeviceClass] {
        match self {
            DeviceTarget::Keyboard => &[DeviceClass::Keyboard],
            DeviceTarget::Mouse => &[DeviceClass::Mouse],
            DeviceTarget::Both => &DeviceClass::ALL,
        }
    }
}

/// Options of the foreground run
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Keyboard sound pack
    #[arg(short = 's', long)]
    pub sound: Option<String>,

    /// Mouse sound pack
    #[arg(short = 'm', long)]
    pub mouse: Option<String>,

    /// Volume for both devices, 0-100
    #[arg(short = 'V', long, allow_negative_numbers = true)]
    pub volume: Option<i64>,

    /// Keyboard volume only, 0-100
    #[arg(short = 'K', long, allow_negative_numbers = true)]
    pub keyboard_volume: Option<i64>,

    /// Mouse volume only, 0-100
    #[arg(short = 'O', long, allow_negative_numbers = true)]
    pub mouse_volume: Option<i64>,

    /// Let the options above win over ~/.keyvibe.json
    #[arg(short = 'c', long)]
    pub override_config: bool,

    /// Debug logging, also passed on to the playback engine
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Apply the command line options to `selection`.
    ///
    /// When a user configuration file was read (`configured`) it wins over
    /// the options unless `--override-config` is given.
    pub fn apply(&self, selection: &PackSelection, configured: bool) -> PackSelection {
        if configured && !self.override_config {
            return selection.clone();
        }

        let mut result = selection.clone();
        if let Some(sound) = &self.sound {
            result.keyboard_pack = sound.clone();
        }
        if let Some(mouse) = &self.mouse {
            result.mouse_pack = mouse.clone();
        }
        if let Some(volume) = self.volume {
            result.keyboard_volume = clamp_volume(volume);
            result.mouse_volume = clamp_volume(volume);
        }
        if let Some(volume) = self.keyboard_volume {
            result.keyboard_volume = clamp_volume(volume);
        }
        if let Some(volume) = self.mouse_volume {
            result.mouse_volume = clamp_volume(volume);
        }
        result
    }
}
