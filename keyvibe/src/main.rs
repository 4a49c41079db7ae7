//! keyvibe controller - Main entry point
//!
//! Resolves the sound packs from `~/.keyvibe.json` and the command line,
//! runs `keyvibe-input` piped into `keyvibe-audio`, and restarts both when
//! the user configuration changes. The control subcommands (`mute`,
//! `volume`, ...) act on a running instance through the runtime flag files.

use anyhow::{bail, Context, Result};
use clap::Parser;
use keyvibe_audio::reload::{
    load_selection, ConfigWatcher, ReloadCoordinator, ReloadSignal, ReloadTarget,
};
use keyvibe_common::config::{user_config_path, SoundPackLocator};
use keyvibe_common::RuntimeStateChannel;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod supervisor;

use cli::{Cli, Command, RunArgs};
use supervisor::{ChildBinaries, ChildSupervisor, SupervisorExit};

#[tokio::main]
async fn main() -> Result<()> {
    let command = Cli::parse().into_command();

    let verbose = matches!(&command, Command::Run(args) if args.verbose);
    let default_filter = if verbose {
        "keyvibe=debug,keyvibe_audio=debug,keyvibe_common=debug"
    } else {
        "keyvibe=info,keyvibe_audio=info,keyvibe_common=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let channel = RuntimeStateChannel::for_current_user();

    match command {
        Command::Run(args) => run(args, channel).await,
        Command::List => {
            commands::list_packs(&SoundPackLocator::system_default(), &mut std::io::stdout())
                .context("Failed to list sound packs")
        }
        Command::Mute { device } => {
            commands::set_mute(&channel, device, true).context("Failed to mute")
        }
        Command::Unmute { device } => {
            commands::set_mute(&channel, device, false).context("Failed to unmute")
        }
        Command::Enable { device } => {
            let config_path = user_config_path()?;
            commands::set_enabled(&channel, &config_path, device, true)
                .context("Failed to enable sounds")
        }
        Command::Disable { device } => {
            let config_path = user_config_path()?;
            commands::set_enabled(&channel, &config_path, device, false)
                .context("Failed to disable sounds")
        }
        Command::Volume { device, level } => {
            let config_path = user_config_path()?;
            let level = commands::set_volume(&channel, &config_path, device, level)
                .context("Failed to set volume")?;
            info!("Volume set to {}", level);
            Ok(())
        }
    }
}

/// Foreground run until interrupted or a child exits
async fn run(args: RunArgs, channel: RuntimeStateChannel) -> Result<()> {
    info!("Starting keyvibe v{}", env!("CARGO_PKG_VERSION"));

    let config_path = user_config_path()?;
    let (config, selection) = commands::startup_config(&config_path, &args);
    info!(
        "Keyboard pack '{}' at {}%, mouse pack '{}' at {}%",
        selection.keyboard_pack,
        selection.keyboard_volume,
        selection.mouse_pack,
        selection.mouse_volume
    );

    let flags = commands::initial_flags(&config, &selection);
    commands::write_flags(&channel, &flags).context("Failed to write runtime flags")?;

    let locator = SoundPackLocator::system_default();
    let packs = load_selection(&locator, &selection).context("Invalid sound pack")?;

    let mut supervisor =
        ChildSupervisor::new(ChildBinaries::discover(), channel, flags, args.verbose);
    supervisor
        .apply(&selection, packs)
        .context("Failed to start child processes")?;
    if let Some(launch) = supervisor.last_launch() {
        info!("Playback engine running in {}", launch.workdir.display());
    }

    let coordinator = ReloadCoordinator::new(config_path.clone(), locator, selection, supervisor);
    let reload = coordinator.signal();
    let _watcher = match ConfigWatcher::new(&config_path, reload.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Configuration changes will need SIGHUP: {}", e);
            None
        }
    };
    spawn_hangup_handler(reload).context("Failed to install SIGHUP handler")?;

    let exit = supervisor::supervise_until(coordinator, shutdown_signal())
        .await
        .context("Supervisor thread failed")?;
    info!("keyvibe stopped");
    if exit == SupervisorExit::NotRunning {
        bail!("Child processes could not be restarted");
    }
    Ok(())
}

/// SIGHUP forces a configuration reload
#[cfg(unix)]
fn spawn_hangup_handler(reload: ReloadSignal) -> std::io::Result<()> {
    let mut hangup = signal::unix::signal(signal::unix::SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reload requested");
            reload.trigger();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_hangup_handler(_reload: ReloadSignal) -> std::io::Result<()> {
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
