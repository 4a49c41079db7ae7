//! keyvibe playback engine (keyvibe-audio) - Main entry point
//!
//! Reads input events from stdin, one JSON object per line, and plays the
//! matching sounds. Exits 0 when stdin closes and 1 when the sound packs or
//! the audio device cannot be initialised.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use keyvibe_audio::audio::CpalSink;
use keyvibe_audio::config::EngineArgs;
use keyvibe_audio::playback::{
    EngineState, PackDescriptors, PlaybackEngine, PlaybackScheduler, DEFAULT_SLOT_CAPACITY,
};
use keyvibe_audio::reload::ReloadSignal;
use keyvibe_common::RuntimeStateChannel;
use tokio::io::BufReader;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Longest wait for in-flight sounds after the feed closes
const FINISH_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    let args = EngineArgs::parse();

    let default_filter = if args.verbose() {
        "keyvibe_audio=debug,keyvibe_common=debug"
    } else {
        "keyvibe_audio=info,keyvibe_common=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting keyvibe-audio v{}", env!("CARGO_PKG_VERSION"));

    let descriptors = PackDescriptors {
        keyboard: args.keyboard_config.clone(),
        mouse: args.mouse_config().map(|p| p.to_path_buf()),
    };
    let packs = descriptors
        .load()
        .context("Failed to initialize sound packs")?;

    let sink = CpalSink::new().context("Failed to initialize audio output")?;

    let state = Arc::new(EngineState::new(packs, args.volumes()));
    let scheduler = PlaybackScheduler::new(Arc::new(sink), DEFAULT_SLOT_CAPACITY);
    let channel = RuntimeStateChannel::for_current_user();
    info!("Runtime flags in {}", channel.dir().display());

    let reload = ReloadSignal::new();
    spawn_hangup_handler(reload.clone()).context("Failed to install SIGHUP handler")?;

    let engine = PlaybackEngine::new(state, scheduler, channel)
        .with_reload(reload, descriptors);

    let feed = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = engine.run(feed) => {
            result.context("Event feed failed")?;
            if tokio::time::timeout(FINISH_TIMEOUT, engine.scheduler().wait_idle()).await.is_err() {
                warn!("Sounds still playing at exit");
            }
        }
        _ = shutdown_signal() => {}
    }

    info!("keyvibe-audio stopped");
    Ok(())
}

/// SIGHUP reloads the sound packs from the same descriptors
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
