//! Playback engine control loop
//!
//! Reads the event feed line by line and submits each event to the
//! scheduler. Waiting for a line is bounded by a one second timeout so a
//! pending reload is picked up even while no input arrives. Runtime flags
//! are re-read from the flag files for every event.
//!
//! The loop ends cleanly when the feed reaches end of file.

use crate::error::{Error, Result};
use crate::feed::PlaybackRequest;
use crate::playback::scheduler::{PlaybackScheduler, SubmitOutcome};
use crate::playback::state::{EngineState, PackSet};
use crate::reload::ReloadSignal;
use crate::soundpack::SoundPack;
use keyvibe_common::{RuntimeFlags, RuntimeStateChannel};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn};

/// Longest wait for a feed line before the loop services reloads
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Descriptor files the engine loads its packs from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackDescriptors {
    pub keyboard: PathBuf,
    pub mouse: Option<PathBuf>,
}

impl PackDescriptors {
    /// Load and verify both packs. A missing mouse descriptor gives an
    /// empty mouse pack.
    ///
    /// # Errors
    /// `Error::Config` or `Error::Decode` naming the pack that failed.
    pub fn load(&self) -> Result<PackSet> {
        let keyboard = load_verified(&self.keyboard, "keyboard")?;
        let mouse = match &self.mouse {
            Some(path) => load_verified(path, "mouse")?,
            None => SoundPack::empty(),
        };
        Ok(PackSet::new(keyboard, mouse))
    }
}

fn load_verified(path: &Path, device: &str) -> Result<SoundPack> {
    let pack = SoundPack::load(path)
        .map_err(|e| Error::Config(format!("Failed to load {} sound pack: {}", device, e)))?;
    pack.verify()
        .map_err(|e| Error::Config(format!("Failed to verify {} sound pack: {}", device, e)))?;
    info!(
        "Loaded {} sound pack {} ({:?} mode, {} mapped codes)",
        device,
        path.display(),
        pack.mode(),
        pack.mapped_codes()
    );
    Ok(pack)
}

/// Feed-driven playback loop
pub struct PlaybackEngine {
    state: Arc<EngineState>,
    scheduler: PlaybackScheduler,
    channel: RuntimeStateChannel,
    reload: Option<(ReloadSignal, PackDescriptors)>,
}

impl PlaybackEngine {
    /// # Arguments
    /// - `state`: Packs and fallback volumes in effect
    /// - `scheduler`: Renders accepted events
    /// - `channel`: Runtime flag files to poll
    pub fn new(
        state: Arc<EngineState>,
        scheduler: PlaybackScheduler,
        channel: RuntimeStateChannel,
    ) -> Self {
        Self {
            state,
            scheduler,
            channel,
            reload: None,
        }
    }

    /// Reload packs from `descriptors` whenever `signal` fires
    pub fn with_reload(mut self, signal: ReloadSignal, descriptors: PackDescriptors) -> Self {
        self.reload = Some((signal, descriptors));
        self
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    /// Flags for the next event. A missing or unreadable flag file means
    /// unmuted and enabled; volumes fall back to the current `EngineState`.
    pub fn current_flags(&self) -> RuntimeFlags {
        self.channel.read_all(self.state.volumes())
    }

    /// Run until the feed ends.
    ///
    /// # Errors
    /// Only I/O errors reading the feed. Malformed lines are skipped.
    pub async fn run<R>(&self, mut feed: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        info!("Playback engine running");
        // Survives a timeout so a partly read line is completed next round
        let mut buf = Vec::new();

        loop {
            self.service_reload();

            let read = match tokio::time::timeout(POLL_INTERVAL, feed.read_until(b'\n', &mut buf))
                .await
            {
                Err(_) => continue,
                Ok(Ok(read)) => read,
                Ok(Err(e)) => {
                    error!("Failed to read event feed: {}", e);
                    return Err(Error::Io(e));
                }
            };

            if read == 0 && buf.is_empty() {
                info!(
                    "Event feed closed ({} rendered, {} dropped)",
                    self.scheduler.rendered_count(),
                    self.scheduler.dropped_count()
                );
                return Ok(());
            }

            let line = std::mem::take(&mut buf);
            self.handle_line(&line);
        }
    }

    fn handle_line(&self, line: &[u8]) {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!("Skipping feed line that is not UTF-8: {}", e);
                return;
            }
        };
        if line.is_empty() {
            return;
        }

        match PlaybackRequest::from_line(line) {
            Ok(request) => {
                self.handle(request);
            }
            Err(e) => warn!("Skipping feed line: {}", e),
        }
    }

    /// Submit one event with freshly read flags
    pub fn handle(&self, request: PlaybackRequest) -> SubmitOutcome {
        let flags = self.current_flags();
        let packs = self.state.snapshot();
        let outcome = self.scheduler.submit(request, &packs, &flags);
        debug!("Event {:?}: {:?}", request, outcome);
        outcome
    }

    fn service_reload(&self) {
        let Some((signal, descriptors)) = &self.reload else {
            return;
        };
        if !signal.take() {
            return;
        }

        info!("Reloading sound packs");
        match descriptors.load() {
            Ok(packs) => {
                self.state.swap(packs, self.state.volumes());
            }
            Err(e) => error!("Reload failed, keeping current sound packs: {}", e),
        }
    }
}
