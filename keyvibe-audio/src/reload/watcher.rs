//! User configuration file watcher
//!
//! Watches the directory holding the configuration file, since editors and
//! `UserConfig::save` may replace the file rather than modify it, and
//! triggers the reload signal on any create or modify event for that file
//! name. The watcher runs on notify's own thread and only flips the bit.

use super::signal::ReloadSignal;
use crate::error::{Error, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Live file watch; dropping it stops watching
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ConfigWatcher {
    /// Start watching `config_path`.
    ///
    /// # Errors
    /// `Error::Config` when the path has no parent directory or the watch
    /// cannot be registered.
    pub fn new(config_path: &Path, signal: ReloadSignal) -> Result<Self> {
        let watch_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Cannot watch {}: no parent directory",
                    config_path.display()
                ))
            })?
            .to_path_buf();
        let file_name = config_path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                Error::Config(format!("Cannot watch {}: no file name", config_path.display()))
            })?;

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    if event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    {
                        debug!("Configuration file changed: {:?}", event.paths);
                        signal.trigger();
                    }
                }
                Err(e) => warn!("Configuration watch error: {}", e),
            },
            Config::default(),
        )
        .map_err(|e| Error::Config(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                Error::Config(format!("Failed to watch {}: {}", watch_dir.display(), e))
            })?;

        info!("Watching configuration file {}", config_path.display());
        Ok(Self {
            _watcher: watcher,
            path: config_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
