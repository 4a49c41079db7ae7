//! Shared engine state
//!
//! The running configuration: one sound pack per device class plus the
//! volumes the engine was launched with. Owned by the engine and shared by
//! handle with the reload coordinator. Readers take a `PackSet` snapshot
//! (two `Arc` clones) and release the lock immediately; a reload replaces
//! the whole set at once.

use crate::soundpack::SoundPack;
use keyvibe_common::runtime::VolumeFallback;
use keyvibe_common::DeviceClass;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Keyboard and mouse packs in effect together
#[derive(Debug, Clone)]
pub struct PackSet {
    pub keyboard: Arc<SoundPack>,
    pub mouse: Arc<SoundPack>,
}

impl PackSet {
    pub fn new(keyboard: SoundPack, mouse: SoundPack) -> Self {
        Self {
            keyboard: Arc::new(keyboard),
            mouse: Arc::new(mouse),
        }
    }

    pub fn get(&self, device: DeviceClass) -> &Arc<SoundPack> {
        match device {
            DeviceClass::Keyboard => &self.keyboard,
            DeviceClass::Mouse => &self.mouse,
        }
    }
}

/// Running configuration shared between the engine loop and reloads
pub struct EngineState {
    packs: RwLock<PackSet>,
    volumes: RwLock<VolumeFallback>,
}

impl EngineState {
    pub fn new(packs: PackSet, volumes: VolumeFallback) -> Self {
        Self {
            packs: RwLock::new(packs),
            volumes: RwLock::new(volumes),
        }
    }

    /// Current packs
    pub fn snapshot(&self) -> PackSet {
        self.packs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn pack(&self, device: DeviceClass) -> Arc<SoundPack> {
        Arc::clone(self.snapshot().get(device))
    }

    /// Volumes used when no volume flag file exists
    pub fn volumes(&self) -> VolumeFallback {
        *self
            .volumes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace both packs and the fallback volumes. Renders already started
    /// keep the packs they resolved against.
    pub fn swap(&self, packs: PackSet, volumes: VolumeFallback) -> PackSet {
        let old = {
            let mut guard = self
                .packs
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *guard, packs)
        };
        *self
            .volumes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = volumes;
        info!(
            "Swapped sound packs (keyboard volume {}, mouse volume {})",
            volumes.keyboard, volumes.mouse
        );
        old
    }
}
