//! Edge-triggered reload request
//!
//! Any number of triggers before the owning loop consumes the request
//! collapse into one reload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reload state observed by the owning loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    ReloadPending,
}

/// Shared reload bit; clones refer to the same request
#[derive(Debug, Clone, Default)]
pub struct ReloadSignal {
    pending: Arc<AtomicBool>,
}

impl ReloadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a reload
    pub fn trigger(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> ReloadState {
        if self.pending.load(Ordering::SeqCst) {
            ReloadState::ReloadPending
        } else {
            ReloadState::Idle
        }
    }

    /// Consume a pending request; returns whether one was pending
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}
