//! Live reconfiguration
//!
//! File watcher and SIGHUP handler set a `ReloadSignal`; the owning loop
//! polls it and lets a `ReloadCoordinator` validate and swap in new packs.

pub mod coordinator;
pub mod signal;
pub mod watcher;

pub use coordinator::{
    load_selection, PackSelection, ReloadCoordinator, ReloadOutcome, ReloadTarget,
};
pub use signal::{ReloadSignal, ReloadState};
pub use watcher::ConfigWatcher;
