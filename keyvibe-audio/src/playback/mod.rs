//! Playback: slot pool, scheduler, shared state and the feed loop

pub mod engine;
pub mod scheduler;
pub mod slots;
pub mod state;

pub use engine::{PackDescriptors, PlaybackEngine};
pub use scheduler::{PlaybackScheduler, SubmitOutcome, Suppression};
pub use slots::{SlotGuard, SlotPool, DEFAULT_SLOT_CAPACITY};
pub use state::{EngineState, PackSet};
