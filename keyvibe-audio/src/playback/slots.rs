//! Execution slot pool
//!
//! Bounds the number of renders running at once. A slot is taken before a
//! render starts and handed back when its `SlotGuard` drops, whichever way
//! the render ends. When every slot is busy the caller is refused rather
//! than queued.

use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Default number of concurrent renders
pub const DEFAULT_SLOT_CAPACITY: usize = 10;

/// Fixed-capacity pool of execution slots
#[derive(Clone)]
pub struct SlotPool {
    permits: Arc<Semaphore>,
    table: Arc<Mutex<Vec<bool>>>,
}

/// Occupied slot; releases on drop
pub struct SlotGuard {
    index: usize,
    table: Arc<Mutex<Vec<bool>>>,
    _permit: OwnedSemaphorePermit,
}

fn lock_table(table: &Mutex<Vec<bool>>) -> MutexGuard<'_, Vec<bool>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            table: Arc::new(Mutex::new(vec![false; capacity])),
        }
    }

    pub fn capacity(&self) -> usize {
        lock_table(&self.table).len()
    }

    /// Number of slots currently held
    pub fn busy(&self) -> usize {
        lock_table(&self.table).iter().filter(|&&held| held).count()
    }

    /// Take the first free slot without waiting.
    ///
    /// # Errors
    /// `Error::ResourceExhausted` when every slot is held.
    pub fn try_acquire(&self) -> Result<SlotGuard> {
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| Error::ResourceExhausted(self.capacity()))?;

        let mut table = lock_table(&self.table);
        let index = table
            .iter()
            .position(|&held| !held)
            .ok_or_else(|| Error::ResourceExhausted(table.len()))?;
        table[index] = true;
        debug!("Acquired execution slot {}", index);

        Ok(SlotGuard {
            index,
            table: Arc::clone(&self.table),
            _permit: permit,
        })
    }

    /// Wait until every slot has been handed back.
    ///
    /// Slots released while waiting are taken by the waiter, so
    /// `try_acquire` is refused until this returns.
    pub async fn wait_idle(&self) {
        let all = u32::try_from(self.capacity()).unwrap_or(u32::MAX);
        // The semaphore is never closed
        if let Ok(permits) = self.permits.acquire_many(all).await {
            drop(permits);
        }
    }
}

impl Default for SlotPool {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_CAPACITY)
    }
}

impl SlotGuard {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // Table entry is cleared before the permit field drops
        lock_table(&self.table)[self.index] = false;
        debug!("Released execution slot {}", self.index);
    }
}
