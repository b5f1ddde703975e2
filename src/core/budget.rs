//! Cache memory budget and epoch-based task invalidation
//!
//! **Why**: The thumbnail cache must never grow past a fixed share of process
//! memory, and a feed reload must be able to cancel every in-flight thumbnail
//! task in one shot. Both figures are decided here, once.
//!
//! **Used by**: ThumbnailCache (capacity), Workers / ThumbnailLoader (epoch)

use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::System;

/// Share of process memory reserved for the thumbnail cache: 1/8.
const DEFAULT_CACHE_DIVISOR: u64 = 8;

/// Fixed cache capacity plus the global epoch counter.
///
/// Capacity is computed once at construction and expressed in kilobytes,
/// the same unit `Thumbnail::size_kb` reports.
#[derive(Debug)]
pub struct CacheBudget {
    capacity_kb: u64,
    /// Epoch counter for cancelling stale background requests
    current_epoch: Arc<AtomicU64>,
}

impl CacheBudget {
    /// Derive the budget from process memory: `floor(max_memory_kb / divisor)`.
    pub fn new(divisor: u64) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let max_memory_kb = sys.total_memory() / 1024;
        let divisor = divisor.max(1);
        let capacity_kb = max_memory_kb / divisor;

        info!(
            "Cache budget: {} KB (1/{} of {} KB process memory)",
            capacity_kb, divisor, max_memory_kb
        );

        Self {
            capacity_kb,
            current_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fixed capacity, for tests and explicit overrides.
    pub fn with_capacity_kb(capacity_kb: u64) -> Self {
        Self {
            capacity_kb,
            current_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn capacity_kb(&self) -> u64 {
        self.capacity_kb
    }

    /// Increment epoch and return the new value.
    ///
    /// Call on feed reload to invalidate all pending thumbnail requests.
    pub fn increment_epoch(&self) -> u64 {
        let new_epoch = self.current_epoch.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Epoch incremented: {}", new_epoch);
        new_epoch
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Relaxed)
    }

    /// Shared epoch counter (for Workers).
    pub fn epoch_ref(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.current_epoch)
    }
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIVISOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_an_eighth_of_process_memory() {
        let mut sys = System::new_all();
        sys.refresh_memory();
        let max_kb = sys.total_memory() / 1024;

        let budget = CacheBudget::new(8);
        assert_eq!(budget.capacity_kb(), max_kb / 8);
    }

    #[test]
    fn test_explicit_capacity() {
        let budget = CacheBudget::with_capacity_kb(1000);
        assert_eq!(budget.capacity_kb(), 1000);
    }

    #[test]
    fn test_epoch_increment() {
        let budget = CacheBudget::with_capacity_kb(1);
        assert_eq!(budget.current_epoch(), 0);
        assert_eq!(budget.increment_epoch(), 1);
        assert_eq!(budget.increment_epoch(), 2);
        assert_eq!(budget.current_epoch(), 2);
    }
}
