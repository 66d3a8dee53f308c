//! Memory budget for resident animation items
//!
//! **Why**: Decoded animations are raw RGBA; a few hundred stickers can take
//! gigabytes. The budget tracks resident bytes against a limit derived from
//! available system memory so the cache knows when to evict.
//!
//! **Used by**: MemoryAnimationCache (insert/evict accounting)

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use sysinfo::System;

use crate::config::CacheConfig;

/// Byte budget shared by one cache
#[derive(Debug)]
pub struct MemoryBudget {
    /// Tracked usage (bytes)
    usage: AtomicUsize,
    /// Maximum allowed bytes, atomic so the limit can change at runtime
    limit: AtomicUsize,
}

impl MemoryBudget {
    /// Budget of `mem_fraction` of available memory after keeping `reserve_mb` free.
    ///
    /// ```rust,no_run
    /// # use multianim::core::cache_man::MemoryBudget;
    /// let budget = MemoryBudget::new(0.25, 512); // quarter of what's left after 512 MB
    /// ```
    pub fn new(mem_fraction: f64, reserve_mb: u64) -> Self {
        let (available, limit) = system_limit(mem_fraction, reserve_mb);
        info!(
            "MemoryBudget init: available={} MB, reserve={} MB, limit={} MB ({}%)",
            available / 1024 / 1024,
            reserve_mb,
            limit / 1024 / 1024,
            (mem_fraction * 100.0) as u32
        );
        Self::with_limit(limit)
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.mem_fraction, config.reserve_mb)
    }

    /// Fixed limit in bytes, no system query
    pub fn with_limit(limit: usize) -> Self {
        Self {
            usage: AtomicUsize::new(0),
            limit: AtomicUsize::new(limit),
        }
    }

    /// Usage above limit
    pub fn over_limit(&self) -> bool {
        self.usage.load(Ordering::Relaxed) > self.limit.load(Ordering::Relaxed)
    }

    /// (usage, limit) in bytes
    pub fn mem(&self) -> (usize, usize) {
        (self.usage.load(Ordering::Relaxed), self.limit.load(Ordering::Relaxed))
    }

    /// Usage fraction (0.0-1.0, may exceed 1.0 when over budget)
    pub fn usage_fraction(&self) -> f64 {
        let (usage, limit) = self.mem();
        if limit == 0 { 0.0 } else { usage as f64 / limit as f64 }
    }

    pub fn add(&self, bytes: usize) {
        let usage = self.usage.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let limit = self.limit.load(Ordering::Relaxed);
        if usage > limit {
            debug!("Memory budget exceeded: {} KB / {} KB", usage / 1024, limit / 1024);
        }
    }

    /// Saturating: never underflows
    pub fn free(&self, bytes: usize) {
        let _ = self
            .usage
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| Some(current.saturating_sub(bytes)));
    }

    pub fn set_limit(&self, limit: usize) {
        self.limit.store(limit, Ordering::Relaxed);
        info!("Memory budget limit updated: {} MB", limit / 1024 / 1024);
    }
}

/// (available, limit) bytes for the current machine
fn system_limit(mem_fraction: f64, reserve_mb: u64) -> (usize, usize) {
    let mut sys = System::new();
    sys.refresh_memory();

    let available = sys.available_memory() as usize;
    let reserve = (reserve_mb as usize).saturating_mul(1024 * 1024);
    let usable = available.saturating_sub(reserve);
    (available, (usable as f64 * mem_fraction.clamp(0.0, 1.0)) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_creation() {
        let budget = MemoryBudget::new(0.5, 256);
        let (usage, _limit) = budget.mem();
        assert_eq!(usage, 0);
    }

    #[test]
    fn test_memory_tracking() {
        let budget = MemoryBudget::with_limit(1024 * 1024);

        budget.add(512 * 1024);
        assert_eq!(budget.mem().0, 512 * 1024);
        assert!(!budget.over_limit());
        assert_eq!(budget.usage_fraction(), 0.5);

        budget.add(1024 * 1024);
        assert!(budget.over_limit());

        budget.free(1024 * 1024);
        assert_eq!(budget.mem().0, 512 * 1024);
    }

    #[test]
    fn test_free_saturates() {
        let budget = MemoryBudget::with_limit(100);
        budget.add(10);
        budget.free(50);
        assert_eq!(budget.mem().0, 0);
    }

    #[test]
    fn test_zero_limit_fraction() {
        let budget = MemoryBudget::with_limit(0);
        assert_eq!(budget.usage_fraction(), 0.0);
        budget.set_limit(10);
        budget.add(5);
        assert_eq!(budget.usage_fraction(), 0.5);
    }
}
