use super::constants::CLASS_COUNT;
use super::size_class::SizeClass;
use serde::Serialize;

/// Lifetime counters of one allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocatorMetrics {
    /// Successful `allocate` calls.
    pub allocations: usize,
    /// `release` calls.
    pub releases: usize,
    /// Superblocks mapped from the page source.
    pub pages_mapped: usize,
    /// Superblocks returned to the page source.
    pub pages_unmapped: usize,
}

impl AllocatorMetrics {
    pub(crate) const fn new() -> Self {
        Self {
            allocations: 0,
            releases: 0,
            pages_mapped: 0,
            pages_unmapped: 0,
        }
    }

    /// Superblocks currently mapped.
    pub fn live_pages(&self) -> usize {
        self.pages_mapped - self.pages_unmapped
    }
}

/// Snapshot of one size-class pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Size class index.
    pub class: usize,
    /// Bytes per slot.
    pub slot_size: usize,
    /// Superblocks linked into the pool.
    pub superblocks: usize,
    /// Free slots across those superblocks.
    pub free_slots: usize,
    /// Superblocks with every usable slot free.
    pub whole_superblocks: usize,
}

/// Snapshot of a whole allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    /// One entry per size class, smallest first.
    pub pools: [PoolStats; CLASS_COUNT],
    /// Lifetime counters.
    pub metrics: AllocatorMetrics,
}

impl AllocatorStats {
    /// Slots currently handed out, across all classes.
    pub fn slots_in_use(&self) -> usize {
        self.pools
            .iter()
            .map(|p| p.superblocks * SizeClass::ALL[p.class].usable_slots() - p.free_slots)
            .sum()
    }
}
