use crate::allocator::constants::{CLASS_COUNT, RESERVE_SUPERBLOCK_THRESHOLD};
use crate::allocator::error::AllocError;
use crate::allocator::page::{PageSource, SyscallPages};
use crate::allocator::pool::SuperblockPool;
use crate::allocator::size_class::SizeClass;
use crate::allocator::stats::{AllocatorMetrics, AllocatorStats, PoolStats};
use crate::allocator::superblock::Header;
use core::ptr::NonNull;
use tracing::{debug, error, warn};

/// A single-threaded, size-classed superblock allocator.
///
/// Owns one superblock pool per size class. Requests of 1 to 2048 bytes are
/// rounded up to a power-of-two slot of at least 32 bytes and served from a
/// one-page superblock of that class. Superblocks are mapped on demand; once a
/// pool holds more than [`RESERVE_SUPERBLOCK_THRESHOLD`] whole superblocks, the
/// release that completes another one unmaps it.
///
/// Every slot is aligned to its own size, so a request of `n` bytes is also
/// aligned to `n.next_power_of_two()`.
///
/// The type is neither `Send` nor `Sync`. Dropping it unmaps every
/// superblock, including slots still handed out.
///
/// # Examples
///
/// ```
/// use sbmalloc::SuperblockAllocator;
///
/// let mut heap = SuperblockAllocator::new();
/// let ptr = heap.allocate(24).unwrap();
/// unsafe {
///     ptr.as_ptr().write_bytes(7, 24);
///     heap.release(ptr);
/// }
/// assert_eq!(heap.allocate(24).unwrap(), ptr);
/// ```
pub struct SuperblockAllocator<P: PageSource = SyscallPages> {
    pools: [SuperblockPool; CLASS_COUNT],
    pages: P,
    metrics: AllocatorMetrics,
}

impl SuperblockAllocator<SyscallPages> {
    /// An empty allocator that maps pages straight from the OS.
    pub const fn new() -> Self {
        Self::with_pages(SyscallPages)
    }
}

impl Default for SuperblockAllocator<SyscallPages> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PageSource> SuperblockAllocator<P> {
    /// An empty allocator drawing superblocks from `pages`.
    pub const fn with_pages(pages: P) -> Self {
        Self {
            pools: [
                SuperblockPool::new(),
                SuperblockPool::new(),
                SuperblockPool::new(),
                SuperblockPool::new(),
                SuperblockPool::new(),
                SuperblockPool::new(),
                SuperblockPool::new(),
            ],
            pages,
            metrics: AllocatorMetrics::new(),
        }
    }

    /// The page source backing this allocator.
    pub fn pages(&self) -> &P {
        &self.pages
    }

    /// Hands out a slot of at least `size` bytes.
    ///
    /// On failure no allocator state is modified.
    ///
    /// # Errors
    /// - [`AllocError::OutOfRange`] for `0` or more than 2048 bytes.
    /// - [`AllocError::ResourceExhausted`] if a superblock was needed and the
    ///   page source had none.
    /// - [`AllocError::InternalInconsistency`] if the pool claims free slots that
    ///   none of its superblocks have. State must not be trusted afterwards.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let class = SizeClass::classify(size)?;
        let pool = &mut self.pools[class.index()];

        let sb = if pool.free_total() == 0 {
            let sb = match Header::create(&self.pages, class) {
                Some(sb) => sb,
                None => {
                    warn!(%class, "page source refused a new superblock");
                    return Err(AllocError::ResourceExhausted { class: class.index() });
                }
            };
            unsafe { pool.link(sb) };
            self.metrics.pages_mapped += 1;
            debug!(%class, superblock = ?sb, "mapped superblock");
            sb
        } else {
            match pool.first_with_free() {
                Some(sb) => sb,
                None => {
                    error!(%class, free_total = pool.free_total(), "pool counts free slots but no superblock has one");
                    return Err(pool.inconsistency(class));
                }
            }
        };

        let header = unsafe { &mut *sb.as_ptr() };
        let Some((slot, was_whole)) = header.pop() else {
            error!(%class, superblock = ?sb, "superblock with a free count has an empty free list");
            return Err(pool.inconsistency(class));
        };
        pool.on_pop(was_whole);
        self.metrics.allocations += 1;
        Ok(slot)
    }

    /// Takes back a slot and applies the release policy.
    ///
    /// The slot goes to the front of its superblock's free list, so the next
    /// allocation of the same class returns it. Its bytes past the first
    /// machine word are overwritten with [`FREE_POISON`](crate::allocator::constants::FREE_POISON).
    ///
    /// # Safety
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on this
    /// allocator and not released since. Anything else is undefined behaviour;
    /// debug builds catch some of it.
    pub unsafe fn release(&mut self, ptr: NonNull<u8>) {
        let sb = Header::from_slot(ptr);
        let header = &mut *sb.as_ptr();
        debug_assert!(header.has_valid_magic(), "released {ptr:p} is not inside a superblock");

        let class = header.class();
        debug_assert_eq!(
            (ptr.as_ptr() as usize - sb.as_ptr() as usize) % class.slot_size(),
            0,
            "released {ptr:p} is not on a slot boundary"
        );

        let became_whole = header.push(ptr);
        let pool = &mut self.pools[class.index()];
        pool.on_push(became_whole);
        self.metrics.releases += 1;

        if pool.whole() > RESERVE_SUPERBLOCK_THRESHOLD {
            let victim = if became_whole { Some(sb) } else { pool.first_whole() };
            if let Some(victim) = victim {
                self.return_to_os(class, victim);
            }
        }
    }

    /// Unlinks a whole superblock and only then unmaps it.
    unsafe fn return_to_os(&mut self, class: SizeClass, sb: NonNull<Header>) {
        let pool = &mut self.pools[class.index()];
        if !pool.unlink(sb) {
            error!(%class, superblock = ?sb, "whole superblock missing from its pool; leaving it mapped");
            return;
        }
        self.pages.unmap_page(sb.as_ref().base());
        self.metrics.pages_unmapped += 1;
        debug!(%class, superblock = ?sb, "returned superblock to the OS");
    }

    /// Counters of one size class.
    pub fn pool_stats(&self, class: SizeClass) -> PoolStats {
        let pool = &self.pools[class.index()];
        PoolStats {
            class: class.index(),
            slot_size: class.slot_size(),
            superblocks: pool.superblocks(),
            free_slots: pool.free_total(),
            whole_superblocks: pool.whole(),
        }
    }

    /// Counters of every pool plus lifetime metrics.
    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            pools: SizeClass::ALL.map(|class| self.pool_stats(class)),
            metrics: self.metrics,
        }
    }

    /// Base addresses of the superblocks of `class`, in pool order.
    pub fn superblocks(&self, class: SizeClass) -> impl Iterator<Item = NonNull<u8>> + '_ {
        self.pools[class.index()].iter().map(|sb| sb.cast::<u8>())
    }

    /// Walks every pool and checks that its counters match its superblocks.
    ///
    /// # Errors
    /// [`AllocError::InternalInconsistency`] naming the first diverging class.
    pub fn check_consistency(&self) -> Result<(), AllocError> {
        for class in SizeClass::ALL {
            self.pools[class.index()].check(class)?;
        }
        Ok(())
    }
}

impl<P: PageSource> Drop for SuperblockAllocator<P> {
    fn drop(&mut self) {
        for pool in &mut self.pools {
            for sb in pool.drain() {
                unsafe { self.pages.unmap_page(sb.as_ref().base()) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::constants::{FREE_POISON, PAGE_SIZE, SUPERBLOCK_MASK};
    use std::collections::HashSet;

    fn class_of(size: usize) -> SizeClass {
        SizeClass::classify(size).unwrap()
    }

    #[test]
    fn exhaustion_maps_a_second_superblock() {
        let mut heap = SuperblockAllocator::new();
        let class = class_of(32);

        let mut seen = HashSet::new();
        let mut pages = HashSet::new();
        for _ in 0..127 {
            let p = heap.allocate(32).unwrap();
            assert!(seen.insert(p.as_ptr() as usize));
            pages.insert(p.as_ptr() as usize & SUPERBLOCK_MASK);
        }
        assert_eq!(pages.len(), 1);
        assert_eq!(heap.pool_stats(class).superblocks, 1);
        assert_eq!(heap.pool_stats(class).free_slots, 0);

        let extra = heap.allocate(32).unwrap();
        let extra_page = extra.as_ptr() as usize & SUPERBLOCK_MASK;
        assert!(!pages.contains(&extra_page));
        assert_eq!(extra_page % PAGE_SIZE, 0);
        assert_eq!(heap.pool_stats(class).superblocks, 2);
        assert_eq!(heap.pool_stats(class).free_slots, 126);
        assert!(heap.check_consistency().is_ok());
    }

    #[test]
    fn release_then_allocate_reuses_slot() {
        let mut heap = SuperblockAllocator::new();
        let a = heap.allocate(100).unwrap();
        let _b = heap.allocate(100).unwrap();
        unsafe { heap.release(a) };
        assert_eq!(heap.allocate(128).unwrap(), a);
    }

    #[test]
    fn released_slot_is_poisoned() {
        let mut heap = SuperblockAllocator::new();
        let keep = heap.allocate(64).unwrap();
        let p = heap.allocate(64).unwrap();
        unsafe {
            p.as_ptr().write_bytes(0, 64);
            heap.release(p);
            let bytes = core::slice::from_raw_parts(p.as_ptr(), 64);
            let word = core::mem::size_of::<usize>();
            assert!(bytes[word..].iter().all(|&b| b == FREE_POISON));
            heap.release(keep);
        }
    }

    #[test]
    fn whole_accounting_follows_releases() {
        let mut heap = SuperblockAllocator::new();
        let class = class_of(1);

        let ptrs: Vec<_> = (0..127).map(|_| heap.allocate(1).unwrap()).collect();
        assert_eq!(heap.pool_stats(class).whole_superblocks, 0);

        for (i, &p) in ptrs.iter().enumerate() {
            unsafe { heap.release(p) };
            let stats = heap.pool_stats(class);
            assert_eq!(stats.free_slots, i + 1);
            assert_eq!(stats.whole_superblocks, usize::from(i == 126));
        }
        assert!(heap.check_consistency().is_ok());

        // Leaving the whole state again is counted.
        let p = heap.allocate(1).unwrap();
        assert_eq!(heap.pool_stats(class).whole_superblocks, 0);
        unsafe { heap.release(p) };
        assert_eq!(heap.pool_stats(class).whole_superblocks, 1);
    }

    #[test]
    fn drifted_free_total_is_reported_without_mutation() {
        let mut heap = SuperblockAllocator::new();
        let class = class_of(32);
        let _first = heap.allocate(32).unwrap();

        // Count a release that never happened, then hand out every real slot.
        heap.pools[class.index()].on_push(false);
        let _rest: Vec<_> = (1..class.usable_slots()).map(|_| heap.allocate(32).unwrap()).collect();
        assert_eq!(heap.pool_stats(class).free_slots, 1);

        let before = heap.stats();
        let err = heap.allocate(32).unwrap_err();
        assert_eq!(err, AllocError::InternalInconsistency { class: 0, free_total: 1 });
        assert!(err.is_fatal());
        assert_eq!(heap.stats(), before);
        assert_eq!(heap.check_consistency(), Err(err));

        // Other classes are unaffected.
        assert!(heap.allocate(64).is_ok());
        assert_eq!(heap.pool_stats(class).superblocks, 1);
    }

    #[test]
    fn out_of_range_touches_nothing() {
        let mut heap = SuperblockAllocator::new();
        assert_eq!(heap.allocate(0), Err(AllocError::OutOfRange { size: 0 }));
        assert_eq!(heap.allocate(2049), Err(AllocError::OutOfRange { size: 2049 }));
        assert_eq!(heap.stats().metrics, AllocatorMetrics::default());
        assert!(heap.stats().pools.iter().all(|p| p.superblocks == 0));
    }

    #[test]
    fn third_whole_superblock_is_unmapped() {
        let mut heap = SuperblockAllocator::new();
        let class = class_of(2048);

        // One usable slot per 2048-byte superblock: four allocations, four superblocks.
        let ptrs: Vec<_> = (0..4).map(|_| heap.allocate(2048).unwrap()).collect();
        assert_eq!(heap.pool_stats(class).superblocks, 4);

        unsafe {
            heap.release(ptrs[0]);
            heap.release(ptrs[1]);
            assert_eq!(heap.stats().metrics.pages_unmapped, 0);
            assert_eq!(heap.pool_stats(class).whole_superblocks, 2);

            heap.release(ptrs[2]);
        }
        let stats = heap.pool_stats(class);
        assert_eq!(heap.stats().metrics.pages_unmapped, 1);
        assert_eq!(stats.superblocks, 3);
        assert_eq!(stats.whole_superblocks, 2);
        assert_eq!(stats.free_slots, 2);

        let unmapped = ptrs[2].as_ptr() as usize & SUPERBLOCK_MASK;
        assert!(heap.superblocks(class).all(|sb| sb.as_ptr() as usize != unmapped));
        assert!(heap.check_consistency().is_ok());
    }
}
