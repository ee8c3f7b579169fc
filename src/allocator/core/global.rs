//! Process-wide allocator.
//!
//! [`SuperblockGlobal`] wraps one [`SuperblockAllocator`] so it can be
//! registered with `#[global_allocator]`. The wrapped state is unsynchronized;
//! the first thread to enter it becomes its owner and every other thread is
//! refused with a fatal diagnostic.
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOC: sbmalloc::SuperblockGlobal = sbmalloc::SuperblockGlobal::new();
//! ```
//!
//! Requests above 2048 bytes (size or alignment) return null, which the
//! standard library reports through `handle_alloc_error`.

use super::engine::SuperblockAllocator;
use crate::allocator::error::AllocError;
use crate::allocator::page::SyscallPages;
use crate::allocator::stats::AllocatorStats;
use crate::allocator::thread::{fatal, ThreadOwner};
use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};

/// A [`SuperblockAllocator`] usable as the process allocator.
pub struct SuperblockGlobal {
    heap: UnsafeCell<SuperblockAllocator<SyscallPages>>,
    owner: ThreadOwner,
    busy: AtomicBool,
}

// Safety: `heap` is only reached through `enter`, which admits the owning
// thread alone and rejects re-entry, so there is never more than one live
// reference to it.
unsafe impl Sync for SuperblockGlobal {}

impl SuperblockGlobal {
    /// An allocator with empty pools and no owner yet.
    pub const fn new() -> Self {
        Self {
            heap: UnsafeCell::new(SuperblockAllocator::new()),
            owner: ThreadOwner::new(),
            busy: AtomicBool::new(false),
        }
    }

    /// Binds the allocator to the calling thread ahead of its first use.
    ///
    /// # Errors
    /// [`AllocError::ForeignThread`] if another thread already owns it.
    pub fn claim_current_thread(&self) -> Result<(), AllocError> {
        self.owner.claim()
    }

    /// Snapshot of the wrapped allocator.
    ///
    /// # Errors
    /// [`AllocError::ForeignThread`] when called from a thread that does not own it.
    pub fn stats(&self) -> Result<AllocatorStats, AllocError> {
        self.owner.claim()?;
        Ok(self.enter().stats())
    }

    /// Walks every pool of the wrapped allocator.
    ///
    /// # Errors
    /// [`AllocError::ForeignThread`] from a non-owning thread, otherwise the
    /// result of [`SuperblockAllocator::check_consistency`].
    pub fn check_consistency(&self) -> Result<(), AllocError> {
        self.owner.claim()?;
        self.enter().check_consistency()
    }

    fn enter(&self) -> Entered<'_> {
        if self.owner.claim().is_err() {
            fatal("allocator entered from a thread other than its owner");
        }
        if self.busy.swap(true, Ordering::Acquire) {
            fatal("allocator re-entered while already running");
        }
        Entered { global: self }
    }
}

impl Default for SuperblockGlobal {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the wrapped allocator for the duration of one call.
struct Entered<'a> {
    global: &'a SuperblockGlobal,
}

impl Deref for Entered<'_> {
    type Target = SuperblockAllocator<SyscallPages>;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.global.heap.get() }
    }
}

impl DerefMut for Entered<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.global.heap.get() }
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.global.busy.store(false, Ordering::Release);
    }
}

unsafe impl GlobalAlloc for SuperblockGlobal {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // A slot is aligned to its own size, so asking for `align` bytes buys the alignment.
        let size = layout.size().max(layout.align());
        let mut heap = self.enter();

        match heap.allocate(size) {
            Ok(ptr) => ptr.as_ptr(),
            Err(err) if err.is_fatal() => fatal("superblock pool bookkeeping diverged"),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        self.enter().release(ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_layouts_through_global_alloc() {
        let global = SuperblockGlobal::new();
        unsafe {
            let layout = Layout::from_size_align(40, 8).unwrap();
            let a = global.alloc(layout);
            assert!(!a.is_null());
            assert_eq!(a as usize % 64, 0);

            // Alignment larger than size picks the class by alignment.
            let aligned = Layout::from_size_align(8, 256).unwrap();
            let b = global.alloc(aligned);
            assert_eq!(b as usize % 256, 0);

            assert!(global.alloc(Layout::from_size_align(4096, 8).unwrap()).is_null());

            global.dealloc(a, layout);
            global.dealloc(b, aligned);
            global.dealloc(ptr::null_mut(), layout);
        }

        let stats = global.stats().unwrap();
        assert_eq!(stats.metrics.allocations, 2);
        assert_eq!(stats.metrics.releases, 2);
        assert_eq!(stats.slots_in_use(), 0);
        assert!(global.check_consistency().is_ok());
    }

    #[test]
    fn foreign_thread_is_refused() {
        let global = SuperblockGlobal::new();
        global.claim_current_thread().unwrap();
        std::thread::scope(|s| {
            let res = s.spawn(|| global.stats().map(|_| ())).join().unwrap();
            assert_eq!(res, Err(AllocError::ForeignThread));
        });
    }
}
