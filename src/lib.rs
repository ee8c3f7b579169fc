//! # `sbmalloc` - Size-Classed Superblock Allocator
//!
//! A standalone, single-threaded `malloc`/`free` replacement that takes its
//! memory straight from the OS one page at a time and never delegates to
//! another general-purpose allocator.
//!
//! ## Architecture
//!
//! ```text
//!   allocate(size)                         release(ptr)
//!        │                                      │
//!        ▼                                      ▼
//!   SizeClass::classify ──► pools[class]   ptr & SUPERBLOCK_MASK ──► Header
//!                              │                                      │
//!                              ▼                                      ▼
//!   ┌────────────── SuperblockPool ───────────────┐        push slot, poison,
//!   │ head ─► [Header|slot|slot|..] ─► [Header|..] │        update counters,
//!   │ free_total, whole                            │        maybe unmap a whole
//!   └──────────────────────────────────────────────┘        superblock
//! ```
//!
//! - **Size classes**: 32, 64, 128, 256, 512, 1024 and 2048 byte slots. Requests
//!   round up to the smallest class that fits; 0 and anything above 2048 fail.
//! - **Superblocks**: one 4KB, page-aligned mapping per superblock, holding
//!   slots of a single class. The first slot stores the bookkeeping header, so
//!   a slot's superblock is found by masking its address.
//! - **Pools**: one list of superblocks per class with the total number of free
//!   slots and the number of superblocks that are entirely free ("whole").
//! - **Release policy**: a pool keeps at most two whole superblocks; the
//!   release that completes a third unlinks it and unmaps it.
//!
//! ## Threading
//!
//! There is no locking. [`SuperblockAllocator`] is an ordinary value used
//! through `&mut self`. [`SuperblockGlobal`] binds itself to the first thread
//! that uses it and aborts with a diagnostic when any other thread enters.
//!
//! ## Example
//!
//! ```rust
//! use sbmalloc::{AllocError, SuperblockAllocator};
//!
//! let mut heap = SuperblockAllocator::new();
//!
//! let a = heap.allocate(40).unwrap();
//! assert_eq!(a.as_ptr() as usize % 64, 0);
//! assert_eq!(heap.allocate(4096), Err(AllocError::OutOfRange { size: 4096 }));
//!
//! unsafe { heap.release(a) };
//! assert_eq!(heap.stats().slots_in_use(), 0);
//! ```
//!
//! ## Features
//!
//! - `alloc-poison`: fill every slot handed out with `0xcd`.
//! - `deny-threads`: export a `pthread_create` that aborts (Unix).

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_safety_doc)]

pub mod allocator;

pub use allocator::constants;
pub use allocator::error::AllocError;
pub use allocator::page::{PageSource, SyscallPages};
pub use allocator::size_class::SizeClass;
pub use allocator::stats::{AllocatorMetrics, AllocatorStats, PoolStats};
pub use allocator::{SuperblockAllocator, SuperblockGlobal};
