//! The allocator proper: size classes, superblocks, pools and the two entry points.

/// Fixed geometry and poison bytes.
pub mod constants;
pub mod core;
/// Allocation failures.
pub mod error;
/// Where superblock pages come from.
pub mod page;
pub(crate) mod pool;
/// Request size to slot size mapping.
pub mod size_class;
/// Counter snapshots.
pub mod stats;
pub(crate) mod superblock;
pub mod syscall;
pub mod thread;

pub use self::core::{SuperblockAllocator, SuperblockGlobal};
