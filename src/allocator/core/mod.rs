//! Entry points: the explicit [`SuperblockAllocator`] context and the
//! [`SuperblockGlobal`] singleton for `#[global_allocator]`.

/// Allocation, release and the release policy.
pub mod engine;
pub mod global;

pub use engine::SuperblockAllocator;
pub use global::SuperblockGlobal;
