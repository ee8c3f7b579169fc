//! Thin wrappers over the OS primitives the allocator needs: anonymous page
//! mappings, a thread identity, and an allocation-free stderr write.

/// `mmap`, `pthread_self` and `write(2)`.
#[cfg(unix)]
pub mod unix;

/// `VirtualAlloc`, `GetCurrentThreadId` and `WriteFile`.
#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use unix::*;

#[cfg(windows)]
pub use windows::*;
