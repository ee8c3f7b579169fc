#![cfg(unix)]

use libc::{c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use std::ptr;

/// Maps `size` bytes of private, anonymous, zero-filled memory.
/// Returns a pointer to the start of the region, or None if the kernel refused.
pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    let ptr = mmap(
        ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
    );

    if ptr == MAP_FAILED {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

/// Unmaps a region obtained from [`allocate_region`].
pub unsafe fn free_region(ptr: *mut u8, size: usize) -> bool {
    munmap(ptr as *mut c_void, size) == 0
}

/// A non-zero identifier for the calling thread. Never allocates.
pub fn current_thread_id() -> usize {
    // pthread_t is an integer or pointer depending on the platform; either way
    // it is non-zero for a live thread.
    unsafe { libc::pthread_self() as usize }
}

/// Writes `msg` to fd 2 without going through `std::io`.
pub fn write_stderr(msg: &[u8]) {
    let mut rest = msg;
    while !rest.is_empty() {
        let n = unsafe { libc::write(libc::STDERR_FILENO, rest.as_ptr() as *const c_void, rest.len()) };
        if n <= 0 {
            return;
        }
        rest = &rest[n as usize..];
    }
}
