#![cfg(windows)]

use std::ptr;
use windows_sys::Win32::Storage::FileSystem::WriteFile;
use windows_sys::Win32::System::Console::{GetStdHandle, STD_ERROR_HANDLE};
use windows_sys::Win32::System::Memory::{VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;

/// Reserves and commits `size` bytes of zeroed read-write memory.
///
/// # Safety
/// The region must be released with [`free_region`] only.
pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    let ptr = VirtualAlloc(ptr::null_mut(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
    if ptr.is_null() {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

/// Releases a region obtained from [`allocate_region`].
///
/// # Safety
/// `ptr` must be the start of a live region and must not be used afterwards.
pub unsafe fn free_region(ptr: *mut u8, _size: usize) -> bool {
    // MEM_RELEASE frees the entire region reserved by VirtualAlloc. Size must be 0.
    VirtualFree(ptr as *mut _, 0, MEM_RELEASE) != 0
}

/// A non-zero identifier for the calling thread. Never allocates.
pub fn current_thread_id() -> usize {
    // Thread ids are never zero on Windows.
    unsafe { GetCurrentThreadId() as usize }
}

/// Writes `msg` to the process error handle without going through `std::io`.
pub fn write_stderr(msg: &[u8]) {
    unsafe {
        let handle = GetStdHandle(STD_ERROR_HANDLE);
        let mut written = 0u32;
        WriteFile(handle, msg.as_ptr(), msg.len() as u32, &mut written, ptr::null_mut());
    }
}
