use super::constants::PAGE_SIZE;
use super::syscall::{allocate_region, free_region};
use core::ptr::NonNull;

/// A source of superblock pages.
///
/// Pages are [`PAGE_SIZE`] bytes, aligned to [`PAGE_SIZE`] and zero-filled. The
/// allocator recovers a superblock header by masking slot addresses, so an
/// implementation that returns misaligned memory breaks every release.
pub trait PageSource {
    /// Maps one page, or returns `None` if no memory is available.
    fn map_page(&self) -> Option<NonNull<u8>>;

    /// Returns a page to its origin.
    ///
    /// # Safety
    /// `page` must come from `map_page` on this source and must not be used afterwards.
    unsafe fn unmap_page(&self, page: NonNull<u8>);
}

/// Pages mapped straight from the OS (`mmap` / `VirtualAlloc`).
#[derive(Default, Clone, Copy, Debug)]
pub struct SyscallPages;

impl PageSource for SyscallPages {
    fn map_page(&self) -> Option<NonNull<u8>> {
        // Anonymous mappings start on an OS page boundary, which is at least 4KB.
        let ptr = unsafe { allocate_region(PAGE_SIZE)? };
        debug_assert_eq!(ptr as usize % PAGE_SIZE, 0);
        NonNull::new(ptr)
    }

    unsafe fn unmap_page(&self, page: NonNull<u8>) {
        let ok = free_region(page.as_ptr(), PAGE_SIZE);
        debug_assert!(ok, "failed to unmap superblock at {page:p}");
    }
}

impl<P: PageSource + ?Sized> PageSource for &P {
    fn map_page(&self) -> Option<NonNull<u8>> {
        (**self).map_page()
    }

    unsafe fn unmap_page(&self, page: NonNull<u8>) {
        (**self).unmap_page(page);
    }
}
