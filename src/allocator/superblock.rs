//! Superblock layout.
//!
//! A superblock is one [`PAGE_SIZE`] page divided into slots of a single size
//! class. The first slot is taken by the [`Header`]; the rest are handed out.
//!
//! ```text
//!   page base (PAGE_SIZE aligned)
//!   ┌──────────┬──────────┬──────────┬─────┬──────────┐
//!   │  Header  │  slot 1  │  slot 2  │ ... │  slot N  │
//!   └──────────┴──────────┴──────────┴─────┴──────────┘
//!   ◄─ slot ──►
//! ```
//!
//! A free slot starts with a [`FreeSlot`] link word. An allocated slot is
//! entirely the caller's; the link word is only read or written while the slot
//! is on the free list.

use super::constants::{ALLOC_POISON, FREE_POISON, MIN_ALLOC, PAGE_SIZE, SUPERBLOCK_MASK};
use super::page::PageSource;
use super::size_class::SizeClass;
use core::mem::size_of;
use core::ptr::{self, NonNull};

/// Marks a page as a live superblock. Checked on release in debug builds.
const HEADER_MAGIC: u32 = 0x5342_4c4b;

/// The view of a slot while it sits on a free list.
#[repr(C)]
pub(crate) struct FreeSlot {
    next: *mut FreeSlot,
}

/// Bookkeeping stored in the first slot of every superblock.
#[repr(C)]
pub(crate) struct Header {
    /// Next superblock in the owning pool.
    pub(crate) next: *mut Header,
    free_list: *mut FreeSlot,
    free_count: u16,
    class: u8,
    in_use: bool,
    magic: u32,
}

// The header has to fit in the smallest slot it displaces.
const _: () = assert!(size_of::<Header>() <= MIN_ALLOC);
const _: () = assert!(size_of::<FreeSlot>() <= MIN_ALLOC);

impl Header {
    /// Maps a page and lays out a fresh superblock for `class`.
    ///
    /// Every usable slot ends up on the free list exactly once; the resulting
    /// list order is highest address first. The pool link is left null.
    pub(crate) fn create<P: PageSource>(pages: &P, class: SizeClass) -> Option<NonNull<Header>> {
        let page = pages.map_page()?;
        let base = page.as_ptr();
        let slot_size = class.slot_size();
        let usable = class.usable_slots();

        unsafe {
            let header = base as *mut Header;
            let mut free_list: *mut FreeSlot = ptr::null_mut();
            // Skip slot 0; it belongs to the header.
            for i in 1..=usable {
                let slot = base.add(i * slot_size) as *mut FreeSlot;
                (*slot).next = free_list;
                free_list = slot;
            }

            ptr::write(
                header,
                Header {
                    next: ptr::null_mut(),
                    free_list,
                    free_count: usable as u16,
                    class: class.raw(),
                    in_use: false,
                    magic: HEADER_MAGIC,
                },
            );
            Some(NonNull::new_unchecked(header))
        }
    }

    /// Recovers the header of the superblock containing `slot`.
    ///
    /// Sound only because every superblock is exactly one page and starts on a
    /// page boundary, so clearing the in-page offset lands on slot 0.
    #[inline]
    pub(crate) fn from_slot(slot: NonNull<u8>) -> NonNull<Header> {
        let addr = slot.as_ptr() as usize & SUPERBLOCK_MASK;
        // A slot is never in the header slot, so a valid slot never masks to 0.
        unsafe { NonNull::new_unchecked(addr as *mut Header) }
    }

    pub(crate) fn class(&self) -> SizeClass {
        match SizeClass::from_raw(self.class) {
            Some(class) => class,
            None => unreachable!("superblock header carries class index {}", self.class),
        }
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free_count as usize
    }

    /// Whether no slot is currently handed out.
    pub(crate) fn is_whole(&self) -> bool {
        self.free_count() == self.class().usable_slots()
    }

    pub(crate) fn in_use(&self) -> bool {
        self.in_use
    }

    pub(crate) fn has_valid_magic(&self) -> bool {
        self.magic == HEADER_MAGIC
    }

    pub(crate) fn base(&self) -> NonNull<u8> {
        NonNull::from(self).cast()
    }

    /// Takes the first slot off the free list.
    ///
    /// Returns the slot and whether the superblock was whole before the pop.
    pub(crate) fn pop(&mut self) -> Option<(NonNull<u8>, bool)> {
        let slot = NonNull::new(self.free_list)?;
        // The head is on the free list, so its link word is ours to read.
        self.free_list = unsafe { (*slot.as_ptr()).next };
        self.free_count -= 1;
        let was_whole = !self.in_use;
        self.in_use = true;

        if cfg!(feature = "alloc-poison") {
            unsafe { ptr::write_bytes(slot.as_ptr().cast::<u8>(), ALLOC_POISON, self.class().slot_size()) };
        }
        Some((slot.cast(), was_whole))
    }

    /// Puts a caller's slot back on the free list and poisons its payload.
    ///
    /// Returns whether the superblock became whole. If it did, the in-use flag
    /// is cleared so the next [`pop`](Self::pop) reports it as leaving the whole state.
    ///
    /// # Safety
    /// `slot` must be a slot of this superblock that is currently handed out.
    pub(crate) unsafe fn push(&mut self, slot: NonNull<u8>) -> bool {
        let slot_size = self.class().slot_size();
        let link = slot.as_ptr() as *mut FreeSlot;

        (*link).next = self.free_list;
        self.free_list = link;
        self.free_count += 1;

        let word = size_of::<FreeSlot>();
        ptr::write_bytes(slot.as_ptr().add(word), FREE_POISON, slot_size - word);

        if self.is_whole() {
            self.in_use = false;
            true
        } else {
            false
        }
    }

    /// Counts the slots reachable from the free-list head.
    pub(crate) fn walk_free_list(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.free_list;
        while !cursor.is_null() && count <= PAGE_SIZE / MIN_ALLOC {
            count += 1;
            cursor = unsafe { (*cursor).next };
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::page::SyscallPages;
    use std::collections::HashSet;

    #[test]
    fn fresh_superblock_layout() {
        for class in SizeClass::ALL {
            let header = Header::create(&SyscallPages, class).unwrap();
            let sb = unsafe { &mut *header.as_ptr() };
            let base = sb.base().as_ptr() as usize;

            assert_eq!(base % PAGE_SIZE, 0);
            assert_eq!(sb.class(), class);
            assert_eq!(sb.free_count(), class.usable_slots());
            assert!(sb.is_whole());
            assert!(!sb.in_use());
            assert!(sb.next.is_null());
            assert_eq!(sb.walk_free_list(), class.usable_slots());

            let mut seen = HashSet::new();
            while let Some((slot, _)) = sb.pop() {
                let addr = slot.as_ptr() as usize;
                assert!(addr >= base + class.slot_size());
                assert!(addr < base + PAGE_SIZE);
                assert_eq!((addr - base) % class.slot_size(), 0);
                assert_eq!(Header::from_slot(slot), header);
                assert!(seen.insert(addr));
            }
            assert_eq!(seen.len(), class.usable_slots());
            assert_eq!(sb.free_count(), 0);

            unsafe { SyscallPages.unmap_page(sb.base()) };
        }
    }

    #[test]
    fn push_poisons_and_reports_whole() {
        let class = SizeClass::classify(64).unwrap();
        let header = Header::create(&SyscallPages, class).unwrap();
        let sb = unsafe { &mut *header.as_ptr() };

        let (a, was_whole) = sb.pop().unwrap();
        assert!(was_whole);
        let (b, was_whole) = sb.pop().unwrap();
        assert!(!was_whole);

        unsafe {
            ptr::write_bytes(a.as_ptr(), 0x11, class.slot_size());
            assert!(!sb.push(a));
            let payload = core::slice::from_raw_parts(a.as_ptr(), class.slot_size());
            assert!(payload[size_of::<FreeSlot>()..].iter().all(|&byte| byte == FREE_POISON));

            assert!(sb.push(b));
        }
        assert!(sb.is_whole());
        assert!(!sb.in_use());

        // LIFO: the last slot pushed comes back first.
        let (again, was_whole) = sb.pop().unwrap();
        assert_eq!(again, b);
        assert!(was_whole);

        unsafe { SyscallPages.unmap_page(sb.base()) };
    }

    #[cfg(feature = "alloc-poison")]
    #[test]
    fn popped_slot_is_alloc_poisoned() {
        let class = SizeClass::classify(128).unwrap();
        let header = Header::create(&SyscallPages, class).unwrap();
        let sb = unsafe { &mut *header.as_ptr() };

        let (a, _) = sb.pop().unwrap();
        let fresh = unsafe { core::slice::from_raw_parts(a.as_ptr(), class.slot_size()) };
        assert!(fresh.iter().all(|&byte| byte == ALLOC_POISON));

        // A recycled slot loses its free poison and link word again.
        unsafe { sb.push(a) };
        let (again, _) = sb.pop().unwrap();
        assert_eq!(again, a);
        let reused = unsafe { core::slice::from_raw_parts(again.as_ptr(), class.slot_size()) };
        assert!(reused.iter().all(|&byte| byte == ALLOC_POISON));

        unsafe { SyscallPages.unmap_page(sb.base()) };
    }
}
