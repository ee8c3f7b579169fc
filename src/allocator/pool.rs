use super::error::AllocError;
use super::size_class::SizeClass;
use super::superblock::Header;
use core::ptr::{self, NonNull};

/// The superblocks of one size class and their aggregate counters.
///
/// The pool owns its superblocks through the `next` links of their headers.
/// Counters are kept in step with the list:
/// `free_total` is the sum of every linked superblock's free count, and
/// `whole` is the number of linked superblocks with nothing handed out.
pub(crate) struct SuperblockPool {
    head: *mut Header,
    free_total: usize,
    whole: usize,
    superblocks: usize,
}

impl SuperblockPool {
    pub(crate) const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            free_total: 0,
            whole: 0,
            superblocks: 0,
        }
    }

    pub(crate) fn free_total(&self) -> usize {
        self.free_total
    }

    pub(crate) fn whole(&self) -> usize {
        self.whole
    }

    pub(crate) fn superblocks(&self) -> usize {
        self.superblocks
    }

    /// Appends a freshly created, whole superblock at the tail.
    ///
    /// # Safety
    /// `sb` must be a live superblock not linked into any pool.
    pub(crate) unsafe fn link(&mut self, sb: NonNull<Header>) {
        let sb_ptr = sb.as_ptr();
        debug_assert!((*sb_ptr).next.is_null());
        debug_assert!((*sb_ptr).is_whole());

        if self.head.is_null() {
            self.head = sb_ptr;
        } else {
            let mut tail = self.head;
            while !(*tail).next.is_null() {
                tail = (*tail).next;
            }
            (*tail).next = sb_ptr;
        }

        self.superblocks += 1;
        self.whole += 1;
        self.free_total += (*sb_ptr).free_count();
    }

    /// Removes a whole superblock from the list and from the counters.
    ///
    /// After this the pool holds no reference to `sb`, so it may be unmapped.
    /// Returns `false`, touching nothing, if `sb` is not in the list.
    ///
    /// # Safety
    /// `sb` must be a live, whole superblock.
    pub(crate) unsafe fn unlink(&mut self, sb: NonNull<Header>) -> bool {
        let sb_ptr = sb.as_ptr();
        debug_assert!((*sb_ptr).is_whole());

        if self.head == sb_ptr {
            self.head = (*sb_ptr).next;
        } else {
            let mut prev = self.head;
            while !prev.is_null() && (*prev).next != sb_ptr {
                prev = (*prev).next;
            }
            if prev.is_null() {
                return false;
            }
            (*prev).next = (*sb_ptr).next;
        }
        (*sb_ptr).next = ptr::null_mut();

        self.superblocks -= 1;
        self.whole -= 1;
        self.free_total -= (*sb_ptr).free_count();
        true
    }

    /// First superblock in list order with at least one free slot.
    pub(crate) fn first_with_free(&self) -> Option<NonNull<Header>> {
        self.iter().find(|sb| unsafe { sb.as_ref() }.free_count() > 0)
    }

    /// First whole superblock in list order.
    pub(crate) fn first_whole(&self) -> Option<NonNull<Header>> {
        self.iter().find(|sb| unsafe { sb.as_ref() }.is_whole())
    }

    /// Records that one slot left a linked superblock.
    pub(crate) fn on_pop(&mut self, was_whole: bool) {
        self.free_total -= 1;
        if was_whole {
            self.whole -= 1;
        }
    }

    /// Records that one slot came back to a linked superblock.
    pub(crate) fn on_push(&mut self, became_whole: bool) {
        self.free_total += 1;
        if became_whole {
            self.whole += 1;
        }
    }

    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            cursor: self.head,
            _pool: core::marker::PhantomData,
        }
    }

    /// Re-derives both counters from the list and compares.
    pub(crate) fn check(&self, class: SizeClass) -> Result<(), AllocError> {
        let mut free = 0;
        let mut whole = 0;
        let mut count = 0;
        for sb in self.iter() {
            let sb = unsafe { sb.as_ref() };
            let in_list = sb.walk_free_list();
            if sb.class() != class || !sb.has_valid_magic() || in_list != sb.free_count() || sb.in_use() == sb.is_whole() {
                return Err(self.inconsistency(class));
            }
            free += sb.free_count();
            whole += usize::from(sb.is_whole());
            count += 1;
        }

        if free != self.free_total || whole != self.whole || count != self.superblocks {
            return Err(self.inconsistency(class));
        }
        Ok(())
    }

    pub(crate) fn inconsistency(&self, class: SizeClass) -> AllocError {
        AllocError::InternalInconsistency {
            class: class.index(),
            free_total: self.free_total,
        }
    }

    /// Detaches every superblock, leaving the pool empty.
    pub(crate) fn drain(&mut self) -> Drain {
        let cursor = self.head;
        *self = Self::new();
        Drain { cursor }
    }
}

/// Walks the superblocks of a pool in list order.
pub(crate) struct Iter<'a> {
    cursor: *mut Header,
    _pool: core::marker::PhantomData<&'a SuperblockPool>,
}

impl Iterator for Iter<'_> {
    type Item = NonNull<Header>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = NonNull::new(self.cursor)?;
        self.cursor = unsafe { current.as_ref().next };
        Some(current)
    }
}

/// Yields detached superblocks. The link is read before each one is yielded,
/// so the caller may unmap it right away.
pub(crate) struct Drain {
    cursor: *mut Header,
}

impl Iterator for Drain {
    type Item = NonNull<Header>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = NonNull::new(self.cursor)?;
        self.cursor = unsafe { current.as_ref().next };
        Some(current)
    }
}
