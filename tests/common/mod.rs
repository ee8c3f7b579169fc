#![allow(dead_code)]

use sbmalloc::{PageSource, SyscallPages};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ptr::NonNull;

/// Maps real pages and remembers which ones are live. Can be told to refuse.
#[derive(Default)]
pub struct TrackingPages {
    live: RefCell<HashSet<usize>>,
    refuse: Cell<bool>,
    mapped: Cell<usize>,
    unmapped: Cell<usize>,
}

impl TrackingPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.set(refuse);
    }

    pub fn is_live(&self, page: usize) -> bool {
        self.live.borrow().contains(&page)
    }

    pub fn live(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn mapped(&self) -> usize {
        self.mapped.get()
    }

    pub fn unmapped(&self) -> usize {
        self.unmapped.get()
    }
}

impl PageSource for TrackingPages {
    fn map_page(&self) -> Option<NonNull<u8>> {
        if self.refuse.get() {
            return None;
        }
        let page = SyscallPages.map_page()?;
        self.live.borrow_mut().insert(page.as_ptr() as usize);
        self.mapped.set(self.mapped.get() + 1);
        Some(page)
    }

    unsafe fn unmap_page(&self, page: NonNull<u8>) {
        assert!(
            self.live.borrow_mut().remove(&(page.as_ptr() as usize)),
            "unmapping a page that is not live: {page:p}"
        );
        self.unmapped.set(self.unmapped.get() + 1);
        SyscallPages.unmap_page(page);
    }
}
