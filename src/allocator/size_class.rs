use super::constants::{CLASS_COUNT, MAX_ALLOC, MIN_ALLOC, PAGE_SIZE};
use super::error::AllocError;

/// Index of one of the [`CLASS_COUNT`] size classes.
///
/// Class `i` serves slots of `32 << i` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeClass(u8);

impl SizeClass {
    /// Every class, smallest first.
    pub const ALL: [SizeClass; CLASS_COUNT] = [
        SizeClass(0),
        SizeClass(1),
        SizeClass(2),
        SizeClass(3),
        SizeClass(4),
        SizeClass(5),
        SizeClass(6),
    ];

    /// Maps a request size to the smallest class whose slot holds it.
    ///
    /// Boundaries are half-open: `(0, 32]` is class 0, `(32, 64]` class 1, up to
    /// `(1024, 2048]` for class 6.
    ///
    /// # Errors
    /// Returns [`AllocError::OutOfRange`] for `0` and anything above [`MAX_ALLOC`].
    #[inline]
    pub const fn classify(size: usize) -> Result<Self, AllocError> {
        if size == 0 || size > MAX_ALLOC {
            return Err(AllocError::OutOfRange { size });
        }
        let size = if size < MIN_ALLOC { MIN_ALLOC } else { size };

        // 32 = 2^5 -> class 0
        let shift = size.next_power_of_two().trailing_zeros();
        Ok(SizeClass((shift - MIN_ALLOC.trailing_zeros()) as u8))
    }

    /// Rebuilds a class from the raw index stored in a superblock header.
    #[inline]
    pub(crate) const fn from_raw(index: u8) -> Option<Self> {
        if (index as usize) < CLASS_COUNT {
            Some(SizeClass(index))
        } else {
            None
        }
    }

    /// The class index in `0..CLASS_COUNT`.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) const fn raw(self) -> u8 {
        self.0
    }

    /// Bytes per slot.
    #[inline]
    pub const fn slot_size(self) -> usize {
        MIN_ALLOC << self.0
    }

    /// Slots in one superblock, header slot included.
    #[inline]
    pub const fn total_slots(self) -> usize {
        PAGE_SIZE / self.slot_size()
    }

    /// Slots a superblock can hand out; the first one holds the header.
    #[inline]
    pub const fn usable_slots(self) -> usize {
        self.total_slots() - 1
    }
}

impl core::fmt::Display for SizeClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "class {} ({} bytes)", self.0, self.slot_size())
    }
}
