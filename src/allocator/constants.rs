/// The superblock size (4KB). Every superblock is exactly one page, mapped
/// page-aligned, so masking a slot address with [`SUPERBLOCK_MASK`] yields its header.
pub const PAGE_SIZE: usize = 4096;

/// Clears the in-page offset of an address.
pub const SUPERBLOCK_MASK: usize = !(PAGE_SIZE - 1);

/// Smallest slot size. Smaller requests are rounded up.
pub const MIN_ALLOC: usize = 32;

/// Largest supported request. Anything bigger is rejected.
pub const MAX_ALLOC: usize = 2048;

/// Number of power-of-two size classes between [`MIN_ALLOC`] and [`MAX_ALLOC`].
pub const CLASS_COUNT: usize = 7;

/// Whole superblocks a pool keeps before returning one to the OS.
pub const RESERVE_SUPERBLOCK_THRESHOLD: usize = 2;

/// Written over released slots, after the free-list link word.
pub const FREE_POISON: u8 = 0xab;

/// Written over freshly handed-out slots when `alloc-poison` is enabled.
pub const ALLOC_POISON: u8 = 0xcd;

const _: () = assert!(MIN_ALLOC << (CLASS_COUNT - 1) == MAX_ALLOC);
const _: () = assert!(PAGE_SIZE % MAX_ALLOC == 0);
const _: () = assert!(PAGE_SIZE.is_power_of_two());
