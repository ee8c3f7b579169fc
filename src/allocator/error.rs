use thiserror::Error;

/// The error type for allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The request was zero bytes or larger than the biggest size class.
    #[error("requested {size} bytes, supported range is 1..=2048")]
    OutOfRange {
        /// The rejected request size.
        size: usize,
    },

    /// The OS refused to map a new superblock.
    #[error("operating system refused a new superblock for size class {class}")]
    ResourceExhausted {
        /// Index of the class that needed the superblock.
        class: usize,
    },

    /// Pool counters no longer describe the superblocks linked into the pool.
    ///
    /// Continuing after this would risk handing out memory that is already in use.
    #[error("pool for size class {class} is inconsistent ({free_total} free slots recorded)")]
    InternalInconsistency {
        /// Index of the class whose pool diverged.
        class: usize,
        /// The aggregate free count the pool reported when the divergence was found.
        free_total: usize,
    },

    /// The allocator was entered from a thread other than the one that owns it.
    #[error("allocator is single-threaded and was entered from a foreign thread")]
    ForeignThread,
}

impl AllocError {
    /// Whether the error means allocator state can no longer be trusted.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, AllocError::InternalInconsistency { .. } | AllocError::ForeignThread)
    }
}
