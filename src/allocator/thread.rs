//! Enforcement of the single-thread contract.
//!
//! The allocator keeps unsynchronized state. Instead of locking, the process-wide
//! instance binds itself to the first thread that enters it, and any other
//! thread is refused. With the `deny-threads` feature, thread creation itself
//! fails on Unix.

use super::error::AllocError;
use super::syscall;
use core::sync::atomic::{AtomicUsize, Ordering};

const UNCLAIMED: usize = 0;

/// Records which thread may use a piece of unsynchronized state.
pub struct ThreadOwner {
    owner: AtomicUsize,
}

impl ThreadOwner {
    /// An owner slot that no thread has claimed yet.
    pub const fn new() -> Self {
        Self {
            owner: AtomicUsize::new(UNCLAIMED),
        }
    }

    /// Claims ownership for the calling thread, or confirms it already holds it.
    ///
    /// # Errors
    /// [`AllocError::ForeignThread`] if a different thread claimed first.
    pub fn claim(&self) -> Result<(), AllocError> {
        let me = syscall::current_thread_id();
        match self.owner.compare_exchange(UNCLAIMED, me, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Ok(()),
            Err(current) if current == me => Ok(()),
            Err(_) => Err(AllocError::ForeignThread),
        }
    }

    /// The owning thread's id, if claimed.
    pub fn owner(&self) -> Option<usize> {
        match self.owner.load(Ordering::Acquire) {
            UNCLAIMED => None,
            id => Some(id),
        }
    }
}

impl Default for ThreadOwner {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes a fixed diagnostic to stderr and aborts the process.
///
/// Formatting could allocate, so only static messages are accepted.
pub fn fatal(msg: &'static str) -> ! {
    syscall::write_stderr(b"sbmalloc: fatal: ");
    syscall::write_stderr(msg.as_bytes());
    syscall::write_stderr(b"\n");
    std::process::abort()
}

/// Replaces `pthread_create` so that spawning a thread fails loudly.
#[cfg(all(unix, feature = "deny-threads"))]
#[no_mangle]
pub unsafe extern "C" fn pthread_create(
    _thread: *mut libc::pthread_t,
    _attr: *const libc::pthread_attr_t,
    _start: extern "C" fn(*mut libc::c_void) -> *mut libc::c_void,
    _arg: *mut libc::c_void,
) -> libc::c_int {
    fatal("thread creation is not supported by this single-threaded allocator")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_wins() {
        let owner = ThreadOwner::new();
        assert_eq!(owner.owner(), None);
        assert!(owner.claim().is_ok());
        assert!(owner.claim().is_ok());
        assert_eq!(owner.owner(), Some(syscall::current_thread_id()));

        std::thread::scope(|s| {
            let refused = s.spawn(|| owner.claim()).join().unwrap();
            assert_eq!(refused, Err(AllocError::ForeignThread));
        });
    }

    // Running it would abort the process, so only its symbol and signature are checked.
    #[cfg(all(unix, feature = "deny-threads"))]
    #[test]
    fn thread_creation_override_is_exported() {
        type CreateFn = unsafe extern "C" fn(
            *mut libc::pthread_t,
            *const libc::pthread_attr_t,
            extern "C" fn(*mut libc::c_void) -> *mut libc::c_void,
            *mut libc::c_void,
        ) -> libc::c_int;

        let create: CreateFn = pthread_create;
        assert_ne!(create as usize, 0);
    }
}
