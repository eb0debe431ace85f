//! Doubly-mapped virtual-memory backend.
//!
//! A doubly-mapped allocation maps the same physical pages twice at
//! adjacent virtual addresses, so a ring buffer built on top of it can hand
//! out a contiguous slice for any read or write window, even one that
//! wraps past the end of the backing capacity.
//!
//! Support is platform-dependent: POSIX systems with `memfd_create`/`mmap`
//! get a real implementation; everything else gets a stub that always
//! fails at construction, matching the original source's
//! `cler_vmem_none.hpp`.

#[cfg(unix)]
mod posix;
#[cfg(unix)]
pub use posix::PosixDoubleMap;

#[cfg(not(unix))]
mod unsupported;
#[cfg(not(unix))]
pub use unsupported::Unsupported;

use crate::error::Error;

/// A backend capable of producing a doubly-mapped memory region.
///
/// `len` is the length in bytes of a *single* mapping; the region returned
/// by [`VmBackend::ptr`] is valid for `2 * len` bytes, with byte `i` and
/// byte `len + i` aliasing the same physical memory for `i in 0..len`.
pub trait VmBackend: Sized {
    /// Creates a new doubly-mapped region of `len` bytes (rounded up to the
    /// platform's allocation granularity by the implementation).
    fn create(len: usize) -> Result<Self, Error>;

    /// Pointer to the start of the first mapping.
    fn ptr(&self) -> *mut u8;

    /// Length in bytes of a single mapping (the same value passed to
    /// `create`, rounded up to allocation granularity).
    fn len(&self) -> usize;

    /// Whether this backend produced a usable mapping.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The backend selected for this platform at compile time.
#[cfg(unix)]
pub type PlatformBackend = PosixDoubleMap;
#[cfg(not(unix))]
pub type PlatformBackend = unsupported::Unsupported;
