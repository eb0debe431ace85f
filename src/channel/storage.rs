use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;

use crate::error::Error;
use crate::pod::Pod;
use crate::vmem::{PlatformBackend, VmBackend};

/// The raw backing buffer for a [`super::Channel`]: either a heap-allocated
/// inline array, or a doubly-mapped virtual-memory region.
///
/// Inline storage only ever hands out contiguous runs up to the physical
/// end of the buffer; doubly-mapped storage can hand out a contiguous run
/// of up to `capacity` elements starting at any offset, since an offset
/// past the end aliases the mirrored mapping.
pub(crate) enum RawStorage<T: Pod> {
    Inline(Box<[UnsafeCell<MaybeUninit<T>>]>),
    DoublyMapped {
        region: PlatformBackend,
        capacity: usize,
    },
}

// SAFETY: access to the backing elements is coordinated entirely through
// the owning Channel's atomic head/tail indices, which is what makes this
// an SPSC (not an arbitrary shared-mutability) structure.
unsafe impl<T: Pod> Send for RawStorage<T> {}
unsafe impl<T: Pod> Sync for RawStorage<T> {}

impl<T: Pod> RawStorage<T> {
    pub(crate) fn inline(capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            buf.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        RawStorage::Inline(buf.into_boxed_slice())
    }

    pub(crate) fn doubly_mapped(capacity: usize) -> Result<Self, Error> {
        let elem = std::mem::size_of::<T>().max(1);
        let bytes = capacity.checked_mul(elem).ok_or(Error::AllocationFailed)?;
        let region = PlatformBackend::create(bytes)?;
        let capacity = region.len() / elem;
        Ok(RawStorage::DoublyMapped { region, capacity })
    }

    pub(crate) fn capacity(&self) -> usize {
        match self {
            RawStorage::Inline(buf) => buf.len(),
            RawStorage::DoublyMapped { capacity, .. } => *capacity,
        }
    }

    pub(crate) fn is_doubly_mapped(&self) -> bool {
        matches!(self, RawStorage::DoublyMapped { .. })
    }

    fn base_ptr(&self) -> *mut T {
        match self {
            RawStorage::Inline(buf) => buf[0].get() as *mut T,
            RawStorage::DoublyMapped { region, .. } => region.ptr() as *mut T,
        }
    }

    /// Writes `src` at ring offset `at` (already reduced mod capacity),
    /// wrapping for inline storage as needed. `src.len()` must not exceed
    /// `capacity`.
    pub(crate) fn write_at(&self, at: usize, src: &[T]) {
        let capacity = self.capacity();
        let base = self.base_ptr();
        // SAFETY: `at < capacity` and `src.len() <= capacity` are upheld by
        // callers in `Channel`, which never admits a write larger than the
        // space it already verified is free.
        unsafe {
            if self.is_doubly_mapped() {
                ptr::copy_nonoverlapping(src.as_ptr(), base.add(at), src.len());
            } else {
                let first = (capacity - at).min(src.len());
                ptr::copy_nonoverlapping(src.as_ptr(), base.add(at), first);
                if src.len() > first {
                    ptr::copy_nonoverlapping(src[first..].as_ptr(), base, src.len() - first);
                }
            }
        }
    }

    /// Reads into `dst` from ring offset `at`, mirroring `write_at`.
    pub(crate) fn read_at(&self, at: usize, dst: &mut [T]) {
        let capacity = self.capacity();
        let base = self.base_ptr();
        // SAFETY: see `write_at`; the same offset/length invariants hold.
        unsafe {
            if self.is_doubly_mapped() {
                ptr::copy_nonoverlapping(base.add(at), dst.as_mut_ptr(), dst.len());
            } else {
                let first = (capacity - at).min(dst.len());
                ptr::copy_nonoverlapping(base.add(at), dst.as_mut_ptr(), first);
                if dst.len() > first {
                    ptr::copy_nonoverlapping(base, dst[first..].as_mut_ptr(), dst.len() - first);
                }
            }
        }
    }

    /// Longest contiguous run available starting at ring offset `at`,
    /// capped at `requested`.
    pub(crate) fn contiguous_len(&self, at: usize, requested: usize) -> usize {
        if self.is_doubly_mapped() {
            requested
        } else {
            (self.capacity() - at).min(requested)
        }
    }

    /// Pointer to ring offset `at`, valid (mutably and for reads) for
    /// `contiguous_len(at, n)` elements for any `n`.
    pub(crate) fn ptr_at(&self, at: usize) -> *mut T {
        // SAFETY: `at < capacity`, upheld by `Channel`.
        unsafe { self.base_ptr().add(at) }
    }
}
