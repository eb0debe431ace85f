use std::ffi::CString;
use std::ptr;

use crate::error::Error;

use super::VmBackend;

/// A doubly-mapped region backed by an anonymous POSIX shared-memory
/// object (`memfd_create`, falling back to `shm_open` on targets without
/// it) and two adjacent `mmap` views of the same file descriptor.
///
/// Available on Linux, macOS and FreeBSD, matching the platforms the
/// original source's virtual-memory module names as supported.
pub struct PosixDoubleMap {
    base: *mut u8,
    mapping_len: usize,
}

unsafe impl Send for PosixDoubleMap {}
unsafe impl Sync for PosixDoubleMap {}

impl VmBackend for PosixDoubleMap {
    fn create(len: usize) -> Result<Self, Error> {
        if len == 0 {
            return Err(Error::AllocationFailed);
        }
        let page = page_size();
        let mapping_len = round_up(len, page);
        let total = mapping_len
            .checked_mul(2)
            .ok_or(Error::AllocationFailed)?;

        let fd = create_anon_fd(mapping_len)?;

        // SAFETY: fd is a valid, just-created file descriptor sized to
        // mapping_len; the reservation mapping is replaced immediately
        // below before any caller can observe it.
        let reservation = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if reservation == libc::MAP_FAILED {
            unsafe { libc::close(fd) };
            return Err(Error::AllocationFailed);
        }
        let base = reservation as *mut u8;

        // SAFETY: base and base+mapping_len both fall within the
        // PROT_NONE reservation just made, which is large enough to hold
        // two mappings of mapping_len bytes; MAP_FIXED overwrites those
        // reserved pages with real mappings of the same fd.
        let first = unsafe {
            libc::mmap(
                base as *mut libc::c_void,
                mapping_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd,
                0,
            )
        };
        let second = unsafe {
            libc::mmap(
                base.add(mapping_len) as *mut libc::c_void,
                mapping_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if first == libc::MAP_FAILED || second == libc::MAP_FAILED {
            unsafe { libc::munmap(base as *mut libc::c_void, total) };
            return Err(Error::AllocationFailed);
        }

        Ok(PosixDoubleMap { base, mapping_len })
    }

    fn ptr(&self) -> *mut u8 {
        self.base
    }

    fn len(&self) -> usize {
        self.mapping_len
    }
}

impl Drop for PosixDoubleMap {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.mapping_len * 2);
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE is always safe to call.
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n <= 0 {
        4096
    } else {
        n as usize
    }
}

fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

#[cfg(target_os = "linux")]
fn create_anon_fd(len: usize) -> Result<libc::c_int, Error> {
    let name = CString::new("conduit-dbf").unwrap();
    // SAFETY: name is a valid NUL-terminated C string.
    let fd = unsafe { libc::memfd_create(name.as_ptr(), 0) };
    if fd < 0 {
        return Err(Error::AllocationFailed);
    }
    if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
        unsafe { libc::close(fd) };
        return Err(Error::AllocationFailed);
    }
    Ok(fd)
}

#[cfg(not(target_os = "linux"))]
fn create_anon_fd(len: usize) -> Result<libc::c_int, Error> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = CString::new(format!(
        "/conduit-dbf-{}-{}",
        std::process::id(),
        id
    ))
    .unwrap();
    // SAFETY: name is a valid NUL-terminated C string.
    let fd = unsafe {
        libc::shm_open(
            name.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o600,
        )
    };
    if fd < 0 {
        return Err(Error::AllocationFailed);
    }
    unsafe { libc::shm_unlink(name.as_ptr()) };
    if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
        unsafe { libc::close(fd) };
        return Err(Error::AllocationFailed);
    }
    Ok(fd)
}
