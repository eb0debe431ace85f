use crate::error::Error;

use super::VmBackend;

/// Fallback backend for platforms without doubly-mapped buffer support.
///
/// Every construction attempt fails with [`Error::UnsupportedPlatform`],
/// mirroring the original source's `cler_vmem_none.hpp` stub, which throws
/// from every accessor to give callers a clear signal rather than silently
/// degrading to a non-doubly-mapped buffer.
pub struct Unsupported {
    _private: (),
}

impl VmBackend for Unsupported {
    fn create(_len: usize) -> Result<Self, Error> {
        Err(Error::UnsupportedPlatform)
    }

    fn ptr(&self) -> *mut u8 {
        unreachable!("Unsupported::create always fails, so no instance can exist")
    }

    fn len(&self) -> usize {
        unreachable!("Unsupported::create always fails, so no instance can exist")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_always_fails() {
        assert!(matches!(
            Unsupported::create(4096),
            Err(Error::UnsupportedPlatform)
        ));
    }
}
