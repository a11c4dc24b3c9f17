//! Executable memory regions.
//!
//! One anonymous mapping per module, written while read/write, then
//! flipped to read/execute after relocation. A host that refuses the
//! executable flip fails the load; there is no silent fallback to
//! non-executable memory.

use std::ptr::{self, NonNull};
use std::sync::atomic::{Ordering, fence};

use crate::LoadError;

/// A page-backed region that can be made executable.
#[derive(Debug)]
pub struct ExecRegion {
    ptr: NonNull<u8>,
    len: usize,
    executable: bool,
}

// The region is exclusively owned; the raw pointer is not shared.
unsafe impl Send for ExecRegion {}

impl ExecRegion {
    /// Reserve a zeroed read/write region of at least `len` bytes.
    pub fn allocate(len: usize) -> Result<Self, LoadError> {
        let len = len.max(1);
        // SAFETY: anonymous private mapping, no file descriptor involved.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(LoadError::OutOfMemory(len));
        }
        Ok(Self {
            // SAFETY: mmap success means a non-null page-aligned pointer.
            ptr: unsafe { NonNull::new_unchecked(ptr.cast()) },
            len,
            executable: false,
        })
    }

    #[must_use]
    pub fn base(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writable view; only valid before the executable flip.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        debug_assert!(!self.executable, "region already sealed");
        // SAFETY: we own the mapping and it is PROT_WRITE until sealed.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Read-only view.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping stays readable in both protection states.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Seal the region: fence, make the new code visible to the
    /// instruction stream, and add execute permission.
    ///
    /// Data and BSS share the region with code and stay writable, the
    /// same contract as the executable heap the modules were built for.
    /// A host that refuses writable+executable mappings fails the load.
    pub fn make_executable(&mut self) -> Result<(), LoadError> {
        fence(Ordering::SeqCst);
        coherence(self.ptr.as_ptr(), self.len);
        // SAFETY: protecting our own mapping.
        let rc = unsafe {
            libc::mprotect(
                self.ptr.as_ptr().cast(),
                self.len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            )
        };
        if rc != 0 {
            return Err(LoadError::NoExecutableMemory);
        }
        self.executable = true;
        Ok(())
    }
}

impl Drop for ExecRegion {
    fn drop(&mut self) {
        // SAFETY: unmapping the exact region this struct mapped.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

/// Data-cache writeback plus instruction-cache invalidate over freshly
/// written code. Unified-cache hosts (x86) only need the fence that ran
/// before this call.
#[cfg(any(target_arch = "aarch64", target_arch = "arm"))]
fn coherence(ptr: *mut u8, len: usize) {
    unsafe extern "C" {
        fn __clear_cache(start: *mut libc::c_char, end: *mut libc::c_char);
    }
    // SAFETY: the range is our own live mapping.
    unsafe {
        __clear_cache(ptr.cast(), ptr.add(len).cast());
    }
}

#[cfg(not(any(target_arch = "aarch64", target_arch = "arm")))]
fn coherence(_ptr: *mut u8, _len: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_is_zeroed_and_writable() {
        let mut region = ExecRegion::allocate(4096).expect("mmap");
        assert!(region.as_slice().iter().all(|&b| b == 0));
        region.as_mut_slice()[0] = 0xAB;
        assert_eq!(region.as_slice()[0], 0xAB);
    }

    #[test]
    fn make_executable_keeps_contents_readable() {
        let mut region = ExecRegion::allocate(64).expect("mmap");
        region.as_mut_slice()[..4].copy_from_slice(&[1, 2, 3, 4]);
        region.make_executable().expect("mprotect");
        assert_eq!(&region.as_slice()[..4], &[1, 2, 3, 4]);
    }
}
