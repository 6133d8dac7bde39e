//! Platform aligned-heap backend.
//!
//! On Windows this is the CRT `_aligned_malloc` family, which memory
//! instrumentation runtimes hook even when they do not hook the heap the
//! Rust runtime uses by default. Elsewhere the same contract is served by
//! `posix_memalign`. Every block, whatever its alignment, goes through the
//! aligned entry points.

use crate::backend::BackendStrategy;
use crate::config::BackendKind;
use crate::sys;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlignedHeap;

unsafe impl BackendStrategy for AlignedHeap {
    fn kind(&self) -> BackendKind {
        BackendKind::AlignedHeap
    }

    #[inline]
    unsafe fn allocate(&self, size: usize, align: usize) -> *mut u8 {
        // SAFETY: fallible platform call; `align` is a power of two.
        unsafe { sys::aligned_alloc(size, align) }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: *mut u8, _size: usize, _align: usize) {
        // SAFETY: every block of this backend comes from `aligned_alloc`.
        unsafe { sys::aligned_free(ptr) }
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        old_size: usize,
        align: usize,
        new_size: usize,
    ) -> *mut u8 {
        // SAFETY: every block of this backend comes from `aligned_alloc`.
        unsafe { sys::aligned_realloc(ptr, old_size, align, new_size) }
    }
}
