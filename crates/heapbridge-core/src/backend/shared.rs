//! Shared process heap backend.
//!
//! Routes Rust allocations into the C heap used by the C and C++ code in the
//! same binary, through its fallible paths. Requests up to the heap's natural
//! alignment take the plain `malloc` path; anything stricter goes through
//! the aligned entry points. Alignments above [`MAX_SUPPORTED_ALIGNMENT`] are
//! refused by the router before they get here.

use crate::backend::BackendStrategy;
use crate::config::BackendKind;
use crate::sys;

/// Alignment guaranteed by the plain `malloc` path (`alignof(max_align_t)`
/// on mainstream 32- and 64-bit targets).
pub const NATURAL_ALIGNMENT: usize = 2 * std::mem::size_of::<usize>();

/// Largest alignment the shared heap accepts.
pub const MAX_SUPPORTED_ALIGNMENT: usize = 1 << 20;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SharedHeap;

impl SharedHeap {
    #[inline]
    const fn plain_path(align: usize) -> bool {
        align <= NATURAL_ALIGNMENT
    }
}

unsafe impl BackendStrategy for SharedHeap {
    fn kind(&self) -> BackendKind {
        BackendKind::SharedHeap
    }

    fn max_supported_alignment(&self) -> Option<usize> {
        Some(MAX_SUPPORTED_ALIGNMENT)
    }

    #[inline]
    unsafe fn allocate(&self, size: usize, align: usize) -> *mut u8 {
        // SAFETY: plain and aligned paths are both fallible C heap calls.
        unsafe {
            if Self::plain_path(align) {
                sys::heap_alloc(size)
            } else {
                sys::aligned_alloc(size, align)
            }
        }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: *mut u8, _size: usize, align: usize) {
        // SAFETY: `align` matches the allocation, so it picks the same family.
        unsafe {
            if Self::plain_path(align) {
                sys::heap_free(ptr);
            } else {
                sys::aligned_free(ptr);
            }
        }
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        old_size: usize,
        align: usize,
        new_size: usize,
    ) -> *mut u8 {
        // SAFETY: `align` matches the allocation, so it picks the same family.
        unsafe {
            if Self::plain_path(align) {
                sys::heap_realloc(ptr, new_size)
            } else {
                sys::aligned_realloc(ptr, old_size, align, new_size)
            }
        }
    }
}
