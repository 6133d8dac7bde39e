//! Runtime default backend: `std::alloc::System`.
//!
//! This is what the Rust runtime would use with no redirection at all. It has
//! a native zeroed path, so the router delegates `alloc_zeroed` directly.

use std::alloc::{GlobalAlloc, Layout, System};

use crate::backend::BackendStrategy;
use crate::config::BackendKind;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeDefault;

unsafe impl BackendStrategy for RuntimeDefault {
    fn kind(&self) -> BackendKind {
        BackendKind::RuntimeDefault
    }

    fn supports_zeroed_allocate(&self) -> bool {
        true
    }

    #[inline]
    unsafe fn allocate(&self, size: usize, align: usize) -> *mut u8 {
        // Sizes that do not form a Layout are a plain failure, not UB.
        let Ok(layout) = Layout::from_size_align(size, align) else {
            return std::ptr::null_mut();
        };
        // SAFETY: `layout` has a non-zero size.
        unsafe { System.alloc(layout) }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: *mut u8, size: usize, align: usize) {
        // SAFETY: the block was allocated with this exact, already validated layout.
        unsafe { System.dealloc(ptr, Layout::from_size_align_unchecked(size, align)) }
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        old_size: usize,
        align: usize,
        new_size: usize,
    ) -> *mut u8 {
        if Layout::from_size_align(new_size, align).is_err() {
            return std::ptr::null_mut();
        }
        // SAFETY: the old layout was validated at allocation time and the new
        // size was just checked against `align`.
        unsafe {
            System.realloc(
                ptr,
                Layout::from_size_align_unchecked(old_size, align),
                new_size,
            )
        }
    }

    #[inline]
    unsafe fn allocate_zeroed(&self, size: usize, align: usize) -> *mut u8 {
        let Ok(layout) = Layout::from_size_align(size, align) else {
            return std::ptr::null_mut();
        };
        // SAFETY: `layout` has a non-zero size.
        unsafe { System.alloc_zeroed(layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_layouts_return_null() {
        let heap = RuntimeDefault;
        unsafe {
            assert!(heap.allocate(usize::MAX, 8).is_null());
            assert!(heap.allocate_zeroed(usize::MAX, 8).is_null());
        }
    }

    #[test]
    fn failed_realloc_keeps_block() {
        let heap = RuntimeDefault;
        unsafe {
            let p = heap.allocate(8, 8);
            assert!(!p.is_null());
            p.write_bytes(0x7E, 8);
            assert!(heap.reallocate(p, 8, 8, usize::MAX).is_null());
            assert!(std::slice::from_raw_parts(p, 8).iter().all(|&b| b == 0x7E));
            heap.deallocate(p, 8, 8);
        }
    }

    #[test]
    fn native_zeroed_path() {
        let heap = RuntimeDefault;
        unsafe {
            let p = heap.allocate_zeroed(1024, 32);
            assert!(!p.is_null());
            assert_eq!(p as usize % 32, 0);
            assert!(std::slice::from_raw_parts(p, 1024).iter().all(|&b| b == 0));
            heap.deallocate(p, 1024, 32);
        }
    }
}
