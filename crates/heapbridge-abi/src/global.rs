//! Rust global allocator backed by the router.

use std::alloc::{GlobalAlloc, Layout};

use heapbridge_core::ROUTER;

/// Sends every Rust heap allocation through [`heapbridge_core::ROUTER`].
///
/// Register it in a final binary with
///
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: heapbridge_abi::RoutedAllocator = heapbridge_abi::RoutedAllocator;
/// ```
///
/// or enable the `global-allocator` feature of this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoutedAllocator;

unsafe impl GlobalAlloc for RoutedAllocator {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe { ROUTER.alloc(layout.size(), layout.align()) }
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { ROUTER.dealloc(ptr, layout.size(), layout.align()) }
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        unsafe { ROUTER.alloc_zeroed(layout.size(), layout.align()) }
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        unsafe { ROUTER.realloc(ptr, layout.size(), layout.align(), new_size) }
    }
}
