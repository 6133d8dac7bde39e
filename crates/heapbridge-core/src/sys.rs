//! Native heap primitives.
//!
//! Direct calls into the process C heap and the platform aligned-heap API.
//! All of them report failure as null and never abort, which is what keeps
//! fallible allocation in Rust (`try_reserve`) working on top of them.
//!
//! Blocks from the `heap_*` family and the `aligned_*` family must not be
//! mixed: on Windows they come from different CRT entry points.

use std::ffi::c_void;

#[cfg(not(any(unix, windows)))]
compile_error!("heapbridge-core needs a C heap: only unix and windows targets are supported");

#[cfg(windows)]
unsafe extern "C" {
    #[link_name = "_aligned_malloc"]
    fn native_aligned_malloc_sym(size: usize, alignment: usize) -> *mut c_void;
    #[link_name = "_aligned_free"]
    fn native_aligned_free_sym(ptr: *mut c_void);
    #[link_name = "_aligned_realloc"]
    fn native_aligned_realloc_sym(ptr: *mut c_void, size: usize, alignment: usize)
    -> *mut c_void;
}

#[inline]
pub(crate) unsafe fn heap_alloc(size: usize) -> *mut u8 {
    // SAFETY: direct call to the C heap.
    unsafe { libc::malloc(size) }.cast()
}

#[inline]
pub(crate) unsafe fn heap_free(ptr: *mut u8) {
    // SAFETY: caller guarantees `ptr` came from `heap_alloc`/`heap_realloc`.
    unsafe { libc::free(ptr.cast::<c_void>()) }
}

#[inline]
pub(crate) unsafe fn heap_realloc(ptr: *mut u8, new_size: usize) -> *mut u8 {
    // SAFETY: caller guarantees `ptr` came from `heap_alloc`/`heap_realloc`
    // and `new_size` is non-zero, so a failed call leaves `ptr` intact.
    unsafe { libc::realloc(ptr.cast::<c_void>(), new_size) }.cast()
}

#[cfg(unix)]
#[inline]
pub(crate) unsafe fn aligned_alloc(size: usize, align: usize) -> *mut u8 {
    // posix_memalign wants a power of two that is also a multiple of sizeof(void*).
    let align = align.max(std::mem::size_of::<*mut c_void>());
    let mut out: *mut c_void = std::ptr::null_mut();
    // SAFETY: `out` is a valid out-pointer and `align` satisfies posix_memalign.
    let rc = unsafe { libc::posix_memalign(&mut out, align, size) };
    if rc == 0 { out.cast() } else { std::ptr::null_mut() }
}

#[cfg(unix)]
#[inline]
pub(crate) unsafe fn aligned_free(ptr: *mut u8) {
    // SAFETY: posix_memalign blocks are released with free.
    unsafe { libc::free(ptr.cast::<c_void>()) }
}

/// POSIX has no aligned realloc: allocate, copy the common prefix, free.
#[cfg(unix)]
pub(crate) unsafe fn aligned_realloc(
    ptr: *mut u8,
    old_size: usize,
    align: usize,
    new_size: usize,
) -> *mut u8 {
    // SAFETY: forwarded caller contract.
    let new_ptr = unsafe { aligned_alloc(new_size, align) };
    if new_ptr.is_null() {
        return new_ptr;
    }
    // SAFETY: `ptr` is valid for `old_size` bytes, `new_ptr` for `new_size`,
    // and the two blocks are distinct live allocations.
    unsafe {
        std::ptr::copy_nonoverlapping(ptr, new_ptr, old_size.min(new_size));
        aligned_free(ptr);
    }
    new_ptr
}

#[cfg(windows)]
#[inline]
pub(crate) unsafe fn aligned_alloc(size: usize, align: usize) -> *mut u8 {
    // SAFETY: direct call to the CRT aligned heap; `align` is a power of two.
    unsafe { native_aligned_malloc_sym(size, align) }.cast()
}

#[cfg(windows)]
#[inline]
pub(crate) unsafe fn aligned_free(ptr: *mut u8) {
    // SAFETY: caller guarantees `ptr` came from `aligned_alloc`/`aligned_realloc`.
    unsafe { native_aligned_free_sym(ptr.cast()) }
}

#[cfg(windows)]
#[inline]
pub(crate) unsafe fn aligned_realloc(
    ptr: *mut u8,
    _old_size: usize,
    align: usize,
    new_size: usize,
) -> *mut u8 {
    // SAFETY: `new_size` is non-zero, so `_aligned_realloc` never frees on failure.
    unsafe { native_aligned_realloc_sym(ptr.cast(), new_size, align) }.cast()
}
