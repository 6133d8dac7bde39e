//! ABI layer for the four allocation operations.
//!
//! These are the symbols C and C++ code links against to allocate from the
//! same heap as Rust. They share the Rust contract exactly: the caller keeps
//! track of `size` and `align` and passes the same values back on
//! `heapbridge_dealloc`/`heapbridge_realloc`. Failure is a null return,
//! never an abort.
//!
//! `align` must be a non-zero power of two on every call.

// ---------------------------------------------------------------------------
// alloc / alloc_zeroed
// ---------------------------------------------------------------------------

abi_export! {
    /// Allocate `size` bytes aligned to `align`. Returns null on failure or
    /// when `align` exceeds what the active backend supports.
    fn heapbridge_alloc(size: usize, align: usize) -> *mut u8 => alloc
}

abi_export! {
    /// Allocate `size` zero bytes aligned to `align`. Returns null on failure.
    fn heapbridge_alloc_zeroed(size: usize, align: usize) -> *mut u8 => alloc_zeroed
}

// ---------------------------------------------------------------------------
// dealloc
// ---------------------------------------------------------------------------

abi_export! {
    /// Release a block from `heapbridge_alloc`, `heapbridge_alloc_zeroed` or
    /// `heapbridge_realloc`. `size` and `align` must match the allocation.
    /// Null is ignored.
    fn heapbridge_dealloc(ptr: *mut u8, size: usize, align: usize) => dealloc
}

// ---------------------------------------------------------------------------
// realloc
// ---------------------------------------------------------------------------

abi_export! {
    /// Resize a block, preserving `min(old_size, new_size)` bytes.
    ///
    /// On null the original block is still valid and still owned by the
    /// caller. A null `ptr` allocates.
    fn heapbridge_realloc(ptr: *mut u8, old_size: usize, align: usize, new_size: usize) -> *mut u8 => realloc
}
