//! The allocation router.
//!
//! [`Router`] implements the four operations the Rust runtime's allocator
//! symbols resolve to, on top of one [`BackendStrategy`]. On top of plain
//! forwarding it adds exactly three behaviors:
//!
//! - alignments above the backend's limit fail with null, without a backend
//!   call;
//! - zero-byte sizes are rounded up to one byte on every operation;
//! - `alloc_zeroed` is allocate-then-fill when the backend has no native
//!   zeroed primitive.
//!
//! There are no locks, counters or retries here. Thread safety is the
//! backend's.

use std::ptr::{self, NonNull};

use crate::backend::{Backend, BackendStrategy};
use crate::block::OwnedBlock;
use crate::config::BuildConfig;
use crate::error::AllocError;
use crate::request::{AllocRequest, backend_size};

/// Process-wide router for the compiled-in configuration.
pub static ROUTER: Router = Router::new(Backend::from_config(BuildConfig::current()));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Router<B = Backend> {
    backend: B,
}

impl<B> Router<B> {
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: BackendStrategy> Router<B> {
    #[inline]
    fn alignment_supported(&self, align: usize) -> bool {
        self.backend
            .max_supported_alignment()
            .is_none_or(|max| align <= max)
    }

    /// Allocate `size` bytes aligned to `align`, or return null.
    ///
    /// # Safety
    ///
    /// `align` must be a non-zero power of two.
    #[inline]
    pub unsafe fn alloc(&self, size: usize, align: usize) -> *mut u8 {
        if !self.alignment_supported(align) {
            return ptr::null_mut();
        }
        // SAFETY: size normalized to >= 1, alignment within the backend limit.
        unsafe { self.backend.allocate(backend_size(size), align) }
    }

    /// Release a block. Null is ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this router with exactly this `size` and `align`,
    /// and must not be used afterwards.
    #[inline]
    pub unsafe fn dealloc(&self, ptr: *mut u8, size: usize, align: usize) {
        if ptr.is_null() {
            return;
        }
        // SAFETY: forwarded caller contract; size normalized as on allocation.
        unsafe { self.backend.deallocate(ptr, backend_size(size), align) }
    }

    /// Resize a block to `new_size`, preserving `min(old_size, new_size)`
    /// bytes. On null the original block is untouched and still owned by
    /// the caller. A null `ptr` behaves like `alloc(new_size, align)`.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from this router with exactly `old_size`
    /// and `align`. On success `ptr` must not be used afterwards.
    #[inline]
    pub unsafe fn realloc(
        &self,
        ptr: *mut u8,
        old_size: usize,
        align: usize,
        new_size: usize,
    ) -> *mut u8 {
        if ptr.is_null() {
            // SAFETY: forwarded caller contract.
            return unsafe { self.alloc(new_size, align) };
        }
        if !self.alignment_supported(align) {
            return ptr::null_mut();
        }
        // SAFETY: forwarded caller contract; both sizes normalized.
        unsafe {
            self.backend
                .reallocate(ptr, backend_size(old_size), align, backend_size(new_size))
        }
    }

    /// Allocate `size` zero bytes aligned to `align`, or return null.
    ///
    /// # Safety
    ///
    /// `align` must be a non-zero power of two.
    #[inline]
    pub unsafe fn alloc_zeroed(&self, size: usize, align: usize) -> *mut u8 {
        if self.backend.supports_zeroed_allocate() {
            if !self.alignment_supported(align) {
                return ptr::null_mut();
            }
            // SAFETY: size normalized, alignment within the backend limit.
            return unsafe { self.backend.allocate_zeroed(backend_size(size), align) };
        }

        // SAFETY: forwarded caller contract.
        let ptr = unsafe { self.alloc(size, align) };
        if !ptr.is_null() {
            // SAFETY: `ptr` is valid for at least `size` bytes.
            unsafe { ptr::write_bytes(ptr, 0, size) };
        }
        ptr
    }

    /// Allocate an owned, zero-filled block for a validated request.
    ///
    /// Goes through [`alloc_zeroed`](Self::alloc_zeroed), so every byte of
    /// the block is initialized before it can be read.
    pub fn allocate(&self, request: AllocRequest) -> Result<OwnedBlock<'_, B>, AllocError> {
        // SAFETY: `AllocRequest` guarantees a power-of-two alignment.
        let ptr = unsafe { self.alloc_zeroed(request.size(), request.align()) };
        self.adopt(ptr, request)
    }

    /// Allocate an owned block through the plain [`alloc`](Self::alloc)
    /// path and fill it with `byte`.
    pub fn allocate_filled(
        &self,
        request: AllocRequest,
        byte: u8,
    ) -> Result<OwnedBlock<'_, B>, AllocError> {
        // SAFETY: `AllocRequest` guarantees a power-of-two alignment.
        let ptr = unsafe { self.alloc(request.size(), request.align()) };
        if !ptr.is_null() {
            // SAFETY: `ptr` is valid for at least `request.size()` bytes.
            unsafe { ptr::write_bytes(ptr, byte, request.size()) };
        }
        self.adopt(ptr, request)
    }

    fn adopt(&self, ptr: *mut u8, request: AllocRequest) -> Result<OwnedBlock<'_, B>, AllocError> {
        match NonNull::new(ptr) {
            // SAFETY: fresh, fully initialized block from this router for `request`.
            Some(ptr) => Ok(unsafe { OwnedBlock::from_raw_parts(self, ptr, request) }),
            None => Err(AllocError {
                size: request.size(),
                align: request.align(),
            }),
        }
    }
}
