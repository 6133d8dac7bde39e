//! Owned blocks: a safe handle over the raw router entry points.
//!
//! An [`OwnedBlock`] remembers the exact size and alignment it was allocated
//! with, so deallocation and resizing always hand the router matching
//! metadata. It is what the harness and the tests use instead of raw
//! pointers.
//!
//! Every byte of a block is initialized for its whole life: blocks are born
//! zeroed or filled, and [`OwnedBlock::resize`] zeroes any bytes it adds.

use std::fmt;
use std::ptr::NonNull;

use crate::backend::BackendStrategy;
use crate::error::AllocError;
use crate::request::AllocRequest;
use crate::router::Router;

pub struct OwnedBlock<'r, B: BackendStrategy> {
    router: &'r Router<B>,
    ptr: NonNull<u8>,
    request: AllocRequest,
}

// SAFETY: the block is uniquely owned memory and every backend is required to
// accept calls from any thread.
unsafe impl<B: BackendStrategy> Send for OwnedBlock<'_, B> {}
// SAFETY: shared access only hands out `&[u8]`.
unsafe impl<B: BackendStrategy> Sync for OwnedBlock<'_, B> {}

impl<'r, B: BackendStrategy> OwnedBlock<'r, B> {
    /// # Safety
    ///
    /// `ptr` must be a live block from `router` allocated for exactly
    /// `request`, with all `request.size()` bytes initialized. Ownership
    /// passes to the returned value.
    pub unsafe fn from_raw_parts(
        router: &'r Router<B>,
        ptr: NonNull<u8>,
        request: AllocRequest,
    ) -> Self {
        Self {
            router,
            ptr,
            request,
        }
    }

    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.request.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.request.size() == 0
    }

    #[must_use]
    pub fn align(&self) -> usize {
        self.request.align()
    }

    #[must_use]
    pub fn request(&self) -> AllocRequest {
        self.request
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the block is live, valid and initialized for `len` bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the block is live, initialized for `len` bytes and uniquely borrowed.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }

    /// Resize to `new_size` bytes, keeping the alignment.
    ///
    /// Bytes past the old length are zeroed. On failure the block is
    /// unchanged: same address, same contents.
    pub fn resize(&mut self, new_size: usize) -> Result<(), AllocError> {
        let failed = AllocError {
            size: new_size,
            align: self.align(),
        };
        let Ok(new_request) = self.request.with_size(new_size) else {
            return Err(failed);
        };
        // SAFETY: the block came from `self.router` with `self.request`.
        let new_ptr = unsafe {
            self.router
                .realloc(self.ptr.as_ptr(), self.len(), self.align(), new_size)
        };
        let new_ptr = NonNull::new(new_ptr).ok_or(failed)?;
        let old_len = self.len();
        if new_size > old_len {
            // SAFETY: the block is valid for `new_size` bytes and the first
            // `old_len` were carried over by realloc.
            unsafe {
                std::ptr::write_bytes(new_ptr.as_ptr().add(old_len), 0, new_size - old_len);
            }
        }
        self.ptr = new_ptr;
        self.request = new_request;
        Ok(())
    }

    /// Give up ownership without freeing.
    #[must_use]
    pub fn into_raw(self) -> (NonNull<u8>, AllocRequest) {
        let parts = (self.ptr, self.request);
        std::mem::forget(self);
        parts
    }
}

impl<B: BackendStrategy> Drop for OwnedBlock<'_, B> {
    fn drop(&mut self) {
        // SAFETY: the block came from `self.router` with `self.request`.
        unsafe {
            self.router
                .dealloc(self.ptr.as_ptr(), self.len(), self.align());
        }
    }
}

impl<B: BackendStrategy> fmt::Debug for OwnedBlock<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedBlock")
            .field("backend", &self.router.backend().kind())
            .field("ptr", &self.ptr)
            .field("size", &self.len())
            .field("align", &self.align())
            .finish()
    }
}
