//! Validated allocation requests.

use std::alloc::Layout;

use crate::error::RequestError;

/// Size the backend actually sees for a caller-visible size.
///
/// Zero-byte requests are rounded up to one byte on every operation, so that
/// `alloc(0, align)` always yields a distinct handle and the matching
/// `dealloc`/`realloc` calls reach the backend with the same byte count.
#[inline]
#[must_use]
pub const fn backend_size(size: usize) -> usize {
    if size == 0 { 1 } else { size }
}

/// A `(size, align)` pair checked against the router's preconditions.
///
/// The raw router entry points trust their callers; this type exists for
/// callers holding untrusted numbers (CLI input, randomized tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocRequest {
    size: usize,
    align: usize,
}

impl AllocRequest {
    /// Validate `size` and `align`.
    ///
    /// `align` must be a non-zero power of two, and `size` rounded up to
    /// `align` must not exceed `isize::MAX`.
    pub const fn new(size: usize, align: usize) -> Result<Self, RequestError> {
        if align == 0 {
            return Err(RequestError::ZeroAlignment);
        }
        if !align.is_power_of_two() {
            return Err(RequestError::NonPowerOfTwo(align));
        }
        if size > isize::MAX as usize - (align - 1) {
            return Err(RequestError::SizeOverflow { size, align });
        }
        Ok(Self { size, align })
    }

    #[inline]
    #[must_use]
    pub const fn size(self) -> usize {
        self.size
    }

    #[inline]
    #[must_use]
    pub const fn align(self) -> usize {
        self.align
    }

    /// Same alignment, different size.
    pub const fn with_size(self, size: usize) -> Result<Self, RequestError> {
        Self::new(size, self.align)
    }

    #[must_use]
    pub fn layout(self) -> Layout {
        // SAFETY: `new` enforced exactly the invariants of `Layout::from_size_align`.
        unsafe { Layout::from_size_align_unchecked(self.size, self.align) }
    }
}

impl From<Layout> for AllocRequest {
    fn from(layout: Layout) -> Self {
        Self {
            size: layout.size(),
            align: layout.align(),
        }
    }
}
