//! Backend strategies.
//!
//! Each backend adapts one external allocator to [`BackendStrategy`]. The
//! router only ever talks to this trait; which implementation sits behind it
//! is decided once, from [`BuildConfig`](crate::BuildConfig).

mod aligned_heap;
mod runtime_default;
mod shared;

pub use aligned_heap::AlignedHeap;
pub use runtime_default::RuntimeDefault;
pub use shared::{MAX_SUPPORTED_ALIGNMENT, NATURAL_ALIGNMENT, SharedHeap};

use crate::config::{BackendKind, BuildConfig};

/// An allocator the router can forward to.
///
/// The router normalizes sizes before calling in: every `size`, `old_size`
/// and `new_size` seen here is at least 1, and `align` is a power of two no
/// larger than [`max_supported_alignment`](Self::max_supported_alignment).
///
/// # Safety
///
/// Implementations must return either null or a pointer to a live block of
/// at least `size` bytes aligned to `align`, and must be callable from any
/// thread concurrently. A failing `reallocate` must leave the original block
/// valid and unchanged.
pub unsafe trait BackendStrategy: Sync {
    fn kind(&self) -> BackendKind;

    /// Largest alignment the backend accepts, if it has a limit. Larger
    /// requests are answered with null before the backend is called.
    fn max_supported_alignment(&self) -> Option<usize> {
        None
    }

    /// Whether [`allocate_zeroed`](Self::allocate_zeroed) is a native
    /// primitive. When false the router allocates and zero-fills itself.
    fn supports_zeroed_allocate(&self) -> bool {
        false
    }

    /// # Safety
    ///
    /// `size >= 1`, `align` a supported power of two.
    unsafe fn allocate(&self, size: usize, align: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` came from this backend with exactly this `size` and `align`.
    unsafe fn deallocate(&self, ptr: *mut u8, size: usize, align: usize);

    /// # Safety
    ///
    /// `ptr` came from this backend with exactly `old_size` and `align`;
    /// `new_size >= 1`.
    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        old_size: usize,
        align: usize,
        new_size: usize,
    ) -> *mut u8;

    /// # Safety
    ///
    /// Same as [`allocate`](Self::allocate).
    unsafe fn allocate_zeroed(&self, size: usize, align: usize) -> *mut u8 {
        // SAFETY: forwarded caller contract.
        let ptr = unsafe { self.allocate(size, align) };
        if !ptr.is_null() {
            // SAFETY: `ptr` is valid for `size` bytes.
            unsafe { std::ptr::write_bytes(ptr, 0, size) };
        }
        ptr
    }
}

/// The three strategies behind one type, so the process-wide router can be a
/// plain `static`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    SharedHeap(SharedHeap),
    AlignedHeap(AlignedHeap),
    RuntimeDefault(RuntimeDefault),
}

impl Backend {
    #[must_use]
    pub const fn for_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::SharedHeap => Self::SharedHeap(SharedHeap),
            BackendKind::AlignedHeap => Self::AlignedHeap(AlignedHeap),
            BackendKind::RuntimeDefault => Self::RuntimeDefault(RuntimeDefault),
        }
    }

    /// Backend selected by `config`.
    #[must_use]
    pub const fn from_config(config: BuildConfig) -> Self {
        Self::for_kind(config.backend_kind())
    }
}

unsafe impl BackendStrategy for Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Self::SharedHeap(b) => b.kind(),
            Self::AlignedHeap(b) => b.kind(),
            Self::RuntimeDefault(b) => b.kind(),
        }
    }

    fn max_supported_alignment(&self) -> Option<usize> {
        match self {
            Self::SharedHeap(b) => b.max_supported_alignment(),
            Self::AlignedHeap(b) => b.max_supported_alignment(),
            Self::RuntimeDefault(b) => b.max_supported_alignment(),
        }
    }

    fn supports_zeroed_allocate(&self) -> bool {
        match self {
            Self::SharedHeap(b) => b.supports_zeroed_allocate(),
            Self::AlignedHeap(b) => b.supports_zeroed_allocate(),
            Self::RuntimeDefault(b) => b.supports_zeroed_allocate(),
        }
    }

    #[inline]
    unsafe fn allocate(&self, size: usize, align: usize) -> *mut u8 {
        // SAFETY: forwarded caller contract.
        unsafe {
            match self {
                Self::SharedHeap(b) => b.allocate(size, align),
                Self::AlignedHeap(b) => b.allocate(size, align),
                Self::RuntimeDefault(b) => b.allocate(size, align),
            }
        }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: *mut u8, size: usize, align: usize) {
        // SAFETY: forwarded caller contract.
        unsafe {
            match self {
                Self::SharedHeap(b) => b.deallocate(ptr, size, align),
                Self::AlignedHeap(b) => b.deallocate(ptr, size, align),
                Self::RuntimeDefault(b) => b.deallocate(ptr, size, align),
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
        // SAFETY: forwarded caller contract.
        unsafe {
            match self {
                Self::SharedHeap(b) => b.reallocate(ptr, old_size, align, new_size),
                Self::AlignedHeap(b) => b.reallocate(ptr, old_size, align, new_size),
                Self::RuntimeDefault(b) => b.reallocate(ptr, old_size, align, new_size),
            }
        }
    }

    #[inline]
    unsafe fn allocate_zeroed(&self, size: usize, align: usize) -> *mut u8 {
        // SAFETY: forwarded caller contract.
        unsafe {
            match self {
                Self::SharedHeap(b) => b.allocate_zeroed(size, align),
                Self::AlignedHeap(b) => b.allocate_zeroed(size, align),
                Self::RuntimeDefault(b) => b.allocate_zeroed(size, align),
            }
        }
    }
}
