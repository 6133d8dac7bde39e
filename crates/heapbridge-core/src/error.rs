//! Error types for the safe edges of the router.
//!
//! The raw entry points never build these: they report failure as a null
//! pointer. Only [`AllocRequest`](crate::AllocRequest) validation and the
//! [`OwnedBlock`](crate::OwnedBlock) API surface typed errors.

use thiserror::Error;

/// An allocation request that no backend could ever satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("alignment must be non-zero")]
    ZeroAlignment,
    #[error("alignment {0} is not a power of two")]
    NonPowerOfTwo(usize),
    #[error("size {size} rounded up to alignment {align} exceeds isize::MAX")]
    SizeOverflow { size: usize, align: usize },
}

/// The backend returned null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("backend could not provide {size} bytes aligned to {align}")]
pub struct AllocError {
    pub size: usize,
    pub align: usize,
}
