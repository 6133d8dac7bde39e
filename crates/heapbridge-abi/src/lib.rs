// Exported entry points take raw pointers from C/C++ callers and carry the
// GlobalAlloc contract; per-function safety docs live on the router.
#![allow(clippy::missing_safety_doc)]
//! # heapbridge-abi
//!
//! Link-visible boundary of the heapbridge router.
//!
//! - [`alloc_abi`]: `extern "C"` exports of the four operations, for the C and
//!   C++ side of a mixed binary.
//! - [`RoutedAllocator`]: a [`GlobalAlloc`](std::alloc::GlobalAlloc) that sends
//!   Rust's own allocations through the same router.
//!
//! ```text
//! Rust heap symbols -> RoutedAllocator ─┐
//!                                       ├─> heapbridge_core::ROUTER -> backend
//! C/C++ callers -> heapbridge_alloc  ───┘
//! ```
//!
//! Registration is an explicit build-time choice: with the `global-allocator`
//! feature this crate installs `RoutedAllocator` itself; with
//! `system-allocator` it installs `std::alloc::System`; with neither, the
//! final binary decides. When both are enabled (`--all-features`),
//! `global-allocator` wins. [`REGISTRATION`] reports the outcome.

#[macro_use]
mod macros;

pub mod alloc_abi;
mod global;

pub use global::RoutedAllocator;

/// Which `#[global_allocator]` this crate registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Nothing; the final binary registers its own.
    None,
    Routed,
    System,
}

impl Registration {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Routed => "routed",
            Self::System => "system",
        }
    }
}

pub const REGISTRATION: Registration = if cfg!(feature = "global-allocator") {
    Registration::Routed
} else if cfg!(feature = "system-allocator") {
    Registration::System
} else {
    Registration::None
};

#[cfg(feature = "global-allocator")]
#[global_allocator]
static GLOBAL: RoutedAllocator = RoutedAllocator;

#[cfg(all(feature = "system-allocator", not(feature = "global-allocator")))]
#[global_allocator]
static GLOBAL: std::alloc::System = std::alloc::System;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_follows_features() {
        let expected = match (
            cfg!(feature = "global-allocator"),
            cfg!(feature = "system-allocator"),
        ) {
            (true, _) => Registration::Routed,
            (false, true) => Registration::System,
            (false, false) => Registration::None,
        };
        assert_eq!(REGISTRATION, expected);
        assert_eq!(REGISTRATION.as_str(), expected.as_str());
    }
}
