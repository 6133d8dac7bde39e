//! # heapbridge-core
//!
//! Allocation router that lets Rust code share one process-wide heap with the
//! C and C++ code linked into the same binary.
//!
//! The router exposes the four operations a Rust global allocator needs
//! (`alloc`, `dealloc`, `realloc`, `alloc_zeroed`) and forwards each call to
//! exactly one backend, chosen once from the build configuration:
//!
//! ```text
//! runtime entry point -> Router -> SharedHeap | AlignedHeap | RuntimeDefault
//! ```
//!
//! - **Shared heap** (`shared-allocator` feature): the process C heap, called
//!   through its fallible paths so `Vec::try_reserve` can fail without
//!   aborting.
//! - **Aligned heap**: the platform aligned-heap API. Selected on Windows when
//!   instrumentation is active and the shared heap is not, because the
//!   instrumentation runtime only hooks that API.
//! - **Runtime default**: `std::alloc::System`.
//!
//! The router itself holds no state. Failures surface as null pointers and are
//! never escalated.

pub mod backend;
pub mod block;
pub mod config;
pub mod error;
pub mod request;
pub mod router;

mod sys;

pub use backend::{AlignedHeap, Backend, BackendStrategy, RuntimeDefault, SharedHeap};
pub use block::OwnedBlock;
pub use config::{BackendKind, BuildConfig, Platform};
pub use error::{AllocError, RequestError};
pub use request::AllocRequest;
pub use router::{ROUTER, Router};
