//! Build configuration.
//!
//! The backend is fixed at compile time from three inputs:
//! - the target platform (`cfg(windows)`),
//! - the `shared-allocator` feature,
//! - the `instrumented` feature, set by builds running under a memory
//!   instrumentation runtime.
//!
//! Nothing here changes at runtime. [`BuildConfig::current`] is a `const fn`
//! so the process-wide router can be built in a `static`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Target platform, as far as backend selection cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Windows, which provides the `_aligned_malloc` family.
    Windows,
    /// Everything else.
    Other,
}

impl Platform {
    /// Platform this crate was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Other
        }
    }

    /// Returns true if instrumented builds must go through the platform
    /// aligned-heap API instead of the runtime default allocator.
    #[must_use]
    pub const fn has_aligned_heap_api(self) -> bool {
        matches!(self, Self::Windows)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Other => "other",
        }
    }
}

/// Which backend the router forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Fallible paths of the process C heap.
    SharedHeap,
    /// Platform aligned-heap API.
    AlignedHeap,
    /// The Rust runtime's own default allocator.
    RuntimeDefault,
}

impl BackendKind {
    pub const ALL: [Self; 3] = [Self::SharedHeap, Self::AlignedHeap, Self::RuntimeDefault];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SharedHeap => "shared",
            Self::AlignedHeap => "aligned-heap",
            Self::RuntimeDefault => "runtime-default",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown backend name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend `{0}` (expected shared, aligned-heap, or runtime-default)")]
pub struct ParseBackendKindError(pub String);

impl FromStr for BackendKind {
    type Err = ParseBackendKindError;

    /// Case-insensitive, with a few aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shared" | "shared-heap" | "shared_heap" | "c-heap" => Ok(Self::SharedHeap),
            "aligned-heap" | "aligned_heap" | "aligned" => Ok(Self::AlignedHeap),
            "runtime-default" | "runtime_default" | "default" | "system" => {
                Ok(Self::RuntimeDefault)
            }
            _ => Err(ParseBackendKindError(s.to_string())),
        }
    }
}

/// Compile-time inputs to backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildConfig {
    pub platform: Platform,
    /// `shared-allocator` feature.
    pub shared_allocator: bool,
    /// `instrumented` feature.
    pub instrumented: bool,
}

impl BuildConfig {
    /// Configuration this crate was compiled with.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            platform: Platform::current(),
            shared_allocator: cfg!(feature = "shared-allocator"),
            instrumented: cfg!(feature = "instrumented"),
        }
    }

    /// Apply the selection policy.
    ///
    /// The shared heap wins whenever it is enabled. Otherwise instrumented
    /// builds on a platform with an aligned-heap API use that API, since the
    /// instrumentation runtime does not observe the runtime default allocator
    /// there. Everything else stays on the runtime default.
    #[must_use]
    pub const fn backend_kind(self) -> BackendKind {
        if self.shared_allocator {
            BackendKind::SharedHeap
        } else if self.instrumented && self.platform.has_aligned_heap_api() {
            BackendKind::AlignedHeap
        } else {
            BackendKind::RuntimeDefault
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::current()
    }
}
