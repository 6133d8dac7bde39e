//! Verification harness for the heapbridge router.
//!
//! This crate provides:
//! - Property checks: run the allocation contract against any backend
//! - Stress runs: multi-threaded randomized alloc/resize/free with handoff
//! - Structured logging: JSONL records for every check and run

#![forbid(unsafe_code)]

pub mod stress;
pub mod structured_log;
pub mod verify;

use heapbridge_core::RequestError;
use heapbridge_core::config::ParseBackendKindError;
use thiserror::Error;

pub use stress::{Incident, IncidentKind, StressConfig, StressReport, run_stress};
pub use verify::{CheckResult, FailedOp, VerifyReport, run_verify};

/// Failures surfaced by the harness CLI.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid allocation request: {0}")]
    Request(#[from] RequestError),
    #[error(transparent)]
    Parse(#[from] ParseBackendKindError),
    #[error("{failed} of {total} checks failed for backend `{backend}`")]
    CheckFailed {
        backend: String,
        failed: usize,
        total: usize,
    },
    #[error("stress run on `{backend}` found {errors} corrupted blocks")]
    StressFailed { backend: String, errors: u64 },
}
