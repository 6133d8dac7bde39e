//! Property checks of the allocation contract against one backend.
//!
//! Every check goes through the safe [`OwnedBlock`](heapbridge_core::OwnedBlock)
//! API, so a failing backend shows up as a failed check rather than a crash
//! of the harness (memory corruption aside).

use std::collections::HashSet;
use std::time::Instant;

use heapbridge_core::{
    AllocRequest, Backend, BackendKind, BackendStrategy, BuildConfig, OwnedBlock, RequestError,
    Router,
};
use serde::Serialize;

use crate::HarnessError;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Operation, Outcome};

const SIZES: [usize; 7] = [0, 1, 7, 16, 100, 4096, 65_537];
const ALIGNS: [usize; 9] = [1, 2, 4, 8, 16, 32, 64, 512, 4096];
const REUSE_CYCLES: usize = 4_096;
/// Large enough that no backend can serve it, small enough to be a valid request.
const IMPOSSIBLE_SIZE: usize = isize::MAX as usize - 4096;

enum Verdict {
    Pass,
    Skip(String),
}

/// The router call a check failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailedOp {
    pub operation: Operation,
    pub size: usize,
    pub align: usize,
    pub latency_ns: u64,
}

struct Failure {
    message: String,
    op: Option<FailedOp>,
}

impl Failure {
    fn at(op: FailedOp, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            op: Some(op),
        }
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self { message, op: None }
    }
}

impl From<RequestError> for Failure {
    fn from(err: RequestError) -> Self {
        err.to_string().into()
    }
}

type CheckFn = fn(&Router) -> Result<Verdict, Failure>;

const CHECKS: &[(&str, CheckFn)] = &[
    ("alignment_grid", check_alignment_grid),
    ("zeroed_allocation", check_zeroed_allocation),
    ("reuse_cycles", check_reuse_cycles),
    ("over_alignment_refused", check_over_alignment_refused),
    ("resize_preserves_prefix", check_resize_preserves_prefix),
    ("failed_resize_keeps_block", check_failed_resize_keeps_block),
    ("zero_size_handles", check_zero_size_handles),
];

/// Result of a single property check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_op: Option<FailedOp>,
}

/// All checks run against one backend.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub backend: String,
    pub platform: String,
    pub max_supported_alignment: Option<usize>,
    pub checks: Vec<CheckResult>,
}

impl VerifyReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(Outcome::Fail)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skip)
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.checks.iter().filter(|c| c.outcome == outcome).count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// `Ok` when nothing failed, otherwise [`HarnessError::CheckFailed`].
    pub fn ensure_passed(&self) -> Result<(), HarnessError> {
        if self.all_passed() {
            Ok(())
        } else {
            Err(HarnessError::CheckFailed {
                backend: self.backend.clone(),
                failed: self.failed(),
                total: self.total(),
            })
        }
    }
}

fn check_record(kind: BackendKind, name: &str, result: &CheckResult) -> LogEntry {
    let level = if result.outcome == Outcome::Fail {
        LogLevel::Error
    } else {
        LogLevel::Info
    };
    let mut entry = LogEntry::new("", level, "check_result")
        .with_backend(kind)
        .with_outcome(result.outcome)
        .with_duration_ms(result.duration_ms)
        .with_details(serde_json::json!({ "check": name, "detail": result.detail }));
    if let Some(op) = result.failed_op {
        entry = entry
            .with_request(op.operation, op.size, op.align)
            .with_latency_ns(op.latency_ns);
    }
    entry
}

/// Run every check against a fresh router over `kind`.
pub fn run_verify(
    kind: BackendKind,
    mut log: Option<&mut LogEmitter>,
) -> Result<VerifyReport, HarnessError> {
    let router = Router::new(Backend::for_kind(kind));
    run_checks(&router, kind, CHECKS, log.as_deref_mut())
}

fn run_checks(
    router: &Router,
    kind: BackendKind,
    checks: &[(&str, CheckFn)],
    mut log: Option<&mut LogEmitter>,
) -> Result<VerifyReport, HarnessError> {
    let mut results = Vec::with_capacity(checks.len());

    for &(name, check) in checks {
        let started = Instant::now();
        let (outcome, detail, failed_op) = match check(router) {
            Ok(Verdict::Pass) => (Outcome::Pass, None, None),
            Ok(Verdict::Skip(why)) => (Outcome::Skip, Some(why), None),
            Err(failure) => (Outcome::Fail, Some(failure.message), failure.op),
        };
        let result = CheckResult {
            name: name.to_string(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            detail,
            failed_op,
        };

        if let Some(log) = log.as_deref_mut() {
            log.emit_entry(check_record(kind, name, &result))?;
        }
        results.push(result);
    }

    Ok(VerifyReport {
        backend: kind.as_str().to_string(),
        platform: BuildConfig::current().platform.as_str().to_string(),
        max_supported_alignment: router.backend().max_supported_alignment(),
        checks: results,
    })
}

// ---------------------------------------------------------------------------
// Timed operations
// ---------------------------------------------------------------------------

fn timed<T>(operation: Operation, size: usize, align: usize, f: impl FnOnce() -> T) -> (T, FailedOp) {
    let started = Instant::now();
    let out = f();
    let op = FailedOp {
        operation,
        size,
        align,
        latency_ns: started.elapsed().as_nanos() as u64,
    };
    (out, op)
}

type Timed<'r> = (OwnedBlock<'r, Backend>, FailedOp);

/// Zero-filled block; the router serves it through `alloc_zeroed`.
fn allocate(router: &Router, size: usize, align: usize) -> Result<Timed<'_>, Failure> {
    let req = AllocRequest::new(size, align)?;
    let (result, op) = timed(Operation::AllocZeroed, size, align, || router.allocate(req));
    result
        .map(|block| (block, op))
        .map_err(|e| Failure::at(op, e.to_string()))
}

/// Block filled with `byte`; the router serves it through `alloc`.
fn allocate_filled(
    router: &Router,
    size: usize,
    align: usize,
    byte: u8,
) -> Result<Timed<'_>, Failure> {
    let req = AllocRequest::new(size, align)?;
    let (result, op) = timed(Operation::Alloc, size, align, || {
        router.allocate_filled(req, byte)
    });
    result
        .map(|block| (block, op))
        .map_err(|e| Failure::at(op, e.to_string()))
}

fn resize(block: &mut OwnedBlock<'_, Backend>, new_size: usize) -> Result<FailedOp, Failure> {
    let align = block.align();
    let (result, op) = timed(Operation::Realloc, new_size, align, || block.resize(new_size));
    result.map(|()| op).map_err(|e| Failure::at(op, e.to_string()))
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_alignment_grid(router: &Router) -> Result<Verdict, Failure> {
    for size in SIZES {
        for align in ALIGNS {
            let (mut block, op) = allocate_filled(router, size, align, 0xAB)?;
            if block.addr() % align != 0 {
                return Err(Failure::at(
                    op,
                    format!("returned misaligned {:#x}", block.addr()),
                ));
            }
            if !block.as_slice().iter().all(|&b| b == 0xAB) {
                return Err(Failure::at(op, "fill did not stick"));
            }
            block.as_mut_slice().fill(0x5A);
            if !block.as_slice().iter().all(|&b| b == 0x5A) {
                return Err(Failure::at(op, "block is not writable"));
            }
        }
    }
    Ok(Verdict::Pass)
}

fn check_zeroed_allocation(router: &Router) -> Result<Verdict, Failure> {
    for size in SIZES {
        for align in [1, 8, 64, 4096] {
            // Leave dirty memory behind for the zeroed call to possibly reuse.
            drop(allocate_filled(router, size, align, 0xEE)?);

            let (block, op) = allocate(router, size, align)?;
            if block.addr() % align != 0 {
                return Err(Failure::at(op, "misaligned"));
            }
            if let Some(pos) = block.as_slice().iter().position(|&b| b != 0) {
                return Err(Failure::at(op, format!("byte {pos} is non-zero")));
            }
        }
    }
    Ok(Verdict::Pass)
}

/// Freed blocks must come back: a heap that never reclaims them hands out a
/// fresh address on every cycle. Over-aligned sizes stay above the C heap's
/// small-chunk caches so freed blocks coalesce.
fn check_reuse_cycles(router: &Router) -> Result<Verdict, Failure> {
    for (size, align) in [(24, 8), (2000, 32), (3000, 4096)] {
        let mut seen = HashSet::new();
        let mut slowest: Option<FailedOp> = None;
        for cycle in 0..REUSE_CYCLES {
            let (block, op) = allocate_filled(router, size, align, cycle as u8)
                .map_err(|f| Failure {
                    message: format!("cycle {cycle}: {}", f.message),
                    op: f.op,
                })?;
            seen.insert(block.addr());
            if slowest.is_none_or(|s| op.latency_ns > s.latency_ns) {
                slowest = Some(op);
            }
        }
        if seen.len() >= REUSE_CYCLES / 2 {
            let message = format!(
                "{} distinct addresses in {REUSE_CYCLES} alloc/free cycles: freed blocks are not reclaimed",
                seen.len()
            );
            return Err(match slowest {
                Some(op) => Failure::at(op, message),
                None => message.into(),
            });
        }
    }
    Ok(Verdict::Pass)
}

fn check_over_alignment_refused(router: &Router) -> Result<Verdict, Failure> {
    let Some(max) = router.backend().max_supported_alignment() else {
        return Ok(Verdict::Skip("backend has no alignment limit".to_string()));
    };
    let Some(align) = max.checked_mul(2) else {
        return Ok(Verdict::Skip(format!("limit {max} cannot be exceeded")));
    };
    for _ in 0..100 {
        if let Ok((_, op)) = allocate_filled(router, 64, align, 0) {
            return Err(Failure::at(op, format!("succeeded above limit {max}")));
        }
        if let Ok((_, op)) = allocate(router, 64, align) {
            return Err(Failure::at(op, format!("succeeded above limit {max}")));
        }
    }
    // The limit itself is still served.
    allocate_filled(router, 64, max, 0)?;
    Ok(Verdict::Pass)
}

fn check_resize_preserves_prefix(router: &Router) -> Result<Verdict, Failure> {
    for align in [8, 64, 4096] {
        let (mut block, _) = allocate(router, 16, align)?;
        for (i, b) in block.as_mut_slice().iter_mut().enumerate() {
            *b = 0xA0 | i as u8;
        }

        let op = resize(&mut block, 64)?;
        let grown_ok = block.as_slice()[..16]
            .iter()
            .enumerate()
            .all(|(i, &b)| b == 0xA0 | i as u8);
        if !grown_ok || block.addr() % align != 0 {
            return Err(Failure::at(op, "grow 16 -> 64 lost data or alignment"));
        }

        let op = resize(&mut block, 4)?;
        if block.as_slice() != [0xA0, 0xA1, 0xA2, 0xA3] {
            return Err(Failure::at(op, "shrink 64 -> 4 lost data"));
        }
    }
    Ok(Verdict::Pass)
}

fn check_failed_resize_keeps_block(router: &Router) -> Result<Verdict, Failure> {
    let (mut block, _) = allocate_filled(router, 16, 8, 0x3C)?;
    let addr = block.addr();

    if let Ok(op) = resize(&mut block, IMPOSSIBLE_SIZE) {
        return Err(Failure::at(op, "impossible resize succeeded"));
    }
    if block.addr() != addr || block.len() != 16 {
        return Err("failed resize moved the block".to_string().into());
    }
    if !block.as_slice().iter().all(|&b| b == 0x3C) {
        return Err("failed resize changed the contents".to_string().into());
    }
    resize(&mut block, 32).map_err(|f| Failure {
        message: format!("block unusable after failed resize: {}", f.message),
        op: f.op,
    })?;
    Ok(Verdict::Pass)
}

fn check_zero_size_handles(router: &Router) -> Result<Verdict, Failure> {
    for align in [1, 16, 256] {
        let blocks = (0..8)
            .map(|_| allocate(router, 0, align))
            .collect::<Result<Vec<_>, Failure>>()?;
        for (i, (block, op)) in blocks.iter().enumerate() {
            if block.addr() % align != 0 {
                return Err(Failure::at(*op, "misaligned"));
            }
            if blocks[..i].iter().any(|(other, _)| other.addr() == block.addr()) {
                return Err(Failure::at(*op, "duplicate zero-size handle"));
            }
        }
    }
    Ok(Verdict::Pass)
}
