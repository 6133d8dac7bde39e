//! Multi-threaded randomized stress of one backend.
//!
//! Each worker keeps a table of live blocks and randomly allocates, resizes,
//! frees, or hands a block to another thread through a shared exchange.
//! Every block is filled with a tag byte and checked before it is resized,
//! handed off, or freed. Corruption is counted, not panicked on, so a run
//! always produces a report; the first few incidents keep the operation,
//! request and latency that exposed them.

use std::thread;
use std::time::{Duration, Instant};

use heapbridge_core::{AllocRequest, Backend, BackendKind, OwnedBlock, Router};
use parking_lot::Mutex;
use serde::Serialize;

use crate::HarnessError;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Operation, Outcome};

/// Incidents kept per run; the counters still count every one.
const MAX_INCIDENTS: usize = 32;

/// Deterministic xorshift64* generator.
#[derive(Clone, Copy, Debug)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform-ish value in `low..=high`.
    pub fn gen_range(&mut self, low: usize, high: usize) -> usize {
        debug_assert!(low <= high);
        let x = self.next_u64();
        match ((high - low) as u64).checked_add(1) {
            Some(span) => low + (x % span) as usize,
            // Full 64-bit range: every value is already in bounds.
            None => low.wrapping_add(x as usize),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StressConfig {
    pub backend: BackendKind,
    pub threads: usize,
    /// Live blocks per thread.
    pub slots: usize,
    pub duration: Duration,
    pub seed: u64,
    pub max_size: usize,
    /// Alignments are drawn from `1 << 0 ..= 1 << max_align_log2`, capped
    /// at the widest shift a `usize` allows.
    pub max_align_log2: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            backend: heapbridge_core::BuildConfig::current().backend_kind(),
            threads: 8,
            slots: 64,
            duration: Duration::from_millis(1_000),
            seed: 0xDEAD_BEEF,
            max_size: 16_384,
            max_align_log2: 12,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StressCounters {
    pub ops: u64,
    pub allocs: u64,
    pub resizes: u64,
    pub frees: u64,
    pub handoffs: u64,
    /// Null returns from the backend. Not an error in itself.
    pub failed_allocs: u64,
    pub corruptions: u64,
}

impl StressCounters {
    fn merge(&mut self, other: &Self) {
        self.ops += other.ops;
        self.allocs += other.allocs;
        self.resizes += other.resizes;
        self.frees += other.frees;
        self.handoffs += other.handoffs;
        self.failed_allocs += other.failed_allocs;
        self.corruptions += other.corruptions;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Misaligned,
    Corrupted,
    /// The backend returned null. Counted in `failed_allocs`, not an error.
    AllocFailed,
}

/// One anomaly, with the router call it was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Incident {
    pub kind: IncidentKind,
    pub operation: Operation,
    pub size: usize,
    pub align: usize,
    pub latency_ns: u64,
}

#[derive(Debug, Default)]
struct Tally {
    counters: StressCounters,
    incidents: Vec<Incident>,
}

impl Tally {
    fn record(&mut self, kind: IncidentKind, operation: Operation, size: usize, align: usize, latency_ns: u64) {
        match kind {
            IncidentKind::Misaligned | IncidentKind::Corrupted => self.counters.corruptions += 1,
            IncidentKind::AllocFailed => self.counters.failed_allocs += 1,
        }
        if self.incidents.len() < MAX_INCIDENTS {
            self.incidents.push(Incident {
                kind,
                operation,
                size,
                align,
                latency_ns,
            });
        }
    }

    fn merge(&mut self, other: Self) {
        self.counters.merge(&other.counters);
        let room = MAX_INCIDENTS.saturating_sub(self.incidents.len());
        self.incidents.extend(other.incidents.into_iter().take(room));
    }

    /// Check the tag, then free the block.
    fn release(&mut self, fill: u8, block: OwnedBlock<'_, Backend>) {
        let (size, align) = (block.len(), block.align());
        let corrupted = !intact(fill, &block);
        let started = Instant::now();
        drop(block);
        let latency = elapsed_ns(started);
        if corrupted {
            self.record(IncidentKind::Corrupted, Operation::Dealloc, size, align, latency);
        }
        self.counters.frees += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub backend: String,
    pub threads: usize,
    pub seed: u64,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub counters: StressCounters,
    pub incidents: Vec<Incident>,
}

impl StressReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.counters.corruptions == 0
    }

    pub fn ensure_passed(&self) -> Result<(), HarnessError> {
        if self.passed() {
            Ok(())
        } else {
            Err(HarnessError::StressFailed {
                backend: self.backend.clone(),
                errors: self.counters.corruptions,
            })
        }
    }
}

type Tagged<'r> = (u8, OwnedBlock<'r, Backend>);

fn intact(fill: u8, block: &OwnedBlock<'_, Backend>) -> bool {
    block.as_slice().iter().all(|&b| b == fill)
}

fn elapsed_ns(started: Instant) -> u64 {
    started.elapsed().as_nanos() as u64
}

fn worker<'r>(
    router: &'r Router,
    exchange: &Mutex<Vec<Tagged<'r>>>,
    config: &StressConfig,
    thread_id: usize,
) -> Tally {
    let mut rng = XorShift64::new(config.seed ^ (thread_id as u64).wrapping_mul(0x9E37_79B9));
    let mut slots: Vec<Option<Tagged<'r>>> = (0..config.slots).map(|_| None).collect();
    let mut tally = Tally::default();
    let started = Instant::now();

    while started.elapsed() < config.duration {
        tally.counters.ops += 1;
        let slot = rng.gen_range(0, config.slots - 1);
        match (slots[slot].take(), rng.gen_range(0, 3)) {
            (None, _) => {
                let size = rng.gen_range(0, config.max_size);
                let align = 1usize << rng.gen_range(0, config.max_align_log2 as usize);
                let Ok(request) = AllocRequest::new(size, align) else {
                    continue;
                };
                let fill = (rng.next_u64() as u8) | 1;
                let op_started = Instant::now();
                let result = router.allocate_filled(request, fill);
                let latency = elapsed_ns(op_started);
                match result {
                    Ok(block) => {
                        tally.counters.allocs += 1;
                        if block.addr() % align != 0 {
                            tally.record(IncidentKind::Misaligned, Operation::Alloc, size, align, latency);
                        }
                        slots[slot] = Some((fill, block));
                    }
                    Err(_) => {
                        tally.record(IncidentKind::AllocFailed, Operation::Alloc, size, align, latency);
                    }
                }
            }
            (Some((fill, mut block)), 0) => {
                let corrupted = !intact(fill, &block);
                let new_size = rng.gen_range(0, config.max_size);
                let align = block.align();
                let op_started = Instant::now();
                let resized = block.resize(new_size);
                let latency = elapsed_ns(op_started);
                if corrupted {
                    tally.record(IncidentKind::Corrupted, Operation::Realloc, new_size, align, latency);
                }
                match resized {
                    Ok(()) => {
                        tally.counters.resizes += 1;
                        block.as_mut_slice().fill(fill);
                    }
                    Err(_) => {
                        tally.record(IncidentKind::AllocFailed, Operation::Realloc, new_size, align, latency);
                    }
                }
                slots[slot] = Some((fill, block));
            }
            (Some((fill, block)), 1) => {
                tally.counters.handoffs += 1;
                exchange.lock().push((fill, block));
            }
            (Some((fill, block)), _) => tally.release(fill, block),
        }

        // Free someone else's block now and then.
        if tally.counters.ops % 16 == 0 {
            let handed = exchange.lock().pop();
            if let Some((fill, block)) = handed {
                tally.release(fill, block);
            }
        }
    }

    for (fill, block) in slots.into_iter().flatten() {
        tally.release(fill, block);
    }
    tally
}

/// Run the stress workload and aggregate per-thread counters.
pub fn run_stress(
    config: &StressConfig,
    log: Option<&mut LogEmitter>,
) -> Result<StressReport, HarnessError> {
    let router = Router::new(Backend::for_kind(config.backend));
    let exchange: Mutex<Vec<Tagged<'_>>> = Mutex::new(Vec::new());
    let totals = Mutex::new(Tally::default());
    let threads = config.threads.max(1);
    let config = StressConfig {
        slots: config.slots.max(1),
        max_align_log2: config.max_align_log2.min(usize::BITS - 1),
        ..config.clone()
    };
    let started = Instant::now();

    thread::scope(|scope| {
        for thread_id in 0..threads {
            let (router, exchange, totals, config) = (&router, &exchange, &totals, &config);
            scope.spawn(move || {
                let tally = worker(router, exchange, config, thread_id);
                totals.lock().merge(tally);
            });
        }
    });

    let mut tally = totals.into_inner();
    for (fill, block) in exchange.into_inner() {
        tally.release(fill, block);
    }

    let report = StressReport {
        backend: config.backend.as_str().to_string(),
        threads,
        seed: config.seed,
        duration_ms: started.elapsed().as_millis() as u64,
        counters: tally.counters,
        incidents: tally.incidents,
    };

    if let Some(log) = log {
        let (level, outcome) = if report.passed() {
            (LogLevel::Info, Outcome::Pass)
        } else {
            (LogLevel::Error, Outcome::Fail)
        };
        log.emit_entry(
            LogEntry::new("", level, "stress_result")
                .with_backend(config.backend)
                .with_outcome(outcome)
                .with_duration_ms(report.duration_ms)
                .with_details(serde_json::to_value(&report)?),
        )?;
        for incident in &report.incidents {
            let level = match incident.kind {
                IncidentKind::AllocFailed => LogLevel::Warn,
                IncidentKind::Misaligned | IncidentKind::Corrupted => LogLevel::Error,
            };
            log.emit_entry(
                LogEntry::new("", level, "stress_incident")
                    .with_backend(config.backend)
                    .with_request(incident.operation, incident.size, incident.align)
                    .with_latency_ns(incident.latency_ns)
                    .with_details(serde_json::json!({ "kind": incident.kind })),
            )?;
        }
    }

    Ok(report)
}
