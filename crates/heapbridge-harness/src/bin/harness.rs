//! CLI entrypoint for the heapbridge harness.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use heapbridge_abi::Registration;
use heapbridge_core::{BackendKind, BackendStrategy, BuildConfig, ROUTER};
use heapbridge_harness::structured_log::{LogEmitter, LogLevel};
use heapbridge_harness::{HarnessError, StressConfig, run_stress, run_verify};

// The harness itself allocates through the router it is testing, unless
// heapbridge-abi was asked to register an allocator of its own.
#[cfg(not(any(feature = "global-allocator", feature = "system-allocator")))]
#[global_allocator]
static GLOBAL: heapbridge_abi::RoutedAllocator = heapbridge_abi::RoutedAllocator;

/// Verification tooling for heapbridge.
#[derive(Debug, Parser)]
#[command(name = "heapbridge-harness")]
#[command(about = "Property checks and stress runs for the heapbridge allocation router")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the compiled-in configuration and the selected backend.
    Config,
    /// Run the allocation-contract checks.
    Verify {
        /// Backend to check (shared, aligned-heap, runtime-default).
        /// Defaults to the compiled-in selection.
        #[arg(long, conflicts_with = "all")]
        backend: Option<BackendKind>,
        /// Check every backend.
        #[arg(long)]
        all: bool,
        /// Structured JSONL log output path; `-` writes to stdout.
        #[arg(long)]
        log: Option<PathBuf>,
        /// JSON report output path.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Hammer one backend from many threads.
    Stress {
        #[arg(long)]
        backend: Option<BackendKind>,
        #[arg(long, default_value_t = 8)]
        threads: usize,
        /// Live blocks per thread.
        #[arg(long, default_value_t = 64)]
        slots: usize,
        #[arg(long, default_value_t = 1_000)]
        duration_ms: u64,
        /// RNG seed (decimal or 0x-prefixed hex, underscores allowed).
        #[arg(long, default_value = "0xDEAD_BEEF")]
        seed: String,
        #[arg(long, default_value_t = 16_384)]
        max_size: usize,
        /// Structured JSONL log output path; `-` writes to stdout.
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn parse_seed(raw: &str) -> Result<u64, String> {
    let cleaned = raw.replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid seed `{raw}`: {e}"))
}

fn open_log(path: Option<&PathBuf>, component: &str) -> Result<Option<LogEmitter>, HarnessError> {
    let run_id = format!("pid{}", std::process::id());
    let Some(path) = path else {
        return Ok(None);
    };
    if path.as_os_str() == "-" {
        return Ok(Some(LogEmitter::to_stdout(component, &run_id)));
    }
    Ok(Some(LogEmitter::to_file(path, component, &run_id)?))
}

fn global_allocator() -> &'static str {
    match heapbridge_abi::REGISTRATION {
        Registration::None => "routed (harness)",
        registered => registered.as_str(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Config => {
            let config = BuildConfig::current();
            let doc = serde_json::json!({
                "platform": config.platform.as_str(),
                "shared_allocator": config.shared_allocator,
                "instrumented": config.instrumented,
                "backend": config.backend_kind().as_str(),
                "active_backend": ROUTER.backend().kind().as_str(),
                "max_supported_alignment": ROUTER.backend().max_supported_alignment(),
                "native_zeroed": ROUTER.backend().supports_zeroed_allocate(),
                "global_allocator": global_allocator(),
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Command::Verify {
            backend,
            all,
            log,
            report,
        } => {
            let kinds: Vec<BackendKind> = if all {
                BackendKind::ALL.to_vec()
            } else {
                vec![backend.unwrap_or_else(|| BuildConfig::current().backend_kind())]
            };

            let mut emitter = open_log(log.as_ref(), "verify")?;
            if let Some(emitter) = emitter.as_mut() {
                emitter.emit(LogLevel::Info, "verify_start")?;
            }

            let mut reports = Vec::with_capacity(kinds.len());
            for kind in kinds {
                let result = run_verify(kind, emitter.as_mut())?;
                eprintln!(
                    "{kind}: total={}, failed={}, skipped={}",
                    result.total(),
                    result.failed(),
                    result.skipped()
                );
                for check in result.checks.iter().filter(|c| c.detail.is_some()) {
                    eprintln!(
                        "  {} [{:?}]: {}",
                        check.name,
                        check.outcome,
                        check.detail.as_deref().unwrap_or_default()
                    );
                }
                reports.push(result);
            }

            if let Some(emitter) = emitter.as_mut() {
                emitter.emit(LogLevel::Info, "verify_end")?;
                emitter.flush()?;
            }
            if let Some(path) = report {
                std::fs::write(&path, serde_json::to_string_pretty(&reports)?)?;
                eprintln!("Wrote report to {}", path.display());
            }
            for result in &reports {
                result.ensure_passed()?;
            }
        }
        Command::Stress {
            backend,
            threads,
            slots,
            duration_ms,
            seed,
            max_size,
            log,
        } => {
            let config = StressConfig {
                backend: backend.unwrap_or_else(|| BuildConfig::current().backend_kind()),
                threads,
                slots,
                duration: Duration::from_millis(duration_ms),
                seed: parse_seed(&seed)?,
                max_size,
                ..StressConfig::default()
            };

            let mut emitter = open_log(log.as_ref(), "stress")?;
            let report = run_stress(&config, emitter.as_mut())?;
            if let Some(emitter) = emitter.as_mut() {
                emitter.flush()?;
            }
            let json = serde_json::to_string_pretty(&report)?;
            // Keep stdout pure JSONL when the log goes there.
            if log.as_ref().is_some_and(|p| p.as_os_str() == "-") {
                eprintln!("{json}");
            } else {
                println!("{json}");
            }
            report.ensure_passed()?;
        }
    }

    Ok(())
}
