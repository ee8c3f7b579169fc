use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sbmalloc::constants::MAX_ALLOC;
use sbmalloc::{AllocatorStats, SuperblockAllocator};
use serde::Serialize;
use std::process::Command;
use std::ptr::NonNull;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "sbmalloc workspace automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive an allocator through a synthetic workload and print its stats as JSON
    Replay {
        /// Shape of the workload
        #[arg(long, value_enum, default_value_t = Pattern::Churn)]
        pattern: Pattern,

        /// Number of operations
        #[arg(long, default_value_t = 100_000)]
        ops: usize,

        /// Largest request size in bytes
        #[arg(long, default_value_t = MAX_ALLOC)]
        max_size: usize,

        /// Seed for the request generator
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Build and test each optional cargo feature on its own
    Features,
    /// Run the criterion benchmarks
    Bench {
        /// Run quickly (lower sample size/time)
        #[arg(long, default_value_t = false)]
        quick: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum Pattern {
    /// Random mix of allocations and releases
    Churn,
    /// Allocate everything, then release everything
    Fill,
    /// Grow to a plateau, shrink halfway, repeat
    Sawtooth,
}

#[derive(Serialize)]
struct Report {
    pattern: Pattern,
    ops: usize,
    max_size: usize,
    seed: u64,
    elapsed_us: u128,
    live_at_end: usize,
    stats: AllocatorStats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { pattern, ops, max_size, seed } => {
            if max_size == 0 || max_size > MAX_ALLOC {
                bail!("--max-size must be between 1 and {MAX_ALLOC}");
            }
            let report = replay(pattern, ops, max_size, seed)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Features => check_features()?,
        Commands::Bench { quick } => run_benchmarks(quick)?,
    }

    Ok(())
}

fn replay(pattern: Pattern, ops: usize, max_size: usize, seed: u64) -> Result<Report> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut heap = SuperblockAllocator::new();
    let mut live: Vec<NonNull<u8>> = Vec::new();
    let plateau = (ops / 10).max(1);
    let start = Instant::now();

    for step in 0..ops {
        let allocate = match pattern {
            Pattern::Churn => live.is_empty() || rng.gen_bool(0.55),
            Pattern::Fill => step < ops / 2,
            Pattern::Sawtooth => {
                let phase = step % plateau;
                phase < plateau * 2 / 3
            }
        };

        if allocate {
            let size = rng.gen_range(1..=max_size);
            let ptr = heap
                .allocate(size)
                .with_context(|| format!("allocate({size}) failed at step {step}"))?;
            live.push(ptr);
        } else if !live.is_empty() {
            let idx = rng.gen_range(0..live.len());
            let ptr = live.swap_remove(idx);
            unsafe { heap.release(ptr) };
        }
    }

    let elapsed_us = start.elapsed().as_micros();
    heap.check_consistency().context("pool bookkeeping diverged during replay")?;

    Ok(Report {
        pattern,
        ops,
        max_size,
        seed,
        elapsed_us,
        live_at_end: live.len(),
        stats: heap.stats(),
    })
}

fn cargo(args: &[&str]) -> Result<()> {
    println!("cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .context("failed to launch cargo")?;
    if !status.success() {
        bail!("cargo {} failed", args.join(" "));
    }
    Ok(())
}

fn check_features() -> Result<()> {
    cargo(&["test", "-p", "sbmalloc", "--lib", "--features", "alloc-poison"])?;
    // The test harness spawns threads, so under deny-threads the tests are only
    // compiled and the single-threaded demo is what actually runs.
    cargo(&["test", "-p", "sbmalloc", "--no-run", "--features", "deny-threads"])?;
    cargo(&["run", "-p", "sbmalloc", "--example", "global", "--features", "deny-threads"])?;
    Ok(())
}

fn run_benchmarks(quick: bool) -> Result<()> {
    println!("Running benchmarks...");
    let start = Instant::now();

    let mut cmd = Command::new("cargo");
    cmd.args(["bench", "--bench", "superblock_bench", "--"]);
    if quick {
        cmd.args(["--measurement-time", "0.1", "--noplot", "--sample-size", "10"]);
    }

    let status = cmd.status().context("failed to launch cargo bench")?;
    if !status.success() {
        bail!("benchmarks failed");
    }
    println!("Finished in {:.2?}", start.elapsed());
    Ok(())
}
