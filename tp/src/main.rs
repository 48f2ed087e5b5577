//! TimerPool demo binary
//!
//! CLI entry point for the demonstration programs: a scheduling showcase
//! mixing one-shot, fixed-interval and zero-interval tasks, and a
//! revocable-callback example where actions guard a non-owning reference to
//! state that may be gone by the time they fire.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use timerpool::{PoolConfig, TimerPool};

#[derive(Parser)]
#[command(name = "tp", about = "Timer-driven worker pool demos")]
struct Cli {
    /// Number of pool workers
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one-shot, fixed-interval and zero-interval tasks side by side
    Demo,
    /// Schedule callbacks holding a revocable reference to shared state
    Guarded,
}

fn setup_logging(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref());

    match cli.command {
        Command::Demo => cmd_demo(cli.workers).await,
        Command::Guarded => cmd_guarded(cli.workers).await,
    }
}

/// Scheduling showcase: a delayed one-shot, an unconditional 500ms repeater,
/// and a zero-interval burst capped at five runs by its continuation
async fn cmd_demo(workers: usize) -> Result<()> {
    let pool = TimerPool::new(PoolConfig::with_workers(workers));

    // 1) One-shot after 1 second
    pool.schedule_once(
        || println!("[one-shot] runs after 1s"),
        Duration::from_secs(1),
    );

    // 2) Repeating every 500ms, no continuation: runs until shutdown
    let ticks = Arc::new(AtomicUsize::new(0));
    {
        let ticks = Arc::clone(&ticks);
        pool.schedule_repeating(
            move || {
                let n = ticks.fetch_add(1, Ordering::Relaxed);
                println!("[interval=500ms] tick={n}");
            },
            Duration::ZERO,
            Duration::from_millis(500),
        );
    }

    // 3) Zero interval with a continuation: re-queues as fast as possible
    //    while fewer than five runs have happened
    let burst = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&burst);
    let check = Arc::clone(&burst);
    pool.schedule_repeating_while(
        move || {
            let n = count.fetch_add(1, Ordering::Relaxed);
            println!("[zero-interval] count={n}");
        },
        Duration::ZERO,
        Duration::ZERO,
        move || check.load(Ordering::Relaxed) < 5,
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    info!("demo window elapsed, shutting down");
    pool.shutdown().await;
    println!(
        "pool stopped after {} interval ticks",
        ticks.load(Ordering::Relaxed)
    );
    Ok(())
}

/// State a scheduled callback wants to read, owned elsewhere
struct Reading {
    value: i32,
}

/// Build an action holding a non-owning handle on the reading; the action
/// checks validity before dereferencing, so firing after the owner dropped
/// the reading degrades to a skip instead of touching dead state
fn guarded_print(target: &Arc<Reading>) -> impl FnMut() + Send + 'static {
    let target = Arc::downgrade(target);
    move || match target.upgrade() {
        Some(reading) => println!("reading value is {}", reading.value),
        None => println!("reading dropped, skipping"),
    }
}

async fn cmd_guarded(workers: usize) -> Result<()> {
    let pool = TimerPool::new(PoolConfig::with_workers(workers));

    // This reading is gone long before its callback fires
    {
        let dropped = Arc::new(Reading { value: 40 });
        pool.schedule_once(guarded_print(&dropped), Duration::from_secs(1));
    }

    // This one stays alive across the delay
    let kept = Arc::new(Reading { value: 12 });
    pool.schedule_once(guarded_print(&kept), Duration::from_secs(1));

    tokio::time::sleep(Duration::from_secs(2)).await;
    pool.shutdown().await;
    Ok(())
}
