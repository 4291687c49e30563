//! IRQ Simulation - producer "interrupt handler" vs consumer mio loop
//!
//! Producer thread meniru interrupt handler: burst record dengan jeda idle
//! di antaranya. Consumer thread adalah `ConsumerLoop` yang dibangunkan
//! lewat mio waker. Di akhir, laporan menunjukkan berapa kali scheduler
//! pindah mode dan berapa interrupt yang berhasil di-mask.
//!
//! Usage:
//!   cargo run --release --bin irq_sim [OPTIONS]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hermes_napi::driver::{ConsumerLoop, IrqLine};
use hermes_napi::{Config, Context};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Simulation configuration
struct SimConfig {
    records: u64,
    burst: u64,
    idle_us: u64,
    pool_capacity: usize,
    ring_capacity: usize,
    budget: usize,
    lock_memory: bool,
    verbose: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            records: 1_000_000,
            burst: 512,
            idle_us: 200,
            pool_capacity: 4096,
            ring_capacity: 4096,
            budget: 64,
            lock_memory: false,
            verbose: false,
        }
    }
}

/// Payload: sequence + timestamp relatif terhadap awal simulasi
const RECORD_SIZE: usize = 16;

fn encode(seq: u64, elapsed_ns: u64) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    buf[0..8].copy_from_slice(&seq.to_le_bytes());
    buf[8..16].copy_from_slice(&elapsed_ns.to_le_bytes());
    buf
}

fn decode(payload: &[u8]) -> Option<(u64, u64)> {
    let seq = u64::from_le_bytes(payload.get(0..8)?.try_into().ok()?);
    let ts = u64::from_le_bytes(payload.get(8..16)?.try_into().ok()?);
    Some((seq, ts))
}

/// Consumer-side latency summary
#[derive(Default)]
struct LatencySummary {
    count: u64,
    total_ns: u64,
    max_ns: u64,
    out_of_order: u64,
    last_seq: Option<u64>,
}

impl LatencySummary {
    fn record(&mut self, seq: u64, latency_ns: u64) {
        if let Some(last) = self.last_seq {
            if seq <= last {
                self.out_of_order += 1;
            }
        }
        self.last_seq = Some(seq);
        self.count += 1;
        self.total_ns += latency_ns;
        self.max_ns = self.max_ns.max(latency_ns);
    }
}

fn run_simulation(config: SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    let irq = Arc::new(IrqLine::new());
    let mut consumer_loop = ConsumerLoop::new()?.with_idle_timeout(Duration::from_millis(10));
    let shutdown = consumer_loop.shutdown_handle();

    let ctx_config = Config::new(config.pool_capacity, config.ring_capacity, config.budget)
        .with_slot_size(RECORD_SIZE)
        .with_memory_lock(config.lock_memory);
    let (mut producer, mut consumer) =
        Context::init(ctx_config, consumer_loop.hooks(Arc::clone(&irq)))?.split();

    let start = Instant::now();

    let consumer = thread::Builder::new()
        .name("consumer".into())
        .spawn(move || {
            let mut summary = LatencySummary::default();
            let result = consumer_loop.run(&mut consumer, |record| {
                if let Some((seq, ts)) = decode(record.payload()) {
                    let now = start.elapsed().as_nanos() as u64;
                    summary.record(seq, now.saturating_sub(ts));
                }
            });
            result.map(|stats| (stats, summary))
        })?;

    let producer = {
        let irq = Arc::clone(&irq);
        let records = config.records;
        let burst = config.burst.max(1);
        let idle = Duration::from_micros(config.idle_us);
        thread::Builder::new()
            .name("producer".into())
            .spawn(move || {
                let mut seq = 0u64;
                while seq < records {
                    let end = (seq + burst).min(records);
                    while seq < end {
                        irq.fire();
                        let payload = encode(seq, start.elapsed().as_nanos() as u64);
                        producer.producer_try_publish(&payload);
                        seq += 1;
                    }
                    if !idle.is_zero() {
                        thread::sleep(idle);
                    }
                }
                producer
            })?
    };

    let ctx = producer
        .join()
        .map_err(|_| "producer thread panicked")?;
    shutdown.shutdown()?;
    let (loop_stats, summary) = consumer
        .join()
        .map_err(|_| "consumer thread panicked")??;

    let elapsed = start.elapsed();
    let stats = ctx.stats();
    let sched = ctx.scheduler_stats();

    info!(elapsed_ms = elapsed.as_millis() as u64, "simulation finished");

    println!("\n📊 IRQ Simulation Results");
    println!("========================");
    println!("  Duration:        {:.2}s", elapsed.as_secs_f64());
    println!("  Produced:        {}", stats.produced);
    println!("  Consumed:        {}", stats.consumed);
    println!(
        "  Dropped:         {} (pool {}, ring {})",
        stats.dropped, stats.drops.pool_exhausted, stats.drops.ring_full
    );
    println!(
        "  Rate:            {:.1} K records/sec",
        stats.consumed as f64 / elapsed.as_secs_f64() / 1000.0
    );
    println!("\nScheduler:");
    println!("  Final mode:      {:?}", sched.mode);
    println!("  Poll rounds:     {}", sched.poll_rounds);
    println!("  Reschedules:     {}", sched.reschedules);
    println!("  IRQ re-arms:     {}", sched.interrupt_rearms);
    println!("  Coalesced:       {}", sched.coalesced_signals);
    println!("  Re-arm races:    {}", sched.rearm_races);
    println!("\nInterrupt line:");
    println!("  Delivered:       {}", irq.delivered());
    println!("  Masked:          {}", irq.masked());
    println!("\nConsumer loop:");
    println!("  Wakeups:         {}", loop_stats.wakeups);
    println!("  Recoveries:      {}", loop_stats.recoveries);
    if summary.count > 0 {
        println!(
            "  Latency avg:     {:.2} μs",
            summary.total_ns as f64 / summary.count as f64 / 1000.0
        );
        println!("  Latency max:     {:.2} μs", summary.max_ns as f64 / 1000.0);
    }

    if config.verbose {
        println!("\n  Budget:          {}", sched.budget);
        println!("  Free slots:      {}", ctx.free_slots());
    }

    if summary.out_of_order > 0 {
        println!("\n⚠️  ORDER VIOLATIONS: {}", summary.out_of_order);
    } else if stats.produced == stats.consumed {
        println!("\n✅ All published records consumed in order");
    }

    Ok(())
}

fn parse_args() -> SimConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = SimConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--records" | "-n" => {
                if i + 1 < args.len() {
                    config.records = args[i + 1].parse().unwrap_or(1_000_000);
                    i += 1;
                }
            }
            "--burst" => {
                if i + 1 < args.len() {
                    config.burst = args[i + 1].parse().unwrap_or(512);
                    i += 1;
                }
            }
            "--idle-us" => {
                if i + 1 < args.len() {
                    config.idle_us = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--pool" => {
                if i + 1 < args.len() {
                    config.pool_capacity = args[i + 1].parse().unwrap_or(4096);
                    i += 1;
                }
            }
            "--ring" => {
                if i + 1 < args.len() {
                    config.ring_capacity = args[i + 1].parse().unwrap_or(4096);
                    i += 1;
                }
            }
            "--budget" | "-b" => {
                if i + 1 < args.len() {
                    config.budget = args[i + 1].parse().unwrap_or(64);
                    i += 1;
                }
            }
            "--lock" => {
                config.lock_memory = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--help" | "-h" => {
                println!("IRQ Simulation - adaptive interrupt/poll consumer\n");
                println!("Usage: irq_sim [OPTIONS]\n");
                println!("Options:");
                println!("  -n, --records <N>    Records to publish (default: 1000000)");
                println!("      --burst <N>      Records per burst (default: 512)");
                println!("      --idle-us <US>   Idle gap between bursts (default: 200)");
                println!("      --pool <N>       Slot pool capacity (default: 4096)");
                println!("      --ring <N>       Ring capacity, power of 2 (default: 4096)");
                println!("  -b, --budget <N>     Records per consumer round (default: 64)");
                println!("      --lock           mlock slot memory");
                println!("  -v, --verbose        Verbose output");
                println!("  -h, --help           Show this help");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let config = parse_args();

    if let Err(e) = run_simulation(config) {
        eprintln!("❌ Simulation error: {}", e);
        std::process::exit(1);
    }
}
