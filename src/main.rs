//! Hermes NAPI - micro benchmark
//!
//! Mengukur biaya setiap lapisan hot path:
//! - Ring Buffer: enqueue/dequeue handle mentah
//! - Slot Pool: alloc/free
//! - Context: publish + consumer_run_once dengan beberapa budget
//!
//! Usage:
//!   cargo run --release --bin hermes_napi_bench

use std::time::Instant;

use hermes_napi::core::{RingBuffer, SlotPool};
use hermes_napi::{Config, Context, NoopHooks};
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    println!("🚀 Hermes NAPI - Slot Ring Benchmark");
    println!("====================================\n");

    benchmark_ring_buffer();
    benchmark_slot_pool();
    benchmark_publish_drain();

    println!("\n✅ All benchmarks complete!");
    println!("\nTo run the interrupt simulation: cargo run --release --bin irq_sim");
}

fn benchmark_ring_buffer() {
    println!("📊 Ring Buffer Benchmark (Lock-Free SPSC)");
    println!("-----------------------------------------");

    const ITERATIONS: usize = 1_000_000;
    let Some(mut rb) = RingBuffer::<u64>::with_capacity(65536) else {
        eprintln!("  invalid ring capacity");
        return;
    };

    // Warm up
    for i in 0..1000 {
        let _ = rb.try_enqueue(i);
    }
    while rb.try_dequeue().is_some() {}

    let start = Instant::now();
    for i in 0..ITERATIONS {
        while rb.try_enqueue(i as u64).is_err() {
            rb.try_dequeue();
        }
    }
    let enqueue_duration = start.elapsed();

    while rb.try_dequeue().is_some() {}

    let start = Instant::now();
    let mut dequeued = 0usize;
    while dequeued < ITERATIONS {
        let _ = rb.try_enqueue(dequeued as u64);
        if rb.try_dequeue().is_some() {
            dequeued += 1;
        }
    }
    let cycle_duration = start.elapsed();

    let enqueue_ns = enqueue_duration.as_nanos() as f64 / ITERATIONS as f64;
    let cycle_ns = cycle_duration.as_nanos() as f64 / ITERATIONS as f64;

    println!("  Operations: {}", ITERATIONS);
    println!("  Enqueue latency:       {:.2} ns/op", enqueue_ns);
    println!("  Enqueue+dequeue cycle: {:.2} ns/op", cycle_ns);
    println!(
        "  Throughput:   {:.2} M ops/sec\n",
        ITERATIONS as f64 / enqueue_duration.as_secs_f64() / 1_000_000.0
    );
}

fn benchmark_slot_pool() {
    println!("📊 Slot Pool Benchmark (alloc/free)");
    println!("-----------------------------------");

    const ITERATIONS: usize = 1_000_000;
    let mut pool = match SlotPool::new(4096, 64) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("  failed to create pool: {}", e);
            return;
        }
    };

    let start = Instant::now();
    for _ in 0..ITERATIONS {
        if let Some(handle) = pool.alloc() {
            pool.free(handle);
        }
    }
    let duration = start.elapsed();

    println!("  Operations: {}", ITERATIONS);
    println!(
        "  alloc+free latency: {:.2} ns/op\n",
        duration.as_nanos() as f64 / ITERATIONS as f64
    );
}

fn benchmark_publish_drain() {
    println!("📊 Publish/Drain Benchmark (budget sweep)");
    println!("-----------------------------------------");

    const ITERATIONS: usize = 1_000_000;
    let payload = [0xABu8; 64];

    for budget in [1usize, 16, 64, 256] {
        let config = Config::new(1024, 1024, budget).with_slot_size(payload.len());
        let mut ctx = match Context::init(config, NoopHooks) {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("  failed to init context: {}", e);
                return;
            }
        };

        let mut checksum = 0u64;
        let start = Instant::now();
        let mut published = 0usize;
        while published < ITERATIONS {
            while published < ITERATIONS && ctx.producer_try_publish(&payload) {
                published += 1;
            }
            ctx.consumer_run_once(|record| checksum += record.payload()[0] as u64);
        }
        while ctx.consumer_run_once(|record| checksum += record.payload()[0] as u64) > 0 {}
        let duration = start.elapsed();

        let stats = ctx.stats();
        let sched = ctx.scheduler_stats();
        println!(
            "  budget {:>3}: {:.2} ns/record, rounds {}, rearms {}, dropped {} (checksum {})",
            budget,
            duration.as_nanos() as f64 / stats.consumed.max(1) as f64,
            sched.poll_rounds,
            sched.interrupt_rearms,
            stats.dropped,
            checksum
        );
    }
}
