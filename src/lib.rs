//! Hermes NAPI - Lock-Free Slot Ring dengan Adaptive Scheduling
//!
//! Arsitektur:
//! - Slot Pool: buffer fixed-size pre-allocated di mmap, dipinjam lewat handle
//! - SPSC Ring: Lamport queue berisi handle, satu writer per cursor
//! - Batch Consumer: kuras paling banyak `budget` record per ronde
//! - Adaptive Scheduler: Interrupt saat sepi, Poll saat padat
//!
//! Satu thread cukup memegang `Context`; untuk producer dan consumer di
//! thread berbeda pakai `Context::split`.
//!
//! ```
//! use hermes_napi::{Config, Context, NoopHooks};
//!
//! let mut ctx = Context::init(Config::new(64, 64, 16), NoopHooks).unwrap();
//! assert!(ctx.producer_try_publish(b"tick"));
//!
//! let processed = ctx.consumer_run_once(|record| {
//!     assert_eq!(record.payload(), b"tick");
//! });
//! assert_eq!(processed, 1);
//! assert_eq!(ctx.stats().consumed, 1);
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod driver;
pub mod error;
pub mod stats;

pub use config::Config;
pub use context::{Consumer, Context, Producer};
pub use crate::core::{BackingMemory, Mode, NoopHooks, Record, SchedulerHooks, SchedulerStats};
pub use error::{ConfigError, PublishError};
pub use stats::{DropStats, Stats};

/// Buat context baru. Lihat `Context::init`.
pub fn init<H: SchedulerHooks>(config: Config, hooks: H) -> Result<Context<H>, ConfigError> {
    Context::init(config, hooks)
}

/// Buat context di atas backing memory dari caller. Lihat
/// `Context::init_with_backing`.
pub fn init_with_backing<H: SchedulerHooks>(
    config: Config,
    backing: BackingMemory,
    hooks: H,
) -> Result<Context<H>, ConfigError> {
    Context::init_with_backing(config, backing, hooks)
}
