//! Core module: SPSC slot ring dengan adaptive consumer scheduling
//!
//! Prinsip desain:
//! - Lock-Free: Hanya atomic load/store, satu writer per cursor
//! - No-Allocation: Pool dan ring pre-allocated saat init
//! - Bounded: Consumer memproses paling banyak `budget` item per ronde

mod backing;
mod consumer;
mod ring_buffer;
mod scheduler;
mod slot_pool;

pub use backing::BackingMemory;
pub use consumer::{BatchConsumer, Record};
pub(crate) use ring_buffer::CacheLinePadded;
pub use ring_buffer::{RingBuffer, RingConsumer, RingProducer};
pub use scheduler::{AdaptiveScheduler, Mode, NoopHooks, SchedulerHooks, SchedulerStats};
pub use slot_pool::{SlotHandle, SlotPool};
