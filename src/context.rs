//! Context: pool + ring + scheduler dalam satu instance eksplisit
//!
//! Tidak ada global state. Dengan satu pemilik, `Context` bisa langsung
//! dipakai lewat `&mut self` (harness deterministik). Untuk dua thread,
//! `split()` menghasilkan `Producer` dan `Consumer`: masing-masing unik,
//! `Send`, tidak `Sync`, dan role method-nya butuh `&mut self`.
//!
//! ```compile_fail
//! use std::sync::Arc;
//! use hermes_napi::{Config, Context, NoopHooks};
//!
//! let ctx = Arc::new(Context::init(Config::default(), NoopHooks).unwrap());
//! ctx.consumer_run_once(|_| {});
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::core::{
    AdaptiveScheduler, BackingMemory, BatchConsumer, Mode, Record, RingBuffer, SchedulerHooks,
    SchedulerStats, SlotHandle, SlotPool,
};
use crate::error::{ConfigError, PublishError};
use crate::stats::{Counters, Stats};

/// Satu instance SPSC slot ring beserta scheduler-nya
pub struct Context<H: SchedulerHooks> {
    ring: RingBuffer<SlotHandle>,
    pool: SlotPool,
    scheduler: AdaptiveScheduler<H>,
    counters: Counters,
    paused: AtomicBool,
    config: Config,
}

impl<H: SchedulerHooks> Context<H> {
    /// Alokasi pool (anonymous mmap) dan ring. Ini satu-satunya titik alokasi.
    pub fn init(config: Config, hooks: H) -> Result<Self, ConfigError> {
        config.validate()?;

        let len = SlotPool::required_len(config.pool_capacity, config.slot_size)?;
        let backing = BackingMemory::anonymous(len)?;
        Self::init_with_backing(config, backing, hooks)
    }

    /// Sama dengan `init`, slot memakai backing memory dari caller
    /// (misal mapping hugetlbfs atau region yang sudah di-pin).
    pub fn init_with_backing(
        config: Config,
        backing: BackingMemory,
        hooks: H,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut pool = SlotPool::with_backing(config.pool_capacity, config.slot_size, backing)?;
        if config.lock_memory {
            if let Err(e) = pool.lock_memory() {
                warn!(error = %e, "failed to lock slot memory, continuing unlocked");
            }
        }

        let ring = RingBuffer::with_capacity(config.ring_capacity)
            .ok_or(ConfigError::RingNotPowerOfTwo(config.ring_capacity))?;
        let scheduler = AdaptiveScheduler::new(config.budget, hooks)?;

        info!(
            pool_capacity = config.pool_capacity,
            ring_capacity = config.ring_capacity,
            slot_size = config.slot_size,
            budget = config.budget,
            locked = pool.is_locked(),
            "slot ring context initialised"
        );

        Ok(Self {
            ring,
            pool,
            scheduler,
            counters: Counters::new(),
            paused: AtomicBool::new(false),
            config,
        })
    }

    /// Pisahkan context menjadi producer half dan consumer half
    pub fn split(self) -> (Producer<H>, Consumer<H>) {
        let ctx = Arc::new(self);
        (
            Producer {
                ctx: Arc::clone(&ctx),
                _role: PhantomData,
            },
            Consumer {
                ctx,
                _role: PhantomData,
            },
        )
    }

    /// Publish satu record
    ///
    /// alloc -> fill -> enqueue -> sinyal scheduler. Setiap kegagalan
    /// dihitung di `dropped` dan tidak pernah di-retry.
    #[inline]
    pub fn try_publish(&mut self, data: &[u8]) -> Result<(), PublishError> {
        // SAFETY: `&mut self` = tidak ada producer lain
        unsafe { self.publish_as_producer(data) }
    }

    /// Sama dengan `try_publish`, hanya melaporkan berhasil/tidak
    #[inline]
    pub fn producer_try_publish(&mut self, data: &[u8]) -> bool {
        self.try_publish(data).is_ok()
    }

    /// Entry point consumer
    ///
    /// Memproses paling banyak `budget` record lalu memutuskan mode
    /// berikutnya. Ring kosong di mode Interrupt = no-op, returns 0.
    pub fn consumer_run_once<F>(&mut self, process: F) -> usize
    where
        F: FnMut(Record<'_>),
    {
        // SAFETY: `&mut self` = tidak ada consumer lain
        unsafe { self.run_as_consumer(process) }
    }

    /// # Safety
    /// Paling banyak satu producer pada satu waktu.
    #[inline]
    unsafe fn publish_as_producer(&self, data: &[u8]) -> Result<(), PublishError> {
        match self.publish(data) {
            Ok(()) => {
                self.counters.record_produced();
                self.scheduler.on_produce();
                Ok(())
            }
            Err(reason) => {
                self.counters.record_drop(reason);
                Err(reason)
            }
        }
    }

    #[inline(always)]
    unsafe fn publish(&self, data: &[u8]) -> Result<(), PublishError> {
        if self.paused.load(Ordering::Acquire) {
            return Err(PublishError::Paused);
        }
        if data.len() > self.pool.slot_size() {
            return Err(PublishError::PayloadTooLarge {
                len: data.len(),
                max: self.pool.slot_size(),
            });
        }

        let mut handle = self
            .pool
            .alloc_as_producer()
            .ok_or(PublishError::PoolExhausted)?;

        // handle baru saja di-alloc dari pool ini
        if let Err(e) = self.pool.write(&mut handle, data) {
            self.pool.recycle_as_producer(handle);
            return Err(e);
        }

        if let Err(handle) = self.ring.enqueue_as_producer(handle) {
            // Jangan bocorkan slot: kembalikan sebelum melapor
            self.pool.recycle_as_producer(handle);
            return Err(PublishError::RingFull);
        }

        Ok(())
    }

    /// # Safety
    /// Paling banyak satu consumer pada satu waktu.
    unsafe fn run_as_consumer<F>(&self, process: F) -> usize
    where
        F: FnMut(Record<'_>),
    {
        let budget = self.scheduler.budget();
        let processed = BatchConsumer::new(&self.ring, &self.pool, self.counters.consumed())
            .drain(budget, process);

        self.scheduler
            .complete_round(processed, budget, || !self.ring.is_empty());

        processed
    }

    /// `true` jika publish berikutnya pasti tidak gagal karena kapasitas.
    ///
    /// Hanya bermakna dari producer context: consumer hanya bisa
    /// menambah ruang, tidak mengurangi.
    #[inline(always)]
    pub fn producer_ready(&self) -> bool {
        !self.is_paused() && self.pool.free_count() > 0 && !self.ring.is_full()
    }

    /// Hentikan production secara kooperatif
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    #[inline(always)]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_budget(&self, budget: usize) -> Result<(), ConfigError> {
        self.scheduler.set_budget(budget)
    }

    #[inline(always)]
    pub fn budget(&self) -> usize {
        self.scheduler.budget()
    }

    #[inline(always)]
    pub fn mode(&self) -> Mode {
        self.scheduler.mode()
    }

    /// Jumlah record yang menunggu di ring (snapshot)
    #[inline(always)]
    pub fn pending(&self) -> usize {
        self.ring.len()
    }

    #[inline(always)]
    pub fn free_slots(&self) -> usize {
        self.pool.free_count()
    }

    /// Apakah slot memory berhasil di-`mlock`
    pub fn is_memory_locked(&self) -> bool {
        self.pool.is_locked()
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn hooks(&self) -> &H {
        self.scheduler.hooks()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[cfg(test)]
    fn ring_cursors(&self) -> (usize, usize) {
        self.ring.cursors()
    }
}

/// Producer half dari `Context::split`
///
/// Observer (stats, mode, pause, ...) tersedia lewat `Deref` ke `Context`.
pub struct Producer<H: SchedulerHooks> {
    ctx: Arc<Context<H>>,
    _role: PhantomData<Cell<()>>,
}

impl<H: SchedulerHooks> Producer<H> {
    #[inline]
    pub fn try_publish(&mut self, data: &[u8]) -> Result<(), PublishError> {
        // SAFETY: hanya ada satu Producer per context, dan ia `&mut`
        unsafe { self.ctx.publish_as_producer(data) }
    }

    #[inline]
    pub fn producer_try_publish(&mut self, data: &[u8]) -> bool {
        self.try_publish(data).is_ok()
    }
}

impl<H: SchedulerHooks> Deref for Producer<H> {
    type Target = Context<H>;

    fn deref(&self) -> &Context<H> {
        &self.ctx
    }
}

/// Consumer half dari `Context::split`
pub struct Consumer<H: SchedulerHooks> {
    ctx: Arc<Context<H>>,
    _role: PhantomData<Cell<()>>,
}

impl<H: SchedulerHooks> Consumer<H> {
    pub fn consumer_run_once<F>(&mut self, process: F) -> usize
    where
        F: FnMut(Record<'_>),
    {
        // SAFETY: hanya ada satu Consumer per context, dan ia `&mut`
        unsafe { self.ctx.run_as_consumer(process) }
    }
}

impl<H: SchedulerHooks> Deref for Consumer<H> {
    type Target = Context<H>;

    fn deref(&self) -> &Context<H> {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NoopHooks;
    use memmap2::MmapOptions;

    fn decode(record: Record<'_>) -> u64 {
        u64::from_le_bytes(record.payload().try_into().unwrap())
    }

    #[test]
    fn test_init_validates() {
        assert!(matches!(
            Context::init(Config::new(8, 12, 4), NoopHooks),
            Err(ConfigError::RingNotPowerOfTwo(12))
        ));
        assert!(matches!(
            Context::init(Config::new(4, 8, 4), NoopHooks),
            Err(ConfigError::PoolSmallerThanRing { .. })
        ));
        assert!(Context::init(Config::new(8, 8, 4), NoopHooks).is_ok());
    }

    #[test]
    fn test_init_with_caller_backing() {
        let config = Config::new(8, 8, 4).with_slot_size(8);
        let len = SlotPool::required_len(8, 8).unwrap();
        let mmap = MmapOptions::new().len(len).map_anon().unwrap();

        let mut ctx =
            Context::init_with_backing(config, BackingMemory::from_mmap(mmap), NoopHooks)
                .unwrap();
        assert_eq!(ctx.free_slots(), 8);

        assert!(ctx.producer_try_publish(&42u64.to_le_bytes()));
        let mut seen = Vec::new();
        assert_eq!(ctx.consumer_run_once(|r| seen.push(decode(r))), 1);
        assert_eq!(seen, vec![42]);
    }

    #[test]
    fn test_init_with_backing_too_small() {
        let mmap = MmapOptions::new().len(64).map_anon().unwrap();
        let result = Context::init_with_backing(
            Config::new(8, 8, 4),
            BackingMemory::from_mmap(mmap),
            NoopHooks,
        );
        assert!(matches!(
            result,
            Err(ConfigError::BackingTooSmall { actual: 64, .. })
        ));
    }

    #[test]
    fn test_memory_lock_request_never_fails_init() {
        let config = Config::new(8, 8, 4).with_slot_size(8).with_memory_lock(true);

        // mlock bisa ditolak RLIMIT_MEMLOCK; bandingkan dengan percobaan langsung
        let len = SlotPool::required_len(8, 8).unwrap();
        let lockable = BackingMemory::anonymous(len).unwrap().lock().is_ok();

        let mut ctx = Context::init(config, NoopHooks).unwrap();
        assert_eq!(ctx.is_memory_locked(), lockable);
        assert!(ctx.config().lock_memory);

        assert!(ctx.producer_try_publish(b"pinned"));
        assert_eq!(ctx.consumer_run_once(|r| assert_eq!(r.payload(), b"pinned")), 1);

        let unlocked = Context::init(Config::new(8, 8, 4), NoopHooks).unwrap();
        assert!(!unlocked.is_memory_locked());
    }

    #[test]
    fn test_ring_full_drop_keeps_items_and_slot() {
        let mut ctx = Context::init(Config::new(8, 8, 16).with_slot_size(8), NoopHooks).unwrap();

        for i in 0..7u64 {
            assert!(ctx.producer_try_publish(&i.to_le_bytes()));
        }
        let cursors = ctx.ring_cursors();
        assert_eq!(ctx.try_publish(&7u64.to_le_bytes()), Err(PublishError::RingFull));
        assert_eq!(ctx.ring_cursors(), cursors);

        let stats = ctx.stats();
        assert_eq!(stats.produced, 7);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.drops.ring_full, 1);
        // Slot yang gagal di-enqueue tidak bocor
        assert_eq!(ctx.free_slots(), 1);

        let mut seen = Vec::new();
        assert_eq!(ctx.consumer_run_once(|r| seen.push(decode(r))), 7);
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
        assert_eq!(ctx.free_slots(), 8);
    }

    #[test]
    fn test_pool_exhaustion_is_counted() {
        let ctx = Context::init(Config::new(4, 4, 1).with_slot_size(4), NoopHooks).unwrap();
        let (mut producer, mut consumer) = ctx.split();
        for _ in 0..3 {
            assert!(producer.producer_try_publish(b"abcd"));
        }
        assert_eq!(producer.try_publish(b"abcd"), Err(PublishError::RingFull));
        assert_eq!(producer.free_slots(), 1);

        // Selama consumer memegang satu slot: 2 di ring + 1 dipegang + 1 bebas
        let mut results = Vec::new();
        consumer.consumer_run_once(|_| {
            results.push(producer.try_publish(b"wxyz"));
            results.push(producer.try_publish(b"wxyz"));
        });
        assert_eq!(results, vec![Ok(()), Err(PublishError::PoolExhausted)]);

        let stats = consumer.stats();
        assert_eq!(stats.produced, 4);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.drops.pool_exhausted, 1);
        assert_eq!(consumer.free_slots(), 1);
    }

    #[test]
    fn test_oversized_and_paused_drops() {
        let mut ctx = Context::init(Config::new(4, 4, 4).with_slot_size(4), NoopHooks).unwrap();

        assert_eq!(
            ctx.try_publish(b"12345"),
            Err(PublishError::PayloadTooLarge { len: 5, max: 4 })
        );

        ctx.pause();
        assert!(!ctx.producer_ready());
        assert_eq!(ctx.try_publish(b"1"), Err(PublishError::Paused));
        ctx.resume();
        assert!(ctx.producer_try_publish(b"1"));

        let stats = ctx.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.drops.oversized, 1);
        assert_eq!(stats.drops.paused, 1);
        assert_eq!(stats.produced, 1);
        assert_eq!(ctx.free_slots(), 3);
    }

    #[test]
    fn test_empty_run_is_idempotent() {
        let mut ctx = Context::init(Config::new(8, 8, 4), NoopHooks).unwrap();
        let stats = ctx.stats();
        let sched = ctx.scheduler_stats();
        let cursors = ctx.ring_cursors();

        for _ in 0..3 {
            assert_eq!(ctx.consumer_run_once(|_| unreachable!()), 0);
        }

        assert_eq!(ctx.stats(), stats);
        assert_eq!(ctx.scheduler_stats(), sched);
        assert_eq!(ctx.ring_cursors(), cursors);
        assert_eq!(ctx.mode(), Mode::Interrupt);
    }

    #[test]
    fn test_publish_switches_to_poll_and_drain_rearms() {
        let mut ctx = Context::init(Config::new(16, 16, 4), NoopHooks).unwrap();
        assert_eq!(ctx.mode(), Mode::Interrupt);

        assert!(ctx.producer_try_publish(b"x"));
        assert_eq!(ctx.mode(), Mode::Poll);

        assert_eq!(ctx.consumer_run_once(|r| assert_eq!(r.payload(), b"x")), 1);
        assert_eq!(ctx.mode(), Mode::Interrupt);
        assert_eq!(ctx.stats().in_flight(), 0);
    }

    #[test]
    fn test_budget_is_runtime_configurable() {
        let mut ctx = Context::init(Config::new(16, 16, 2), NoopHooks).unwrap();
        for i in 0..6u64 {
            assert!(ctx.producer_try_publish(&i.to_le_bytes()));
        }

        assert_eq!(ctx.consumer_run_once(|_| {}), 2);
        ctx.set_budget(3).unwrap();
        assert_eq!(ctx.budget(), 3);
        assert_eq!(ctx.consumer_run_once(|_| {}), 3);
        assert_eq!(ctx.consumer_run_once(|_| {}), 1);
        assert!(ctx.set_budget(0).is_err());
    }

    #[test]
    fn test_split_halves_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Producer<NoopHooks>>();
        assert_send::<Consumer<NoopHooks>>();
    }
}
