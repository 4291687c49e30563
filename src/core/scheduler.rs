//! Adaptive Interrupt/Poll Scheduler (NAPI-style)
//!
//! Dua mode:
//! - `Interrupt`: consumer tidur, event source aktif, setiap produksi
//!   membangunkan consumer
//! - `Poll`: event source dimatikan, consumer terus dijadwalkan ulang
//!   selama setiap ronde menghabiskan seluruh budget
//!
//! Beban ringan = latency rendah, beban berat = tidak ada interrupt storm.

use std::sync::atomic::{fence, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use super::ring_buffer::CacheLinePadded;
use crate::error::ConfigError;

/// Kolaborator eksternal yang dipanggil scheduler
///
/// `disable_source`/`enable_source` dipanggil tepat saat transisi mode.
/// `schedule` harus mengatur satu pemanggilan `consumer_run_once` secara
/// asinkron di consumer context; tidak boleh memanggilnya secara langsung.
pub trait SchedulerHooks: Send + Sync {
    fn disable_source(&self) {}

    fn enable_source(&self) {}

    fn schedule(&self);
}

impl<T: SchedulerHooks + ?Sized> SchedulerHooks for Arc<T> {
    fn disable_source(&self) {
        (**self).disable_source()
    }

    fn enable_source(&self) {
        (**self).enable_source()
    }

    fn schedule(&self) {
        (**self).schedule()
    }
}

/// Hooks kosong untuk harness yang memanggil `consumer_run_once` sendiri
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SchedulerHooks for NoopHooks {
    fn schedule(&self) {}
}

/// Mode scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Interrupt = 0,
    Poll = 1,
}

impl Mode {
    #[inline(always)]
    fn from_u8(raw: u8) -> Self {
        if raw == Mode::Poll as u8 {
            Mode::Poll
        } else {
            Mode::Interrupt
        }
    }
}

/// Snapshot counter scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub mode: Mode,
    pub budget: usize,
    /// Ronde consumer yang memproses minimal satu item
    pub poll_rounds: u64,
    /// Ronde yang menghabiskan budget dan menjadwalkan ulang consumer
    pub reschedules: u64,
    /// Transisi Poll -> Interrupt
    pub interrupt_rearms: u64,
    /// Sinyal produksi yang diabaikan karena sudah di Poll
    pub coalesced_signals: u64,
    /// Produksi yang datang tepat saat re-arm dan diambil alih consumer
    pub rearm_races: u64,
}

/// Two-state adaptive scheduler
pub struct AdaptiveScheduler<H> {
    mode: CacheLinePadded<AtomicU8>,
    // Ditulis producer, pisahkan dari counter consumer
    coalesced_signals: CacheLinePadded<AtomicU64>,
    budget: AtomicUsize,
    poll_rounds: AtomicU64,
    reschedules: AtomicU64,
    interrupt_rearms: AtomicU64,
    rearm_races: AtomicU64,
    hooks: H,
}

impl<H: SchedulerHooks> AdaptiveScheduler<H> {
    pub fn new(budget: usize, hooks: H) -> Result<Self, ConfigError> {
        if budget == 0 {
            return Err(ConfigError::ZeroBudget);
        }

        Ok(Self {
            mode: CacheLinePadded::new(AtomicU8::new(Mode::Interrupt as u8)),
            coalesced_signals: CacheLinePadded::new(AtomicU64::new(0)),
            budget: AtomicUsize::new(budget),
            poll_rounds: AtomicU64::new(0),
            reschedules: AtomicU64::new(0),
            interrupt_rearms: AtomicU64::new(0),
            rearm_races: AtomicU64::new(0),
            hooks,
        })
    }

    #[inline(always)]
    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.value.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub fn budget(&self) -> usize {
        self.budget.load(Ordering::Relaxed)
    }

    /// Ubah budget saat runtime. Berlaku mulai ronde berikutnya.
    pub fn set_budget(&self, budget: usize) -> Result<(), ConfigError> {
        if budget == 0 {
            return Err(ConfigError::ZeroBudget);
        }
        let previous = self.budget.swap(budget, Ordering::Relaxed);
        debug!(previous, budget, "consumer budget updated");
        Ok(())
    }

    #[inline(always)]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Sinyal produksi (Producer side)
    ///
    /// Returns `true` jika sinyal ini memindahkan scheduler ke `Poll` dan
    /// menjadwalkan consumer. Di `Poll`, sinyal digabung (no-op).
    #[inline(always)]
    pub fn on_produce(&self) -> bool {
        // Pasangan fence dengan re-check di `complete_round`: enqueue sebelum
        // fence ini terlihat oleh consumer, atau consumer terlihat sudah re-arm.
        fence(Ordering::SeqCst);

        if self.try_enter_poll() {
            self.hooks.disable_source();
            self.hooks.schedule();
            true
        } else {
            self.coalesced_signals
                .value
                .fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Tutup satu ronde consumer (Consumer side)
    ///
    /// `processed` adalah hasil `drain(budget)`. `pending` dipakai untuk
    /// re-check ring setelah interrupt di-enable kembali.
    pub fn complete_round(&self, processed: usize, budget: usize, pending: impl Fn() -> bool) -> Mode {
        if processed > 0 {
            self.poll_rounds.fetch_add(1, Ordering::Relaxed);
        }

        if processed >= budget {
            // Masih ada kemungkinan sisa pekerjaan: tetap di Poll
            if self.try_enter_poll() {
                self.hooks.disable_source();
            }
            self.reschedules.fetch_add(1, Ordering::Relaxed);
            trace!(processed, budget, "budget exhausted, rescheduling consumer");
            self.hooks.schedule();
            return Mode::Poll;
        }

        let previous = Mode::from_u8(
            self.mode
                .value
                .swap(Mode::Interrupt as u8, Ordering::SeqCst),
        );
        if previous == Mode::Interrupt {
            // Invocation spurious atau ekstra, source sudah aktif
            return Mode::Interrupt;
        }

        self.interrupt_rearms.fetch_add(1, Ordering::Relaxed);
        debug!(processed, budget, "ring drained, re-arming interrupt source");
        self.hooks.enable_source();

        fence(Ordering::SeqCst);
        if pending() && self.try_enter_poll() {
            self.rearm_races.fetch_add(1, Ordering::Relaxed);
            debug!("production raced with re-arm, back to polling");
            self.hooks.disable_source();
            self.hooks.schedule();
            return Mode::Poll;
        }

        Mode::Interrupt
    }

    #[inline(always)]
    fn try_enter_poll(&self) -> bool {
        self.mode
            .value
            .compare_exchange(
                Mode::Interrupt as u8,
                Mode::Poll as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            mode: self.mode(),
            budget: self.budget(),
            poll_rounds: self.poll_rounds.load(Ordering::Relaxed),
            reschedules: self.reschedules.load(Ordering::Relaxed),
            interrupt_rearms: self.interrupt_rearms.load(Ordering::Relaxed),
            coalesced_signals: self.coalesced_signals.value.load(Ordering::Relaxed),
            rearm_races: self.rearm_races.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingHooks {
        disabled: AtomicUsize,
        enabled: AtomicUsize,
        scheduled: AtomicUsize,
    }

    impl SchedulerHooks for CountingHooks {
        fn disable_source(&self) {
            self.disabled.fetch_add(1, Ordering::SeqCst);
        }

        fn enable_source(&self) {
            self.enabled.fetch_add(1, Ordering::SeqCst);
        }

        fn schedule(&self) {
            self.scheduled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counts(hooks: &CountingHooks) -> (usize, usize, usize) {
        (
            hooks.disabled.load(Ordering::SeqCst),
            hooks.enabled.load(Ordering::SeqCst),
            hooks.scheduled.load(Ordering::SeqCst),
        )
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(
            AdaptiveScheduler::new(0, NoopHooks),
            Err(ConfigError::ZeroBudget)
        ));
        let sched = AdaptiveScheduler::new(1, NoopHooks).unwrap();
        assert!(sched.set_budget(0).is_err());
        assert_eq!(sched.budget(), 1);
    }

    #[test]
    fn test_first_signal_enters_poll_rest_coalesce() {
        let sched = AdaptiveScheduler::new(4, CountingHooks::default()).unwrap();
        assert_eq!(sched.mode(), Mode::Interrupt);

        assert!(sched.on_produce());
        assert_eq!(sched.mode(), Mode::Poll);
        assert_eq!(counts(sched.hooks()), (1, 0, 1));

        assert!(!sched.on_produce());
        assert!(!sched.on_produce());
        assert_eq!(counts(sched.hooks()), (1, 0, 1));
        assert_eq!(sched.stats().coalesced_signals, 2);
    }

    #[test]
    fn test_full_round_reschedules() {
        let sched = AdaptiveScheduler::new(4, CountingHooks::default()).unwrap();
        sched.on_produce();

        assert_eq!(sched.complete_round(4, 4, || true), Mode::Poll);
        assert_eq!(sched.mode(), Mode::Poll);
        assert_eq!(counts(sched.hooks()), (1, 0, 2));
    }

    #[test]
    fn test_partial_round_rearms() {
        let sched = AdaptiveScheduler::new(4, CountingHooks::default()).unwrap();
        sched.on_produce();

        assert_eq!(sched.complete_round(2, 4, || false), Mode::Interrupt);
        assert_eq!(counts(sched.hooks()), (1, 1, 1));

        let stats = sched.stats();
        assert_eq!(stats.interrupt_rearms, 1);
        assert_eq!(stats.poll_rounds, 1);
        assert_eq!(stats.rearm_races, 0);
    }

    #[test]
    fn test_spurious_round_changes_nothing() {
        let sched = AdaptiveScheduler::new(4, CountingHooks::default()).unwrap();
        let before = sched.stats();

        assert_eq!(sched.complete_round(0, 4, || false), Mode::Interrupt);
        assert_eq!(sched.stats(), before);
        assert_eq!(counts(sched.hooks()), (0, 0, 0));
    }

    #[test]
    fn test_rearm_race_returns_to_poll() {
        let sched = AdaptiveScheduler::new(4, CountingHooks::default()).unwrap();
        sched.on_produce();

        // Item baru muncul tepat setelah interrupt di-enable
        assert_eq!(sched.complete_round(1, 4, || true), Mode::Poll);
        assert_eq!(counts(sched.hooks()), (2, 1, 2));
        assert_eq!(sched.stats().rearm_races, 1);
    }
}
