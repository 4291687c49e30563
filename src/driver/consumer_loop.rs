//! Consumer event loop dengan mio
//!
//! `schedule()` = `Waker::wake()`. Wake yang bertumpuk digabung oleh mio,
//! aman karena consumer menjadwalkan ulang dirinya sendiri selama masih
//! ada pekerjaan.
//!
//! Jika `wake()` gagal, scheduler sudah di Poll dan sinyal produksi
//! berikutnya digabung. Satu-satunya jalan keluar adalah idle timeout,
//! karena itu loop selalu punya timeout kecuali dimatikan eksplisit.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::{Events, Poll, Token, Waker};
use tracing::{debug, info, warn};

use super::IrqLine;
use crate::context::Consumer;
use crate::core::{Record, SchedulerHooks};

const WAKE_TOKEN: Token = Token(0);
const EVENTS_CAPACITY: usize = 64;

/// Interval recovery default saat tidak ada wake
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

/// `SchedulerHooks` di atas mio waker + interrupt line simulasi
#[derive(Clone)]
pub struct WakerHooks {
    waker: Arc<Waker>,
    irq: Arc<IrqLine>,
}

impl WakerHooks {
    pub fn irq(&self) -> &Arc<IrqLine> {
        &self.irq
    }
}

impl SchedulerHooks for WakerHooks {
    fn disable_source(&self) {
        self.irq.disable();
    }

    fn enable_source(&self) {
        self.irq.enable();
    }

    fn schedule(&self) {
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "failed to wake consumer loop");
        }
    }
}

/// Hentikan `ConsumerLoop::run` dari thread lain
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> io::Result<()> {
        self.flag.store(true, Ordering::Release);
        self.waker.wake()
    }
}

/// Statistik satu `run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub wakeups: u64,
    pub rounds: u64,
    /// Ronde karena idle timeout menemukan ring tidak kosong
    pub recoveries: u64,
    pub processed: u64,
}

/// Consumer context
pub struct ConsumerLoop {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
    idle_timeout: Option<Duration>,
}

impl ConsumerLoop {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            waker,
            shutdown: Arc::new(AtomicBool::new(false)),
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        })
    }

    /// Bangun berkala walau tidak ada wake (default `DEFAULT_IDLE_TIMEOUT`)
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Tidur tanpa batas sampai ada wake.
    ///
    /// Wake yang gagal tidak lagi bisa dipulihkan: consumer bisa macet
    /// sampai shutdown.
    pub fn without_idle_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Hooks untuk `Context::init`
    pub fn hooks(&self, irq: Arc<IrqLine>) -> WakerHooks {
        WakerHooks {
            waker: Arc::clone(&self.waker),
            irq,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Jalankan consumer sampai shutdown, lalu kuras sisa ring
    pub fn run<H, F>(
        &mut self,
        consumer: &mut Consumer<H>,
        mut process: F,
    ) -> io::Result<LoopStats>
    where
        H: SchedulerHooks,
        F: FnMut(Record<'_>),
    {
        let mut stats = LoopStats::default();
        info!(idle_timeout = ?self.idle_timeout, "consumer loop started");

        while !self.shutdown.load(Ordering::Acquire) {
            match self.poll.poll(&mut self.events, self.idle_timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let woken = self.events.iter().any(|event| event.token() == WAKE_TOKEN);
            if woken {
                stats.wakeups += 1;
            } else if consumer.pending() > 0 {
                stats.recoveries += 1;
                debug!(pending = consumer.pending(), "idle timeout found pending records");
            } else {
                continue;
            }

            let processed = consumer.consumer_run_once(&mut process);
            stats.rounds += 1;
            stats.processed += processed as u64;
        }

        loop {
            let processed = consumer.consumer_run_once(&mut process);
            if processed == 0 {
                break;
            }
            stats.rounds += 1;
            stats.processed += processed as u64;
        }

        info!(
            wakeups = stats.wakeups,
            rounds = stats.rounds,
            processed = stats.processed,
            "consumer loop stopped"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_timeout_is_on_by_default() {
        let consumer_loop = ConsumerLoop::new().unwrap();
        assert_eq!(consumer_loop.idle_timeout(), Some(DEFAULT_IDLE_TIMEOUT));

        let consumer_loop = consumer_loop.with_idle_timeout(Duration::from_millis(5));
        assert_eq!(consumer_loop.idle_timeout(), Some(Duration::from_millis(5)));

        let consumer_loop = consumer_loop.without_idle_timeout();
        assert_eq!(consumer_loop.idle_timeout(), None);
    }
}
