//! Monotonic counters untuk observability
//!
//! Counter producer dan consumer berada di cache line terpisah karena
//! masing-masing hanya ditulis oleh satu sisi.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::CacheLinePadded;
use crate::error::PublishError;

/// Snapshot counter context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub produced: u64,
    pub dropped: u64,
    pub consumed: u64,
    /// Rincian `dropped`
    pub drops: DropStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropStats {
    pub pool_exhausted: u64,
    pub ring_full: u64,
    pub oversized: u64,
    pub paused: u64,
}

impl Stats {
    /// Item yang sudah dipublish tapi belum diproses consumer
    pub fn in_flight(&self) -> u64 {
        self.produced.saturating_sub(self.consumed)
    }
}

#[derive(Default)]
struct ProducerCounters {
    produced: AtomicU64,
    dropped: AtomicU64,
    pool_exhausted: AtomicU64,
    ring_full: AtomicU64,
    oversized: AtomicU64,
    paused: AtomicU64,
}

pub(crate) struct Counters {
    producer: CacheLinePadded<ProducerCounters>,
    consumed: CacheLinePadded<AtomicU64>,
}

impl Counters {
    pub(crate) fn new() -> Self {
        Self {
            producer: CacheLinePadded::new(ProducerCounters::default()),
            consumed: CacheLinePadded::new(AtomicU64::new(0)),
        }
    }

    #[inline(always)]
    pub(crate) fn record_produced(&self) {
        self.producer.value.produced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn record_drop(&self, reason: PublishError) {
        let p = &self.producer.value;
        let bucket = match reason {
            PublishError::PoolExhausted => &p.pool_exhausted,
            PublishError::RingFull => &p.ring_full,
            PublishError::PayloadTooLarge { .. } => &p.oversized,
            PublishError::Paused => &p.paused,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
        p.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn consumed(&self) -> &AtomicU64 {
        &self.consumed.value
    }

    pub(crate) fn snapshot(&self) -> Stats {
        let p = &self.producer.value;
        Stats {
            produced: p.produced.load(Ordering::Relaxed),
            dropped: p.dropped.load(Ordering::Relaxed),
            consumed: self.consumed.value.load(Ordering::Relaxed),
            drops: DropStats {
                pool_exhausted: p.pool_exhausted.load(Ordering::Relaxed),
                ring_full: p.ring_full.load(Ordering::Relaxed),
                oversized: p.oversized.load(Ordering::Relaxed),
                paused: p.paused.load(Ordering::Relaxed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_breakdown_sums_to_dropped() {
        let counters = Counters::new();
        counters.record_drop(PublishError::PoolExhausted);
        counters.record_drop(PublishError::RingFull);
        counters.record_drop(PublishError::RingFull);
        counters.record_drop(PublishError::PayloadTooLarge { len: 9, max: 8 });
        counters.record_drop(PublishError::Paused);
        counters.record_produced();

        let stats = counters.snapshot();
        assert_eq!(stats.dropped, 5);
        assert_eq!(stats.produced, 1);
        assert_eq!(stats.drops.ring_full, 2);
        let d = stats.drops;
        assert_eq!(d.pool_exhausted + d.ring_full + d.oversized + d.paused, stats.dropped);
    }
}
