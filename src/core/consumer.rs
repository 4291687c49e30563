//! Batch Consumer
//!
//! Menguras paling banyak `max_batch` handle per panggilan, memproses
//! setiap slot, lalu mengembalikannya ke pool. Batas kerja per invocation
//! adalah jumlah item, bukan waktu.

use std::sync::atomic::{AtomicU64, Ordering};

use super::ring_buffer::RingBuffer;
use super::slot_pool::{SlotHandle, SlotPool};

/// Satu record yang sedang dipegang consumer
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    index: usize,
    payload: &'a [u8],
}

impl<'a> Record<'a> {
    /// Index slot asal record
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline(always)]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Consumer side dari pasangan ring + pool
pub struct BatchConsumer<'a> {
    ring: &'a RingBuffer<SlotHandle>,
    pool: &'a SlotPool,
    consumed: &'a AtomicU64,
}

impl<'a> BatchConsumer<'a> {
    /// # Safety
    /// Semua handle di `ring` harus berasal dari `pool`, dan selama
    /// `BatchConsumer` ini hidup tidak ada consumer lain untuk `ring`
    /// maupun pemanggil lain `free` pada `pool`.
    pub(crate) unsafe fn new(
        ring: &'a RingBuffer<SlotHandle>,
        pool: &'a SlotPool,
        consumed: &'a AtomicU64,
    ) -> Self {
        Self {
            ring,
            pool,
            consumed,
        }
    }

    /// Proses hingga `max_batch` record, returns jumlah yang diproses.
    ///
    /// Berhenti lebih awal jika ring kosong. Slot dibebaskan setelah
    /// `process` selesai dengan record-nya.
    #[inline]
    pub fn drain<F>(&self, max_batch: usize, mut process: F) -> usize
    where
        F: FnMut(Record<'_>),
    {
        let mut processed = 0;

        while processed < max_batch {
            // SAFETY: kontrak `new`, kita satu-satunya consumer ring ini
            let Some(handle) = (unsafe { self.ring.dequeue_as_consumer() }) else {
                break;
            };

            // SAFETY: ring hanya berisi handle dari pool ini
            let payload = unsafe { self.pool.read(&handle) };
            process(Record {
                index: handle.index(),
                payload,
            });

            // SAFETY: kontrak `new`, kita satu-satunya pemanggil free
            unsafe { self.pool.free_as_consumer(handle) };
            self.consumed.fetch_add(1, Ordering::Relaxed);
            processed += 1;
        }

        processed
    }
}
