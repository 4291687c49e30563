//! Lock-Free Single-Producer Single-Consumer (SPSC) Ring Buffer
//!
//! Implementasi menggunakan Lamport Queue dengan memory ordering yang tepat.
//! Tidak ada Mutex, tidak ada CAS, tidak ada alokasi setelah inisialisasi.
//!
//! Aturan single-writer:
//! - `tail` hanya ditulis oleh producer
//! - `head` hanya ditulis oleh consumer
//!
//! Satu entry selalu dikosongkan untuk membedakan penuh vs kosong, jadi
//! kapasitas efektif adalah `capacity - 1`.
//!
//! Peran dipaksa oleh type system: `try_enqueue`/`try_dequeue` butuh
//! `&mut self`, dan untuk dua thread ring di-`split()` menjadi
//! `RingProducer` + `RingConsumer` yang masing-masing `Send` tapi tidak
//! `Sync` dan tidak `Clone`.

use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Slot dalam ring buffer
#[repr(transparent)]
struct Slot<T> {
    data: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    const fn new() -> Self {
        Self {
            data: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
pub(crate) struct CacheLinePadded<T> {
    pub(crate) value: T,
}

impl<T> CacheLinePadded<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self { value }
    }
}

/// Lock-Free SPSC Ring Buffer
///
/// `head` dan `tail` berada di cache line terpisah untuk menghindari
/// false sharing antara producer dan consumer.
#[repr(C)]
pub struct RingBuffer<T> {
    // Consumer side - cache line aligned
    head: CacheLinePadded<AtomicUsize>,
    // Producer side - cache line aligned
    tail: CacheLinePadded<AtomicUsize>,
    // Pre-allocated buffer di heap - tidak ada alokasi setelah init
    buffer: Box<[Slot<T>]>,
    // capacity - 1, capacity selalu power of 2
    mask: usize,
}

// SAFETY: lewat `&RingBuffer` hanya observer (atomic load) yang bisa
// dipanggil secara safe. Enqueue/dequeue bersama hanya lewat fungsi
// `unsafe` di bawah, yang mensyaratkan satu producer dan satu consumer.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Membuat ring buffer baru dengan `capacity` entry.
    ///
    /// Returns `None` jika `capacity` bukan power of 2 atau kurang dari 2.
    /// Alokasi hanya terjadi sekali di sini.
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return None;
        }

        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, Slot::new);

        Some(Self {
            head: CacheLinePadded::new(AtomicUsize::new(0)),
            tail: CacheLinePadded::new(AtomicUsize::new(0)),
            buffer: buffer.into_boxed_slice(),
            mask: capacity - 1,
        })
    }

    /// Push item ke buffer
    ///
    /// Returns `Err(item)` jika buffer penuh, item dikembalikan ke caller.
    /// Tidak pernah retry dan tidak pernah spin.
    #[inline(always)]
    pub fn try_enqueue(&mut self, item: T) -> Result<(), T> {
        // SAFETY: `&mut self` = tidak ada producer atau consumer lain
        unsafe { self.enqueue_as_producer(item) }
    }

    /// Pop item dari buffer. Returns `None` jika buffer kosong.
    #[inline(always)]
    pub fn try_dequeue(&mut self) -> Option<T> {
        // SAFETY: `&mut self` = tidak ada producer atau consumer lain
        unsafe { self.dequeue_as_consumer() }
    }

    /// Pisahkan ring menjadi producer half dan consumer half
    pub fn split(self) -> (RingProducer<T>, RingConsumer<T>) {
        let ring = Arc::new(self);
        (
            RingProducer {
                ring: Arc::clone(&ring),
                _role: PhantomData,
            },
            RingConsumer {
                ring,
                _role: PhantomData,
            },
        )
    }

    /// Enqueue lewat referensi bersama (Producer side)
    ///
    /// # Safety
    /// Hanya boleh ada satu pemanggil fungsi ini pada satu waktu.
    #[inline(always)]
    pub(crate) unsafe fn enqueue_as_producer(&self, item: T) -> Result<(), T> {
        let tail = self.tail.value.load(Ordering::Relaxed);
        let next_tail = (tail + 1) & self.mask;

        if next_tail == self.head.value.load(Ordering::Acquire) {
            return Err(item);
        }

        // Slot `tail` berada di luar [head, tail), consumer tidak menyentuhnya
        (*self.buffer[tail].data.get()).write(item);

        // Release: isi slot visible sebelum tail baru terlihat oleh consumer
        self.tail.value.store(next_tail, Ordering::Release);

        Ok(())
    }

    /// Dequeue lewat referensi bersama (Consumer side)
    ///
    /// # Safety
    /// Hanya boleh ada satu pemanggil fungsi ini pada satu waktu.
    #[inline(always)]
    pub(crate) unsafe fn dequeue_as_consumer(&self) -> Option<T> {
        let head = self.head.value.load(Ordering::Relaxed);

        if head == self.tail.value.load(Ordering::Acquire) {
            return None;
        }

        // Acquire pada tail menjamin slot `head` sudah ditulis penuh
        let item = (*self.buffer[head].data.get()).assume_init_read();

        // Release: read di atas selesai sebelum producer boleh menimpa slot ini
        self.head
            .value
            .store((head + 1) & self.mask, Ordering::Release);

        Some(item)
    }

    /// Cek apakah buffer kosong
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        let head = self.head.value.load(Ordering::Acquire);
        let tail = self.tail.value.load(Ordering::Acquire);
        head == tail
    }

    /// Cek apakah buffer penuh
    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.len() == self.mask
    }

    /// Jumlah item dalam buffer
    ///
    /// Snapshot saja jika dipanggil dari luar producer/consumer.
    #[inline(always)]
    pub fn len(&self) -> usize {
        let head = self.head.value.load(Ordering::Acquire);
        let tail = self.tail.value.load(Ordering::Acquire);
        tail.wrapping_sub(head) & self.mask
    }

    /// Kapasitas buffer (termasuk entry cadangan)
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Jumlah maksimum item yang bisa antre sekaligus
    #[inline(always)]
    pub fn usable_capacity(&self) -> usize {
        self.mask
    }

    #[cfg(test)]
    pub(crate) fn cursors(&self) -> (usize, usize) {
        (
            self.head.value.load(Ordering::Acquire),
            self.tail.value.load(Ordering::Acquire),
        )
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        while self.try_dequeue().is_some() {}
    }
}

/// Producer half dari ring yang sudah di-`split()`
///
/// Bisa dipindah ke thread lain, tapi tidak bisa dibagi:
///
/// ```compile_fail
/// fn shared<T: Sync>() {}
/// shared::<hermes_napi::core::RingProducer<u64>>();
/// ```
pub struct RingProducer<T> {
    ring: Arc<RingBuffer<T>>,
    _role: PhantomData<Cell<()>>,
}

impl<T> RingProducer<T> {
    #[inline(always)]
    pub fn try_enqueue(&mut self, item: T) -> Result<(), T> {
        // SAFETY: hanya ada satu RingProducer per ring, dan ia `&mut`
        unsafe { self.ring.enqueue_as_producer(item) }
    }
}

impl<T> Deref for RingProducer<T> {
    type Target = RingBuffer<T>;

    fn deref(&self) -> &RingBuffer<T> {
        &self.ring
    }
}

/// Consumer half dari ring yang sudah di-`split()`
///
/// ```compile_fail
/// fn shared<T: Sync>() {}
/// shared::<hermes_napi::core::RingConsumer<u64>>();
/// ```
pub struct RingConsumer<T> {
    ring: Arc<RingBuffer<T>>,
    _role: PhantomData<Cell<()>>,
}

impl<T> RingConsumer<T> {
    #[inline(always)]
    pub fn try_dequeue(&mut self) -> Option<T> {
        // SAFETY: hanya ada satu RingConsumer per ring, dan ia `&mut`
        unsafe { self.ring.dequeue_as_consumer() }
    }
}

impl<T> Deref for RingConsumer<T> {
    type Target = RingBuffer<T>;

    fn deref(&self) -> &RingBuffer<T> {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hint::spin_loop;
    use std::rc::Rc;
    use std::thread;

    #[test]
    fn test_rejects_bad_capacity() {
        assert!(RingBuffer::<u64>::with_capacity(0).is_none());
        assert!(RingBuffer::<u64>::with_capacity(1).is_none());
        assert!(RingBuffer::<u64>::with_capacity(12).is_none());
        assert!(RingBuffer::<u64>::with_capacity(2).is_some());
    }

    #[test]
    fn test_basic_enqueue_dequeue() {
        let mut rb = RingBuffer::<u64>::with_capacity(16).unwrap();

        assert!(rb.is_empty());
        assert!(!rb.is_full());

        assert!(rb.try_enqueue(42).is_ok());
        assert!(!rb.is_empty());
        assert_eq!(rb.len(), 1);

        assert_eq!(rb.try_dequeue(), Some(42));
        assert!(rb.is_empty());
        assert_eq!(rb.try_dequeue(), None);
    }

    #[test]
    fn test_scenario_capacity_eight() {
        let mut rb = RingBuffer::<u32>::with_capacity(8).unwrap();

        for i in 0..7 {
            assert!(rb.try_enqueue(i).is_ok());
        }
        assert!(rb.is_full());

        let before = rb.cursors();
        assert_eq!(rb.try_enqueue(7), Err(7));
        assert_eq!(rb.cursors(), before);

        let drained: Vec<u32> = std::iter::from_fn(|| rb.try_dequeue()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_full_buffer_then_space() {
        let mut rb = RingBuffer::<u64>::with_capacity(4).unwrap();

        assert!(rb.try_enqueue(1).is_ok());
        assert!(rb.try_enqueue(2).is_ok());
        assert!(rb.try_enqueue(3).is_ok());

        assert!(rb.is_full());
        assert!(rb.try_enqueue(4).is_err());

        assert_eq!(rb.try_dequeue(), Some(1));
        assert!(rb.try_enqueue(4).is_ok());
        assert_eq!(rb.len(), 3);
    }

    #[test]
    fn test_wraparound() {
        let mut rb = RingBuffer::<u64>::with_capacity(4).unwrap();

        // Fill and drain multiple times to test wraparound
        for round in 0..10 {
            for i in 0..3 {
                assert!(rb.try_enqueue(round * 3 + i).is_ok());
            }
            for i in 0..3 {
                assert_eq!(rb.try_dequeue(), Some(round * 3 + i));
            }
        }
        assert!(rb.is_empty());
    }

    #[test]
    fn test_drop_releases_queued_items() {
        let marker = Rc::new(());
        {
            let mut rb = RingBuffer::with_capacity(8).unwrap();
            for _ in 0..5 {
                assert!(rb.try_enqueue(Rc::clone(&marker)).is_ok());
            }
            drop(rb.try_dequeue());
            assert_eq!(Rc::strong_count(&marker), 5);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn test_split_halves_cross_thread() {
        const COUNT: u64 = 500_000;
        let (mut tx, mut rx) = RingBuffer::<Box<u64>>::with_capacity(64).unwrap().split();

        let consumer = thread::spawn(move || {
            let mut expected = 0u64;
            while expected < COUNT {
                match rx.try_dequeue() {
                    Some(value) => {
                        assert_eq!(*value, expected, "duplicate or lost item");
                        expected += 1;
                    }
                    None => spin_loop(),
                }
            }
            assert!(rx.try_dequeue().is_none());
        });

        for value in 0..COUNT {
            let mut item = Box::new(value);
            while let Err(back) = tx.try_enqueue(item) {
                item = back;
                spin_loop();
            }
        }

        consumer.join().unwrap();
        assert!(tx.is_empty());
    }

    #[test]
    fn test_split_halves_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<RingProducer<Box<u64>>>();
        assert_send::<RingConsumer<Box<u64>>>();
    }

    #[test]
    fn test_split_drop_releases_queued_items() {
        let marker = Arc::new(());
        let (mut tx, rx) = RingBuffer::with_capacity(4).unwrap().split();
        assert!(tx.try_enqueue(Arc::clone(&marker)).is_ok());
        assert!(tx.try_enqueue(Arc::clone(&marker)).is_ok());

        drop(tx);
        assert_eq!(Arc::strong_count(&marker), 3);
        drop(rx);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
