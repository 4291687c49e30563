//! Pre-allocated Slot Pool
//!
//! Sekumpulan buffer berukuran tetap yang dipinjamkan lewat handle.
//! Free set adalah SPSC ring tersendiri:
//! - Producer satu-satunya yang `alloc()` (consumer dari free ring)
//! - Consumer satu-satunya yang `free()` (producer dari free ring)
//!
//! Jadi alloc/free sama-sama O(1), lock-free, dan tanpa alokasi.
//!
//! API publik memakai `&mut self` (satu pemilik). Context yang membagi
//! pool antara producer half dan consumer half memakai varian `*_as_*`
//! yang `unsafe`.
//!
//! Slot yang batal dipakai producer (misal ring penuh) tidak boleh masuk
//! free ring karena producer bukan writer-nya. Slot itu disimpan di satu
//! `spare` milik producer dan dipakai lagi oleh `alloc()` berikutnya.

#[cfg(debug_assertions)]
use std::sync::atomic::AtomicBool;
use std::sync::atomic::{AtomicU32, Ordering};

use super::backing::BackingMemory;
use super::ring_buffer::RingBuffer;
use crate::error::{ConfigError, PublishError};

/// Alignment stride tiap slot
const CACHE_LINE: usize = 64;

/// Header di awal tiap slot: panjang payload (u32) + padding
const SLOT_HEADER_SIZE: usize = 8;

/// Sentinel `spare` kosong
const NO_SPARE: u32 = u32::MAX;

/// Handle ke satu slot pool.
///
/// Sengaja tidak `Clone`/`Copy`: memegang handle berarti memiliki slot.
#[derive(Debug, PartialEq, Eq)]
pub struct SlotHandle(u32);

impl SlotHandle {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Fixed-capacity pool of fixed-size slots
pub struct SlotPool {
    free: RingBuffer<SlotHandle>,
    // Hanya ditulis producer
    spare: AtomicU32,
    base: *mut u8,
    stride: usize,
    slot_size: usize,
    capacity: usize,
    backing: BackingMemory,
    #[cfg(debug_assertions)]
    owned: Box<[AtomicBool]>,
}

// SAFETY: setiap slot hanya diakses oleh pemilik handle-nya,
// perpindahan handle lewat free ring membawa happens-before edge.
// Lewat `&SlotPool` hanya observer dan fungsi `unsafe` yang tersedia.
unsafe impl Send for SlotPool {}
unsafe impl Sync for SlotPool {}

impl SlotPool {
    /// Pool dengan anonymous mmap sebagai backing memory
    pub fn new(capacity: usize, slot_size: usize) -> Result<Self, ConfigError> {
        let len = Self::required_len(capacity, slot_size)?;
        let backing = BackingMemory::anonymous(len)?;
        Self::with_backing(capacity, slot_size, backing)
    }

    /// Pool di atas backing memory yang disiapkan caller
    pub fn with_backing(
        capacity: usize,
        slot_size: usize,
        mut backing: BackingMemory,
    ) -> Result<Self, ConfigError> {
        let required = Self::required_len(capacity, slot_size)?;
        if backing.len() < required {
            return Err(ConfigError::BackingTooSmall {
                required,
                actual: backing.len(),
            });
        }

        let ring_capacity = (capacity + 1)
            .checked_next_power_of_two()
            .ok_or(ConfigError::CapacityTooLarge(capacity))?;
        let mut free = RingBuffer::with_capacity(ring_capacity)
            .ok_or(ConfigError::CapacityTooLarge(capacity))?;

        for index in 0..capacity {
            // ring_capacity > capacity, jadi tidak mungkin penuh di sini
            if free.try_enqueue(SlotHandle(index as u32)).is_err() {
                return Err(ConfigError::CapacityTooLarge(capacity));
            }
        }

        Ok(Self {
            free,
            spare: AtomicU32::new(NO_SPARE),
            base: backing.as_mut_ptr(),
            stride: Self::stride(slot_size),
            slot_size,
            capacity,
            backing,
            #[cfg(debug_assertions)]
            owned: (0..capacity).map(|_| AtomicBool::new(false)).collect(),
        })
    }

    /// Ukuran backing memory minimum untuk `capacity` slot
    pub fn required_len(capacity: usize, slot_size: usize) -> Result<usize, ConfigError> {
        if slot_size == 0 {
            return Err(ConfigError::ZeroSlotSize);
        }
        if capacity == 0 {
            return Err(ConfigError::ZeroPoolCapacity);
        }
        if capacity >= NO_SPARE as usize || slot_size > u32::MAX as usize {
            return Err(ConfigError::CapacityTooLarge(capacity));
        }

        capacity
            .checked_mul(Self::stride(slot_size))
            .ok_or(ConfigError::CapacityTooLarge(capacity))
    }

    #[inline(always)]
    fn stride(slot_size: usize) -> usize {
        (SLOT_HEADER_SIZE + slot_size + CACHE_LINE - 1) & !(CACHE_LINE - 1)
    }

    /// Ambil slot bebas. `None` berarti pool habis.
    #[inline(always)]
    pub fn alloc(&mut self) -> Option<SlotHandle> {
        // SAFETY: `&mut self` = satu-satunya pemakai pool
        unsafe { self.alloc_as_producer() }
    }

    /// Kembalikan slot ke free set
    #[inline(always)]
    pub fn free(&mut self, handle: SlotHandle) {
        // SAFETY: `&mut self` = satu-satunya pemakai pool
        unsafe { self.free_as_consumer(handle) }
    }

    /// Kembalikan slot yang baru di-`alloc()` tapi tidak jadi dipakai.
    /// Slot dipakai lagi oleh `alloc()` berikutnya.
    #[inline(always)]
    pub fn recycle(&mut self, handle: SlotHandle) {
        // SAFETY: `&mut self` = satu-satunya pemakai pool
        unsafe { self.recycle_as_producer(handle) }
    }

    /// `alloc()` lewat referensi bersama (Producer side)
    ///
    /// # Safety
    /// Hanya satu thread yang boleh memanggil `alloc_as_producer` dan
    /// `recycle_as_producer` pada satu waktu.
    #[inline(always)]
    pub(crate) unsafe fn alloc_as_producer(&self) -> Option<SlotHandle> {
        let spare = self.spare.load(Ordering::Relaxed);
        let handle = if spare != NO_SPARE {
            self.spare.store(NO_SPARE, Ordering::Relaxed);
            SlotHandle(spare)
        } else {
            self.free.dequeue_as_consumer()?
        };

        #[cfg(debug_assertions)]
        self.owned[handle.index()].store(true, Ordering::Relaxed);

        Some(handle)
    }

    /// `free()` lewat referensi bersama (Consumer side)
    ///
    /// # Safety
    /// Hanya satu thread yang boleh memanggil `free_as_consumer` pada
    /// satu waktu.
    #[inline(always)]
    pub(crate) unsafe fn free_as_consumer(&self, handle: SlotHandle) {
        debug_assert!(handle.index() < self.capacity, "handle out of range");

        #[cfg(debug_assertions)]
        {
            let was_owned = self.owned[handle.index()].swap(false, Ordering::Relaxed);
            debug_assert!(was_owned, "slot {} freed twice", handle.index());
        }

        let rejected = self.free.enqueue_as_producer(handle).is_err();
        debug_assert!(!rejected, "free set overflow");
    }

    /// `recycle()` lewat referensi bersama (Producer side)
    ///
    /// # Safety
    /// Sama dengan `alloc_as_producer`.
    #[inline(always)]
    pub(crate) unsafe fn recycle_as_producer(&self, handle: SlotHandle) {
        debug_assert!(handle.index() < self.capacity, "handle out of range");
        debug_assert_eq!(
            self.spare.load(Ordering::Relaxed),
            NO_SPARE,
            "producer already holds a spare slot"
        );

        #[cfg(debug_assertions)]
        self.owned[handle.index()].store(false, Ordering::Relaxed);

        self.spare.store(handle.0, Ordering::Relaxed);
    }

    /// Salin `data` ke slot dan set panjangnya
    ///
    /// # Safety
    /// `handle` harus hasil `alloc()` dari pool ini.
    #[inline(always)]
    pub unsafe fn write(&self, handle: &mut SlotHandle, data: &[u8]) -> Result<(), PublishError> {
        if data.len() > self.slot_size {
            return Err(PublishError::PayloadTooLarge {
                len: data.len(),
                max: self.slot_size,
            });
        }

        let slot = self.slot_ptr(handle);
        std::ptr::write(slot as *mut u32, data.len() as u32);
        std::ptr::copy_nonoverlapping(data.as_ptr(), slot.add(SLOT_HEADER_SIZE), data.len());

        Ok(())
    }

    /// Payload yang terakhir ditulis ke slot
    ///
    /// # Safety
    /// `handle` harus hasil `alloc()` dari pool ini.
    #[inline(always)]
    pub unsafe fn read<'a>(&'a self, handle: &'a SlotHandle) -> &'a [u8] {
        let slot = self.slot_ptr(handle);
        let len = std::ptr::read(slot as *const u32) as usize;
        std::slice::from_raw_parts(slot.add(SLOT_HEADER_SIZE), len.min(self.slot_size))
    }

    #[inline(always)]
    fn slot_ptr(&self, handle: &SlotHandle) -> *mut u8 {
        debug_assert!(handle.index() < self.capacity, "handle out of range");
        // SAFETY: handle dari pool ini, jadi index < capacity dan region
        // berukuran capacity * stride
        unsafe { self.base.add(handle.index() * self.stride) }
    }

    /// Jumlah slot bebas (snapshot)
    #[inline(always)]
    pub fn free_count(&self) -> usize {
        let spare = (self.spare.load(Ordering::Relaxed) != NO_SPARE) as usize;
        self.free.len() + spare
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.backing.is_locked()
    }

    /// Pin backing memory di RAM
    pub fn lock_memory(&mut self) -> std::io::Result<()> {
        self.backing.lock()
    }
}
