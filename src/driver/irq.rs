//! Interrupt line simulasi
//!
//! Pengganti register enable/disable interrupt di hardware. Producer
//! memanggil `fire()` setelah publish; interrupt hanya "terkirim" jika
//! line sedang enabled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
pub struct IrqLine {
    enabled: AtomicBool,
    delivered: AtomicU64,
    masked: AtomicU64,
    disables: AtomicU64,
    enables: AtomicU64,
}

impl Default for IrqLine {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqLine {
    /// Line baru dalam keadaan enabled
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
            masked: AtomicU64::new(0),
            disables: AtomicU64::new(0),
            enables: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.disables.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
        self.enables.fetch_add(1, Ordering::Relaxed);
    }

    /// Hardware event. Returns `true` jika interrupt terkirim.
    #[inline(always)]
    pub fn fire(&self) -> bool {
        if self.is_enabled() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.masked.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Event yang terjadi saat line di-mask (mode Poll)
    pub fn masked(&self) -> u64 {
        self.masked.load(Ordering::Relaxed)
    }

    pub fn disables(&self) -> u64 {
        self.disables.load(Ordering::Relaxed)
    }

    pub fn enables(&self) -> u64 {
        self.enables.load(Ordering::Relaxed)
    }
}
