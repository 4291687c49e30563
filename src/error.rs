//! Error types
//!
//! Semua kegagalan publish bersifat lokal dan non-fatal: dihitung di
//! `Stats::dropped`, tidak pernah panic, tidak pernah retry otomatis.

use std::io;
use thiserror::Error;

/// Alasan satu unit kerja producer dibuang
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("slot pool exhausted")]
    PoolExhausted,

    #[error("ring buffer full")]
    RingFull,

    #[error("payload of {len} bytes exceeds slot size {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("production paused")]
    Paused,
}

/// Konfigurasi tidak valid atau backing memory gagal disiapkan
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ring capacity {0} must be a power of two and at least 2")]
    RingNotPowerOfTwo(usize),

    #[error("pool capacity {pool} is smaller than ring capacity {ring}")]
    PoolSmallerThanRing { pool: usize, ring: usize },

    #[error("pool capacity must be non-zero")]
    ZeroPoolCapacity,

    #[error("budget must be at least 1")]
    ZeroBudget,

    #[error("slot size must be non-zero")]
    ZeroSlotSize,

    #[error("capacity {0} is too large")]
    CapacityTooLarge(usize),

    #[error("backing memory holds {actual} bytes, {required} required")]
    BackingTooSmall { required: usize, actual: usize },

    #[error("backing memory: {0}")]
    Backing(#[from] io::Error),
}
