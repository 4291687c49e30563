//! Konfigurasi context
//!
//! Semua ukuran ditetapkan sekali saat init. Satu-satunya knob runtime
//! adalah `budget` (lihat `Context::set_budget`).

use crate::error::ConfigError;

/// Context configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Jumlah slot di pool, minimal `ring_capacity`
    pub pool_capacity: usize,
    /// Kapasitas ring (power of 2), efektif `ring_capacity - 1` item
    pub ring_capacity: usize,
    /// Maksimum item per ronde consumer
    pub budget: usize,
    /// Ukuran payload maksimum per slot
    pub slot_size: usize,
    /// `mlock` backing memory pool
    pub lock_memory: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_capacity: 1024,
            ring_capacity: 1024,
            budget: 64,
            slot_size: 256,
            lock_memory: false,
        }
    }
}

impl Config {
    pub fn new(pool_capacity: usize, ring_capacity: usize, budget: usize) -> Self {
        Self {
            pool_capacity,
            ring_capacity,
            budget,
            ..Self::default()
        }
    }

    pub fn with_slot_size(mut self, slot_size: usize) -> Self {
        self.slot_size = slot_size;
        self
    }

    pub fn with_memory_lock(mut self, lock_memory: bool) -> Self {
        self.lock_memory = lock_memory;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_capacity < 2 || !self.ring_capacity.is_power_of_two() {
            return Err(ConfigError::RingNotPowerOfTwo(self.ring_capacity));
        }
        if self.pool_capacity < self.ring_capacity {
            return Err(ConfigError::PoolSmallerThanRing {
                pool: self.pool_capacity,
                ring: self.ring_capacity,
            });
        }
        if self.budget == 0 {
            return Err(ConfigError::ZeroBudget);
        }
        if self.slot_size == 0 {
            return Err(ConfigError::ZeroSlotSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            Config::new(8, 6, 4).validate(),
            Err(ConfigError::RingNotPowerOfTwo(6))
        ));
        assert!(matches!(
            Config::new(8, 1, 4).validate(),
            Err(ConfigError::RingNotPowerOfTwo(1))
        ));
        assert!(matches!(
            Config::new(4, 8, 4).validate(),
            Err(ConfigError::PoolSmallerThanRing { pool: 4, ring: 8 })
        ));
        assert!(matches!(
            Config::new(8, 8, 0).validate(),
            Err(ConfigError::ZeroBudget)
        ));
        assert!(matches!(
            Config::new(8, 8, 1).with_slot_size(0).validate(),
            Err(ConfigError::ZeroSlotSize)
        ));
    }
}
