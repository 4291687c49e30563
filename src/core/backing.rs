//! Backing memory untuk Slot Pool
//!
//! Semua slot hidup di satu region mmap yang dibuat sekali saat init:
//! - Page-aligned: slot stride kelipatan cache line
//! - Tidak pernah resize: producer tidak pernah memicu alokasi
//! - Opsional `mlock`: page di-pin di RAM agar producer tidak page-fault

use memmap2::{MmapMut, MmapOptions};
use std::io;

/// Region memori kontigu yang menampung semua slot pool
pub struct BackingMemory {
    mmap: MmapMut,
    locked: bool,
}

impl BackingMemory {
    /// Anonymous mapping dengan ukuran `len` bytes (zero-filled oleh kernel)
    pub fn anonymous(len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "backing memory length must be non-zero",
            ));
        }

        let mmap = MmapOptions::new().len(len).map_anon()?;
        Ok(Self {
            mmap,
            locked: false,
        })
    }

    /// Memakai mapping yang sudah disiapkan caller (misal hugetlbfs)
    pub fn from_mmap(mmap: MmapMut) -> Self {
        Self {
            mmap,
            locked: false,
        }
    }

    /// Pin seluruh region di RAM.
    ///
    /// Gagal dengan `ENOMEM`/`EPERM` jika `RLIMIT_MEMLOCK` terlalu kecil.
    #[cfg(unix)]
    pub fn lock(&mut self) -> io::Result<()> {
        if self.locked {
            return Ok(());
        }

        // SAFETY: pointer dan panjang berasal dari mapping yang masih hidup
        let rc = unsafe {
            libc::mlock(
                self.mmap.as_ptr() as *const libc::c_void,
                self.mmap.len() as libc::size_t,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        self.locked = true;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn lock(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "memory locking is only available on unix",
        ))
    }

    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    #[inline(always)]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_is_zeroed() {
        let mut backing = BackingMemory::anonymous(4096).unwrap();
        assert_eq!(backing.len(), 4096);
        assert!(!backing.is_locked());

        let ptr = backing.as_mut_ptr();
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 4096) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_length_rejected() {
        let err = BackingMemory::anonymous(0).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_from_mmap_keeps_length() {
        let mmap = MmapOptions::new().len(8192).map_anon().unwrap();
        let backing = BackingMemory::from_mmap(mmap);
        assert_eq!(backing.len(), 8192);
    }
}
