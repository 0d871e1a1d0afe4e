//! The MSHR pool for one cache (§4.6): `mshr_size - mshr_wb_size` miss
//! entries and `mshr_wb_size` writeback entries, with coalescing of
//! later misses onto an already-outstanding request for the same line.

use std::collections::HashMap;

use crate::model::cache_request::CacheAction;
use crate::model::mshr::{Mshr, MshrKind};

/// Why an MSHR allocation request could not be satisfied this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MshrAllocError {
    /// Every entry of the requested kind is busy.
    PoolFull,
}

/// Fixed-capacity pool of miss and writeback MSHR slots for one cache.
pub struct MshrPool {
    miss: Vec<Option<Mshr>>,
    writeback: Vec<Option<Mshr>>,
    /// Maps a cache-line-aligned paddr with an outstanding miss to its
    /// slot index in `miss`, for O(1) coalescing lookups.
    miss_index: HashMap<u64, usize>,
}

impl MshrPool {
    /// Creates a pool with `mshr_size - mshr_wb_size` miss entries and
    /// `mshr_wb_size` writeback entries.
    #[must_use]
    pub fn new(mshr_size: usize, mshr_wb_size: usize) -> Self {
        let miss_count = mshr_size.saturating_sub(mshr_wb_size);
        Self {
            miss: (0..miss_count).map(|_| None).collect(),
            writeback: (0..mshr_wb_size).map(|_| None).collect(),
            miss_index: HashMap::new(),
        }
    }

    /// True if a miss to `paddr` would coalesce onto an existing slot.
    #[must_use]
    pub fn has_outstanding_miss(&self, paddr: u64) -> bool {
        self.miss_index.contains_key(&paddr)
    }

    /// Allocates (or coalesces onto) a miss MSHR for `req`.
    ///
    /// # Errors
    /// Returns [`MshrAllocError::PoolFull`] if no miss slot is free and
    /// `req` does not coalesce onto an existing one.
    pub fn allocate_miss(&mut self, req: CacheAction, cycle: u64) -> Result<usize, MshrAllocError> {
        if let Some(&slot) = self.miss_index.get(&req.paddr) {
            if let Some(mshr) = &mut self.miss[slot] {
                mshr.coalesce(req);
            }
            return Ok(slot);
        }
        let slot = self
            .miss
            .iter()
            .position(std::option::Option::is_none)
            .ok_or(MshrAllocError::PoolFull)?;
        self.miss[slot] = Some(Mshr::new(MshrKind::Miss, req.paddr, req, cycle));
        self.miss_index.insert(req.paddr, slot);
        Ok(slot)
    }

    /// Allocates a writeback MSHR for `req`.
    ///
    /// # Errors
    /// Returns [`MshrAllocError::PoolFull`] if no writeback slot is free.
    pub fn allocate_writeback(&mut self, req: CacheAction, cycle: u64) -> Result<usize, MshrAllocError> {
        let slot = self
            .writeback
            .iter()
            .position(std::option::Option::is_none)
            .ok_or(MshrAllocError::PoolFull)?;
        self.writeback[slot] = Some(Mshr::new(MshrKind::Writeback, req.paddr, req, cycle));
        Ok(slot)
    }

    /// Marks a miss slot's response as returned from the next level.
    pub fn mark_miss_returned(&mut self, slot: usize) {
        if let Some(mshr) = &mut self.miss[slot] {
            mshr.mark_returned();
        }
    }

    /// Marks a miss slot's line as installed, and frees the slot
    /// (returning every coalesced waiter so the caller can fire their
    /// callbacks in FIFO order: primary first, then each coalesced
    /// waiter in arrival order).
    pub fn fill_and_free_miss(&mut self, slot: usize) -> Vec<CacheAction> {
        let Some(mut mshr) = self.miss[slot].take() else {
            return Vec::new();
        };
        mshr.mark_filled();
        self.miss_index.remove(&mshr.paddr);
        let mut callbacks = Vec::with_capacity(1 + mshr.waiters.len());
        callbacks.push(mshr.primary);
        callbacks.extend(mshr.waiters);
        callbacks
    }

    /// Frees a writeback slot once its response has returned.
    pub fn free_writeback(&mut self, slot: usize) {
        self.writeback[slot] = None;
    }

    /// Number of free miss slots.
    #[must_use]
    pub fn free_miss_count(&self) -> usize {
        self.miss.iter().filter(|m| m.is_none()).count()
    }

    /// Number of free writeback slots.
    #[must_use]
    pub fn free_writeback_count(&self) -> usize {
        self.writeback.iter().filter(|m| m.is_none()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cache_request::CacheOp;

    fn req(paddr: u64) -> CacheAction {
        CacheAction::anonymous(0, CacheOp::Read, paddr, 0)
    }

    #[test]
    fn second_miss_to_same_line_coalesces() {
        let mut pool = MshrPool::new(4, 1);
        let slot_a = pool.allocate_miss(req(0x1000), 0).unwrap();
        let slot_b = pool.allocate_miss(req(0x1000), 1).unwrap();
        assert_eq!(slot_a, slot_b);
    }

    #[test]
    fn fill_returns_primary_then_waiters_in_order() {
        let mut pool = MshrPool::new(4, 1);
        let slot = pool.allocate_miss(req(0x1000), 0).unwrap();
        pool.allocate_miss(req(0x1000), 1).unwrap();
        pool.allocate_miss(req(0x1000), 2).unwrap();
        let callbacks = pool.fill_and_free_miss(slot);
        assert_eq!(callbacks.len(), 3);
        assert!(pool.miss_index.get(&0x1000).is_none());
    }

    #[test]
    fn pool_full_once_all_miss_slots_busy() {
        let mut pool = MshrPool::new(2, 1);
        pool.allocate_miss(req(0x1000), 0).unwrap();
        assert_eq!(pool.allocate_miss(req(0x2000), 0), Err(MshrAllocError::PoolFull));
    }
}
