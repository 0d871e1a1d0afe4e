//! Cache line state and replacement metadata (§4.6).

/// One cache line slot within a set.
///
/// `repl_state` is opaque to the line itself; its meaning (recency stack
/// position, PLRU bit vector, clock hand bit, …) is owned by whichever
/// [`crate::cache::policies::ReplacementPolicy`] the cache was configured
/// with.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheLine {
    /// Line tag, valid only when `valid` is set.
    pub tag: u64,
    /// Core that owns this line in a private cache; unused in a shared
    /// (LLC) cache.
    pub owner_core: Option<usize>,
    /// Opaque replacement-policy state word for this line.
    pub repl_state: u64,
    /// Line holds valid data.
    pub valid: bool,
    /// Line has been written since fill (needs writeback on eviction).
    pub dirty: bool,
    /// Line was installed by a prefetch, not a demand access.
    pub prefetched: bool,
    /// A demand access has hit this line since it was prefetched in
    /// (used for prefetch-accuracy accounting, cleared on eviction).
    pub prefetch_used: bool,
}

impl CacheLine {
    /// An empty, invalid slot.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Installs a fresh line, clearing dirty/prefetch-used and setting
    /// `prefetched` per the caller.
    pub fn fill(&mut self, tag: u64, owner_core: Option<usize>, prefetched: bool) {
        self.tag = tag;
        self.owner_core = owner_core;
        self.valid = true;
        self.dirty = false;
        self.prefetched = prefetched;
        self.prefetch_used = false;
    }

    /// Invalidates the slot, returning whether a writeback is owed.
    pub fn evict(&mut self) -> bool {
        let needs_writeback = self.valid && self.dirty;
        *self = Self::default();
        needs_writeback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_clears_dirty_and_prefetch_used() {
        let mut line = CacheLine::empty();
        line.dirty = true;
        line.prefetch_used = true;
        line.fill(0xabc, Some(2), true);
        assert!(line.valid);
        assert!(!line.dirty);
        assert!(!line.prefetch_used);
        assert!(line.prefetched);
    }

    #[test]
    fn evict_reports_writeback_only_when_dirty() {
        let mut clean = CacheLine::empty();
        clean.fill(1, None, false);
        assert!(!clean.evict());

        let mut dirty = CacheLine::empty();
        dirty.fill(1, None, false);
        dirty.dirty = true;
        assert!(dirty.evict());
        assert!(!dirty.valid);
    }
}
