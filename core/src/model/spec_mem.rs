//! Per-byte speculative memory: the undo log backing nuke/flush recovery
//! (§3, §4.5).
//!
//! Every speculative store byte-write is recorded here instead of being
//! applied directly to architectural memory. A load reads a byte by
//! walking the chain for that address from the tail (youngest) backward,
//! returning the first entry it finds, or falling through to
//! architectural memory if none exists. On commit, the head entry for
//! each byte is applied to architectural memory and unlinked; on
//! nuke/flush, entries younger than the recovery point are unlinked and
//! discarded without being applied.

use std::collections::HashMap;

/// One speculative write to a single byte of memory.
#[derive(Clone, Copy, Debug)]
pub struct SpecByte {
    /// New (speculative) value.
    pub new_value: u8,
    /// Value this write would restore if undone, and whether one exists
    /// (the byte may have had no prior speculative writer, in which case
    /// undoing this entry means falling through to architectural memory).
    pub prev_value: Option<u8>,
    /// The uop slot that performed this write, for attribution during
    /// nuke/flush unwind.
    pub writer_slot: u32,
    /// Sequence number, strictly increasing in program order, used to
    /// walk the chain from the tail and to decide what "younger than X"
    /// means during recovery.
    pub seq: u64,
}

/// Append-only-at-tail, read-from-tail speculative memory.
///
/// Implemented as a hash map from byte address to a small vector kept in
/// ascending `seq` order; despite the name this is logically a doubly
/// linked list per address (push at tail, unlink from either end), a
/// `Vec` is the simpler realization of the same access pattern.
#[derive(Default)]
pub struct SpeculativeMemory {
    chains: HashMap<u64, Vec<SpecByte>>,
    next_seq: u64,
}

impl SpeculativeMemory {
    /// Creates an empty speculative memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a speculative write to `addr`, returning the entry's
    /// sequence number.
    pub fn write(&mut self, addr: u64, new_value: u8, writer_slot: u32) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let chain = self.chains.entry(addr).or_default();
        let prev_value = chain.last().map(|e| e.new_value);
        chain.push(SpecByte {
            new_value,
            prev_value,
            writer_slot,
            seq,
        });
        seq
    }

    /// Reads `addr`, returning the youngest speculative write if one
    /// exists, or `None` to indicate "fall through to architectural
    /// memory".
    #[must_use]
    pub fn read(&self, addr: u64) -> Option<u8> {
        self.chains.get(&addr).and_then(|c| c.last()).map(|e| e.new_value)
    }

    /// Commits the oldest (head) entry for `addr`, returning the value to
    /// apply to architectural memory. Returns `None` if there is nothing
    /// to commit at that address.
    pub fn commit_oldest(&mut self, addr: u64) -> Option<u8> {
        let chain = self.chains.get_mut(&addr)?;
        if chain.is_empty() {
            return None;
        }
        let entry = chain.remove(0);
        if chain.is_empty() {
            self.chains.remove(&addr);
        }
        Some(entry.new_value)
    }

    /// Discards every entry with `seq >= recovery_seq` across all
    /// addresses, used to unwind speculative writes on nuke/flush.
    pub fn discard_from(&mut self, recovery_seq: u64) {
        self.chains.retain(|_, chain| {
            chain.retain(|e| e.seq < recovery_seq);
            !chain.is_empty()
        });
    }

    /// The sequence number the next write will receive; callers capture
    /// this before issuing a batch of speculative stores so they can
    /// later call [`Self::discard_from`] with it if those stores need to
    /// be unwound.
    #[must_use]
    pub fn watermark(&self) -> u64 {
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_falls_through_when_no_writer() {
        let mem = SpeculativeMemory::new();
        assert_eq!(mem.read(0x100), None);
    }

    #[test]
    fn read_returns_youngest_write() {
        let mut mem = SpeculativeMemory::new();
        mem.write(0x100, 1, 0);
        mem.write(0x100, 2, 1);
        assert_eq!(mem.read(0x100), Some(2));
    }

    #[test]
    fn commit_oldest_applies_in_order() {
        let mut mem = SpeculativeMemory::new();
        mem.write(0x100, 1, 0);
        mem.write(0x100, 2, 1);
        assert_eq!(mem.commit_oldest(0x100), Some(1));
        assert_eq!(mem.commit_oldest(0x100), Some(2));
        assert_eq!(mem.commit_oldest(0x100), None);
    }

    #[test]
    fn discard_from_unwinds_younger_writes_only() {
        let mut mem = SpeculativeMemory::new();
        mem.write(0x100, 1, 0);
        let mark = mem.watermark();
        mem.write(0x100, 2, 1);
        mem.discard_from(mark);
        assert_eq!(mem.read(0x100), Some(1));
    }
}
