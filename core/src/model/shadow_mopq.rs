//! Ring buffer of non-speculative handshakes plus their speculative
//! siblings, used to replay instructions after a nuke (§3, §4.2).
//!
//! Per §6, the external feeder hands back one confirmed ("non-speculative")
//! handshake at a time. Between two confirmed handshakes the core may have
//! fetched any number of speculative Mops down a predicted path; those are
//! recorded as siblings of the most recent confirmed entry. When a nuke
//! fires, the core rewinds to the entry at the violating point and replays
//! forward through the recorded siblings rather than re-querying the
//! feeder, since the feeder itself is one-directional and non-speculative.

use std::collections::VecDeque;

/// One confirmed handshake plus the speculative Mops fetched after it and
/// before the next confirmed handshake arrived.
pub struct ShadowEntry<H> {
    /// The non-speculative handshake from the feeder.
    pub handshake: H,
    /// Speculative siblings fetched on the predicted path following this
    /// handshake, in fetch order.
    pub siblings: Vec<H>,
}

/// Bounded ring of [`ShadowEntry`], oldest first.
///
/// Generic over the handshake payload type so this module has no
/// dependency on the feeder's concrete handshake representation.
pub struct ShadowMopQueue<H> {
    ring: VecDeque<ShadowEntry<H>>,
    capacity: usize,
}

impl<H> ShadowMopQueue<H> {
    /// Creates an empty queue bounded to `capacity` confirmed entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a newly confirmed handshake, evicting the oldest entry if
    /// the ring is at capacity.
    pub fn push_confirmed(&mut self, handshake: H) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(ShadowEntry {
            handshake,
            siblings: Vec::new(),
        });
    }

    /// Appends a speculative sibling to the most recently confirmed
    /// entry. No-op if the ring is empty (nothing confirmed yet).
    pub fn push_sibling(&mut self, handshake: H) {
        if let Some(entry) = self.ring.back_mut() {
            entry.siblings.push(handshake);
        }
    }

    /// Number of confirmed entries currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// True if no confirmed entries are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Iterates confirmed entries oldest-first, each paired with its
    /// recorded speculative siblings, for nuke replay.
    pub fn iter(&self) -> impl Iterator<Item = &ShadowEntry<H>> {
        self.ring.iter()
    }

    /// Drops every confirmed entry from the `count` most recent, keeping
    /// everything older — used when a nuke's recovery point lands inside
    /// the retained window and everything after it must be discarded.
    pub fn truncate_back(&mut self, keep: usize) {
        while self.ring.len() > keep {
            self.ring.pop_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siblings_attach_to_most_recent_confirmed() {
        let mut q: ShadowMopQueue<u32> = ShadowMopQueue::new(4);
        q.push_confirmed(1);
        q.push_sibling(10);
        q.push_sibling(11);
        q.push_confirmed(2);
        q.push_sibling(20);

        let entries: Vec<_> = q.iter().collect();
        assert_eq!(entries[0].handshake, 1);
        assert_eq!(entries[0].siblings, vec![10, 11]);
        assert_eq!(entries[1].handshake, 2);
        assert_eq!(entries[1].siblings, vec![20]);
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut q: ShadowMopQueue<u32> = ShadowMopQueue::new(2);
        q.push_confirmed(1);
        q.push_confirmed(2);
        q.push_confirmed(3);
        let handshakes: Vec<_> = q.iter().map(|e| e.handshake).collect();
        assert_eq!(handshakes, vec![2, 3]);
    }

    #[test]
    fn truncate_back_keeps_oldest_n() {
        let mut q: ShadowMopQueue<u32> = ShadowMopQueue::new(8);
        for i in 0..5 {
            q.push_confirmed(i);
        }
        q.truncate_back(2);
        let handshakes: Vec<_> = q.iter().map(|e| e.handshake).collect();
        assert_eq!(handshakes, vec![0, 1]);
    }

    #[test]
    fn push_sibling_before_any_confirmed_is_noop() {
        let mut q: ShadowMopQueue<u32> = ShadowMopQueue::new(4);
        q.push_sibling(99);
        assert!(q.is_empty());
    }
}
