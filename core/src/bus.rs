//! Fixed-width bus / NoC model clocked at a ratio to the CPU clock (§4,
//! overview table).
//!
//! The front-side bus connecting the LLC to the memory controller is the
//! one instance this crate models; it is a single shared resource with a
//! configured width, speed ratio, and round-trip latency, queued FIFO.

use std::collections::VecDeque;

use crate::model::cache_request::CacheAction;

/// One in-flight bus transaction.
#[derive(Debug, Clone, Copy)]
pub struct BusTransaction {
    /// The request this transfer carries, so its completion can be routed
    /// back to the core and callback that issued it.
    pub action: CacheAction,
    /// Cycle the transaction was enqueued.
    pub enqueued_cycle: u64,
    /// Uncore cycle the transaction completes and data/ack is available.
    pub completes_cycle: u64,
}

/// A fixed-width, fixed-latency bus with a configurable clock ratio.
pub struct Bus {
    width_bytes: usize,
    roundtrip: u32,
    /// Ticks of the bus's own clock consumed per uncore tick; values > 1
    /// mean the bus runs slower than the uncore clock it is driven from.
    clock_ratio: u32,
    queue: VecDeque<BusTransaction>,
    /// Cycle the bus is next free to start a new transfer (models
    /// `width_bytes`-limited serialization of back-to-back transactions).
    next_free_cycle: u64,
}

impl Bus {
    /// Creates a bus with the given width (bytes/transfer), round-trip
    /// latency (uncore cycles), and clock ratio.
    #[must_use]
    pub fn new(width_bytes: usize, roundtrip: u32, clock_ratio: u32) -> Self {
        Self {
            width_bytes: width_bytes.max(1),
            roundtrip,
            clock_ratio: clock_ratio.max(1),
            queue: VecDeque::new(),
            next_free_cycle: 0,
        }
    }

    /// Enqueues a transfer carrying `action`, returning the cycle at
    /// which it will complete.
    pub fn enqueue(&mut self, action: CacheAction, current_cycle: u64) -> u64 {
        let start = current_cycle.max(self.next_free_cycle);
        let completes = start + u64::from(self.roundtrip) * u64::from(self.clock_ratio);
        self.next_free_cycle = start + u64::from(self.clock_ratio);
        self.queue.push_back(BusTransaction {
            action,
            enqueued_cycle: current_cycle,
            completes_cycle: completes,
        });
        completes
    }

    /// Pops every transaction that has completed by `current_cycle`.
    pub fn drain_completed(&mut self, current_cycle: u64) -> Vec<BusTransaction> {
        let mut done = Vec::new();
        while self.queue.front().is_some_and(|front| front.completes_cycle <= current_cycle) {
            if let Some(transaction) = self.queue.pop_front() {
                done.push(transaction);
            }
        }
        done
    }

    /// Bus transfer width, bytes.
    #[must_use]
    pub fn width_bytes(&self) -> usize {
        self.width_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cache_request::CacheOp;

    fn demand(paddr: u64) -> CacheAction {
        CacheAction::anonymous(0, CacheOp::Read, paddr, 0)
    }

    #[test]
    fn transaction_completes_after_roundtrip() {
        let mut bus = Bus::new(32, 20, 1);
        let completes = bus.enqueue(demand(0x1000), 100);
        assert_eq!(completes, 120);
        assert!(bus.drain_completed(119).is_empty());
        assert_eq!(bus.drain_completed(120).len(), 1);
    }

    #[test]
    fn back_to_back_transfers_serialize() {
        let mut bus = Bus::new(32, 20, 2);
        let first = bus.enqueue(demand(0x1000), 0);
        let second = bus.enqueue(demand(0x2000), 0);
        assert!(second > first);
    }

    #[test]
    fn drained_transaction_carries_its_action() {
        let mut bus = Bus::new(32, 20, 1);
        bus.enqueue(demand(0x4000), 0);
        let done = bus.drain_completed(20);
        assert_eq!(done[0].action.paddr, 0x4000);
    }
}
