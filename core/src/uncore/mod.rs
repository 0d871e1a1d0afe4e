//! The uncore: last-level cache, front-side bus, and memory controller,
//! clocked at a rational ratio to the CPU clock and shared by every core
//! (§4, §5).

/// Memory-controller / DRAM policy boundary.
pub mod dram;

use std::collections::HashMap;

use crate::bus::Bus;
use crate::cache::{AccessOutcome, Cache};
use crate::config::UncoreConfig;
use crate::model::cache_request::{CacheAction, CacheOp};
use dram::{build_dram_policy, DramPolicy};

/// The shared memory subsystem below the private per-core caches.
pub struct Uncore {
    llc: Cache,
    bus: Bus,
    dram: Box<dyn DramPolicy>,
    /// Uncore clock, advanced independently of (and typically faster
    /// than) any single CPU core's clock.
    cycle: u64,
    /// Resolved demand accesses waiting to be claimed by the core that
    /// issued them, keyed by [`CacheAction::origin_core`].
    completions: HashMap<usize, Vec<CacheAction>>,
}

impl Uncore {
    /// Builds the uncore from its configuration.
    ///
    /// # Errors
    /// Returns a description of the problem if `config.llc`'s prefetcher/
    /// mshr-order spec or `config.dram_spec` does not name a known
    /// plug-in variant.
    pub fn new(config: &UncoreConfig) -> Result<Self, String> {
        Ok(Self {
            llc: Cache::new(&config.llc)?,
            bus: Bus::new(config.fsb_width_bytes, config.fsb_roundtrip, config.fsb_speed_ratio),
            dram: build_dram_policy(&config.dram_spec)?,
            cycle: 0,
            completions: HashMap::new(),
        })
    }

    /// Current uncore cycle.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Accepts an LLC access from a private-cache miss.
    pub fn issue_llc(&mut self, action: CacheAction) {
        self.llc.issue(action, self.cycle);
    }

    /// Drains every completion addressed to `core_id` since the last
    /// call: an LLC hit or a DRAM fill that now satisfies a per-core
    /// cache miss forwarded here by [`Self::issue_llc`].
    pub fn take_completions(&mut self, core_id: usize) -> Vec<CacheAction> {
        self.completions.remove(&core_id).unwrap_or_default()
    }

    /// Advances the uncore one cycle: drains the LLC's pipelines,
    /// forwards any LLC miss to the bus/DRAM path, and drains completed
    /// bus transactions back to the LLC as fills, routing each resolved
    /// demand access back to the core that issued it.
    pub fn tick(&mut self) -> Vec<(CacheAction, AccessOutcome)> {
        self.cycle += 1;
        let results = self.llc.drain_pipes(self.cycle);
        for (action, outcome) in &results {
            match outcome {
                AccessOutcome::Hit => {
                    self.completions.entry(action.origin_core).or_default().push(*action);
                }
                AccessOutcome::Miss => {
                    let is_write = action.op == CacheOp::Write;
                    let dram_latency = self.dram.latency(action.paddr, is_write);
                    let _ = self.bus.enqueue(*action, self.cycle + u64::from(dram_latency));
                }
                AccessOutcome::Blocked => {}
            }
        }
        for txn in self.bus.drain_completed(self.cycle) {
            let _ = self.llc.install_fill(txn.action.paddr, Some(txn.action.origin_core), false);
            self.completions.entry(txn.action.origin_core).or_default().push(txn.action);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_uncore_clock() {
        let mut uncore = Uncore::new(&UncoreConfig::default()).unwrap();
        assert_eq!(uncore.cycle(), 0);
        let _ = uncore.tick();
        assert_eq!(uncore.cycle(), 1);
    }

    #[test]
    fn llc_hit_completion_is_routed_back_to_origin_core() {
        let mut uncore = Uncore::new(&UncoreConfig::default()).unwrap();
        uncore.llc.install_fill(0x1000, Some(3), false);
        uncore.issue_llc(CacheAction::anonymous(3, CacheOp::Read, 0x1000, 0));
        let _ = uncore.tick();
        let completions = uncore.take_completions(3);
        assert_eq!(completions.len(), 1);
        assert!(uncore.take_completions(3).is_empty());
    }
}
