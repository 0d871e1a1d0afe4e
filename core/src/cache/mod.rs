//! A generic set-associative cache with banked access ports, MSHRs, a
//! fill pipeline, and pluggable replacement/prefetch/coherence policies
//! (§4.6, §4.7).
//!
//! This is the single implementation shared by I-caches, D-caches, and
//! the LLC; only the [`crate::config::CacheConfig`] it is built from
//! differs per level.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cache::controller::{CacheController, PermissiveController};
use crate::cache::policies::{build_policy, ReplacementPolicy};
use crate::cache::prefetch::{build_prefetcher, Prefetcher};
use crate::config::CacheConfig;
use crate::model::cache_line::CacheLine;
use crate::model::cache_request::{CacheAction, CacheOp};
use crate::model::mshr::parse_mshr_order;

/// Coherence controller.
pub mod controller;
/// MSHR allocation pool.
pub mod mshr_pool;
/// Replacement policies.
pub mod policies;
/// Prefetcher implementations.
pub mod prefetch;

use mshr_pool::MshrPool;

/// One entry sitting in a bank's access or fill pipeline, ordered by
/// `pipe_exit_time` so the earliest-exiting entry surfaces first from the
/// per-bank min-heap.
#[derive(Clone, Copy, Debug)]
struct PipeEntry {
    pipe_exit_time: u64,
    seq: u64,
    action: CacheAction,
}

impl PartialEq for PipeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.pipe_exit_time == other.pipe_exit_time && self.seq == other.seq
    }
}
impl Eq for PipeEntry {}
impl PartialOrd for PipeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PipeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.pipe_exit_time, self.seq).cmp(&(other.pipe_exit_time, other.seq))
    }
}

/// One bank: an independent access port into the line array, with its
/// own request and fill pipelines.
struct Bank {
    request_pipe: BinaryHeap<Reverse<PipeEntry>>,
    fill_pipe: BinaryHeap<Reverse<PipeEntry>>,
}

impl Bank {
    fn new() -> Self {
        Self {
            request_pipe: BinaryHeap::new(),
            fill_pipe: BinaryHeap::new(),
        }
    }
}

/// Result of a cache access completing, telling the caller whether (and
/// how) a requester should be serviced right away.
#[derive(Debug, Clone, Copy)]
pub enum AccessOutcome {
    /// Line was resident; data available this cycle.
    Hit,
    /// Line was absent; an MSHR now tracks the fill.
    Miss,
    /// No MSHR slot was free; the caller must retry the access later.
    Blocked,
}

/// A generic N-way set-associative cache.
pub struct Cache {
    sets: usize,
    ways: usize,
    line_bytes: usize,
    lines: Vec<CacheLine>,
    policy: Box<dyn ReplacementPolicy>,
    prefetcher: Box<dyn Prefetcher>,
    controller: Box<dyn CacheController>,
    mshr: MshrPool,
    banks: Vec<Bank>,
    bank_rotate: usize,
    latency: u32,
    magic_hit_rate: Option<f64>,
    next_seq: u64,
    rng: StdRng,
    /// Misses that found an already-outstanding MSHR for the same line
    /// rather than allocating a fresh one (§8's MSHR-coalescing stat).
    coalesced_misses: u64,
}

impl Cache {
    /// Builds a cache from its configuration.
    ///
    /// # Errors
    /// Returns a description of the problem if `config.prefetcher_spec` or
    /// `config.mshr_order` does not name a known plug-in variant.
    pub fn new(config: &CacheConfig) -> Result<Self, String> {
        let line_bytes = config.line_bytes.max(1);
        let sets = (config.size_bytes / line_bytes / config.ways.max(1)).max(1);
        let ways = config.ways.max(1);
        let _ = parse_mshr_order(&config.mshr_order)?;
        Ok(Self {
            sets,
            ways,
            line_bytes,
            lines: vec![CacheLine::empty(); sets * ways],
            policy: build_policy(config.policy, sets, ways),
            prefetcher: build_prefetcher(&config.prefetcher_spec, line_bytes)?,
            controller: Box::new(PermissiveController),
            mshr: MshrPool::new(config.mshr_size, config.mshr_wb_size),
            banks: (0..config.banks.max(1)).map(|_| Bank::new()).collect(),
            bank_rotate: 0,
            latency: config.latency,
            magic_hit_rate: config.magic_hit_rate,
            next_seq: 0,
            rng: StdRng::seed_from_u64(0xC0FF_EE00 ^ config.size_bytes as u64),
            coalesced_misses: 0,
        })
    }

    fn set_index(&self, paddr: u64) -> usize {
        ((paddr / self.line_bytes as u64) as usize) % self.sets
    }

    fn tag_of(&self, paddr: u64) -> u64 {
        paddr / (self.line_bytes * self.sets) as u64
    }

    fn bank_of(&self, paddr: u64) -> usize {
        self.set_index(paddr) % self.banks.len()
    }

    fn find_way(&self, set: usize, tag: u64) -> Option<usize> {
        (0..self.ways).find(|&way| {
            let line = &self.lines[set * self.ways + way];
            line.valid && line.tag == tag
        })
    }

    /// True if `paddr` currently hits, without side effects. Used only
    /// for tests and invariant checks; `access` is the real entry point.
    #[must_use]
    pub fn probe_hit(&self, paddr: u64) -> bool {
        let set = self.set_index(paddr);
        let tag = self.tag_of(paddr);
        self.find_way(set, tag).is_some()
    }

    /// Issues an access, queuing it into the appropriate bank's request
    /// pipeline. Hit/miss is resolved later when [`Self::drain_pipes`]
    /// processes the entry past `pipe_exit_time`.
    ///
    /// # Errors
    /// Never fails; a full MSHR pool is reported later as
    /// [`AccessOutcome::Blocked`] from [`Self::drain_pipes`].
    pub fn issue(&mut self, action: CacheAction, current_cycle: u64) {
        let bank = self.bank_of(action.paddr);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.banks[bank].request_pipe.push(Reverse(PipeEntry {
            pipe_exit_time: current_cycle + u64::from(self.latency),
            seq,
            action,
        }));
    }

    /// Drains every bank's request pipeline whose entries have reached
    /// `pipe_exit_time`, returning `(action, outcome)` pairs for the
    /// caller to route (fire callbacks, forward misses downstream).
    ///
    /// Banks are drained starting from a rotating `bank_rotate` offset
    /// each call, for round-robin fairness across banks (§4.6 step 4).
    pub fn drain_pipes(&mut self, current_cycle: u64) -> Vec<(CacheAction, AccessOutcome)> {
        let mut results = Vec::new();
        let nbanks = self.banks.len();
        for i in 0..nbanks {
            let bank_idx = (self.bank_rotate + i) % nbanks;
            while let Some(&Reverse(entry)) = self.banks[bank_idx].request_pipe.peek() {
                if entry.pipe_exit_time > current_cycle {
                    break;
                }
                self.banks[bank_idx].request_pipe.pop();
                let outcome = self.service(entry.action, current_cycle);
                results.push((entry.action, outcome));
            }
        }
        self.bank_rotate = (self.bank_rotate + 1) % nbanks.max(1);
        results
    }

    fn service(&mut self, action: CacheAction, current_cycle: u64) -> AccessOutcome {
        if let Some(rate) = self.magic_hit_rate {
            if self.rng.gen::<f64>() < rate {
                return AccessOutcome::Hit;
            }
        }

        let set = self.set_index(action.paddr);
        let tag = self.tag_of(action.paddr);

        if let Some(way) = self.find_way(set, tag) {
            self.policy.update(set, way);
            let line = &mut self.lines[set * self.ways + way];
            if action.op == CacheOp::Write {
                line.dirty = true;
            }
            if line.prefetched && !line.prefetch_used {
                line.prefetch_used = true;
            }
            let hints = self.prefetcher.observe(action.paddr, true);
            for hint in hints {
                self.issue(
                    CacheAction::anonymous(action.origin_core, CacheOp::Prefetch, hint, current_cycle),
                    current_cycle,
                );
            }
            return AccessOutcome::Hit;
        }

        if self.mshr.has_outstanding_miss(action.paddr) {
            let _ = self.mshr.allocate_miss(action, current_cycle);
            self.coalesced_misses += 1;
            return AccessOutcome::Miss;
        }

        match self.mshr.allocate_miss(action, current_cycle) {
            Ok(_) => {
                let hints = self.prefetcher.observe(action.paddr, false);
                for hint in hints {
                    self.issue(
                        CacheAction::anonymous(action.origin_core, CacheOp::Prefetch, hint, current_cycle),
                        current_cycle,
                    );
                }
                AccessOutcome::Miss
            }
            Err(mshr_pool::MshrAllocError::PoolFull) => AccessOutcome::Blocked,
        }
    }

    /// Installs a fill for `paddr` (an MSHR response has returned),
    /// possibly evicting a line. Returns `Some(evicted_paddr)` if the
    /// evicted line was dirty and now needs a writeback.
    pub fn install_fill(&mut self, paddr: u64, owner_core: Option<usize>, prefetched: bool) -> Option<u64> {
        let set = self.set_index(paddr);
        let tag = self.tag_of(paddr);
        let way = if let Some(free) = (0..self.ways).find(|&w| !self.lines[set * self.ways + w].valid) {
            free
        } else {
            self.policy.get_victim(set)
        };
        let slot = &mut self.lines[set * self.ways + way];
        let evicted_tag = slot.tag;
        let evicted_was_valid = slot.valid;
        let needs_writeback = slot.evict();
        slot.fill(tag, owner_core, prefetched);
        self.policy.update(set, way);
        if needs_writeback && evicted_was_valid {
            Some(evicted_tag * (self.line_bytes * self.sets) as u64 + (set * self.line_bytes) as u64)
        } else {
            None
        }
    }

    /// Associated MSHR pool, for the cache-process sub-steps that drive
    /// MSHR scheduling directly (`§4.6` steps 1/2/5).
    pub fn mshr_pool_mut(&mut self) -> &mut MshrPool {
        &mut self.mshr
    }

    /// Cache line size in bytes.
    #[must_use]
    pub fn line_bytes(&self) -> usize {
        self.line_bytes
    }

    /// Number of sets.
    #[must_use]
    pub fn num_sets(&self) -> usize {
        self.sets
    }

    /// Associativity.
    #[must_use]
    pub fn ways(&self) -> usize {
        self.ways
    }

    /// Current count of valid lines in `set` (for the §8 invariant that
    /// this never exceeds associativity).
    #[must_use]
    pub fn valid_lines_in_set(&self, set: usize) -> usize {
        (0..self.ways)
            .filter(|&w| self.lines[set * self.ways + w].valid)
            .count()
    }

    /// Drains the count of misses that coalesced onto an already
    /// outstanding MSHR since the last call.
    pub fn take_coalesced_misses(&mut self) -> u64 {
        std::mem::take(&mut self.coalesced_misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            size_bytes: 4 * 64,
            line_bytes: 64,
            ways: 2,
            banks: 1,
            latency: 1,
            mshr_size: 4,
            mshr_wb_size: 1,
            policy: crate::config::ReplacementPolicy::Lru,
            prefetcher_spec: "none".to_owned(),
            prefetch_fifo: 4,
            prefetch_threshold: 0,
            prefetch_max_outstanding: 0,
            magic_hit_rate: None,
            mshr_order: "RPWB".to_owned(),
        }
    }

    #[test]
    fn miss_then_fill_then_hit() {
        let mut cache = Cache::new(&config()).unwrap();
        cache.issue(CacheAction::anonymous(0, CacheOp::Read, 0x1000, 0), 0);
        let results = cache.drain_pipes(1);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, AccessOutcome::Miss));

        cache.install_fill(0x1000, Some(0), false);
        assert!(cache.probe_hit(0x1000));

        cache.issue(CacheAction::anonymous(0, CacheOp::Read, 0x1000, 2), 2);
        let results = cache.drain_pipes(3);
        assert!(matches!(results[0].1, AccessOutcome::Hit));
    }

    #[test]
    fn valid_lines_never_exceed_associativity() {
        let mut cache = Cache::new(&config()).unwrap();
        for i in 0..8 {
            cache.install_fill(i * 64 * 4, Some(0), false);
        }
        for set in 0..cache.num_sets() {
            assert!(cache.valid_lines_in_set(set) <= cache.ways());
        }
    }

    #[test]
    fn magic_hit_rate_one_always_hits() {
        let mut config = config();
        config.magic_hit_rate = Some(1.0);
        let mut cache = Cache::new(&config).unwrap();
        cache.issue(CacheAction::anonymous(0, CacheOp::Read, 0x9999, 0), 0);
        let results = cache.drain_pipes(1);
        assert!(matches!(results[0].1, AccessOutcome::Hit));
    }

    #[test]
    fn second_miss_to_same_line_coalesces_not_blocked() {
        let mut cache = Cache::new(&config()).unwrap();
        cache.issue(CacheAction::anonymous(0, CacheOp::Read, 0x1000, 0), 0);
        cache.issue(CacheAction::anonymous(0, CacheOp::Read, 0x1000, 0), 0);
        let results = cache.drain_pipes(1);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, o)| matches!(o, AccessOutcome::Miss)));
        assert_eq!(cache.take_coalesced_misses(), 1);
        assert_eq!(cache.take_coalesced_misses(), 0);
    }
}
