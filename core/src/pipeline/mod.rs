//! Fetch, decode, alloc, execute, and commit pipeline stages (§4).
//!
//! Each stage is a free function operating on [`Core`], called once per
//! cycle in reverse pipeline order (commit, execute, alloc, decode,
//! fetch) so a younger stage never overtakes data an older stage still
//! needs to see this same cycle.

/// Fetch stage: drives the oracle and the instruction cache.
pub mod fetch;
/// Decode stage: pipeline-latches a cracked Mop's uops toward alloc.
pub mod decode;
/// Alloc/rename stage: ROB/RS/LDQ/STQ allocation and dataflow wiring.
pub mod alloc;
/// Execute stage: functional-unit scheduling, memory access, writeback.
pub mod exec;
/// Commit stage: in-order retirement, architectural update, recovery.
pub mod commit;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::cache::Cache;
use crate::config::CoreConfig;
use crate::decoder_iface::{Decoder, UopCracker};
use crate::feeder::Feeder;
use crate::model::dep_map::DependencyMap;
use crate::model::mop::Mop;
use crate::model::uop::OdepArena;
use crate::oracle::Oracle;
use crate::pipeline::exec::functional_units::ExecUnits;
use crate::pipeline::exec::memdep::{build_mdp, MemDependencePredictor, SpeculativeLoad};
use crate::predictor::Predictor;
use crate::stats::CoreStats;
use crate::trace::TraceBuffer;
use crate::uncore::Uncore;

/// An oracle built from boxed external-collaborator trait objects, so a
/// [`Core`] can be assembled at runtime from config-selected
/// implementations rather than being generic over them.
pub type DynOracle = Oracle<Box<dyn Feeder>, Box<dyn Decoder>, Box<dyn UopCracker>, Box<dyn Predictor>>;

/// Uops per in-flight Mop slot a [`crate::model::uop::UopHandle`] can
/// address; uop flows are at most a handful long, so 256 is generous.
const MAX_UOPS_PER_MOP_SLOT: u32 = 256;

/// Packs a (Mop arena slot, uop index) pair into the flat `u32` slot
/// number every [`crate::model::uop::UopHandle`] in this crate uses.
#[must_use]
pub fn pack_handle(mop_slot: u32, uop_idx: u32) -> u32 {
    mop_slot * MAX_UOPS_PER_MOP_SLOT + uop_idx
}

/// Inverse of [`pack_handle`].
#[must_use]
pub fn unpack_handle(slot: u32) -> (u32, u32) {
    (slot / MAX_UOPS_PER_MOP_SLOT, slot % MAX_UOPS_PER_MOP_SLOT)
}

/// A pipeline latch: entries become visible to the next stage once the
/// cycle they were pushed at has passed, modeling a fixed-depth pipeline
/// register.
pub struct Latch<T> {
    queue: VecDeque<(u64, T)>,
}

impl<T> Default for Latch<T> {
    fn default() -> Self {
        Self { queue: VecDeque::new() }
    }
}

impl<T> Latch<T> {
    /// Creates an empty latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `item`, visible to [`Self::pop_ready`] starting at
    /// `ready_cycle`.
    pub fn push(&mut self, ready_cycle: u64, item: T) {
        self.queue.push_back((ready_cycle, item));
    }

    /// Pops the oldest entry if it is ready by `cycle`.
    pub fn pop_ready(&mut self, cycle: u64) -> Option<T> {
        if self.queue.front().is_some_and(|(ready, _)| *ready <= cycle) {
            self.queue.pop_front().map(|(_, item)| item)
        } else {
            None
        }
    }

    /// Looks at the oldest entry without consuming it, so a caller can
    /// check downstream capacity before committing to [`Self::pop_ready`].
    pub fn peek_ready(&self, cycle: u64) -> Option<&T> {
        self.queue.front().filter(|(ready, _)| *ready <= cycle).map(|(_, item)| item)
    }

    /// Entries currently queued (ready or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// One CPU core: pipeline state plus its private cache hierarchy.
///
/// Runs on its own OS thread under the multi-core simulation model
/// (`sim`), rendezvousing with the uncore once per cycle; every field
/// here must stay `Send`.
pub struct Core {
    /// This core's id, also its feeder channel index.
    pub core_id: usize,
    /// This core's configuration.
    pub cfg: CoreConfig,
    /// Execution-driven functional front end.
    pub oracle: DynOracle,
    /// Private L1 instruction cache.
    pub il1: Cache,
    /// Private L1 data cache.
    pub dl1: Cache,
    /// Private L2 cache.
    pub dl2: Cache,
    /// Shared last-level cache / bus / DRAM, reached on a private-cache
    /// miss; one handle shared with every other core and the uncore's own
    /// clock thread.
    pub uncore: Arc<Mutex<Uncore>>,
    /// Alloc-time rename table.
    pub dep_map: DependencyMap,
    /// Shared output-consumer-edge arena for every in-flight uop.
    pub odep_arena: OdepArena,

    /// In-flight Mop arena; `None` marks a free slot.
    pub mops: Vec<Option<Mop>>,
    /// Free-list of `mops` indices.
    pub free_mop_slots: Vec<u32>,

    /// Mops fetched from the oracle, delayed by `fetch.depth` before
    /// decode can see them.
    pub fetch_latch: Latch<u32>,
    /// Individual uops, delayed by `decode.depth` before alloc can see
    /// them.
    pub decode_latch: Latch<(u32, u32)>,

    /// Reservation station: packed handles of non-memory uops awaiting
    /// issue.
    pub rs: Vec<u32>,
    /// Load queue, in program order.
    pub ldq: VecDeque<u32>,
    /// Store queue, in program order.
    pub stq: VecDeque<u32>,
    /// Reorder buffer: packed handles in program order.
    pub rob: VecDeque<u32>,

    /// Execution-port/functional-unit timing scheduler.
    pub exec_units: ExecUnits,
    /// Memory-dependence predictor a load consults before bypassing
    /// older, address-unresolved stores.
    pub mdp: Box<dyn MemDependencePredictor>,
    /// Pending functional-unit completions, earliest first.
    pub fu_completions: std::collections::BinaryHeap<std::cmp::Reverse<(u64, u32)>>,
    /// Loads the memory-dependence predictor let bypass an older,
    /// unresolved store; tracked until every such store resolves, so a
    /// later address match against one of them is recognized as a
    /// genuine ordering violation (§4.1/§4.4 nuke).
    pub speculative_loads: Vec<SpeculativeLoad>,

    /// This core's private clock.
    pub cycle: u64,
    /// PC fetch will request next, absent a redirect.
    pub next_fetch_pc: u64,
    /// Cycle fetch may resume after a branch-misprediction bubble.
    pub jeclear_resume_cycle: Option<u64>,
    /// Cycles since the last commit, for the deadlock/emergency watchdogs.
    pub cycles_since_commit: u64,
    /// True once this core has seen end-of-stream and drained.
    pub halted: bool,

    /// Per-core statistics.
    pub stats: CoreStats,
    /// Per-core trace ring buffer.
    pub trace: TraceBuffer,
    /// Set by [`crate::sim_assert!`] when a pipeline invariant is
    /// violated; checked once per cycle by `sim::run_core` and turned
    /// into a process-ending [`crate::common::SimError`].
    pub fault: Option<crate::common::SimError>,
}

impl Core {
    /// Builds a core starting fetch at `entry_pc`.
    ///
    /// # Errors
    /// Returns a description of the problem if any per-cache prefetcher/
    /// mshr-order spec or `cfg.exec.mdp_spec` does not name a known
    /// plug-in variant.
    pub fn new(
        core_id: usize,
        cfg: CoreConfig,
        oracle: DynOracle,
        entry_pc: u64,
        uncore: Arc<Mutex<Uncore>>,
    ) -> Result<Self, String> {
        let il1 = Cache::new(&cfg.fetch.il1)?;
        let dl1 = Cache::new(&cfg.exec.dl1)?;
        let dl2 = Cache::new(&cfg.exec.dl2)?;
        let num_ports = cfg.exec.num_exec_ports;
        let exec_units = ExecUnits::new(cfg.exec.fu.clone(), num_ports);
        let mdp = build_mdp(&cfg.exec.mdp_spec)?;
        Ok(Self {
            core_id,
            cfg,
            oracle,
            il1,
            dl1,
            dl2,
            uncore,
            dep_map: DependencyMap::new(),
            odep_arena: OdepArena::new(),
            mops: Vec::new(),
            free_mop_slots: Vec::new(),
            fetch_latch: Latch::new(),
            decode_latch: Latch::new(),
            rs: Vec::new(),
            ldq: VecDeque::new(),
            stq: VecDeque::new(),
            rob: VecDeque::new(),
            exec_units,
            mdp,
            fu_completions: std::collections::BinaryHeap::new(),
            speculative_loads: Vec::new(),
            cycle: 0,
            next_fetch_pc: entry_pc,
            jeclear_resume_cycle: None,
            cycles_since_commit: 0,
            halted: false,
            stats: CoreStats::default(),
            trace: TraceBuffer::new(4096),
            fault: None,
        })
    }

    fn alloc_mop_slot(&mut self, mop: Mop) -> u32 {
        if let Some(slot) = self.free_mop_slots.pop() {
            self.mops[slot as usize] = Some(mop);
            slot
        } else {
            self.mops.push(Some(mop));
            (self.mops.len() - 1) as u32
        }
    }

    fn free_mop_slot(&mut self, slot: u32) {
        self.mops[slot as usize] = None;
        self.free_mop_slots.push(slot);
    }

    /// Advances this core by exactly one cycle, running every stage in
    /// reverse pipeline order.
    pub fn tick(&mut self) {
        self.cycle += 1;
        commit::step(self);
        exec::step(self);
        alloc::step(self);
        decode::step(self);
        fetch::step(self);

        if self.cfg.commit.emergency_recovery_threshold > 0
            && self.cycles_since_commit >= self.cfg.commit.emergency_recovery_threshold
        {
            self.emergency_recover();
        }
    }

    /// Drops every in-flight uop and Mop, reverts the rename table, and
    /// resumes fetch at `resume_pc`. Shared by [`Self::emergency_recover`]
    /// and [`Self::nuke`]: both discard the entire speculative window and
    /// differ only in why and where execution resumes.
    fn full_pipeline_flush(&mut self, resume_pc: u64) {
        self.rob.clear();
        self.rs.clear();
        self.ldq.clear();
        self.stq.clear();
        self.fu_completions.clear();
        self.speculative_loads.clear();
        self.fetch_latch = Latch::new();
        self.decode_latch = Latch::new();
        self.mops.clear();
        self.free_mop_slots.clear();
        self.dep_map.clear();

        self.oracle.recover(0, 0);
        self.next_fetch_pc = resume_pc;
        self.jeclear_resume_cycle = None;
        self.cycles_since_commit = 0;
    }

    /// Silent pipeline flush used when no Mop has committed for
    /// `emergency_recovery_threshold` cycles: resumes fetch from the
    /// oldest ROB entry's Mop pc (or, if the ROB is empty, the recorded
    /// `next_fetch_pc`).
    fn emergency_recover(&mut self) {
        self.stats.emergency_recoveries += 1;
        let resume_pc = self
            .rob
            .front()
            .map(|&h| unpack_handle(h).0)
            .and_then(|mop_slot| self.mops[mop_slot as usize].as_ref())
            .map_or(self.next_fetch_pc, |m| m.pc);

        self.full_pipeline_flush(resume_pc);
    }

    /// Full pipeline flush triggered by a detected memory-order violation
    /// (§4.1/§4.4): a load bypassed an older, unresolved store under the
    /// memory-dependence predictor's guess, and that store's address, once
    /// resolved, turned out to alias the load. Every uop younger than the
    /// violating store is speculative garbage and must be discarded;
    /// fetch resumes at `resume_pc`, the pc of the bypassing load.
    pub fn nuke(&mut self, resume_pc: u64) {
        self.stats.num_nuke += 1;
        self.full_pipeline_flush(resume_pc);
    }

    /// Redirects fetch after a resolved branch: records the corrected
    /// PC and the bubble before fetch may resume.
    pub fn redirect_fetch(&mut self, corrected_pc: u64) {
        self.next_fetch_pc = corrected_pc;
        self.jeclear_resume_cycle = Some(self.cycle + u64::from(self.cfg.fetch.jeclear_delay));
        self.stats.num_jeclear += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let packed = pack_handle(12, 3);
        assert_eq!(unpack_handle(packed), (12, 3));
    }

    #[test]
    fn latch_holds_entries_until_ready_cycle() {
        let mut latch: Latch<u32> = Latch::new();
        latch.push(5, 42);
        assert_eq!(latch.pop_ready(4), None);
        assert_eq!(latch.pop_ready(5), Some(42));
    }
}
