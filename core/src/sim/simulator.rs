//! Top-level multi-core simulator (§5): owns the shared uncore and one
//! thread per CPU core, each driving its own [`Core`] and rendezvousing
//! on [`Rendezvous`] once per cycle so the uncore advances exactly once.
//!
//! Per §9's "global mutable state" note, the uncore, cycle counters, and
//! configuration are not ambient globals — every core thread reaches
//! them only through the [`Simulator`] value this module builds, shared
//! as `Arc<Mutex<..>>` handles passed into each thread's closure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::cache::AccessOutcome;
use crate::common::SimError;
use crate::config::{Config, SystemConfig};
use crate::decoder_iface::{Decoder, TableCracker, TableDecoder, UopCracker};
use crate::feeder::{Feeder, FeederStall, Handshake};
use crate::oracle::Oracle;
use crate::pipeline::Core;
use crate::predictor::build_predictor;
use crate::stats::SimStats;
use crate::trace::TraceBuffer;
use crate::uncore::Uncore;

use super::rendezvous::Rendezvous;

/// Forwards every [`Feeder`] call through a shared, lock-protected
/// instance: a single feeder answers every core's `core_id`-keyed
/// requests, so each [`Core`]'s oracle needs its own handle onto the
/// same underlying feeder rather than owning one outright. Address
/// translation (§5's `memory_lock`) and the activate/deactivate control
/// surface are exactly the calls every core may make concurrently; this
/// wrapper's single mutex is that lock.
struct SharedFeeder(Arc<Mutex<Box<dyn Feeder>>>);

impl Feeder for SharedFeeder {
    fn next_handshake(&mut self, core_id: usize) -> Result<Handshake, FeederStall> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).next_handshake(core_id)
    }

    fn v2p_translate(&self, asid: u32, vaddr: u64) -> u64 {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).v2p_translate(asid, vaddr)
    }

    fn warmup(&mut self, asid: u32, vaddr: u64, is_write: bool) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).warmup(asid, vaddr, is_write);
    }

    fn activate_core(&mut self, core_id: usize) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).activate_core(core_id);
    }

    fn deactivate_core(&mut self, core_id: usize) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).deactivate_core(core_id);
    }

    fn is_core_active(&self, core_id: usize) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_core_active(core_id)
    }
}

/// Shared counters the elected master updates after each uncore tick,
/// read back once every core thread has joined.
#[derive(Default)]
struct SharedOutcome {
    llc_hits: u64,
    llc_misses: u64,
    fatal: Option<SimError>,
}

/// Owns every core and the uncore shared between them for one run.
pub struct Simulator {
    system: SystemConfig,
    uncore: Arc<Mutex<Uncore>>,
    feeder: Arc<Mutex<Box<dyn Feeder>>>,
    cores: Vec<Core>,
}

impl Simulator {
    /// Builds a simulator from a loaded [`Config`] and the feeder every
    /// core's oracle will pull handshakes from.
    ///
    /// # Errors
    /// Returns [`SimError::Config`] if a per-core predictor spec string
    /// does not name a known plug-in variant.
    pub fn new(config: Config, feeder: Box<dyn Feeder>) -> Result<Self, SimError> {
        let feeder = Arc::new(Mutex::new(feeder));
        let uncore = Arc::new(Mutex::new(Uncore::new(&config.uncore).map_err(SimError::Config)?));

        let mut cores = Vec::with_capacity(config.cores.len());
        for (core_id, core_cfg) in config.cores.into_iter().enumerate() {
            let predictor = build_predictor(&core_cfg.fetch.predictor_spec).map_err(SimError::Config)?;
            let shadow_mopq_size = core_cfg.shadow_mopq_size;
            let oracle = Oracle::new(
                core_id,
                Box::new(SharedFeeder(Arc::clone(&feeder))) as Box<dyn Feeder>,
                Box::new(TableDecoder) as Box<dyn Decoder>,
                Box::new(TableCracker) as Box<dyn UopCracker>,
                predictor,
                shadow_mopq_size,
            );
            let mut core = Core::new(core_id, core_cfg, oracle, 0, Arc::clone(&uncore)).map_err(SimError::Config)?;
            core.trace = TraceBuffer::new(config.system.trace_buffer_capacity);
            if !config.system.ztrace_filename.is_empty() {
                let path = config.system.ztrace_filename.replace("{core}", &core_id.to_string());
                core.trace.open_file(std::path::Path::new(&path))?;
            }
            cores.push(core);
        }

        {
            let mut f = feeder.lock().unwrap_or_else(PoisonError::into_inner);
            for core_id in 0..cores.len() {
                f.activate_core(core_id);
            }
        }

        Ok(Self { system: config.system, uncore, feeder, cores })
    }

    /// Runs every core to completion — feeder exhaustion plus a fully
    /// drained pipeline — or until `max_cycles` uncore cycles have
    /// elapsed if given, then returns the accumulated statistics.
    ///
    /// # Errors
    /// Returns [`SimError::Deadlock`] if any core's
    /// `commit.deadlock_threshold` cycles pass with no commit.
    pub fn run(mut self, max_cycles: Option<u64>) -> Result<SimStats, SimError> {
        let num_cores = self.cores.len();
        let rendezvous = Rendezvous::new(num_cores.max(1));
        let stop = AtomicBool::new(false);
        let outcome = Mutex::new(SharedOutcome::default());
        let system = &self.system;
        let uncore = &self.uncore;
        let feeder = &self.feeder;

        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(num_cores);
            for core in &mut self.cores {
                let rendezvous = &rendezvous;
                let stop = &stop;
                let outcome = &outcome;
                handles.push(scope.spawn(move || {
                    run_core(core, rendezvous, uncore, feeder, system, max_cycles, stop, outcome);
                }));
            }
            for handle in handles {
                let _ = handle.join();
            }
        });

        let outcome = outcome.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(err) = outcome.fatal {
            // Per §7, a fatal condition (deadlock watchdog, invariant
            // violation) flushes every core's trace buffer before the
            // process exits, so whatever led up to the failure is not
            // lost along with the ring buffer.
            for core in &mut self.cores {
                if let Err(io_err) = core.trace.flush() {
                    tracing::warn!("failed to flush core {} trace on fatal error: {io_err}", core.core_id);
                }
            }
            return Err(err);
        }

        let mut stats = SimStats::new(num_cores);
        stats.cores = self.cores.iter().map(|c| c.stats.clone()).collect();
        stats.uncore_cycles = self.uncore.lock().unwrap_or_else(PoisonError::into_inner).cycle();
        stats.llc_hits = outcome.llc_hits;
        stats.llc_misses = outcome.llc_misses;
        Ok(stats)
    }
}

#[allow(clippy::too_many_arguments)]
fn run_core(
    core: &mut Core,
    rendezvous: &Rendezvous,
    uncore: &Arc<Mutex<Uncore>>,
    feeder: &Arc<Mutex<Box<dyn Feeder>>>,
    system: &SystemConfig,
    max_cycles: Option<u64>,
    stop: &AtomicBool,
    outcome: &Mutex<SharedOutcome>,
) {
    loop {
        let active = feeder.lock().unwrap_or_else(PoisonError::into_inner).is_core_active(core.core_id);
        if core.halted || !active || stop.load(Ordering::Acquire) {
            rendezvous.leave();
            return;
        }

        core.tick();
        core.stats.cycles = core.cycle;

        if let Some(fault) = core.fault.take() {
            let mut out = outcome.lock().unwrap_or_else(PoisonError::into_inner);
            out.fatal.get_or_insert(fault);
            drop(out);
            stop.store(true, Ordering::Release);
        }

        if core.cfg.commit.deadlock_threshold > 0 && core.cycles_since_commit >= core.cfg.commit.deadlock_threshold {
            let mut out = outcome.lock().unwrap_or_else(PoisonError::into_inner);
            out.fatal.get_or_insert(SimError::Deadlock { core_id: core.core_id, cycles: core.cycles_since_commit });
            drop(out);
            stop.store(true, Ordering::Release);
        }

        if core.halted {
            feeder.lock().unwrap_or_else(PoisonError::into_inner).deactivate_core(core.core_id);
        }

        let is_master = rendezvous.arrive_and_wait(core.core_id);
        if is_master {
            let results = uncore.lock().unwrap_or_else(PoisonError::into_inner).tick();
            let mut out = outcome.lock().unwrap_or_else(PoisonError::into_inner);
            for (_, result) in results {
                match result {
                    AccessOutcome::Hit => out.llc_hits += 1,
                    AccessOutcome::Miss | AccessOutcome::Blocked => out.llc_misses += 1,
                }
            }
            drop(out);

            let cycle = uncore.lock().unwrap_or_else(PoisonError::into_inner).cycle();
            if system.heartbeat_frequency > 0 && cycle % system.heartbeat_frequency == 0 {
                eprintln!("heartbeat: uncore_cycle={cycle}");
            }
            if max_cycles.is_some_and(|limit| cycle >= limit) {
                stop.store(true, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeder::TraceFeeder;

    fn hs(pc: u64) -> Handshake {
        Handshake { pc, bytes: vec![0x90], arch_regs: Vec::new(), speculative: false }
    }

    #[test]
    fn single_core_run_drains_and_commits() {
        let config = Config::default();
        let feeder = Box::new(TraceFeeder::from_handshakes(vec![hs(0x1000), hs(0x1001), hs(0x1002)])) as Box<dyn Feeder>;
        let sim = Simulator::new(config, feeder).unwrap();
        let stats = sim.run(Some(10_000)).unwrap();
        assert!(stats.total_mops_committed() >= 3);
    }

    #[test]
    fn two_core_run_commits_on_both() {
        let mut config = Config::default();
        config.system.num_cores = 2;
        config.normalize();
        let feeder = Box::new(TraceFeeder::from_per_core(vec![
            vec![hs(0x1000), hs(0x1001)],
            vec![hs(0x2000), hs(0x2001)],
        ])) as Box<dyn Feeder>;
        let sim = Simulator::new(config, feeder).unwrap();
        let stats = sim.run(Some(10_000)).unwrap();
        assert!(stats.cores[0].mops_committed >= 2);
        assert!(stats.cores[1].mops_committed >= 2);
    }

    #[test]
    fn max_cycles_bounds_the_run() {
        let config = Config::default();
        let handshakes: Vec<Handshake> = (0..10_000).map(|i| hs(0x1000 + i)).collect();
        let feeder = Box::new(TraceFeeder::from_handshakes(handshakes)) as Box<dyn Feeder>;
        let sim = Simulator::new(config, feeder).unwrap();
        let stats = sim.run(Some(5)).unwrap();
        assert!(stats.uncore_cycles <= 6);
    }
}
