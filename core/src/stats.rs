//! Simulation statistics collection and reporting (§6, §7).
//!
//! Tracks what the testable scenarios in §8 and the error-handling
//! design in §7 name directly (`num_jeclear`, `emergency_recoveries`,
//! MSHR coalescing counts) alongside the usual IPC/cache/stall metrics.

use std::time::Instant;

/// Per-core statistics.
#[derive(Debug, Clone)]
pub struct CoreStats {
    /// Cycles this core has run.
    pub cycles: u64,
    /// Mops committed.
    pub mops_committed: u64,
    /// uops committed.
    pub uops_committed: u64,

    /// Branch mispredictions resolved at execute (`jeclear` events).
    pub num_jeclear: u64,
    /// Nukes (load/store ordering violation replays).
    pub num_nuke: u64,
    /// Silent emergency-recovery pipeline flushes.
    pub emergency_recoveries: u64,
    /// Unknown-opcode instructions downgraded to a NOP with a warning.
    pub unknown_opcode_nops: u64,

    /// L1 instruction-cache hits/misses.
    pub il1_hits: u64,
    /// See `il1_hits`.
    pub il1_misses: u64,
    /// L1 data-cache hits/misses.
    pub dl1_hits: u64,
    /// See `dl1_hits`.
    pub dl1_misses: u64,
    /// L2 data-cache hits/misses.
    pub dl2_hits: u64,
    /// See `dl2_hits`.
    pub dl2_misses: u64,

    /// MSHR requests that coalesced onto an already-outstanding entry.
    pub mshr_coalesces: u64,
    /// Loads satisfied by store-to-load forwarding instead of a cache
    /// access (§4.4 item 4).
    pub store_to_load_forwards: u64,

    /// Cycles fetch stalled (IQ full, byte queue empty, bogus path).
    pub stalls_fetch: u64,
    /// Cycles alloc stalled (ROB/RS/LDQ/STQ full).
    pub stalls_alloc: u64,
}

impl Default for CoreStats {
    fn default() -> Self {
        Self {
            cycles: 0,
            mops_committed: 0,
            uops_committed: 0,
            num_jeclear: 0,
            num_nuke: 0,
            emergency_recoveries: 0,
            unknown_opcode_nops: 0,
            il1_hits: 0,
            il1_misses: 0,
            dl1_hits: 0,
            dl1_misses: 0,
            dl2_hits: 0,
            dl2_misses: 0,
            mshr_coalesces: 0,
            store_to_load_forwards: 0,
            stalls_fetch: 0,
            stalls_alloc: 0,
        }
    }
}

impl CoreStats {
    /// Instructions-per-cycle, protected against a zero cycle count.
    #[must_use]
    pub fn ipc(&self) -> f64 {
        let cyc = self.cycles.max(1);
        self.mops_committed as f64 / cyc as f64
    }
}

/// Whole-simulation statistics: per-core stats plus uncore/system totals.
#[derive(Debug, Clone)]
pub struct SimStats {
    start_time: Instant,
    /// Uncore (shared) cycle count at run end.
    pub uncore_cycles: u64,
    /// Per-core statistics, indexed by core id.
    pub cores: Vec<CoreStats>,
    /// LLC hits/misses (shared across cores).
    pub llc_hits: u64,
    /// See `llc_hits`.
    pub llc_misses: u64,
}

impl SimStats {
    /// Creates stats for a simulation with `num_cores` cores.
    #[must_use]
    pub fn new(num_cores: usize) -> Self {
        Self {
            start_time: Instant::now(),
            uncore_cycles: 0,
            cores: vec![CoreStats::default(); num_cores],
            llc_hits: 0,
            llc_misses: 0,
        }
    }

    /// Total Mops committed across all cores.
    #[must_use]
    pub fn total_mops_committed(&self) -> u64 {
        self.cores.iter().map(|c| c.mops_committed).sum()
    }

    /// Prints a human-readable report to stdout.
    pub fn print_report(&self) {
        let seconds = self.start_time.elapsed().as_secs_f64();
        let cyc = self.uncore_cycles.max(1);
        let total_insts = self.total_mops_committed().max(1);
        let mips = (total_insts as f64 / seconds.max(f64::EPSILON)) / 1_000_000.0;

        println!("==========================================================");
        println!("X86 OOO SIMULATION STATISTICS");
        println!("==========================================================");
        println!("host_seconds             {seconds:.4} s");
        println!("uncore_cycles            {}", self.uncore_cycles);
        println!("sim_insts                {}", self.total_mops_committed());
        println!("sim_mips                 {mips:.2}");
        println!("----------------------------------------------------------");
        for (i, core) in self.cores.iter().enumerate() {
            println!("core[{i}]");
            println!("  cycles                 {}", core.cycles);
            println!("  mops_committed         {}", core.mops_committed);
            println!("  ipc                    {:.4}", core.ipc());
            println!("  num_jeclear            {}", core.num_jeclear);
            println!("  num_nuke               {}", core.num_nuke);
            println!("  emergency_recoveries   {}", core.emergency_recoveries);
            println!("  store_to_load_forwards {}", core.store_to_load_forwards);
            println!(
                "  dl1                    {} hits / {} misses",
                core.dl1_hits, core.dl1_misses
            );
        }
        println!("----------------------------------------------------------");
        println!(
            "llc                      {} hits / {} misses",
            self.llc_hits, self.llc_misses
        );
        let _ = cyc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_is_zero_with_no_cycles_elapsed() {
        let stats = CoreStats::default();
        assert_eq!(stats.ipc(), 0.0);
    }

    #[test]
    fn total_mops_committed_sums_all_cores() {
        let mut stats = SimStats::new(2);
        stats.cores[0].mops_committed = 3;
        stats.cores[1].mops_committed = 5;
        assert_eq!(stats.total_mops_committed(), 8);
    }
}
