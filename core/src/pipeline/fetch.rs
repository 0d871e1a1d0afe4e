//! Fetch stage (§4.1, §4.6): drives the oracle and the instruction cache.
//!
//! Fetch decouples from the rest of the pipeline through
//! [`super::Latch`]: a Mop pulled from the oracle this cycle becomes
//! visible to decode only once `fetch.depth` cycles have passed, and
//! only if fetch is not sitting in a post-misprediction bubble.

use crate::model::cache_request::{CacheAction, CacheOp};

use super::Core;

/// Runs one cycle of fetch.
pub fn step(core: &mut Core) {
    drain_il1(core);

    if core.halted {
        return;
    }
    if let Some(resume) = core.jeclear_resume_cycle {
        if core.cycle < resume {
            core.stats.stalls_fetch += 1;
            return;
        }
        core.jeclear_resume_cycle = None;
    }

    let width = core.cfg.fetch.width;
    let branch_limit = core.cfg.fetch.branch_limit;
    let mut fetched = 0usize;
    let mut taken_branches = 0usize;

    while fetched < width {
        if !core.oracle.has_pending() && core.oracle.buffer_handshake().is_err() {
            break;
        }
        let Some(peeked) = core.oracle.peek() else {
            break;
        };
        if peeked.predicted_taken() && taken_branches >= branch_limit {
            // Leave it buffered; fetch will pick it up next cycle once
            // the branch-limit window resets.
            break;
        }
        let taken = peeked.predicted_taken();
        let Some(mop) = core.oracle.consume() else {
            core.fault = Some(crate::common::SimError::InvariantViolation {
                cycle: core.cycle,
                message: "oracle.consume() returned None immediately after a successful peek".to_owned(),
            });
            return;
        };
        if taken {
            taken_branches += 1;
        }

        core.il1.issue(
            CacheAction::anonymous(core.core_id, CacheOp::Read, mop.pc, core.cycle),
            core.cycle,
        );

        let slot = core.alloc_mop_slot(mop);
        let ready_cycle = core.cycle + u64::from(core.cfg.fetch.depth);
        core.fetch_latch.push(ready_cycle, slot);
        fetched += 1;
    }

    if fetched == 0 {
        core.stats.stalls_fetch += 1;
    }
    if !core.oracle.can_exec() && core.rob.is_empty() && core.fetch_latch.is_empty() && core.decode_latch.is_empty() {
        core.halted = true;
    }
}

fn drain_il1(core: &mut Core) {
    for (_, outcome) in core.il1.drain_pipes(core.cycle) {
        match outcome {
            crate::cache::AccessOutcome::Hit => core.stats.il1_hits += 1,
            crate::cache::AccessOutcome::Miss | crate::cache::AccessOutcome::Blocked => core.stats.il1_misses += 1,
        }
    }
    core.stats.mshr_coalesces += core.il1.take_coalesced_misses();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::decoder_iface::{TableCracker, TableDecoder};
    use crate::feeder::{Handshake, TraceFeeder};
    use crate::oracle::Oracle;
    use crate::predictor::StaticNotTakenPredictor;

    fn hs(pc: u64) -> Handshake {
        Handshake {
            pc,
            bytes: vec![0x90],
            arch_regs: Vec::new(),
            speculative: false,
        }
    }

    fn test_core(handshakes: Vec<Handshake>) -> Core {
        let oracle = Oracle::new(
            0,
            Box::new(TraceFeeder::from_handshakes(handshakes)) as Box<dyn crate::feeder::Feeder>,
            Box::new(TableDecoder) as Box<dyn crate::decoder_iface::Decoder>,
            Box::new(TableCracker) as Box<dyn crate::decoder_iface::UopCracker>,
            Box::new(StaticNotTakenPredictor::new()) as Box<dyn crate::predictor::Predictor>,
            8,
        );
        let uncore = std::sync::Arc::new(std::sync::Mutex::new(
            crate::uncore::Uncore::new(&crate::config::UncoreConfig::default()).unwrap(),
        ));
        Core::new(0, CoreConfig::default(), oracle, 0x1000, uncore).unwrap()
    }

    #[test]
    fn fetch_pulls_mops_into_latch() {
        let mut core = test_core(vec![hs(0x1000), hs(0x1001)]);
        step(&mut core);
        assert_eq!(core.fetch_latch.len(), 2);
    }

    #[test]
    fn fetch_halts_once_stream_and_pipeline_drain() {
        let mut core = test_core(vec![]);
        step(&mut core);
        assert!(core.halted);
    }
}
