//! Decode stage (§4.2): pipeline-latches a cracked Mop's uops toward
//! alloc.
//!
//! Cracking itself already happened in the oracle (§3's execution-driven
//! front end decodes once, at fetch time); this stage only models the
//! decode pipeline's latency and per-cycle throughput before a Mop's
//! uops become visible to alloc.

use super::Core;

/// Runs one cycle of decode.
pub fn step(core: &mut Core) {
    let width = core.cfg.decode.width;
    let mut decoded = 0usize;

    while decoded < width {
        let Some(mop_slot) = core.fetch_latch.pop_ready(core.cycle) else {
            break;
        };
        let num_uops = core.mops[mop_slot as usize]
            .as_ref()
            .map_or(0, |m| m.uops.len());
        let ready_cycle = core.cycle + u64::from(core.cfg.decode.depth);
        for uop_idx in 0..num_uops {
            core.decode_latch.push(ready_cycle, (mop_slot, uop_idx as u32));
        }
        if num_uops == 0 {
            // A Mop with an empty uop flow (shouldn't happen once the
            // oracle always emits at least a NOP) still needs to reach
            // alloc so it can be freed; push a sentinel uop index.
            core.decode_latch.push(ready_cycle, (mop_slot, 0));
        }
        decoded += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::action_id::ActionId;
    use crate::config::CoreConfig;
    use crate::decoder_iface::{TableCracker, TableDecoder};
    use crate::feeder::TraceFeeder;
    use crate::model::mop::Mop;
    use crate::model::uop::Uop;
    use crate::oracle::Oracle;
    use crate::predictor::StaticNotTakenPredictor;

    fn test_core() -> Core {
        let oracle = Oracle::new(
            0,
            Box::new(TraceFeeder::from_handshakes(vec![])) as Box<dyn crate::feeder::Feeder>,
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
    fn decode_expands_mop_into_per_uop_entries() {
        let mut core = test_core();
        let pred_handle = crate::predictor::PredictionHandle { index: 0, action_id: ActionId::FIRST };
        let mut mop = Mop::new(0x1000, 0x1003, 0x1003, false, ActionId::FIRST, 0, pred_handle);
        mop.uops.push(Uop::new(ActionId::FIRST));
        mop.uops.push(Uop::new(ActionId::FIRST));
        let slot = core.alloc_mop_slot(mop);
        core.fetch_latch.push(core.cycle, slot);
        step(&mut core);
        assert_eq!(core.decode_latch.len(), 2);
    }
}
