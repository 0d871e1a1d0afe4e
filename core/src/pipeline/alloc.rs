//! Alloc/rename stage (§4.3, §3): ROB/RS/LDQ/STQ allocation and
//! dataflow wiring.
//!
//! This is where [`crate::model::uop::UopHandle`]s first become
//! meaningful: a uop has no ROB slot before this stage runs, so there is
//! nothing yet for a consumer to rename against. Allocation order here
//! fixes [`crate::model::dep_map::DependencyMap`]'s head/tail chains for
//! every register this uop reads or writes.

use crate::model::uop::ArchReg;

use super::{pack_handle, unpack_handle, Core};

/// Runs one cycle of alloc.
pub fn step(core: &mut Core) {
    let width = core.cfg.alloc.width;
    let rob_size = core.cfg.commit.rob_size;
    let rs_size = core.cfg.exec.rs_size;
    let ldq_size = core.cfg.exec.ldq_size;
    let stq_size = core.cfg.exec.stq_size;

    let mut allocated = 0usize;
    while allocated < width {
        let Some(&(mop_slot, uop_idx)) = core.decode_latch.peek_ready(core.cycle) else {
            break;
        };

        let (is_load, is_sta_or_std) = core.mops[mop_slot as usize]
            .as_ref()
            .map(|m| {
                let u = &m.uops[uop_idx as usize];
                (u.is_load, u.is_sta || u.is_std)
            })
            .unwrap_or((false, false));

        if core.rob.len() >= rob_size
            || core.rs.len() >= rs_size
            || (is_load && core.ldq.len() >= ldq_size)
            || (is_sta_or_std && core.stq.len() >= stq_size)
        {
            core.stats.stalls_alloc += 1;
            break;
        }

        let Some((_, _)) = core.decode_latch.pop_ready(core.cycle) else {
            core.fault = Some(crate::common::SimError::InvariantViolation {
                cycle: core.cycle,
                message: "decode_latch.pop_ready returned None immediately after peek_ready confirmed readiness".to_owned(),
            });
            return;
        };
        let handle = pack_handle(mop_slot, uop_idx);
        // mop_slot was placed in the decode latch this or an earlier cycle
        // and cannot be freed before commit observes every uop of its Mop
        // retired, which cannot have happened yet for a uop still in decode.
        #[allow(clippy::expect_used)]
        let action_id = core.mops[mop_slot as usize].as_ref().expect("live slot").action_id;
        let consumer = crate::common::action_id::Handle { slot: handle, action_id };

        wire_inputs(core, mop_slot, uop_idx, consumer);
        wire_outputs(core, mop_slot, uop_idx, consumer);

        core.rob.push_back(handle);
        core.rs.push(handle);
        if is_load {
            core.ldq.push_back(handle);
        }
        if is_sta_or_std {
            core.stq.push_back(handle);
        }
        crate::sim_assert!(core, core.rob.len() <= rob_size, "rob grew to {} past configured capacity {rob_size}", core.rob.len());
        crate::sim_assert!(core, core.rs.len() <= rs_size, "rs grew to {} past configured capacity {rs_size}", core.rs.len());
        crate::sim_assert!(core, core.ldq.len() <= ldq_size, "ldq grew to {} past configured capacity {ldq_size}", core.ldq.len());
        crate::sim_assert!(core, core.stq.len() <= stq_size, "stq grew to {} past configured capacity {stq_size}", core.stq.len());

        #[allow(clippy::expect_used)]
        let uop = &mut core.mops[mop_slot as usize].as_mut().expect("live slot").uops[uop_idx as usize];
        uop.rob_index = Some((core.rob.len() - 1) as u32);
        uop.rs_index = Some((core.rs.len() - 1) as u32);
        uop.ts.allocated = Some(core.cycle);

        allocated += 1;
    }
}

// The four `.expect("live slot")` calls below all index `mop_slot`, which
// this same call (`wire_inputs`, from `step`) was just handed for a uop
// still sitting in the decode latch; its Mop cannot have been freed yet.
#[allow(clippy::expect_used)]
fn wire_inputs(core: &mut Core, mop_slot: u32, uop_idx: u32, consumer: crate::common::action_id::Handle) {
    let iregs = core.mops[mop_slot as usize].as_ref().expect("live slot").uops[uop_idx as usize].ireg;
    for (i, &reg) in iregs.iter().enumerate() {
        if !reg.is_present() {
            continue;
        }
        let producer = core.dep_map.lookup(reg);
        match producer {
            Some(producer_handle) if super::exec::producer_already_complete(core, producer_handle) => {
                // The producer already broadcast its result; no later
                // completion will arrive to satisfy a freshly linked edge.
                let uop = &mut core.mops[mop_slot as usize].as_mut().expect("live slot").uops[uop_idx as usize];
                uop.idep[i] = Some(producer_handle);
                uop.ivalue_valid[i] = true;
            }
            Some(producer_handle) => {
                link_consumer(core, producer_handle, consumer, i as u8);
                let uop = &mut core.mops[mop_slot as usize].as_mut().expect("live slot").uops[uop_idx as usize];
                uop.idep[i] = Some(producer_handle);
                uop.ivalue_valid[i] = false;
            }
            None => {
                let uop = &mut core.mops[mop_slot as usize].as_mut().expect("live slot").uops[uop_idx as usize];
                uop.idep[i] = None;
                uop.ivalue_valid[i] = true;
            }
        }
    }
}

fn link_consumer(core: &mut Core, producer: crate::common::action_id::Handle, consumer: crate::common::action_id::Handle, input_slot: u8) {
    let (producer_slot, producer_idx) = unpack_handle(producer.slot);
    let Some(mop) = core.mops[producer_slot as usize].as_mut() else {
        return;
    };
    if mop.action_id != producer.action_id {
        // Stale: the producer was squashed and its slot reused already.
        return;
    }
    let producer_uop = &mut mop.uops[producer_idx as usize];
    let new_head = core.odep_arena.push_front(producer_uop.odep_head, consumer, input_slot);
    producer_uop.odep_head = Some(new_head);
}

#[allow(clippy::expect_used)]
fn wire_outputs(core: &mut Core, mop_slot: u32, uop_idx: u32, producer: crate::common::action_id::Handle) {
    let oregs = core.mops[mop_slot as usize].as_ref().expect("live slot").uops[uop_idx as usize].oreg;
    for reg in oregs {
        if !reg.is_present() {
            continue;
        }
        core.dep_map.allocate(reg, producer);
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

    fn push_mop_with_uop(core: &mut Core, mut uop: Uop) -> u32 {
        let pred_handle = crate::predictor::PredictionHandle { index: 0, action_id: ActionId::FIRST };
        let mut mop = Mop::new(0x1000, 0x1003, 0x1003, false, ActionId::FIRST, 0, pred_handle);
        uop.action_id = ActionId::FIRST;
        mop.uops.push(uop);
        let slot = core.alloc_mop_slot(mop);
        core.decode_latch.push(core.cycle, (slot, 0));
        slot
    }

    #[test]
    fn alloc_assigns_rob_and_rs_slots() {
        let mut core = test_core();
        push_mop_with_uop(&mut core, Uop::new(ActionId::FIRST));
        step(&mut core);
        assert_eq!(core.rob.len(), 1);
        assert_eq!(core.rs.len(), 1);
    }

    #[test]
    fn second_producer_of_same_register_wires_consumer_dependency() {
        let mut core = test_core();
        let mut producer = Uop::new(ActionId::FIRST);
        producer.oreg[0] = ArchReg(1);
        push_mop_with_uop(&mut core, producer);
        step(&mut core);

        let mut consumer = Uop::new(ActionId::FIRST);
        consumer.ireg[0] = ArchReg(1);
        push_mop_with_uop(&mut core, consumer);
        step(&mut core);

        let (mop_slot, uop_idx) = unpack_handle(core.rob[1]);
        let uop = &core.mops[mop_slot as usize].as_ref().unwrap().uops[uop_idx as usize];
        assert!(uop.idep[0].is_some());
        assert!(!uop.ivalue_valid[0]);
    }

    #[test]
    fn full_rob_stalls_alloc() {
        let mut core = test_core();
        core.cfg.commit.rob_size = 1;
        push_mop_with_uop(&mut core, Uop::new(ActionId::FIRST));
        step(&mut core);
        push_mop_with_uop(&mut core, Uop::new(ActionId::FIRST));
        step(&mut core);
        assert_eq!(core.rob.len(), 1);
        assert_eq!(core.stats.stalls_alloc, 1);
    }
}
