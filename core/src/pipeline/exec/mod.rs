//! Execute stage (§4.4, §4.6): functional-unit scheduling, memory
//! access, and uop completion/broadcast.

/// Port-binding and per-class latency/issue-rate timing.
pub mod functional_units;
/// Memory-dependence prediction boundary.
pub mod memdep;

use std::cmp::Reverse;

use crate::model::cache_request::{CacheAction, CacheCallback, CacheOp};

use super::{pack_handle, unpack_handle, Core};
use memdep::SpeculativeLoad;

/// Runs one cycle of execute: drains completions from the prior cycle,
/// then tries to issue every ready RS entry.
pub fn step(core: &mut Core) {
    drain_completions(core);
    drain_data_caches(core);
    issue_ready(core);
}

// The slot this reuses for `uop_mut` was read as `Some` a few lines above
// in this same iteration of the loop, with nothing in between able to
// free it.
#[allow(clippy::expect_used)]
fn issue_ready(core: &mut Core) {
    let mut still_waiting = Vec::with_capacity(core.rs.len());
    let entries = std::mem::take(&mut core.rs);
    for handle in entries {
        let (mop_slot, uop_idx) = unpack_handle(handle);
        let Some(mop) = core.mops[mop_slot as usize].as_ref() else {
            continue;
        };
        let uop = &mop.uops[uop_idx as usize];
        if uop.ts.issued.is_some() {
            continue;
        }
        if !uop.inputs_ready() {
            still_waiting.push(handle);
            continue;
        }

        let mut bypass_record = None;
        if uop.is_load {
            if let Some(vaddr) = uop.vaddr {
                if find_forwarding_value(core, vaddr).is_none() {
                    let unresolved = older_unresolved_store_handles(core, handle);
                    if !unresolved.is_empty() {
                        let load_pc = mop.pc;
                        if !core.mdp.may_bypass(load_pc) {
                            still_waiting.push(handle);
                            continue;
                        }
                        bypass_record = Some((load_pc, unresolved, vaddr));
                    }
                }
            }
        }

        let is_load = uop.is_load;
        let fu_class = uop.fu_class;
        let Some(completion) = core.exec_units.try_issue(fu_class, core.cycle) else {
            still_waiting.push(handle);
            continue;
        };

        let uop_mut = &mut core.mops[mop_slot as usize].as_mut().expect("live slot").uops[uop_idx as usize];
        uop_mut.ts.issued = Some(core.cycle);
        uop_mut.ts.exec = Some(core.cycle);
        issue_memory_access(core, mop_slot, uop_idx);
        if !is_load {
            // A load's completion is driven by the cache/forwarding path
            // in `issue_memory_access`, not a fixed functional-unit
            // latency; every other uop completes after `completion`.
            core.fu_completions.push(Reverse((completion, handle)));
        }
        if let Some((load_pc, outstanding_stores, vaddr)) = bypass_record {
            core.speculative_loads.push(SpeculativeLoad {
                vaddr,
                pc: load_pc,
                load_handle: handle,
                outstanding_stores,
            });
        }
    }
    core.rs = still_waiting;
}

/// Packed handles of every older, address-unresolved store between the
/// ROB front and `load_handle`. Walks the ROB (full program order)
/// rather than the STQ alone, since the STQ's allocation order matches
/// program order but carries no direct way to compare positions against
/// a load, which never enters it. "Unresolved" means the STA has not yet
/// completed: under the execution-driven oracle a store's `vaddr` is
/// already known at decode time from the register snapshot, so it is
/// `ts.completed`, not `vaddr`, that marks the point the rest of the
/// pipeline can see the address.
fn older_unresolved_store_handles(core: &Core, load_handle: u32) -> Vec<u32> {
    let mut handles = Vec::new();
    for &h in &core.rob {
        if h == load_handle {
            break;
        }
        let (slot, idx) = unpack_handle(h);
        if let Some(mop) = core.mops[slot as usize].as_ref() {
            let uop = &mop.uops[idx as usize];
            if uop.is_sta && uop.ts.completed.is_none() {
                handles.push(h);
            }
        }
    }
    handles
}

/// Scans the store queue, oldest first, for the most recent store whose
/// resolved address matches `load_vaddr` and whose value is already
/// known, so the load can be satisfied directly (§4.4 item 4) instead of
/// waiting on the store to reach the data cache.
fn find_forwarding_value(core: &Core, load_vaddr: u64) -> Option<u64> {
    let mut found = None;
    for &h in &core.stq {
        let (slot, idx) = unpack_handle(h);
        let Some(mop) = core.mops[slot as usize].as_ref() else {
            continue;
        };
        let uop = &mop.uops[idx as usize];
        if !uop.is_std || idx == 0 {
            continue;
        }
        let sta = &mop.uops[idx as usize - 1];
        if let (Some(sta_vaddr), Some(value)) = (sta.vaddr, uop.store_value) {
            if sta_vaddr == load_vaddr {
                found = Some(value);
            }
        }
    }
    found
}

fn issue_memory_access(core: &mut Core, mop_slot: u32, uop_idx: u32) {
    let Some(mop) = core.mops[mop_slot as usize].as_ref() else {
        return;
    };
    let uop = &mop.uops[uop_idx as usize];
    if uop.is_load {
        let Some(vaddr) = uop.vaddr else {
            return;
        };
        let mop_action_id = mop.action_id;
        if find_forwarding_value(core, vaddr).is_some() {
            core.stats.store_to_load_forwards += 1;
            complete(core, pack_handle(mop_slot, uop_idx), core.cycle);
            return;
        }
        let handle = crate::common::action_id::Handle { slot: pack_handle(mop_slot, uop_idx), action_id: mop_action_id };
        core.dl1.issue(
            CacheAction::demand(core.core_id, CacheOp::Read, vaddr, CacheCallback::FillLoad(handle), mop_action_id, core.cycle),
            core.cycle,
        );
    } else if uop.is_std {
        // The paired STA (by convention the preceding uop in the flow)
        // carries the computed address; the STD carries the value.
        if uop_idx > 0 {
            let sta = &mop.uops[uop_idx as usize - 1];
            if let (Some(vaddr), Some(value)) = (sta.vaddr, uop.store_value) {
                core.oracle.exec(vaddr, value as u8, pack_handle(mop_slot, uop_idx));
                core.dl1.issue(
                    CacheAction::anonymous(core.core_id, CacheOp::Write, vaddr, core.cycle),
                    core.cycle,
                );
            }
        }
    }
}

/// Drains the dl1/dl2/uncore memory hierarchy by one level each: an L1
/// hit or a completion claimed back from the uncore fires the waiting
/// load's callback directly; an L1 or L2 miss is forwarded one level
/// down, carrying the same [`CacheAction`] (and so the same callback)
/// all the way to DRAM if needed (§4.6, §4.4 item 3).
fn drain_data_caches(core: &mut Core) {
    let dl1_results = core.dl1.drain_pipes(core.cycle);
    for (action, outcome) in dl1_results {
        match outcome {
            crate::cache::AccessOutcome::Hit => {
                core.stats.dl1_hits += 1;
                deliver_cache_action(core, action);
            }
            crate::cache::AccessOutcome::Miss => {
                core.stats.dl1_misses += 1;
                core.dl2.issue(action, core.cycle);
            }
            crate::cache::AccessOutcome::Blocked => {
                core.stats.dl1_misses += 1;
                core.dl1.issue(action, core.cycle);
            }
        }
    }

    let dl2_results = core.dl2.drain_pipes(core.cycle);
    for (action, outcome) in dl2_results {
        match outcome {
            crate::cache::AccessOutcome::Hit => {
                core.stats.dl2_hits += 1;
                let _ = core.dl1.install_fill(action.paddr, Some(action.origin_core), false);
                deliver_cache_action(core, action);
            }
            crate::cache::AccessOutcome::Miss => {
                core.stats.dl2_misses += 1;
                core.uncore.lock().unwrap_or_else(std::sync::PoisonError::into_inner).issue_llc(action);
            }
            crate::cache::AccessOutcome::Blocked => {
                core.stats.dl2_misses += 1;
                core.dl2.issue(action, core.cycle);
            }
        }
    }

    core.stats.mshr_coalesces += core.dl1.take_coalesced_misses();
    core.stats.mshr_coalesces += core.dl2.take_coalesced_misses();

    let completions = core.uncore.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take_completions(core.core_id);
    for action in completions {
        let _ = core.dl2.install_fill(action.paddr, Some(action.origin_core), false);
        let _ = core.dl1.install_fill(action.paddr, Some(action.origin_core), false);
        deliver_cache_action(core, action);
    }
}

/// Routes a resolved cache action back to its requester, if any, dropping
/// it silently if the requester's Mop slot has since been reused or the
/// Mop arena itself shrank out from under it (a stale completion behind
/// a nuke or emergency-recovery flush, which do not drain in-flight
/// cache/uncore traffic before clearing Mop state).
fn deliver_cache_action(core: &mut Core, action: CacheAction) {
    let CacheCallback::FillLoad(handle) = action.callback else {
        return;
    };
    let (mop_slot, _) = unpack_handle(handle.slot);
    let Some(Some(mop)) = core.mops.get(mop_slot as usize) else {
        return;
    };
    if action.is_stale(mop.action_id) {
        return;
    }
    complete(core, handle.slot, core.cycle);
}

fn drain_completions(core: &mut Core) {
    while let Some(&Reverse((cycle, handle))) = core.fu_completions.peek() {
        if cycle > core.cycle {
            break;
        }
        core.fu_completions.pop();
        complete(core, handle, cycle);
    }
}

fn complete(core: &mut Core, handle: u32, cycle: u64) {
    let (mop_slot, uop_idx) = unpack_handle(handle);
    let Some(Some(mop)) = core.mops.get_mut(mop_slot as usize) else {
        return;
    };
    let Some(uop) = mop.uops.get_mut(uop_idx as usize) else {
        return;
    };
    if uop.ts.completed.is_some() {
        return;
    }
    uop.ts.completed = Some(cycle);
    let is_sta = uop.is_sta;
    let sta_vaddr = uop.vaddr;
    mop.num_completed += 1;
    let sta_pc = mop.pc;
    let odep_head = mop.uops[uop_idx as usize].odep_head;

    for node in core.odep_arena.iter(odep_head) {
        let (c_slot, c_idx) = unpack_handle(node.consumer.slot);
        if let Some(Some(c_mop)) = core.mops.get_mut(c_slot as usize) {
            if c_mop.action_id == node.consumer.action_id {
                if let Some(c_uop) = c_mop.uops.get_mut(c_idx as usize) {
                    c_uop.ivalue_valid[node.input_slot as usize] = true;
                }
            }
        }
    }

    if is_sta {
        if let Some(resume_pc) = resolve_memory_order_violations(core, handle, sta_vaddr, sta_pc) {
            core.nuke(resume_pc);
        }
    }
}

/// Checks a just-completed store's address against every load that
/// bypassed it speculatively (§4.1/§4.4), firing a nuke on the first
/// address match found and otherwise pruning this store from each
/// tracked load's outstanding list, dropping loads with none left (they
/// are now known to have bypassed correctly).
fn resolve_memory_order_violations(core: &mut Core, store_handle: u32, store_vaddr: Option<u64>, store_pc: u64) -> Option<u64> {
    let mut violation = None;
    let mut survivors = Vec::with_capacity(core.speculative_loads.len());
    for mut load in std::mem::take(&mut core.speculative_loads) {
        load.outstanding_stores.retain(|&h| h != store_handle);
        if violation.is_none() && store_vaddr == Some(load.vaddr) {
            violation = Some((load.pc, store_pc));
            continue;
        }
        if !load.outstanding_stores.is_empty() {
            survivors.push(load);
        }
    }
    core.speculative_loads = survivors;
    let (load_pc, st_pc) = violation?;
    core.mdp.record_violation(load_pc, st_pc);
    Some(load_pc)
}

/// Called by alloc when wiring a consumer whose producer has already
/// completed: no broadcast will arrive later, so the dependency is
/// resolved immediately instead of linked into the producer's odep list.
#[must_use]
pub fn producer_already_complete(core: &Core, producer_handle: crate::common::action_id::Handle) -> bool {
    let (slot, idx) = unpack_handle(producer_handle.slot);
    core.mops[slot as usize]
        .as_ref()
        .is_some_and(|m| m.action_id == producer_handle.action_id && m.uops[idx as usize].ts.completed.is_some())
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
    use crate::predictor::{PredictionHandle, StaticNotTakenPredictor};

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

    fn push_mop_with_uop(core: &mut Core, uop: Uop) -> u32 {
        let pred_handle = PredictionHandle { index: 0, action_id: ActionId::FIRST };
        let mut mop = Mop::new(0x1000, 0x1003, 0x1003, false, ActionId::FIRST, 0, pred_handle);
        mop.uops.push(uop);
        let slot = core.alloc_mop_slot(mop);
        core.rob.push_back(pack_handle(slot, 0));
        core.rs.push(pack_handle(slot, 0));
        slot
    }

    #[test]
    fn ready_uop_issues_and_completes() {
        let mut core = test_core();
        push_mop_with_uop(&mut core, Uop::new(ActionId::FIRST));
        step(&mut core);
        assert!(core.rs.is_empty());
        assert_eq!(core.fu_completions.len(), 1);
    }

    #[test]
    fn load_stalls_behind_older_unresolved_store_address() {
        let mut core = test_core();
        let mut sta = Uop::new(ActionId::FIRST);
        sta.is_sta = true;
        push_mop_with_uop(&mut core, sta);

        let mut load = Uop::new(ActionId::FIRST);
        load.is_load = true;
        load.vaddr = Some(0x2000);
        push_mop_with_uop(&mut core, load);

        step(&mut core);
        // The load's handle should still be waiting; only the STA (which
        // has no memory-ordering gate of its own) may have issued.
        assert_eq!(core.rs.len(), 1);
    }

    #[test]
    fn store_to_load_forwarding_satisfies_same_address_load() {
        let mut core = test_core();

        let pred_handle = PredictionHandle { index: 0, action_id: ActionId::FIRST };
        let mut store_mop = Mop::new(0x1000, 0x1003, 0x1003, false, ActionId::FIRST, 0, pred_handle);
        let mut sta = Uop::new(ActionId::FIRST);
        sta.is_sta = true;
        sta.vaddr = Some(0x3000);
        sta.ts.completed = Some(0);
        let mut std_uop = Uop::new(ActionId::FIRST);
        std_uop.is_std = true;
        std_uop.store_value = Some(7);
        store_mop.uops.push(sta);
        store_mop.uops.push(std_uop);
        let store_slot = core.alloc_mop_slot(store_mop);
        core.stq.push_back(pack_handle(store_slot, 0));
        core.stq.push_back(pack_handle(store_slot, 1));

        let mut load = Uop::new(ActionId::FIRST);
        load.is_load = true;
        load.vaddr = Some(0x3000);
        push_mop_with_uop(&mut core, load);

        step(&mut core);

        assert!(core.rs.is_empty());
        assert_eq!(core.stats.store_to_load_forwards, 1);
    }

    fn test_core_with_always_bypass() -> Core {
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
        let mut cfg = CoreConfig::default();
        cfg.exec.mdp_spec = "always".to_owned();
        Core::new(0, cfg, oracle, 0x1000, uncore).unwrap()
    }

    #[test]
    fn load_bypassing_store_that_resolves_to_same_address_triggers_nuke() {
        let mut core = test_core_with_always_bypass();

        let mut sta = Uop::new(ActionId::FIRST);
        sta.is_sta = true;
        sta.vaddr = Some(0x4000);
        push_mop_with_uop(&mut core, sta);

        let mut load = Uop::new(ActionId::FIRST);
        load.is_load = true;
        load.vaddr = Some(0x4000);
        push_mop_with_uop(&mut core, load);

        for _ in 0..8 {
            step(&mut core);
            if core.stats.num_nuke > 0 {
                break;
            }
        }

        assert_eq!(core.stats.num_nuke, 1);
        assert!(core.speculative_loads.is_empty());
    }

    #[test]
    fn producer_already_complete_true_once_completed_timestamp_set() {
        let mut core = test_core();
        let mut uop = Uop::new(ActionId::FIRST);
        uop.ts.completed = Some(0);
        let slot = core.alloc_mop_slot({
            let pred_handle = PredictionHandle { index: 0, action_id: ActionId::FIRST };
            let mut mop = Mop::new(0x1000, 0x1003, 0x1003, false, ActionId::FIRST, 0, pred_handle);
            mop.uops.push(uop);
            mop
        });
        let handle = crate::common::action_id::Handle { slot: pack_handle(slot, 0), action_id: ActionId::FIRST };
        assert!(producer_already_complete(&core, handle));
    }
}
