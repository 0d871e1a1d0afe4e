//! The oracle (§3, §4.1): the execution-driven functional front end.
//!
//! This crate is *execution-driven*: rather than symbolically predicting
//! what a program will do, the oracle asks the external feeder for the
//! instruction that actually executed next, decodes and cracks it into a
//! dataflow-annotated [`Mop`], and maintains just enough of its own
//! functional state (a byte-addressable store and a shadow queue of
//! recently confirmed handshakes) that the timing pipeline can be
//! rewound and replayed after a nuke without re-querying the feeder,
//! which is itself one-directional and non-speculative.
//!
//! Concretely the oracle owns:
//! - The [`Feeder`] connection and a small pending-[`Mop`] queue fetch
//!   drains from.
//! - [`SpeculativeMemory`], the undo log backing store uops until they
//!   commit, plus a committed byte store standing in for architectural
//!   memory.
//! - A [`ShadowMopQueue`] of handshakes, so a nuke can replay the
//!   speculative instructions fetched since the last confirmed one
//!   instead of asking the feeder to repeat itself.
//! - The [`Decoder`]/[`UopCracker`]/[`Predictor`] external-collaborator
//!   boundaries, driven once per handshake to produce a fully formed Mop.

use std::collections::{HashMap, VecDeque};

use crate::common::action_id::ActionId;
use crate::decoder_iface::{DecodedInsn, Decoder, UopCracker, UopTemplate};
use crate::feeder::{Feeder, FeederStall, Handshake};
use crate::model::mop::Mop;
use crate::model::shadow_mopq::ShadowMopQueue;
use crate::model::spec_mem::SpeculativeMemory;
use crate::model::uop::{ArchReg, Uop};
use crate::predictor::Predictor;

fn reg_value(regs: &[(u16, u64)], reg: ArchReg) -> u64 {
    if !reg.is_present() {
        return 0;
    }
    regs.iter()
        .find(|(r, _)| *r == reg.0)
        .map_or(0, |(_, v)| *v)
}

fn effective_addr(insn: &DecodedInsn, regs: &[(u16, u64)]) -> Option<u64> {
    let mem = insn.mem_operand?;
    let base = reg_value(regs, mem.base);
    let index = reg_value(regs, mem.index);
    Some(base.wrapping_add(index.wrapping_mul(u64::from(mem.scale))).wrapping_add(mem.displacement as i64 as u64))
}

fn build_uop(template: &UopTemplate, insn: &DecodedInsn, regs: &[(u16, u64)], action_id: ActionId) -> Uop {
    let mut uop = Uop::new(action_id);
    uop.fu_class = template.fu_class;
    uop.is_load = template.is_load;
    uop.is_sta = template.is_sta;
    uop.is_std = template.is_std;
    uop.is_ctrl = template.is_ctrl;
    uop.is_fence = template.is_fence;
    uop.is_agen = template.is_agen;
    uop.is_nop = template.is_nop;
    uop.is_fpop = insn.is_fp;

    if template.is_sta {
        let mem = insn.mem_operand;
        uop.ireg[0] = mem.map_or(ArchReg::NONE, |m| m.base);
        uop.ireg[1] = mem.map_or(ArchReg::NONE, |m| m.index);
        uop.vaddr = effective_addr(insn, regs);
        uop.access_size = mem.map_or(0, |m| m.size);
    } else if template.is_std {
        uop.ireg[0] = insn.inputs.first().copied().unwrap_or(ArchReg::NONE);
        uop.store_value = Some(reg_value(regs, uop.ireg[0]));
    } else if template.is_load {
        let mem = insn.mem_operand;
        uop.ireg[0] = mem.map_or(ArchReg::NONE, |m| m.base);
        uop.ireg[1] = mem.map_or(ArchReg::NONE, |m| m.index);
        uop.oreg[0] = insn.outputs.first().copied().unwrap_or(ArchReg::NONE);
        uop.vaddr = effective_addr(insn, regs);
        uop.access_size = mem.map_or(0, |m| m.size);
    } else {
        for (i, &r) in insn.inputs.iter().take(3).enumerate() {
            uop.ireg[i] = r;
        }
        for (i, &r) in insn.outputs.iter().take(2).enumerate() {
            uop.oreg[i] = r;
        }
    }
    uop
}

/// Builds the Mop for one handshake, downgrading to a single-NOP Mop if
/// the decoder or cracker don't recognize the instruction (§7's
/// unknown-opcode fault policy).
fn build_mop<D: Decoder, C: UopCracker>(
    decoder: &D,
    cracker: &C,
    handshake: &Handshake,
    predicted_npc: u64,
    action_id: ActionId,
    fetch_watermark: u64,
    pred_handle: crate::predictor::PredictionHandle,
) -> (Mop, bool) {
    let insn = decoder.decode(&handshake.bytes);
    let flow = insn.as_ref().and_then(|insn| cracker.crack(insn));

    let length = insn.as_ref().map_or(1, |i| u64::from(i.length));
    let fallthrough = handshake.pc.wrapping_add(length);
    // `predicted_npc == handshake.pc` is the predictor's "use fallthrough"
    // sentinel (see `StaticNotTakenPredictor`); only a genuine taken
    // prediction differs from the fetch pc itself.
    let predicted_npc = if predicted_npc == handshake.pc { fallthrough } else { predicted_npc };
    let mut mop = Mop::new(handshake.pc, fallthrough, predicted_npc, handshake.speculative, action_id, fetch_watermark, pred_handle);

    match (insn, flow) {
        (Some(insn), Some(flow)) => {
            for template in &flow {
                mop.uops.push(build_uop(template, &insn, &handshake.arch_regs, action_id));
            }
            (mop, false)
        }
        _ => {
            mop.uops.push(Uop::new(action_id));
            mop.uops[0].is_nop = true;
            (mop, true)
        }
    }
}

/// The execution-driven functional front end.
pub struct Oracle<F, D, C, P>
where
    F: Feeder,
    D: Decoder,
    C: UopCracker,
    P: Predictor,
{
    core_id: usize,
    feeder: F,
    decoder: D,
    cracker: C,
    predictor: P,
    shadow: ShadowMopQueue<Handshake>,
    spec_mem: SpeculativeMemory,
    committed_mem: HashMap<u64, u8>,
    pending: VecDeque<Mop>,
    action_id: ActionId,
    unknown_opcode_count: u64,
    exhausted: bool,
}

impl<F, D, C, P> Oracle<F, D, C, P>
where
    F: Feeder,
    D: Decoder,
    C: UopCracker,
    P: Predictor,
{
    /// Creates an oracle for `core_id`, bounding its shadow queue to
    /// `shadow_capacity` confirmed handshakes.
    pub fn new(core_id: usize, feeder: F, decoder: D, cracker: C, predictor: P, shadow_capacity: usize) -> Self {
        Self {
            core_id,
            feeder,
            decoder,
            cracker,
            predictor,
            shadow: ShadowMopQueue::new(shadow_capacity),
            spec_mem: SpeculativeMemory::new(),
            committed_mem: HashMap::new(),
            pending: VecDeque::new(),
            action_id: ActionId::FIRST,
            unknown_opcode_count: 0,
            exhausted: false,
        }
    }

    /// True while this core's feeder may still have work: either it has
    /// not signaled end-of-stream, or built Mops are still waiting to be
    /// consumed.
    #[must_use]
    pub fn can_exec(&self) -> bool {
        !self.exhausted || !self.pending.is_empty()
    }

    /// Number of Mops downgraded to a NOP for an unrecognized opcode.
    #[must_use]
    pub fn unknown_opcode_count(&self) -> u64 {
        self.unknown_opcode_count
    }

    /// Pulls the next handshake from the feeder, decodes and cracks it
    /// into a dataflow-annotated [`Mop`], and enqueues it for fetch to
    /// [`Self::consume`].
    ///
    /// # Errors
    /// Returns the [`FeederStall`] the feeder reported; `EndOfStream`
    /// marks this oracle exhausted (see [`Self::can_exec`]).
    pub fn buffer_handshake(&mut self) -> Result<(), FeederStall> {
        let handshake = match self.feeder.next_handshake(self.core_id) {
            Ok(h) => h,
            Err(FeederStall::EndOfStream) => {
                self.exhausted = true;
                return Err(FeederStall::EndOfStream);
            }
            Err(stall) => return Err(stall),
        };

        let (predicted_npc, pred_handle) = self.predictor.predict(handshake.pc, self.action_id);
        let action_id = self.action_id;
        self.action_id = self.action_id.next();
        let fetch_watermark = self.spec_mem.watermark();

        let (mop, unknown) = build_mop(&self.decoder, &self.cracker, &handshake, predicted_npc, action_id, fetch_watermark, pred_handle);
        if unknown {
            self.unknown_opcode_count += 1;
        }

        if handshake.speculative {
            self.shadow.push_sibling(handshake);
        } else {
            self.shadow.push_confirmed(handshake);
        }
        self.pending.push_back(mop);
        Ok(())
    }

    /// Pops the next buffered Mop for the fetch stage.
    pub fn consume(&mut self) -> Option<Mop> {
        self.pending.pop_front()
    }

    /// Looks at the next buffered Mop without consuming it, so fetch can
    /// apply its per-cycle taken-branch limit before committing to it.
    #[must_use]
    pub fn peek(&self) -> Option<&Mop> {
        self.pending.front()
    }

    /// True if a Mop is currently buffered and ready for [`Self::consume`].
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Functionally executes a speculative store byte, recording it in
    /// the undo log rather than applying it directly. Returns the
    /// sequence number the commit/recovery path uses to identify it.
    pub fn exec(&mut self, vaddr: u64, value: u8, writer_slot: u32) -> u64 {
        self.spec_mem.write(vaddr, value, writer_slot)
    }

    /// Functionally reads one byte: the youngest speculative write if
    /// any, falling through to committed memory, defaulting to zero for
    /// never-written addresses.
    #[must_use]
    pub fn read_byte(&self, vaddr: u64) -> u8 {
        self.spec_mem
            .read(vaddr)
            .or_else(|| self.committed_mem.get(&vaddr).copied())
            .unwrap_or(0)
    }

    /// Commits the oldest pending speculative write at `vaddr` into
    /// committed memory. Called by the commit stage once the
    /// corresponding store uop retires.
    pub fn commit(&mut self, vaddr: u64) {
        if let Some(value) = self.spec_mem.commit_oldest(vaddr) {
            self.committed_mem.insert(vaddr, value);
        }
    }

    /// Feeds a resolved branch outcome back to the predictor. Called by
    /// commit once a predicted Mop retires.
    pub fn update_predictor(&mut self, handle: crate::predictor::PredictionHandle, outcome: crate::predictor::BranchOutcome) {
        self.predictor.update(handle, outcome);
    }

    /// Reverts a prediction made on a path now known to be wrong. Called
    /// by commit when squashing Mops younger than a mispredicted branch.
    pub fn revert_predictor(&mut self, handle: crate::predictor::PredictionHandle) {
        self.predictor.revert(handle);
    }

    /// The current speculative-memory watermark, captured before issuing
    /// a batch of speculative stores so they can later be unwound with
    /// [`Self::recover`].
    #[must_use]
    pub fn watermark(&self) -> u64 {
        self.spec_mem.watermark()
    }

    /// Unwinds speculative state after a nuke or pipeline flush: discards
    /// every speculative byte write at or after `recovery_seq`, drops
    /// every buffered Mop (fetch will re-request down the corrected
    /// path), and trims the shadow queue back to its `keep_confirmed`
    /// oldest confirmed entries.
    pub fn recover(&mut self, recovery_seq: u64, keep_confirmed: usize) {
        self.spec_mem.discard_from(recovery_seq);
        self.pending.clear();
        self.shadow.truncate_back(keep_confirmed);
    }

    /// Replays the speculative siblings retained in the shadow queue
    /// (the Mops fetched after the last confirmed handshake) by
    /// re-decoding and re-cracking them, without re-querying the feeder.
    /// Used to refill the pending queue after [`Self::recover`] when the
    /// redirected path still matches instructions already seen once.
    pub fn pipe_recover(&mut self) -> Vec<Mop> {
        let mut replayed = Vec::new();
        let handshakes: Vec<Handshake> = self
            .shadow
            .iter()
            .flat_map(|entry| std::iter::once(entry.handshake.clone()).chain(entry.siblings.iter().cloned()))
            .collect();
        for handshake in handshakes {
            let (predicted_npc, pred_handle) = self.predictor.predict(handshake.pc, self.action_id);
            let action_id = self.action_id;
            self.action_id = self.action_id.next();
            let fetch_watermark = self.spec_mem.watermark();
            let (mop, unknown) = build_mop(&self.decoder, &self.cracker, &handshake, predicted_npc, action_id, fetch_watermark, pred_handle);
            if unknown {
                self.unknown_opcode_count += 1;
            }
            replayed.push(mop);
        }
        replayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder_iface::TableCracker;
    use crate::decoder_iface::TableDecoder;
    use crate::feeder::TraceFeeder;
    use crate::predictor::StaticNotTakenPredictor;

    fn hs(pc: u64, bytes: Vec<u8>) -> Handshake {
        Handshake {
            pc,
            bytes,
            arch_regs: Vec::new(),
            speculative: false,
        }
    }

    fn oracle(handshakes: Vec<Handshake>) -> Oracle<TraceFeeder, TableDecoder, TableCracker, StaticNotTakenPredictor> {
        Oracle::new(
            0,
            TraceFeeder::from_handshakes(handshakes),
            TableDecoder,
            TableCracker,
            StaticNotTakenPredictor::new(),
            8,
        )
    }

    #[test]
    fn buffer_then_consume_yields_cracked_mop() {
        let mut oracle = oracle(vec![hs(0x1000, vec![0x01, 1, 2])]);
        oracle.buffer_handshake().unwrap();
        let mop = oracle.consume().unwrap();
        assert_eq!(mop.pc, 0x1000);
        assert_eq!(mop.uops.len(), 1);
    }

    #[test]
    fn unknown_opcode_downgrades_to_nop() {
        let mut oracle = oracle(vec![hs(0x1000, vec![0xFE])]);
        oracle.buffer_handshake().unwrap();
        let mop = oracle.consume().unwrap();
        assert!(mop.uops[0].is_nop);
        assert_eq!(oracle.unknown_opcode_count(), 1);
    }

    #[test]
    fn end_of_stream_marks_exhausted() {
        let mut oracle = oracle(vec![]);
        assert_eq!(oracle.buffer_handshake().unwrap_err(), FeederStall::EndOfStream);
        assert!(!oracle.can_exec());
    }

    #[test]
    fn store_then_commit_round_trips_through_committed_memory() {
        let mut oracle = oracle(vec![]);
        oracle.exec(0x200, 0x42, 0);
        assert_eq!(oracle.read_byte(0x200), 0x42);
        oracle.commit(0x200);
        assert_eq!(oracle.read_byte(0x200), 0x42);
    }

    #[test]
    fn recover_discards_writes_at_or_after_watermark() {
        let mut oracle = oracle(vec![]);
        oracle.exec(0x200, 1, 0);
        let mark = oracle.watermark();
        oracle.exec(0x200, 2, 0);
        oracle.recover(mark, 0);
        assert_eq!(oracle.read_byte(0x200), 1);
    }
}
