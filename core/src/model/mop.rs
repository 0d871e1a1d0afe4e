//! The macro-op (Mop): one architectural instruction and its uop flow.
//!
//! Per §3, a Mop owns a pointer-stable sequence of uops (so that
//! [`crate::model::uop::UopHandle`]s into it stay valid across growth) and
//! tracks, per uop, whether it has completed and whether it has committed,
//! so the Mop as a whole can retire once every uop in its flow has.

use crate::common::action_id::ActionId;
use crate::model::uop::Uop;
use crate::predictor::PredictionHandle;

/// Cycle timestamps tracked at Mop granularity (§3).
#[derive(Clone, Copy, Debug, Default)]
pub struct MopTimestamps {
    /// Cycle fetched from the oracle.
    pub fetch: Option<u64>,
    /// Cycle decode/crack began.
    pub decode_start: Option<u64>,
    /// Cycle decode/crack finished (uop flow fully populated).
    pub decode_finish: Option<u64>,
    /// Cycle the first uop in the flow committed.
    pub commit_start: Option<u64>,
    /// Cycle the last uop in the flow committed.
    pub commit_finish: Option<u64>,
}

/// One macro-op: a decoded x86 instruction plus its crack into uops.
pub struct Mop {
    /// Program counter this Mop was fetched at.
    pub pc: u64,
    /// Branch predictor's predicted next PC (may be wrong).
    pub predicted_npc: u64,
    /// Sequential fall-through PC (`pc + instruction length`).
    pub fallthrough_pc: u64,
    /// True if this Mop was fetched down a not-yet-confirmed predicted
    /// path (i.e. there is an older unresolved branch ahead of it).
    pub speculative: bool,

    /// Generation tag, bumped on squash so in-flight references to this
    /// Mop via a handle can detect staleness.
    pub action_id: ActionId,

    /// Speculative-memory watermark captured when this Mop was built,
    /// before any younger Mop's stores executed. A misprediction
    /// discovered at this Mop's commit rolls [`crate::model::spec_mem::SpeculativeMemory`]
    /// back to this mark.
    pub fetch_watermark: u64,

    /// The handle the predictor returned when this Mop was fetched;
    /// commit feeds the resolved outcome back through it, a squash
    /// reverts it.
    pub pred_handle: PredictionHandle,

    /// The uop flow this Mop cracked into. Indices are stable for the
    /// lifetime of the Mop: uops are never removed from the middle, only
    /// marked complete/committed, so [`super::uop::UopHandle`]s that name
    /// `(mop_slot, uop_index)` stay valid.
    pub uops: Vec<Uop>,
    /// Count of uops in `uops` that have completed execution.
    pub num_completed: usize,
    /// Count of uops in `uops` that have committed.
    pub num_committed: usize,

    /// Per-Mop timestamps.
    pub ts: MopTimestamps,
}

impl Mop {
    /// Creates a Mop with an empty uop flow; the decode/alloc stage fills
    /// `uops` in before allocation.
    #[must_use]
    pub fn new(
        pc: u64,
        fallthrough_pc: u64,
        predicted_npc: u64,
        speculative: bool,
        action_id: ActionId,
        fetch_watermark: u64,
        pred_handle: PredictionHandle,
    ) -> Self {
        Self {
            pc,
            predicted_npc,
            fallthrough_pc,
            speculative,
            action_id,
            fetch_watermark,
            pred_handle,
            uops: Vec::new(),
            num_completed: 0,
            num_committed: 0,
            ts: MopTimestamps::default(),
        }
    }

    /// True once every uop in the flow has completed execution.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.num_completed == self.uops.len()
    }

    /// True once every uop in the flow has committed.
    #[must_use]
    pub fn all_committed(&self) -> bool {
        self.num_committed == self.uops.len()
    }

    /// True if the predicted next PC was not simply the fall-through
    /// (i.e. this Mop was predicted taken or otherwise redirected).
    #[must_use]
    pub fn predicted_taken(&self) -> bool {
        self.predicted_npc != self.fallthrough_pc
    }

    /// Bumps this Mop's action id and every uop's, invalidating all
    /// in-flight stale references after a squash/flush.
    pub fn squash(&mut self) {
        self.action_id = self.action_id.next();
        for uop in &mut self.uops {
            uop.squash();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pred_handle() -> PredictionHandle {
        PredictionHandle { index: 0, action_id: ActionId::FIRST }
    }

    fn mop() -> Mop {
        Mop::new(0x1000, 0x1004, 0x1004, false, ActionId::FIRST, 0, test_pred_handle())
    }

    #[test]
    fn all_completed_true_for_empty_flow() {
        assert!(mop().all_completed());
    }

    #[test]
    fn all_completed_false_until_every_uop_counted() {
        let mut m = mop();
        m.uops.push(Uop::new(ActionId::FIRST));
        m.uops.push(Uop::new(ActionId::FIRST));
        assert!(!m.all_completed());
        m.num_completed = 1;
        assert!(!m.all_completed());
        m.num_completed = 2;
        assert!(m.all_completed());
    }

    #[test]
    fn predicted_taken_detects_redirect() {
        let m = mop();
        assert!(!m.predicted_taken());
        let mut m2 = Mop::new(0x1000, 0x1004, 0x2000, false, ActionId::FIRST, 0, test_pred_handle());
        assert!(m2.predicted_taken());
        m2.predicted_npc = 0x1004;
        assert!(!m2.predicted_taken());
    }

    #[test]
    fn squash_bumps_mop_and_uop_action_ids() {
        let mut m = mop();
        m.uops.push(Uop::new(ActionId::FIRST));
        let before_mop = m.action_id;
        let before_uop = m.uops[0].action_id;
        m.squash();
        assert_ne!(m.action_id, before_mop);
        assert_ne!(m.uops[0].action_id, before_uop);
    }
}
