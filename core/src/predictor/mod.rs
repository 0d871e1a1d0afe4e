//! Branch prediction boundary (§4.2, §9).
//!
//! Per the design note, this crate commits to the predictor's *contract*
//! — query, attach-a-handle-to-the-Mop, update-on-commit, revert-on-flush
//! — not to a catalog of prediction algorithms. A fetched Mop carries the
//! handle returned by [`Predictor::predict`]; commit calls
//! [`Predictor::update`], a squash calls [`Predictor::revert`]. The
//! predictor owns its own shadow update buffer so that speculative
//! predictions made down a path later discovered to be wrong can be
//! reverted without corrupting the architectural predictor state that
//! other, still-valid in-flight predictions depend on.

use crate::common::action_id::ActionId;

/// Opaque handle a predictor hands back from [`Predictor::predict`] and
/// later receives back in [`Predictor::update`]/[`Predictor::revert`].
///
/// Stamped with the action id live at prediction time so a predictor
/// implementation can detect (and ignore) an update/revert call whose Mop
/// was squashed and reused for something else in the interim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionHandle {
    /// Predictor-private index into its own shadow/history state.
    pub index: u32,
    /// Action id of the Mop this prediction was made for.
    pub action_id: ActionId,
}

/// The resolved outcome of a branch, fed back via [`Predictor::update`].
#[derive(Debug, Clone, Copy)]
pub struct BranchOutcome {
    /// Whether the branch was actually taken.
    pub taken: bool,
    /// The actual target PC if taken.
    pub target: u64,
}

/// The branch-predictor contract (§4.2, §9).
pub trait Predictor: Send + Sync {
    /// Predicts the next PC for a Mop fetched at `pc`, returning the
    /// predicted NPC and a handle to attach to that Mop.
    fn predict(&mut self, pc: u64, action_id: ActionId) -> (u64, PredictionHandle);

    /// Commits a prediction: the branch resolved as `outcome`. Called
    /// once per predicted Mop, in commit order.
    fn update(&mut self, handle: PredictionHandle, outcome: BranchOutcome);

    /// Reverts a prediction made on a path now known to be wrong; the
    /// predictor's speculative update for this handle must be undone
    /// without disturbing updates made for still-valid, older handles.
    fn revert(&mut self, handle: PredictionHandle);
}

impl Predictor for Box<dyn Predictor> {
    fn predict(&mut self, pc: u64, action_id: ActionId) -> (u64, PredictionHandle) {
        (**self).predict(pc, action_id)
    }

    fn update(&mut self, handle: PredictionHandle, outcome: BranchOutcome) {
        (**self).update(handle, outcome);
    }

    fn revert(&mut self, handle: PredictionHandle) {
        (**self).revert(handle);
    }
}

/// Reference implementation: always predicts not-taken (fall-through).
///
/// No history tables, no shadow buffer beyond a flat vec of in-flight
/// fallthrough targets keyed by handle index, since there is no
/// speculative state that a revert could ever need to unwind.
#[derive(Debug, Default)]
pub struct StaticNotTakenPredictor {
    next_index: u32,
}

impl StaticNotTakenPredictor {
    /// Creates a fresh predictor with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Predictor for StaticNotTakenPredictor {
    fn predict(&mut self, pc: u64, action_id: ActionId) -> (u64, PredictionHandle) {
        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        // Fall-through prediction: the caller (fetch) knows the true
        // instruction length and will use this only as "not taken";
        // predicted NPC for a static not-taken predictor is the PC
        // itself plus zero, signaling "use fallthrough" to the caller.
        (pc, PredictionHandle { index, action_id })
    }

    fn update(&mut self, _handle: PredictionHandle, _outcome: BranchOutcome) {}

    fn revert(&mut self, _handle: PredictionHandle) {}
}

/// Parses a `predictor_spec` config string into a boxed [`Predictor`].
///
/// # Errors
/// Returns an error naming the unrecognized spec.
pub fn build_predictor(spec: &str) -> Result<Box<dyn Predictor>, String> {
    match spec {
        "static" | "" => Ok(Box::new(StaticNotTakenPredictor::new())),
        other => Err(format!("unknown predictor spec '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_predictor_always_predicts_fallthrough() {
        let mut p = StaticNotTakenPredictor::new();
        let (npc, _handle) = p.predict(0x1000, ActionId::FIRST);
        assert_eq!(npc, 0x1000);
    }

    #[test]
    fn build_predictor_rejects_unknown_spec() {
        assert!(build_predictor("tage").is_err());
    }

    #[test]
    fn build_predictor_accepts_static() {
        assert!(build_predictor("static").is_ok());
    }
}
