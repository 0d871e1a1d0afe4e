//! Memory-dependence prediction boundary (§4.4, §9).
//!
//! Mirrors the [`crate::predictor::Predictor`]/[`crate::cache::prefetch::Prefetcher`]
//! contract-only pattern: this crate commits to the interface a load
//! uses to decide whether it may bypass older, address-unresolved
//! stores, not to a catalog of predictors (store sets, alias tables).

/// Whether a load may speculatively bypass older stores still in the
/// store queue whose addresses are not yet known.
pub trait MemDependencePredictor: Send + Sync {
    /// True if the load at `load_pc` may issue ahead of older stores
    /// with unresolved addresses.
    fn may_bypass(&mut self, load_pc: u64) -> bool;

    /// Records that a load at `load_pc` bypassed and was later found to
    /// violate ordering against a store at `store_pc` (a memory-ordering
    /// nuke), so future predictions can be more conservative.
    fn record_violation(&mut self, load_pc: u64, store_pc: u64);
}

impl MemDependencePredictor for Box<dyn MemDependencePredictor> {
    fn may_bypass(&mut self, load_pc: u64) -> bool {
        (**self).may_bypass(load_pc)
    }

    fn record_violation(&mut self, load_pc: u64, store_pc: u64) {
        (**self).record_violation(load_pc, store_pc);
    }
}

/// Reference implementation: never speculates past an address-unknown
/// store. Always correct, at the cost of memory-level parallelism.
#[derive(Debug, Default)]
pub struct NoSpeculationMdp;

impl MemDependencePredictor for NoSpeculationMdp {
    fn may_bypass(&mut self, _load_pc: u64) -> bool {
        false
    }

    fn record_violation(&mut self, _load_pc: u64, _store_pc: u64) {}
}

/// Always lets a load bypass older, address-unresolved stores. The
/// opposite extreme from [`NoSpeculationMdp`]: maximal memory-level
/// parallelism, at the cost of relying entirely on the nuke path
/// (§4.1/§4.4) to catch the resulting ordering violations.
#[derive(Debug, Default)]
pub struct AlwaysBypassMdp;

impl MemDependencePredictor for AlwaysBypassMdp {
    fn may_bypass(&mut self, _load_pc: u64) -> bool {
        true
    }

    fn record_violation(&mut self, _load_pc: u64, _store_pc: u64) {}
}

/// A load the memory-dependence predictor let issue ahead of one or more
/// older, address-unresolved stores still in the store queue. Tracked
/// until every such store resolves its address, so a later address match
/// against one of them can be recognized as a genuine ordering violation
/// rather than a false positive against a store that turned out to alias
/// nothing.
#[derive(Debug, Clone)]
pub struct SpeculativeLoad {
    /// The load's resolved virtual address at the time it bypassed.
    pub vaddr: u64,
    /// The load's pc, recorded so a later violation can train the mdp and
    /// so `nuke` knows where to resume fetch.
    pub pc: u64,
    /// The load uop's packed handle, identifying which uop this entry
    /// tracks.
    pub load_handle: u32,
    /// Packed handles of the older, still-address-unresolved stores this
    /// load jumped ahead of. Each is removed as its store completes; the
    /// entry is dropped once this is empty without a violation found.
    pub outstanding_stores: Vec<u32>,
}

/// Parses a `mdp_spec` config string into a boxed [`MemDependencePredictor`].
///
/// # Errors
/// Returns an error naming the unrecognized spec.
pub fn build_mdp(spec: &str) -> Result<Box<dyn MemDependencePredictor>, String> {
    match spec {
        "none" | "" => Ok(Box::new(NoSpeculationMdp)),
        "always" => Ok(Box::new(AlwaysBypassMdp)),
        other => Err(format!("unknown mdp spec '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_speculation_mdp_never_bypasses() {
        let mut mdp = NoSpeculationMdp;
        assert!(!mdp.may_bypass(0x1000));
    }

    #[test]
    fn build_mdp_rejects_unknown_spec() {
        assert!(build_mdp("store-sets").is_err());
    }

    #[test]
    fn always_bypass_mdp_always_bypasses() {
        let mut mdp = AlwaysBypassMdp;
        assert!(mdp.may_bypass(0x1000));
    }

    #[test]
    fn build_mdp_accepts_always() {
        assert!(build_mdp("always").is_ok());
    }
}
