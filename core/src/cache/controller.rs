//! Pluggable cache coherence controller (§4.6).
//!
//! This crate models a single address space shared by all cores behind
//! one LLC, so the only coherence question that ever arises is "may core
//! X fill this line", which a single always-grant controller answers
//! trivially. The trait exists so a stricter protocol (MESI, directory)
//! could be dropped in without reshaping the cache around it.

/// Decides whether a fill request may proceed.
pub trait CacheController: Send + Sync {
    /// Returns `true` if `requesting_core` may install `paddr` into its
    /// cache right now.
    fn grant_fill(&mut self, requesting_core: usize, paddr: u64) -> bool;

    /// Notifies the controller that `requesting_core` evicted `paddr`.
    fn notify_evict(&mut self, requesting_core: usize, paddr: u64);
}

/// Always grants; used for every cache in this simulator, since the
/// address space is shared without per-core coherence state.
#[derive(Debug, Default)]
pub struct PermissiveController;

impl CacheController for PermissiveController {
    fn grant_fill(&mut self, _requesting_core: usize, _paddr: u64) -> bool {
        true
    }

    fn notify_evict(&mut self, _requesting_core: usize, _paddr: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_controller_always_grants() {
        let mut c = PermissiveController;
        assert!(c.grant_fill(0, 0x1000));
        assert!(c.grant_fill(3, 0xdead_beef));
    }
}
