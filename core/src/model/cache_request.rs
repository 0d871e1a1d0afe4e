//! A request travelling through the cache hierarchy (§4.6).

use crate::common::action_id::ActionId;
use crate::model::uop::UopHandle;

/// The operation a [`CacheAction`] performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOp {
    /// Demand read (load).
    Read,
    /// Demand write (store commit).
    Write,
    /// Dirty-line writeback to the next level.
    Writeback,
    /// Prefetch fill, no requester waits on it.
    Prefetch,
    /// Bus-initiated read from a lower level satisfying a miss.
    BusRead,
}

/// What to do when a [`CacheAction`] completes, stamped with the action
/// id in effect when the request was issued so a stale completion (the
/// requester was squashed/nuked in the meantime) is dropped rather than
/// applied — see [`crate::common::action_id`].
#[derive(Clone, Copy, Debug)]
pub enum CacheCallback {
    /// Deliver a load's result to the waiting uop.
    FillLoad(UopHandle),
    /// Mark a store as globally visible.
    SatisfyStore(UopHandle),
    /// No requester; used for prefetches and writebacks.
    None,
}

/// A single request in flight through the cache hierarchy: a demand
/// access, a writeback, or a prefetch.
#[derive(Clone, Copy, Debug)]
pub struct CacheAction {
    /// Core that originated the request (the owning core for private
    /// caches; the requesting core for shared LLC accesses).
    pub origin_core: usize,
    /// What this request does.
    pub op: CacheOp,
    /// Physical address, cache-line aligned.
    pub paddr: u64,
    /// What happens when this request completes.
    pub callback: CacheCallback,
    /// Action id of the requester at issue time; `None` for prefetches
    /// and writebacks, which have no requester to go stale.
    pub requester_action_id: Option<ActionId>,
    /// True once the physical address has been resolved through the
    /// (unmodeled-latency) TLB.
    pub translated: bool,
    /// Cycle this request was issued to the cache.
    pub issued_cycle: u64,
    /// MSHR slot this request coalesced into, once accepted.
    pub mshr_slot: Option<u32>,
}

impl CacheAction {
    /// Creates a demand request on behalf of `requester`.
    #[must_use]
    pub fn demand(
        origin_core: usize,
        op: CacheOp,
        paddr: u64,
        callback: CacheCallback,
        requester_action_id: ActionId,
        issued_cycle: u64,
    ) -> Self {
        Self {
            origin_core,
            op,
            paddr,
            callback,
            requester_action_id: Some(requester_action_id),
            translated: false,
            issued_cycle,
            mshr_slot: None,
        }
    }

    /// Creates a requester-less request (prefetch or writeback).
    #[must_use]
    pub fn anonymous(origin_core: usize, op: CacheOp, paddr: u64, issued_cycle: u64) -> Self {
        Self {
            origin_core,
            op,
            paddr,
            callback: CacheCallback::None,
            requester_action_id: None,
            translated: false,
            issued_cycle,
            mshr_slot: None,
        }
    }

    /// True if this request's completion callback is stale, i.e. the
    /// requester's live action id (re-read through its handle by the
    /// caller) no longer matches the id stamped at issue time.
    #[must_use]
    pub fn is_stale(&self, current: ActionId) -> bool {
        self.requester_action_id.is_some_and(|stamped| stamped != current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_request_never_stale() {
        let req = CacheAction::anonymous(0, CacheOp::Prefetch, 0x4000, 10);
        assert!(!req.is_stale(ActionId::FIRST.next()));
    }

    #[test]
    fn demand_request_goes_stale_after_requester_squash() {
        let req = CacheAction::demand(
            0,
            CacheOp::Read,
            0x4000,
            CacheCallback::None,
            ActionId::FIRST,
            10,
        );
        assert!(!req.is_stale(ActionId::FIRST));
        assert!(req.is_stale(ActionId::FIRST.next()));
    }
}
