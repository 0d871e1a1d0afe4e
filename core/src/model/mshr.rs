//! Miss-status handling register / writeback-buffer entry (§4.6).
//!
//! One MSHR tracks a line-sized request outstanding below a cache: the
//! first miss to a line allocates it, later misses to the same line
//! coalesce onto it by appending their requester to `waiters` rather than
//! issuing a second fill. Writebacks reuse the same slot pool ("the
//! writeback buffer does double duty as an MSHR"), distinguished by
//! [`MshrKind::Writeback`].

use crate::model::cache_request::CacheAction;

/// Whether an MSHR slot is servicing a miss fill or a dirty writeback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MshrKind {
    /// Servicing a demand/prefetch miss.
    Miss,
    /// Servicing a dirty-line writeback to the next level.
    Writeback,
}

/// Lifecycle of one MSHR slot.
///
/// A writeback never passes through `Filled` — once `Returned` it is
/// immediately `Deallocated`, since there is no line-fill step to wait
/// on the fill pipeline for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MshrState {
    /// Slot is free.
    #[default]
    Unstarted,
    /// Request issued to the next level, awaiting response.
    InFlight,
    /// Response arrived from the next level.
    Returned,
    /// Line installed into the array (miss fills only).
    Filled,
    /// Slot released back to the free pool.
    Deallocated,
}

/// One miss-status handling register / writeback-buffer slot.
pub struct Mshr {
    /// Miss fill vs. writeback.
    pub kind: MshrKind,
    /// Cache-line-aligned physical address this slot covers.
    pub paddr: u64,
    /// Current lifecycle state.
    pub state: MshrState,
    /// The request that allocated this slot.
    pub primary: CacheAction,
    /// Later requests to the same line, coalesced onto this slot; all
    /// are satisfied together when the fill completes.
    pub waiters: Vec<CacheAction>,
    /// Cycle this slot was allocated, for MSHR-occupancy stats.
    pub allocated_cycle: u64,
}

impl Mshr {
    /// Allocates a new slot for `primary`, with no coalesced waiters yet.
    #[must_use]
    pub fn new(kind: MshrKind, paddr: u64, primary: CacheAction, allocated_cycle: u64) -> Self {
        Self {
            kind,
            paddr,
            state: MshrState::InFlight,
            primary,
            waiters: Vec::new(),
            allocated_cycle,
        }
    }

    /// Coalesces another request onto this already-outstanding slot.
    pub fn coalesce(&mut self, req: CacheAction) {
        self.waiters.push(req);
    }

    /// Advances lifecycle on next-level response.
    pub fn mark_returned(&mut self) {
        self.state = MshrState::Returned;
        if self.kind == MshrKind::Writeback {
            self.state = MshrState::Deallocated;
        }
    }

    /// Advances lifecycle once the fill pipeline installs the line
    /// (miss fills only; no-op for writebacks, which never reach this).
    pub fn mark_filled(&mut self) {
        if self.kind == MshrKind::Miss {
            self.state = MshrState::Filled;
        }
    }

    /// Releases the slot.
    pub fn deallocate(&mut self) {
        self.state = MshrState::Deallocated;
    }
}

/// Parses a per-command MSHR priority order string like `"RPWB"` into a
/// fixed priority order over `{Read, Prefetch, Writeback, BusRead}`,
/// naming which class of request a contended MSHR-allocation cycle
/// favors first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MshrCommandClass {
    /// Demand read.
    Read,
    /// Prefetch fill.
    Prefetch,
    /// Dirty-line writeback.
    Writeback,
    /// Bus-initiated read.
    BusRead,
}

/// Parses an MSHR order spec string into priority order, highest first.
///
/// # Errors
/// Returns an error describing the bad character if `spec` contains
/// anything other than `R`, `P`, `W`, `B`, or duplicates a letter.
pub fn parse_mshr_order(spec: &str) -> Result<Vec<MshrCommandClass>, String> {
    let mut order = Vec::with_capacity(4);
    for c in spec.chars() {
        let class = match c {
            'R' => MshrCommandClass::Read,
            'P' => MshrCommandClass::Prefetch,
            'W' => MshrCommandClass::Writeback,
            'B' => MshrCommandClass::BusRead,
            other => return Err(format!("unknown MSHR order class '{other}'")),
        };
        if order.contains(&class) {
            return Err(format!("duplicate MSHR order class '{c}'"));
        }
        order.push(class);
    }
    Ok(order)
}
