//! Common types shared across the timing core.
//!
//! 1. **Error/fault model:** [`error::SimError`] and [`error::Fault`], the
//!    crate-wide error enum and the per-Mop fault kind, plus the
//!    fault/speculative policy predicate from design note §9.
//! 2. **Action-id staleness:** [`action_id::ActionId`] and
//!    [`action_id::Stamped`], the generation-tag contract every
//!    cache/MSHR/RS entry uses to drop stale callbacks after a squash.

/// Error and fault types: configuration errors, invariant violations,
/// deadlock, and per-Mop faults.
pub mod error;
/// Generation-tagged action ids for squash-safe callbacks.
pub mod action_id;

pub use error::{Fault, SimError};
pub use action_id::ActionId;
