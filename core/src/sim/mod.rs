//! Multi-core simulation driver (§5): owns the shared uncore and runs
//! one core-owning OS thread per CPU, rendezvousing once per cycle so
//! the uncore advances exactly once per round.

/// The per-cycle core/uncore rendezvous barrier.
pub mod rendezvous;
/// The top-level multi-core [`simulator::Simulator`].
pub mod simulator;
