/// Fluent builder for a one- or multi-core [`Simulator`] over an
/// in-memory handshake list.
///
/// [`Simulator`]: x86sim_core::Simulator
pub mod harness;
