//! Integration test entry point.
//!
//! Aggregates shared test infrastructure and the end-to-end scenario
//! suite into a single test binary, mirroring how the unit-test tree is
//! organized inside the crate itself.

/// Shared test infrastructure: a builder for a minimal [`Simulator`]
/// driven from an in-memory instruction list, without a real decoder or
/// feeder binary.
///
/// [`Simulator`]: x86sim_core::Simulator
pub mod common;
