//! Cycle-accurate, execution-driven microarchitecture timing core for a
//! superscalar out-of-order x86 processor.
//!
//! This crate models the pipeline and memory-hierarchy timing engine:
//! 1. **Oracle:** functional/speculation model feeding the pipeline a
//!    dataflow-annotated instruction stream, with shadow-buffer nuke
//!    recovery (`oracle`).
//! 2. **Pipeline:** fetch, decode/alloc, execute, and commit stages,
//!    stepped in reverse order each cycle (`pipeline`).
//! 3. **Cache hierarchy:** a generic N-way set-associative cache with
//!    banks, MSHRs, fill pipeline, and pluggable prefetch/coherence
//!    policies (`cache`).
//! 4. **Uncore:** last-level cache, front-side bus, and memory controller
//!    clocked at a rational ratio to the CPU clock (`uncore`).
//! 5. **Simulation:** per-core threads rendezvousing on a shared uncore
//!    clock each cycle (`sim`).
//!
//! The instruction decoder, uop cracker, and instruction feeder are
//! external collaborators; this crate consumes their output through the
//! traits in [`decoder_iface`] and [`feeder`].

/// Common types shared across the crate: addresses, error/trap kinds,
/// and the action-id staleness contract.
pub mod common;
/// Hierarchical simulator configuration.
pub mod config;
/// The data model: Mop, uop, dependency map, cache requests, MSHRs,
/// speculative memory, and the shadow Mop queue.
pub mod model;
/// Contract for the external instruction decoder / uop cracker.
pub mod decoder_iface;
/// Contract for the external instruction feeder.
pub mod feeder;
/// The oracle: functional/speculative front end driving the pipeline.
pub mod oracle;
/// Pluggable branch predictor contract and a reference implementation.
pub mod predictor;
/// Fetch, decode/alloc, execute, and commit pipeline stages.
pub mod pipeline;
/// Generic set-associative cache with MSHRs, banks, and fill pipeline.
pub mod cache;
/// Fixed-width clocked bus / NoC model.
pub mod bus;
/// Last-level cache, front-side bus, and memory controller.
pub mod uncore;
/// Multi-core simulation loop and core/uncore rendezvous.
pub mod sim;
/// Simulation statistics collection.
pub mod stats;
/// Per-core append-only / circular-buffer trace output.
pub mod trace;

pub use crate::config::Config;
pub use crate::sim::simulator::Simulator;
