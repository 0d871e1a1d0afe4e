//! The data model (§3): Mop, uop, the rename table, cache lines and
//! requests, MSHRs, speculative memory, and the shadow Mop queue.

/// Macro-op: one architectural instruction and its uop flow.
pub mod mop;
/// Micro-op: one execution-engine operation, with dataflow edges.
pub mod uop;
/// Per-register producer tracking (the alloc stage's rename table).
pub mod dep_map;
/// Cache line state and replacement metadata.
pub mod cache_line;
/// A request travelling through the cache hierarchy.
pub mod cache_request;
/// Miss-status handling register / writeback buffer entry.
pub mod mshr;
/// Per-byte speculative memory, for nuke/flush undo.
pub mod spec_mem;
/// Ring buffer of non-speculative handshakes plus speculative siblings.
pub mod shadow_mopq;

pub use cache_line::CacheLine;
pub use cache_request::{CacheAction, CacheOp};
pub use dep_map::DependencyMap;
pub use mop::Mop;
pub use mshr::{Mshr, MshrKind, MshrState};
pub use shadow_mopq::ShadowMopQueue;
pub use spec_mem::SpeculativeMemory;
pub use uop::{ArchReg, FuClass, Uop, UopHandle};
