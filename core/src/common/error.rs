//! Crate-wide error model.
//!
//! Two error families, matching §7 of the design: [`SimError`] for
//! conditions that abort the simulator process (configuration, deadlock,
//! invariant violation), and [`Fault`] for conditions that stall or
//! squash a single Mop without aborting anything.

use std::fmt;

use thiserror::Error;

/// Errors that terminate the simulation process.
#[derive(Debug, Error)]
pub enum SimError {
    /// A configuration option was malformed or out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// An internal invariant was violated (`sim_assert!` failure). Carries
    /// the cycle at which the check failed and a description.
    #[error("invariant violation at cycle {cycle}: {message}")]
    InvariantViolation {
        /// Uncore cycle at which the check failed.
        cycle: u64,
        /// Human-readable description of the violated invariant.
        message: String,
    },

    /// No core made forward progress for `deadlock_threshold` cycles.
    #[error("deadlock: core {core_id} made no progress for {cycles} cycles")]
    Deadlock {
        /// Core that triggered the watchdog.
        core_id: usize,
        /// Number of cycles without a commit.
        cycles: u64,
    },

    /// A checkpoint or trace file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A checkpoint replay found a mismatch against simulator state
    /// (ICNT, PC, input register, or input memory). Per §7 this does not
    /// abort the run — recovery overwrites simulator state and logs a
    /// warning — but is modeled as an error value so the caller can
    /// decide whether to escalate.
    #[error("feeder inconsistency: {0}")]
    FeederInconsistency(String),
}

/// A fault detected while processing a single Mop or uop.
///
/// Faults never abort the process by themselves; §7 routes them through
/// [`FaultAction`] based on whether the faulting instruction is on a
/// speculative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The decoder/uop cracker produced no uop flow for this opcode.
    UnknownOpcode(u32),
    /// A serializing instruction (CPUID/INT/HLT) requiring pipeline drain.
    Trap,
    /// A load/store ordering violation requiring a nuke.
    OrderingViolation,
    /// A speculative decode failed while on a wrong-path fetch.
    BogusFetch,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode(op) => write!(f, "unknown opcode {op:#x}"),
            Self::Trap => write!(f, "trap instruction"),
            Self::OrderingViolation => write!(f, "load/store ordering violation"),
            Self::BogusFetch => write!(f, "bogus speculative fetch"),
        }
    }
}

impl std::error::Error for Fault {}

/// Checks an internal pipeline invariant from within a `Core`-stage
/// function returning `()`.
///
/// On failure this stamps a [`SimError::InvariantViolation`] onto
/// `$core.fault` and returns early from the enclosing function, instead
/// of unwinding the core's thread the way `assert!`/`debug_assert!`
/// would. `run_core` checks `core.fault` once per cycle and turns a set
/// fault into the process-ending [`SimError`] it carries, the same way
/// a deadlock is surfaced.
#[macro_export]
macro_rules! sim_assert {
    ($core:expr, $cond:expr, $($msg:tt)+) => {
        if !($cond) {
            let cycle = $core.cycle;
            $core.fault = Some($crate::common::SimError::InvariantViolation {
                cycle,
                message: format!($($msg)+),
            });
            return;
        }
    };
}

/// What the machine should do about a fault, as a function of
/// `(fault_kind, speculative?)`.
///
/// §9's open question resolves to: any fault taken on a non-speculative
/// path is a Mop-level trap (drain then replay), never a process abort,
/// except [`Fault::UnknownOpcode`] is downgraded to a silently-NOPed
/// instruction with a warning stat increment (§7), and deadlock / invariant
/// violation (not representable as a [`Fault`]) are always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Turn the Mop into a NOP and continue (no stat beyond a counter bump).
    Nop,
    /// Drain the pipeline, then replay from this Mop as a trap.
    DrainAndTrap,
    /// Discard the current fetch path; correction will arrive via a
    /// younger non-speculative recovery.
    DiscardSpeculative,
}

/// The configurable fault-policy predicate named in design note §9.
///
/// `speculative` means the faulting Mop is not (yet) known to be on the
/// architecturally-committed path.
#[must_use]
pub fn fault_policy(fault: &Fault, speculative: bool) -> FaultAction {
    match (fault, speculative) {
        (Fault::UnknownOpcode(_), true) => FaultAction::DiscardSpeculative,
        (Fault::UnknownOpcode(_), false) => FaultAction::Nop,
        (Fault::BogusFetch, _) => FaultAction::DiscardSpeculative,
        (Fault::Trap | Fault::OrderingViolation, true) => FaultAction::DiscardSpeculative,
        (Fault::Trap | Fault::OrderingViolation, false) => FaultAction::DrainAndTrap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_opcode_on_correct_path_is_nop() {
        assert_eq!(
            fault_policy(&Fault::UnknownOpcode(0xdead), false),
            FaultAction::Nop
        );
    }

    #[test]
    fn unknown_opcode_on_wrong_path_is_discarded() {
        assert_eq!(
            fault_policy(&Fault::UnknownOpcode(0xdead), true),
            FaultAction::DiscardSpeculative
        );
    }

    #[test]
    fn trap_on_correct_path_drains() {
        assert_eq!(
            fault_policy(&Fault::Trap, false),
            FaultAction::DrainAndTrap
        );
    }

    #[test]
    fn ordering_violation_on_speculative_path_is_discarded() {
        assert_eq!(
            fault_policy(&Fault::OrderingViolation, true),
            FaultAction::DiscardSpeculative
        );
    }
}
