//! Memory-controller / DRAM policy boundary (§1 Non-goals, §6).
//!
//! DRAM scheduling policy (row-buffer management, bank conflict modeling,
//! request reordering) is out of scope; this crate commits only to the
//! [`DramPolicy`] contract plus one trivial fixed-latency reference
//! implementation, selected by the `dram_spec` config string.

/// Decides how long a memory-controller request takes.
pub trait DramPolicy: Send + Sync {
    /// Returns the latency, in uncore cycles, for an access to `paddr`.
    fn latency(&mut self, paddr: u64, is_write: bool) -> u32;
}

/// Fixed latency regardless of address or access type.
pub struct FixedLatencyDram {
    latency: u32,
}

impl FixedLatencyDram {
    /// Creates a policy with a flat `latency` for every access.
    #[must_use]
    pub fn new(latency: u32) -> Self {
        Self { latency }
    }
}

impl DramPolicy for FixedLatencyDram {
    fn latency(&mut self, _paddr: u64, _is_write: bool) -> u32 {
        self.latency
    }
}

/// Builds the configured [`DramPolicy`] from a `dram_spec` string.
///
/// # Errors
/// Returns an error naming the unrecognized spec.
pub fn build_dram_policy(spec: &str) -> Result<Box<dyn DramPolicy>, String> {
    match spec {
        "fixed" | "" => Ok(Box::new(FixedLatencyDram::new(120))),
        other => Err(format!("unknown dram spec '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_latency_is_constant() {
        let mut dram = FixedLatencyDram::new(50);
        assert_eq!(dram.latency(0x1000, false), 50);
        assert_eq!(dram.latency(0x9999, true), 50);
    }
}
