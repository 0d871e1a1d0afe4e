//! Execution-port and functional-unit timing (§4.4, §6).
//!
//! Per-class latency and issue-rate are external config
//! ([`crate::config::FuConfig`], keyed by [`FuClass`] discriminant
//! name); this module only owns the per-port busy-until bookkeeping that
//! decides when a uop of a given class may next issue.

use std::collections::HashMap;

use crate::config::FuConfig;
use crate::model::uop::FuClass;

fn class_key(class: FuClass) -> &'static str {
    match class {
        FuClass::IntAlu => "IntAlu",
        FuClass::IntMul => "IntMul",
        FuClass::IntDiv => "IntDiv",
        FuClass::Agen => "Agen",
        FuClass::Load => "Load",
        FuClass::Store => "Store",
        FuClass::Branch => "Branch",
        FuClass::FpAdd => "FpAdd",
        FuClass::FpMul => "FpMul",
        FuClass::FpDiv => "FpDiv",
    }
}

/// Fallback timing for a functional-unit class absent from the config's
/// `fu` table: a single-cycle, fully pipelined unit bound to port 0.
fn default_fu_config() -> FuConfig {
    FuConfig {
        ports: vec![0],
        latency: 1,
        issue_rate: 1,
    }
}

/// Per-core execution-port scheduler.
pub struct ExecUnits {
    fu: HashMap<String, FuConfig>,
    port_busy_until: Vec<u64>,
    /// Cycle each functional-unit class may next accept an issue
    /// (reciprocal-throughput throttle, independent of port occupancy).
    class_free_at: HashMap<String, u64>,
}

impl ExecUnits {
    /// Builds a scheduler for `num_ports` execution ports, configured per
    /// `fu`.
    #[must_use]
    pub fn new(fu: HashMap<String, FuConfig>, num_ports: usize) -> Self {
        Self {
            fu,
            port_busy_until: vec![0; num_ports.max(1)],
            class_free_at: HashMap::new(),
        }
    }

    fn config_for(&self, class: FuClass) -> FuConfig {
        self.fu.get(class_key(class)).cloned().unwrap_or_else(default_fu_config)
    }

    /// Attempts to issue a uop of `class` at `cycle`. Returns the
    /// completion cycle if a port is free and the class's issue-rate
    /// throttle has elapsed, else `None` (the caller retries next cycle).
    pub fn try_issue(&mut self, class: FuClass, cycle: u64) -> Option<u64> {
        let cfg = self.config_for(class);
        let key = class_key(class);
        if self.class_free_at.get(key).is_some_and(|&free| cycle < free) {
            return None;
        }
        let port = cfg
            .ports
            .iter()
            .copied()
            .filter(|&p| p < self.port_busy_until.len())
            .find(|&p| self.port_busy_until[p] <= cycle)?;

        self.port_busy_until[port] = cycle + 1;
        self.class_free_at.insert(key.to_owned(), cycle + u64::from(cfg.issue_rate.max(1)));
        Some(cycle + u64::from(cfg.latency.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_port_config() -> HashMap<String, FuConfig> {
        let mut m = HashMap::new();
        m.insert(
            "IntAlu".to_owned(),
            FuConfig {
                ports: vec![0],
                latency: 2,
                issue_rate: 1,
            },
        );
        m
    }

    #[test]
    fn issue_returns_completion_cycle_offset_by_latency() {
        let mut units = ExecUnits::new(single_port_config(), 1);
        let done = units.try_issue(FuClass::IntAlu, 10).unwrap();
        assert_eq!(done, 12);
    }

    #[test]
    fn busy_port_blocks_second_issue_same_cycle() {
        let mut units = ExecUnits::new(single_port_config(), 1);
        assert!(units.try_issue(FuClass::IntAlu, 10).is_some());
        assert!(units.try_issue(FuClass::IntAlu, 10).is_none());
    }

    #[test]
    fn unconfigured_class_uses_default_timing() {
        let mut units = ExecUnits::new(HashMap::new(), 2);
        let done = units.try_issue(FuClass::FpDiv, 5).unwrap();
        assert_eq!(done, 6);
    }
}
