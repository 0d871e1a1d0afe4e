//! Hierarchical simulator configuration (§6).
//!
//! This module defines every structure and enum needed to parameterize
//! the simulator. It provides:
//! 1. **Defaults:** baseline constants (`defaults`), used as `#[serde(default = "...")]`
//!    fallbacks so a config file only needs to name what it overrides.
//! 2. **Structures:** per-component config — system, per-core fetch/decode/
//!    alloc/exec/commit, cache, uncore.
//! 3. **Enums:** replacement policy and MSHR command-class ordering; most
//!    pluggable algorithms (branch predictor, prefetcher, memory-dependence
//!    predictor, DRAM policy) are instead named by a free-form "spec string"
//!    parsed by that component's own small parser, since this crate only
//!    commits to their trait contracts, not to a catalog of algorithms.
//!
//! Configuration is supplied as JSON via the CLI's `-c/--config <path>`
//! flag; see [`crate::Config`] for the root structure.

use serde::Deserialize;

/// Baseline hardware constants used as config defaults.
pub mod defaults {
    /// Per-core instruction-byte-queue capacity (bytes).
    pub const FETCH_BYTE_QUEUE: usize = 64;
    /// Per-core fetch-stage instruction queue depth (Mops).
    pub const FETCH_IQ_SIZE: usize = 16;
    /// Fetch pipeline depth (cycles from fetch request to Mop available).
    pub const FETCH_DEPTH: u32 = 2;
    /// Max Mops fetched per cycle.
    pub const FETCH_WIDTH: usize = 4;
    /// Max taken branches predicted per cycle.
    pub const FETCH_BRANCH_LIMIT: usize = 1;
    /// Cycles of bubble inserted into fetch before a misprediction redirect.
    pub const JECLEAR_DELAY: u32 = 7;

    /// Decode pipeline depth (cycles).
    pub const DECODE_DEPTH: u32 = 2;
    /// Mops decoded per cycle.
    pub const DECODE_WIDTH: usize = 4;
    /// Microsequencer latency for a microcoded Mop, in cycles.
    pub const MS_LATENCY: u32 = 8;
    /// uop queue depth between decode and alloc.
    pub const UOPQ_SIZE: usize = 32;

    /// Alloc/rename pipeline depth (cycles).
    pub const ALLOC_DEPTH: u32 = 1;
    /// uops allocated per cycle.
    pub const ALLOC_WIDTH: usize = 4;

    /// Reservation-station entry count.
    pub const RS_SIZE: usize = 32;
    /// Load-queue entry count.
    pub const LDQ_SIZE: usize = 32;
    /// Store-queue entry count.
    pub const STQ_SIZE: usize = 24;
    /// Number of execution ports.
    pub const NUM_EXEC_PORTS: usize = 4;

    /// Reorder-buffer entry count.
    pub const ROB_SIZE: usize = 128;
    /// Mops committed per cycle.
    pub const COMMIT_WIDTH: usize = 4;
    /// Taken branches committed per cycle.
    pub const COMMIT_BRANCH_LIMIT: usize = 1;
    /// Cycles a Mop must sit ready-to-commit before it actually retires
    /// (models the "pre-commit" pipeline the teacher's ROB exposes).
    pub const PRE_COMMIT_DEPTH: u32 = 1;

    /// Cache line size, bytes. Shared by every level.
    pub const CACHE_LINE_BYTES: usize = 64;
    /// L1 size, bytes.
    pub const L1_SIZE_BYTES: usize = 32 * 1024;
    /// L1 associativity.
    pub const L1_WAYS: usize = 8;
    /// L1 access latency, cycles.
    pub const L1_LATENCY: u32 = 1;
    /// L1 bank count.
    pub const L1_BANKS: usize = 4;
    /// L1 total MSHR entries (miss + writeback).
    pub const L1_MSHR_SIZE: usize = 8;
    /// L1 writeback-only MSHR entries (subset of `L1_MSHR_SIZE`).
    pub const L1_MSHR_WB_SIZE: usize = 2;

    /// L2 size, bytes.
    pub const L2_SIZE_BYTES: usize = 256 * 1024;
    /// L2 associativity.
    pub const L2_WAYS: usize = 8;
    /// L2 access latency, cycles.
    pub const L2_LATENCY: u32 = 10;
    /// L2 bank count.
    pub const L2_BANKS: usize = 4;
    /// L2 total MSHR entries.
    pub const L2_MSHR_SIZE: usize = 16;
    /// L2 writeback-only MSHR entries.
    pub const L2_MSHR_WB_SIZE: usize = 4;

    /// LLC size, bytes (shared uncore resource).
    pub const LLC_SIZE_BYTES: usize = 8 * 1024 * 1024;
    /// LLC associativity.
    pub const LLC_WAYS: usize = 16;
    /// LLC access latency, cycles (uncore clock).
    pub const LLC_LATENCY: u32 = 30;
    /// LLC bank count.
    pub const LLC_BANKS: usize = 8;
    /// LLC total MSHR entries.
    pub const LLC_MSHR_SIZE: usize = 32;
    /// LLC writeback-only MSHR entries.
    pub const LLC_MSHR_WB_SIZE: usize = 8;

    /// Front-side bus width, bytes per transfer.
    pub const FSB_WIDTH_BYTES: usize = 32;
    /// Front-side bus clock multiplier relative to uncore clock.
    pub const FSB_SPEED_RATIO: u32 = 1;
    /// Front-side bus round trip, uncore cycles.
    pub const FSB_ROUNDTRIP: u32 = 20;

    /// DTLB entry count.
    pub const DTLB_SIZE: usize = 64;
    /// ITLB entry count.
    pub const ITLB_SIZE: usize = 64;
    /// BTB entry count.
    pub const BTB_SIZE: usize = 1024;
    /// Return-address-stack depth.
    pub const RAS_SIZE: usize = 16;

    /// Cycles of no commits before the deadlock watchdog fires fatally.
    pub const DEADLOCK_THRESHOLD: u64 = 1_000_000;
    /// Cycles of no commits before a silent emergency pipeline flush.
    /// Deliberately well short of `DEADLOCK_THRESHOLD` so recovery has a
    /// chance to run before the fatal watchdog does.
    pub const EMERGENCY_RECOVERY_THRESHOLD: u64 = 100_000;
    /// Uncore cycles between heartbeat lines on stderr.
    pub const HEARTBEAT_FREQUENCY: u64 = 100_000;
    /// Ratio of uncore clock ticks per CPU clock tick (uncore is faster).
    pub const UNCORE_CLOCK_RATIO: u32 = 1;

    /// Shadow Mop queue capacity (confirmed handshakes retained for replay).
    pub const SHADOW_MOPQ_SIZE: usize = 64;

    fn default_predictor_spec() -> String {
        "static".to_owned()
    }

    fn default_prefetcher_spec() -> String {
        "none".to_owned()
    }

    fn default_mdp_spec() -> String {
        "none".to_owned()
    }

    fn default_dram_spec() -> String {
        "fixed".to_owned()
    }

    fn default_mshr_order() -> String {
        "RPWB".to_owned()
    }

    pub(super) use default_dram_spec as dram_spec;
    pub(super) use default_mdp_spec as mdp_spec;
    pub(super) use default_mshr_order as mshr_order;
    pub(super) use default_predictor_spec as predictor_spec;
    pub(super) use default_prefetcher_spec as prefetcher_spec;
}

/// Cache line replacement algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// True LRU, full recency stack per set.
    #[default]
    Lru,
    /// Tree-based pseudo-LRU.
    Plru,
    /// Most-recently-used (evicts the line just touched).
    Mru,
    /// Not-most-recently-used (evicts uniformly among all but the MRU way).
    Nmru,
    /// Clock/second-chance approximation of LRU.
    Clock,
    /// Uniform random eviction.
    Random,
}

/// One cache level's configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Whether this level is present at all (L3/LLC may be disabled).
    #[serde(default = "CacheConfig::default_enabled")]
    pub enabled: bool,
    /// Capacity in bytes.
    pub size_bytes: usize,
    /// Line size in bytes.
    #[serde(default = "defaults_cache_line_bytes")]
    pub line_bytes: usize,
    /// Associativity (ways per set).
    pub ways: usize,
    /// Number of independent access ports (banks).
    #[serde(default = "CacheConfig::default_banks")]
    pub banks: usize,
    /// Access latency, cycles.
    pub latency: u32,
    /// Total MSHR entries (miss + writeback).
    pub mshr_size: usize,
    /// Writeback-only MSHR entries (subset of `mshr_size`).
    pub mshr_wb_size: usize,
    /// Replacement policy.
    #[serde(default)]
    pub policy: ReplacementPolicy,
    /// Prefetcher spec string, parsed by [`crate::cache::prefetch`].
    #[serde(default = "defaults::prefetcher_spec")]
    pub prefetcher_spec: String,
    /// Prefetch-request FIFO depth.
    #[serde(default = "CacheConfig::default_prefetch_fifo")]
    pub prefetch_fifo: usize,
    /// Prefetch filter/threshold/max/watermark knobs, forwarded verbatim
    /// to the prefetcher constructor named by `prefetcher_spec`.
    #[serde(default)]
    pub prefetch_threshold: u32,
    /// See `prefetch_threshold`.
    #[serde(default)]
    pub prefetch_max_outstanding: usize,
    /// If set, `access()` draws a uniform random value and forces a hit at
    /// this rate without touching replacement state (magic-hit calibration).
    #[serde(default)]
    pub magic_hit_rate: Option<f64>,
    /// Per-command MSHR allocation priority, e.g. `"RPWB"`.
    #[serde(default = "defaults::mshr_order")]
    pub mshr_order: String,
}

fn defaults_cache_line_bytes() -> usize {
    defaults::CACHE_LINE_BYTES
}

impl CacheConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_banks() -> usize {
        1
    }

    fn default_prefetch_fifo() -> usize {
        8
    }

    /// L1-sized defaults, used when a config omits a per-core cache block.
    #[must_use]
    pub fn l1_defaults() -> Self {
        Self {
            enabled: true,
            size_bytes: defaults::L1_SIZE_BYTES,
            line_bytes: defaults::CACHE_LINE_BYTES,
            ways: defaults::L1_WAYS,
            banks: defaults::L1_BANKS,
            latency: defaults::L1_LATENCY,
            mshr_size: defaults::L1_MSHR_SIZE,
            mshr_wb_size: defaults::L1_MSHR_WB_SIZE,
            policy: ReplacementPolicy::default(),
            prefetcher_spec: defaults::prefetcher_spec(),
            prefetch_fifo: Self::default_prefetch_fifo(),
            prefetch_threshold: 0,
            prefetch_max_outstanding: 0,
            magic_hit_rate: None,
            mshr_order: defaults::mshr_order(),
        }
    }

    /// L2-sized defaults.
    #[must_use]
    pub fn l2_defaults() -> Self {
        Self {
            size_bytes: defaults::L2_SIZE_BYTES,
            ways: defaults::L2_WAYS,
            banks: defaults::L2_BANKS,
            latency: defaults::L2_LATENCY,
            mshr_size: defaults::L2_MSHR_SIZE,
            mshr_wb_size: defaults::L2_MSHR_WB_SIZE,
            ..Self::l1_defaults()
        }
    }
}

/// Per-core fetch-stage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Raw instruction-byte queue capacity.
    pub byte_queue_size: usize,
    /// Decoupled fetch instruction-queue depth (Mops awaiting decode).
    pub iq_size: usize,
    /// Fetch pipeline depth, cycles.
    pub depth: u32,
    /// Mops fetched per cycle.
    pub width: usize,
    /// Max taken branches predicted per cycle.
    pub branch_limit: usize,
    /// Bubble cycles before a misprediction redirect takes effect.
    pub jeclear_delay: u32,
    /// Branch-predictor spec string.
    pub predictor_spec: String,
    /// BTB entry count.
    pub btb_size: usize,
    /// Return-address-stack depth.
    pub ras_size: usize,
    /// ITLB entry count.
    pub itlb_size: usize,
    /// L1 instruction-cache config.
    pub il1: CacheConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            byte_queue_size: defaults::FETCH_BYTE_QUEUE,
            iq_size: defaults::FETCH_IQ_SIZE,
            depth: defaults::FETCH_DEPTH,
            width: defaults::FETCH_WIDTH,
            branch_limit: defaults::FETCH_BRANCH_LIMIT,
            jeclear_delay: defaults::JECLEAR_DELAY,
            predictor_spec: defaults::predictor_spec(),
            btb_size: defaults::BTB_SIZE,
            ras_size: defaults::RAS_SIZE,
            itlb_size: defaults::ITLB_SIZE,
            il1: CacheConfig::l1_defaults(),
        }
    }
}

/// Per-core decode-stage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Decode pipeline depth, cycles.
    pub depth: u32,
    /// Mops decoded per cycle.
    pub width: usize,
    /// Per-decoder-unit width (e.g. `[4, 1, 1]` for one complex + two simple).
    pub decoder_widths: Vec<usize>,
    /// Microsequencer latency for microcoded Mops, cycles.
    pub ms_latency: u32,
    /// uop queue depth feeding alloc.
    pub uopq_size: usize,
    /// Enable load-op / load-op-store / fp-load-op fusion.
    pub fusion_enabled: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            depth: defaults::DECODE_DEPTH,
            width: defaults::DECODE_WIDTH,
            decoder_widths: vec![defaults::DECODE_WIDTH],
            ms_latency: defaults::MS_LATENCY,
            uopq_size: defaults::UOPQ_SIZE,
            fusion_enabled: true,
        }
    }
}

/// Per-core alloc/rename-stage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AllocConfig {
    /// Alloc pipeline depth, cycles.
    pub depth: u32,
    /// uops allocated per cycle.
    pub width: usize,
    /// If true, a full ROB/RS/LDQ/STQ stalls alloc by draining and
    /// reflushing fetch rather than backpressuring cycle-by-cycle.
    pub drain_flush: bool,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            depth: defaults::ALLOC_DEPTH,
            width: defaults::ALLOC_WIDTH,
            drain_flush: false,
        }
    }
}

/// Per-functional-unit-class latency/throughput/port binding.
#[derive(Debug, Clone, Deserialize)]
pub struct FuConfig {
    /// Execution ports this class may issue to.
    pub ports: Vec<usize>,
    /// Latency, cycles, from issue to result.
    pub latency: u32,
    /// Cycles between successive issues to the same unit (reciprocal
    /// throughput); 1 means fully pipelined.
    pub issue_rate: u32,
}

/// Per-core execute-stage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Reservation-station entry count.
    pub rs_size: usize,
    /// Load-queue entry count.
    pub ldq_size: usize,
    /// Store-queue entry count.
    pub stq_size: usize,
    /// Number of execution ports.
    pub num_exec_ports: usize,
    /// Per functional-unit-class config (keyed by [`crate::model::uop::FuClass`]
    /// discriminant name).
    pub fu: std::collections::HashMap<String, FuConfig>,
    /// If true, a unit stalled for `tornado_breaker_threshold` cycles is
    /// force-drained (see design note on the "tornado breaker").
    pub tornado_breaker_enabled: bool,
    /// Threshold for the tornado breaker.
    pub tornado_breaker_threshold: u32,
    /// Issue-width throttle applied once the RS is more than this
    /// fraction full, to avoid pathological replay storms.
    pub partial_throttle_occupancy: f64,
    /// Memory-dependence predictor spec string.
    pub mdp_spec: String,
    /// Reserved for forward config-file compatibility; not used by this
    /// simulator (no instruction repeater/fast-forwarding mode).
    pub repeater_spec: String,
    /// L1 data-cache config.
    pub dl1: CacheConfig,
    /// L2 data-cache config (private per core).
    pub dl2: CacheConfig,
    /// DTLB entry count.
    pub dtlb_size: usize,
    /// Second-level DTLB entry count.
    pub dtlb2_size: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            rs_size: defaults::RS_SIZE,
            ldq_size: defaults::LDQ_SIZE,
            stq_size: defaults::STQ_SIZE,
            num_exec_ports: defaults::NUM_EXEC_PORTS,
            fu: std::collections::HashMap::new(),
            tornado_breaker_enabled: true,
            tornado_breaker_threshold: 1_000,
            partial_throttle_occupancy: 0.875,
            mdp_spec: defaults::mdp_spec(),
            repeater_spec: String::new(),
            dl1: CacheConfig::l1_defaults(),
            dl2: CacheConfig::l2_defaults(),
            dtlb_size: defaults::DTLB_SIZE,
            dtlb2_size: defaults::DTLB_SIZE,
        }
    }
}

/// Per-core commit-stage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Reorder-buffer entry count.
    pub rob_size: usize,
    /// Mops committed per cycle.
    pub width: usize,
    /// Taken branches committed per cycle.
    pub branch_limit: usize,
    /// Cycles a ready Mop waits before actually retiring.
    pub pre_commit_depth: u32,
    /// Cycles without a commit before the fatal deadlock watchdog fires.
    pub deadlock_threshold: u64,
    /// Cycles without a commit before a silent emergency recovery flush.
    pub emergency_recovery_threshold: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            rob_size: defaults::ROB_SIZE,
            width: defaults::COMMIT_WIDTH,
            branch_limit: defaults::COMMIT_BRANCH_LIMIT,
            pre_commit_depth: defaults::PRE_COMMIT_DEPTH,
            deadlock_threshold: defaults::DEADLOCK_THRESHOLD,
            emergency_recovery_threshold: defaults::EMERGENCY_RECOVERY_THRESHOLD,
        }
    }
}

/// One core's full configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Fetch-stage config.
    pub fetch: FetchConfig,
    /// Decode-stage config.
    pub decode: DecodeConfig,
    /// Alloc-stage config.
    pub alloc: AllocConfig,
    /// Execute-stage config.
    pub exec: ExecConfig,
    /// Commit-stage config.
    pub commit: CommitConfig,
    /// Shadow Mop queue (nuke replay buffer) capacity.
    pub shadow_mopq_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            decode: DecodeConfig::default(),
            alloc: AllocConfig::default(),
            exec: ExecConfig::default(),
            commit: CommitConfig::default(),
            shadow_mopq_size: defaults::SHADOW_MOPQ_SIZE,
        }
    }
}

/// System-wide configuration: core count, heartbeat, tracing, assertions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Number of cores to simulate.
    pub num_cores: usize,
    /// Uncore cycles between heartbeat lines on stderr.
    pub heartbeat_frequency: u64,
    /// Per-core trace filename pattern (`{core}` substituted), or empty
    /// to disable tracing.
    pub ztrace_filename: String,
    /// Per-core trace circular-buffer capacity (records).
    pub trace_buffer_capacity: usize,
    /// On an invariant-violation assertion failure, spin instead of
    /// exiting, so a debugger can attach.
    pub assert_spin: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            num_cores: 1,
            heartbeat_frequency: defaults::HEARTBEAT_FREQUENCY,
            ztrace_filename: String::new(),
            trace_buffer_capacity: 4096,
            assert_spin: false,
        }
    }
}

/// Uncore (shared LLC / FSB / memory controller) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UncoreConfig {
    /// Last-level cache config.
    pub llc: CacheConfig,
    /// LLC MSHR allocation priority order, e.g. `"RPWB"`.
    pub llc_mshr_order: String,
    /// Front-side bus width, bytes per transfer.
    pub fsb_width_bytes: usize,
    /// Front-side bus clock ratio relative to uncore clock.
    pub fsb_speed_ratio: u32,
    /// True if the front-side bus is double-data-rate.
    pub fsb_ddr: bool,
    /// Front-side bus round trip latency, uncore cycles.
    pub fsb_roundtrip: u32,
    /// Memory-controller / DRAM policy spec string.
    pub dram_spec: String,
    /// Ratio of uncore clock ticks per CPU clock tick.
    pub uncore_clock_ratio: u32,
}

impl Default for UncoreConfig {
    fn default() -> Self {
        Self {
            llc: CacheConfig {
                size_bytes: defaults::LLC_SIZE_BYTES,
                ways: defaults::LLC_WAYS,
                banks: defaults::LLC_BANKS,
                latency: defaults::LLC_LATENCY,
                mshr_size: defaults::LLC_MSHR_SIZE,
                mshr_wb_size: defaults::LLC_MSHR_WB_SIZE,
                ..CacheConfig::l1_defaults()
            },
            llc_mshr_order: defaults::mshr_order(),
            fsb_width_bytes: defaults::FSB_WIDTH_BYTES,
            fsb_speed_ratio: defaults::FSB_SPEED_RATIO,
            fsb_ddr: true,
            fsb_roundtrip: defaults::FSB_ROUNDTRIP,
            dram_spec: defaults::dram_spec(),
            uncore_clock_ratio: defaults::UNCORE_CLOCK_RATIO,
        }
    }
}

/// Root configuration structure.
///
/// Deserialized from the JSON file named by the CLI's `-c/--config <path>`
/// flag. Every field has a default, so a config file only needs to name
/// what it overrides.
///
/// # Examples
/// ```
/// use x86sim_core::Config;
/// let config = Config::default();
/// assert_eq!(config.system.num_cores, 1);
/// assert_eq!(config.cores.len(), 1);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// System-wide settings.
    pub system: SystemConfig,
    /// Per-core settings, one entry per core (padded/truncated to
    /// `system.num_cores` at load time via [`Config::normalize`]).
    pub cores: Vec<CoreConfig>,
    /// Shared uncore settings.
    pub uncore: UncoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        let system = SystemConfig::default();
        let cores = vec![CoreConfig::default(); system.num_cores];
        Self {
            system,
            cores,
            uncore: UncoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads and parses a config file, then normalizes `cores` to match
    /// `system.num_cores`.
    ///
    /// # Errors
    /// Returns [`crate::SimError::Io`] if the file cannot be read, or
    /// [`crate::SimError::Config`] if it is not valid JSON for this shape.
    pub fn load(path: &std::path::Path) -> Result<Self, crate::common::SimError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&text)
            .map_err(|e| crate::common::SimError::Config(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    /// Pads or truncates `cores` to exactly `system.num_cores` entries,
    /// repeating the last entry (or the default) as needed.
    pub fn normalize(&mut self) {
        let want = self.system.num_cores.max(1);
        if self.cores.is_empty() {
            self.cores.push(CoreConfig::default());
        }
        while self.cores.len() < want {
            let last = self.cores.last().cloned().unwrap_or_default();
            self.cores.push(last);
        }
        self.cores.truncate(want);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_one_core() {
        let config = Config::default();
        assert_eq!(config.cores.len(), 1);
        assert_eq!(config.system.num_cores, 1);
    }

    #[test]
    fn normalize_pads_cores_to_num_cores() {
        let mut config = Config {
            system: SystemConfig {
                num_cores: 3,
                ..SystemConfig::default()
            },
            cores: vec![CoreConfig::default()],
            uncore: UncoreConfig::default(),
        };
        config.normalize();
        assert_eq!(config.cores.len(), 3);
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let json = r#"{"system": {"num_cores": 2}}"#;
        let mut config: Config = serde_json::from_str(json).unwrap();
        config.normalize();
        assert_eq!(config.system.num_cores, 2);
        assert_eq!(config.cores.len(), 2);
        assert_eq!(config.cores[0].commit.rob_size, defaults::ROB_SIZE);
    }

    #[test]
    fn cache_config_replacement_policy_parses_uppercase() {
        let json = r#"{"size_bytes": 4096, "ways": 4, "latency": 1, "mshr_size": 4, "mshr_wb_size": 1, "policy": "PLRU"}"#;
        let cache: CacheConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cache.policy, ReplacementPolicy::Plru);
    }
}
