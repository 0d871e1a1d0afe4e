use x86sim_core::common::SimError;
use x86sim_core::config::{Config, FuConfig};
use x86sim_core::feeder::{Feeder, Handshake, TraceFeeder};
use x86sim_core::stats::SimStats;
use x86sim_core::Simulator;

/// Every functional-unit class name [`x86sim_core::model::uop::FuClass`]
/// can map to, matching `functional_units::class_key`.
const FU_CLASSES: [&str; 10] =
    ["IntAlu", "IntMul", "IntDiv", "Agen", "Load", "Store", "Branch", "FpAdd", "FpMul", "FpDiv"];

/// Builds a minimal single-core [`Simulator`] from an in-memory handshake
/// list, without a real decoder or feeder binary.
pub struct TestContext {
    config: Config,
    handshakes: Vec<Handshake>,
}

impl TestContext {
    /// A default single-core config, widened so every functional-unit
    /// class may issue one uop per execution port per cycle instead of
    /// falling back to the single-port default a config with no `fu`
    /// entries gets in production.
    #[must_use]
    pub fn new() -> Self {
        let mut config = Config::default();
        let num_ports = config.cores[0].exec.num_exec_ports.max(1);
        for class in FU_CLASSES {
            config.cores[0].exec.fu.insert(
                class.to_owned(),
                FuConfig { ports: (0..num_ports).collect(), latency: 1, issue_rate: 1 },
            );
        }
        Self { config, handshakes: Vec::new() }
    }

    /// Appends one handshake to the single core's instruction stream.
    #[must_use]
    pub fn with_handshake(mut self, hs: Handshake) -> Self {
        self.handshakes.push(hs);
        self
    }

    /// Mutates the config before the run, e.g. to shrink a deadlock
    /// threshold or a queue size for a targeted test.
    #[must_use]
    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    /// Builds and runs the simulator for at most `max_cycles` uncore
    /// cycles, returning the accumulated statistics.
    ///
    /// # Errors
    /// Propagates [`SimError::Deadlock`] if no core commits for
    /// `commit.deadlock_threshold` cycles.
    pub fn run(self, max_cycles: u64) -> Result<SimStats, SimError> {
        let feeder = Box::new(TraceFeeder::from_handshakes(self.handshakes)) as Box<dyn Feeder>;
        let simulator = Simulator::new(self.config, feeder).expect("harness config is always valid");
        simulator.run(Some(max_cycles))
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes `ADD dst, dst, src` in [`x86sim_core::decoder_iface::TableDecoder`]'s
/// single-byte-opcode scheme.
#[must_use]
pub fn add(dst: u8, src: u8) -> Vec<u8> {
    vec![0x01, dst, src]
}

/// Encodes `MOV [base], src` (a store).
#[must_use]
pub fn mov_store(base: u8, src: u8) -> Vec<u8> {
    vec![0x89, base, src]
}

/// Encodes `MOV dst, [base]` (a load).
#[must_use]
pub fn mov_load(dst: u8, base: u8) -> Vec<u8> {
    vec![0x8B, dst, base]
}

/// Encodes a conditional jump with an 8-bit signed displacement operand
/// (unused by the table decoder's control-flow handling itself — the
/// feeder's next handshake is what actually determines the resolved
/// target in this execution-driven model).
#[must_use]
pub fn jz(disp: i8) -> Vec<u8> {
    vec![0x74, disp as u8]
}

/// Builds a handshake carrying an architected register snapshot.
#[must_use]
pub fn handshake(pc: u64, bytes: Vec<u8>, regs: &[(u16, u64)]) -> Handshake {
    Handshake { pc, bytes, arch_regs: regs.to_vec(), speculative: false }
}
