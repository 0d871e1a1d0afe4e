//! The instruction-feeder boundary (§6): the external collaborator that
//! supplies the oracle with a dataflow-annotated instruction stream and
//! resolves virtual addresses and warmup accesses. This crate drives it
//! but never originates instruction bytes or register values itself.

use std::collections::VecDeque;

use crate::common::SimError;

/// One instruction handed from the feeder to a core's oracle.
///
/// Carries everything §6 lists: raw bytes for the decoder, and an
/// architected register-state snapshot the oracle uses to seed dataflow
/// for this instruction's inputs.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Program counter.
    pub pc: u64,
    /// Raw instruction bytes, length ≤ 15.
    pub bytes: Vec<u8>,
    /// Architected register values live at this point, keyed by register
    /// index; only as many entries as the instruction reads.
    pub arch_regs: Vec<(u16, u64)>,
    /// True if the feeder is speculating (has not yet confirmed this
    /// instruction actually executes architecturally).
    pub speculative: bool,
}

/// Why [`Feeder::next_handshake`] could not return a handshake this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederStall {
    /// The core's shadow buffer is full; the feeder won't speculate
    /// further ahead until it drains.
    HandshakeNotConsumed,
    /// The feeder has no more instructions (program exit).
    EndOfStream,
}

/// The feeder boundary this crate consumes (§6).
pub trait Feeder: Send + Sync {
    /// Returns the next handshake for `core_id`, or `Err` if none is
    /// available right now.
    fn next_handshake(&mut self, core_id: usize) -> Result<Handshake, FeederStall>;

    /// Translates a virtual address to a physical address for `asid`.
    fn v2p_translate(&self, asid: u32, vaddr: u64) -> u64;

    /// Issues a cache-warmup access (no timing effect, just touches
    /// replacement/fill state) for `asid`.
    fn warmup(&mut self, asid: u32, vaddr: u64, is_write: bool);

    /// Activates a core (it may now request handshakes).
    fn activate_core(&mut self, core_id: usize);

    /// Deactivates a core; once deactivated the master-core rendezvous
    /// no longer waits on it.
    fn deactivate_core(&mut self, core_id: usize);

    /// True if `core_id` is currently active.
    fn is_core_active(&self, core_id: usize) -> bool;
}

impl Feeder for Box<dyn Feeder> {
    fn next_handshake(&mut self, core_id: usize) -> Result<Handshake, FeederStall> {
        (**self).next_handshake(core_id)
    }

    fn v2p_translate(&self, asid: u32, vaddr: u64) -> u64 {
        (**self).v2p_translate(asid, vaddr)
    }

    fn warmup(&mut self, asid: u32, vaddr: u64, is_write: bool) {
        (**self).warmup(asid, vaddr, is_write);
    }

    fn activate_core(&mut self, core_id: usize) {
        (**self).activate_core(core_id);
    }

    fn deactivate_core(&mut self, core_id: usize) {
        (**self).deactivate_core(core_id);
    }

    fn is_core_active(&self, core_id: usize) -> bool {
        (**self).is_core_active(core_id)
    }
}

/// A reference [`Feeder`] reading a fixed in-memory instruction list
/// (for tests) or a simple line-oriented trace file (for the CLI).
///
/// Each trace line is `<hex pc> <hex bytes> [reg=value ...]`; blank lines
/// and lines starting with `#` are skipped.
pub struct TraceFeeder {
    per_core: Vec<VecDeque<Handshake>>,
    active: Vec<bool>,
    identity_map: bool,
}

impl TraceFeeder {
    /// Builds a feeder from an explicit list of handshakes, all fed to
    /// core 0 — the common case in unit/integration tests.
    #[must_use]
    pub fn from_handshakes(handshakes: Vec<Handshake>) -> Self {
        Self {
            per_core: vec![VecDeque::from(handshakes)],
            active: vec![true],
            identity_map: true,
        }
    }

    /// Builds a multi-core feeder, one handshake list per core.
    #[must_use]
    pub fn from_per_core(streams: Vec<Vec<Handshake>>) -> Self {
        let active = vec![true; streams.len()];
        Self {
            per_core: streams.into_iter().map(VecDeque::from).collect(),
            active,
            identity_map: true,
        }
    }

    /// Parses a trace file into a single-core feeder.
    ///
    /// # Errors
    /// Returns [`SimError::Io`] if the file cannot be read, or
    /// [`SimError::Config`] if a non-comment, non-blank line is malformed.
    pub fn from_trace_file(path: &std::path::Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        let mut handshakes = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            handshakes.push(parse_trace_line(line).map_err(|e| {
                SimError::Config(format!("trace line {}: {e}", lineno + 1))
            })?);
        }
        Ok(Self::from_handshakes(handshakes))
    }
}

fn parse_trace_line(line: &str) -> Result<Handshake, String> {
    let mut fields = line.split_whitespace();
    let pc = fields
        .next()
        .ok_or_else(|| "missing pc".to_owned())
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string()))?;
    let bytes_field = fields.next().ok_or_else(|| "missing bytes".to_owned())?;
    let bytes = (0..bytes_field.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&bytes_field[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect::<Result<Vec<u8>, _>>()?;
    let mut arch_regs = Vec::new();
    for field in fields {
        let (reg, val) = field
            .split_once('=')
            .ok_or_else(|| format!("malformed register field '{field}'"))?;
        let reg: u16 = reg.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
        let val = u64::from_str_radix(val.trim_start_matches("0x"), 16).map_err(|e| e.to_string())?;
        arch_regs.push((reg, val));
    }
    Ok(Handshake {
        pc,
        bytes,
        arch_regs,
        speculative: false,
    })
}

impl Feeder for TraceFeeder {
    fn next_handshake(&mut self, core_id: usize) -> Result<Handshake, FeederStall> {
        self.per_core
            .get_mut(core_id)
            .and_then(VecDeque::pop_front)
            .ok_or(FeederStall::EndOfStream)
    }

    fn v2p_translate(&self, _asid: u32, vaddr: u64) -> u64 {
        debug_assert!(self.identity_map, "only identity mapping is modeled");
        vaddr
    }

    fn warmup(&mut self, _asid: u32, _vaddr: u64, _is_write: bool) {}

    fn activate_core(&mut self, core_id: usize) {
        if let Some(slot) = self.active.get_mut(core_id) {
            *slot = true;
        }
    }

    fn deactivate_core(&mut self, core_id: usize) {
        if let Some(slot) = self.active.get_mut(core_id) {
            *slot = false;
        }
    }

    fn is_core_active(&self, core_id: usize) -> bool {
        self.active.get(core_id).copied().unwrap_or(false)
    }
}
