//! The instruction-decoder boundary (§6): this crate consumes decoded
//! instructions and cracks them into uop flows, but owns neither x86
//! decoding nor ISA semantics — those live with the external feeder.

use smallvec::SmallVec;

use crate::model::uop::{ArchReg, FuClass};

/// A memory operand descriptor for an instruction that touches memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemOperand {
    /// Base register, or [`ArchReg::NONE`].
    pub base: ArchReg,
    /// Index register, or [`ArchReg::NONE`].
    pub index: ArchReg,
    /// Scale factor applied to `index` (1, 2, 4, or 8).
    pub scale: u8,
    /// Signed displacement.
    pub displacement: i32,
    /// Access size in bytes.
    pub size: u8,
    /// True if this operand is written (store/RMW) rather than only read.
    pub is_write: bool,
}

/// One decoded x86 instruction, as handed to this crate by the external
/// decoder.
#[derive(Debug, Clone)]
pub struct DecodedInsn {
    /// Opcode mnemonic, e.g. `"ADD"`, `"MOV"`, `"JZ"`. Opaque to this
    /// crate beyond table lookup in [`UopCracker`] implementations.
    pub mnemonic: String,
    /// Up to three input (source) register operands.
    pub inputs: SmallVec<[ArchReg; 3]>,
    /// Up to two output (destination) register operands.
    pub outputs: SmallVec<[ArchReg; 2]>,
    /// Immediate operand, if any.
    pub immediate: Option<i64>,
    /// Memory operand, if this instruction touches memory.
    pub mem_operand: Option<MemOperand>,
    /// Instruction length in bytes (≤ 15 per the x86 encoding limit).
    pub length: u8,
    /// True if this is a control-flow instruction (branch/call/jump/ret).
    pub is_control: bool,
    /// True if this is a floating-point instruction.
    pub is_fp: bool,
    /// True if this is a serializing instruction (CPUID/INT/HLT) that
    /// must drain the pipeline before executing.
    pub is_serializing: bool,
}

/// One template uop within a [`UopFlow`]: everything [`UopCracker`] knows
/// about a uop before it is bound to concrete register/address values by
/// decode/alloc.
#[derive(Debug, Clone, Copy)]
pub struct UopTemplate {
    /// Functional-unit class this uop issues to.
    pub fu_class: FuClass,
    /// True if this uop is a memory load.
    pub is_load: bool,
    /// True if this uop computes a store address.
    pub is_sta: bool,
    /// True if this uop supplies store data.
    pub is_std: bool,
    /// True if this uop only computes an address (AGEN, no access).
    pub is_agen: bool,
    /// True if this uop is control flow.
    pub is_ctrl: bool,
    /// True if this uop is a fence.
    pub is_fence: bool,
    /// True if this uop is an architectural no-op.
    pub is_nop: bool,
}

/// The uop flow one [`DecodedInsn`] cracks into: 1-4 uops for the common
/// case, occasionally more for a microcoded instruction.
pub type UopFlow = SmallVec<[UopTemplate; 4]>;

/// The raw-bytes-to-[`DecodedInsn`] boundary.
///
/// Full x86 instruction decoding (prefixes, ModRM/SIB, immediate
/// encodings) is out of scope for this crate; [`TableDecoder`] is a
/// fixed single-byte-opcode reference implementation covering the same
/// instruction set [`TableCracker`] cracks, sufficient to drive the
/// testable scenarios. A production deployment supplies its own
/// [`Decoder`] backed by a real x86 decode library.
pub trait Decoder: Send + Sync {
    /// Decodes the instruction at the start of `bytes`, returning it and
    /// the byte length consumed, or `None` if the leading byte is not in
    /// this decoder's table.
    fn decode(&self, bytes: &[u8]) -> Option<DecodedInsn>;
}

impl Decoder for Box<dyn Decoder> {
    fn decode(&self, bytes: &[u8]) -> Option<DecodedInsn> {
        (**self).decode(bytes)
    }
}

/// Fixed single-byte-opcode decoder mirroring [`TableCracker`]'s mnemonic
/// coverage.
#[derive(Debug, Default)]
pub struct TableDecoder;

impl TableDecoder {
    fn reg_at(bytes: &[u8], offset: usize) -> ArchReg {
        bytes.get(offset).map_or(ArchReg::NONE, |&b| ArchReg(u16::from(b)))
    }
}

impl Decoder for TableDecoder {
    fn decode(&self, bytes: &[u8]) -> Option<DecodedInsn> {
        let opcode = *bytes.first()?;
        let dst = Self::reg_at(bytes, 1);
        let src = Self::reg_at(bytes, 2);

        let alu = |mnemonic: &str| DecodedInsn {
            mnemonic: mnemonic.to_owned(),
            inputs: SmallVec::from_slice(&[dst, src]),
            outputs: SmallVec::from_slice(&[dst]),
            immediate: None,
            mem_operand: None,
            length: 3,
            is_control: false,
            is_fp: false,
            is_serializing: false,
        };

        match opcode {
            0x01 => Some(alu("ADD")),
            0x29 => Some(alu("SUB")),
            0x21 => Some(alu("AND")),
            0x09 => Some(alu("OR")),
            0x31 => Some(alu("XOR")),
            0x39 => Some(alu("CMP")),
            0x85 => Some(alu("TEST")),
            0x89 => Some(DecodedInsn {
                mnemonic: "MOV".to_owned(),
                inputs: SmallVec::from_slice(&[src]),
                outputs: SmallVec::new(),
                immediate: None,
                mem_operand: Some(MemOperand {
                    base: dst,
                    index: ArchReg::NONE,
                    scale: 1,
                    displacement: 0,
                    size: 8,
                    is_write: true,
                }),
                length: 3,
                is_control: false,
                is_fp: false,
                is_serializing: false,
            }),
            0x8B => Some(DecodedInsn {
                mnemonic: "MOV".to_owned(),
                inputs: SmallVec::new(),
                outputs: SmallVec::from_slice(&[dst]),
                immediate: None,
                mem_operand: Some(MemOperand {
                    base: src,
                    index: ArchReg::NONE,
                    scale: 1,
                    displacement: 0,
                    size: 8,
                    is_write: false,
                }),
                length: 3,
                is_control: false,
                is_fp: false,
                is_serializing: false,
            }),
            0x88 => Some(DecodedInsn {
                mnemonic: "MOV".to_owned(),
                inputs: SmallVec::from_slice(&[dst, src]),
                outputs: SmallVec::from_slice(&[dst]),
                immediate: None,
                mem_operand: None,
                length: 3,
                is_control: false,
                is_fp: false,
                is_serializing: false,
            }),
            0x74 | 0x75 | 0xEB => Some(DecodedInsn {
                mnemonic: match opcode {
                    0x74 => "JZ".to_owned(),
                    0x75 => "JNZ".to_owned(),
                    _ => "JMP".to_owned(),
                },
                inputs: SmallVec::new(),
                outputs: SmallVec::new(),
                immediate: bytes.get(1).map(|&b| i64::from(b as i8)),
                mem_operand: None,
                length: 2,
                is_control: true,
                is_fp: false,
                is_serializing: false,
            }),
            0x0F | 0xCD | 0xF4 => Some(DecodedInsn {
                mnemonic: match opcode {
                    0x0F => "CPUID".to_owned(),
                    0xCD => "INT".to_owned(),
                    _ => "HLT".to_owned(),
                },
                inputs: SmallVec::new(),
                outputs: SmallVec::new(),
                immediate: None,
                mem_operand: None,
                length: 2,
                is_control: false,
                is_fp: false,
                is_serializing: true,
            }),
            0x90 => Some(DecodedInsn {
                mnemonic: "NOP".to_owned(),
                inputs: SmallVec::new(),
                outputs: SmallVec::new(),
                immediate: None,
                mem_operand: None,
                length: 1,
                is_control: false,
                is_fp: false,
                is_serializing: false,
            }),
            _ => None,
        }
    }
}

/// Cracks a decoded instruction into its uop flow.
///
/// Implementations are free to consult `insn.mnemonic` however they like;
/// this crate does not interpret mnemonics itself.
pub trait UopCracker: Send + Sync {
    /// Returns the uop flow for `insn`, or `None` if the mnemonic is not
    /// recognized (the caller turns this into
    /// [`crate::common::Fault::UnknownOpcode`]).
    fn crack(&self, insn: &DecodedInsn) -> Option<UopFlow>;
}

impl UopCracker for Box<dyn UopCracker> {
    fn crack(&self, insn: &DecodedInsn) -> Option<UopFlow> {
        (**self).crack(insn)
    }
}

/// A small static-table cracker covering the handful of mnemonics needed
/// to exercise the testable scenarios in §8: ALU ops, load/store moves,
/// conditional jumps, and the three serializing traps.
#[derive(Debug, Default)]
pub struct TableCracker;

impl TableCracker {
    fn single(t: UopTemplate) -> UopFlow {
        let mut flow = UopFlow::new();
        flow.push(t);
        flow
    }

    fn alu() -> UopTemplate {
        UopTemplate {
            fu_class: FuClass::IntAlu,
            is_load: false,
            is_sta: false,
            is_std: false,
            is_agen: false,
            is_ctrl: false,
            is_fence: false,
            is_nop: false,
        }
    }
}

impl UopCracker for TableCracker {
    fn crack(&self, insn: &DecodedInsn) -> Option<UopFlow> {
        match insn.mnemonic.as_str() {
            "ADD" | "SUB" | "AND" | "OR" | "XOR" | "CMP" | "TEST" => {
                Some(Self::single(Self::alu()))
            }
            "MOV" if insn.mem_operand.is_some_and(|m| !m.is_write) => Some(Self::single(UopTemplate {
                is_load: true,
                ..Self::alu()
            })),
            "MOV" if insn.mem_operand.is_some_and(|m| m.is_write) => {
                let mut flow = UopFlow::new();
                flow.push(UopTemplate {
                    is_sta: true,
                    is_agen: true,
                    ..Self::alu()
                });
                flow.push(UopTemplate {
                    is_std: true,
                    ..Self::alu()
                });
                Some(flow)
            }
            "MOV" => Some(Self::single(Self::alu())),
            "JZ" | "JNZ" | "JMP" | "JE" | "JNE" => Some(Self::single(UopTemplate {
                fu_class: FuClass::Branch,
                is_ctrl: true,
                ..Self::alu()
            })),
            "CPUID" | "INT" | "HLT" => Some(Self::single(UopTemplate {
                fu_class: FuClass::IntAlu,
                is_fence: true,
                ..Self::alu()
            })),
            "NOP" => Some(Self::single(UopTemplate {
                is_nop: true,
                ..Self::alu()
            })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insn(mnemonic: &str) -> DecodedInsn {
        DecodedInsn {
            mnemonic: mnemonic.to_owned(),
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            immediate: None,
            mem_operand: None,
            length: 2,
            is_control: false,
            is_fp: false,
            is_serializing: false,
        }
    }

    #[test]
    fn cracks_simple_alu_op() {
        let cracker = TableCracker;
        let flow = cracker.crack(&insn("ADD")).unwrap();
        assert_eq!(flow.len(), 1);
    }

    #[test]
    fn cracks_store_into_sta_std_pair() {
        let cracker = TableCracker;
        let mut mov = insn("MOV");
        mov.mem_operand = Some(MemOperand {
            base: ArchReg(0),
            index: ArchReg::NONE,
            scale: 1,
            displacement: 0,
            size: 4,
            is_write: true,
        });
        let flow = cracker.crack(&mov).unwrap();
        assert_eq!(flow.len(), 2);
        assert!(flow[0].is_sta);
        assert!(flow[1].is_std);
    }

    #[test]
    fn unknown_mnemonic_returns_none() {
        let cracker = TableCracker;
        assert!(cracker.crack(&insn("VFMADD231PS")).is_none());
    }

    #[test]
    fn table_decoder_decodes_add_with_register_operands() {
        let decoder = TableDecoder;
        let insn = decoder.decode(&[0x01, 3, 4]).unwrap();
        assert_eq!(insn.mnemonic, "ADD");
        assert_eq!(insn.outputs[0], ArchReg(3));
    }

    #[test]
    fn table_decoder_decodes_load_store_mov() {
        let decoder = TableDecoder;
        let load = decoder.decode(&[0x8B, 1, 2]).unwrap();
        assert!(load.mem_operand.is_some_and(|m| !m.is_write));
        let store = decoder.decode(&[0x89, 1, 2]).unwrap();
        assert!(store.mem_operand.is_some_and(|m| m.is_write));
    }

    #[test]
    fn table_decoder_rejects_unknown_opcode() {
        let decoder = TableDecoder;
        assert!(decoder.decode(&[0xFE]).is_none());
    }
}
