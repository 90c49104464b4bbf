//! Instruction decoder for the 4004.
//!
//! Opcodes are one byte; the high nibble (OPR) selects a family and the
//! low nibble (OPA) carries a register, pair, condition or immediate.
//! Five families take a second byte: JCN, FIM, JUN, JMS and ISZ.
//!
//! Decoding is kept apart from execution so the nibble/parity split can be
//! checked against the whole opcode space on its own.

use crate::cpu::registers::RegisterPair;
use crate::nibble::split;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Clock periods in one machine cycle.
pub const CLOCKS_PER_CYCLE: u32 = 8;

/// JCN condition nibble: `C1 C2 C3 C4` from high to low bit.
///
/// - C1: invert the outcome
/// - C2: accumulator is zero
/// - C3: carry is set
/// - C4: TEST input is low
///
/// The selected tests are OR-ed, then C1 is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition(u8);

impl Condition {
    /// Jump if TEST = 0 (`JT`).
    pub const TEST: Condition = Condition(0x1);
    /// Jump if carry = 1 (`JC`).
    pub const CARRY: Condition = Condition(0x2);
    /// Jump if accumulator = 0 (`JZ`).
    pub const ZERO: Condition = Condition(0x4);
    /// Jump if TEST = 1 (`JNT`).
    pub const NO_TEST: Condition = Condition(0x9);
    /// Jump if carry = 0 (`JNC`).
    pub const NO_CARRY: Condition = Condition(0xA);
    /// Jump if accumulator != 0 (`JNZ`).
    pub const NONZERO: Condition = Condition(0xC);

    /// Build from the low nibble of a JCN opcode.
    pub const fn new(bits: u8) -> Self {
        Self(bits & 0xF)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn invert(self) -> bool {
        self.0 & 0x8 != 0
    }

    pub const fn on_zero(self) -> bool {
        self.0 & 0x4 != 0
    }

    pub const fn on_carry(self) -> bool {
        self.0 & 0x2 != 0
    }

    pub const fn on_test(self) -> bool {
        self.0 & 0x1 != 0
    }

    /// Evaluate against the accumulator, carry and TEST pin level.
    pub fn matches(self, acc: u8, carry: bool, test_high: bool) -> bool {
        let hit = (self.on_zero() && acc == 0)
            || (self.on_carry() && carry)
            || (self.on_test() && !test_high);
        hit != self.invert()
    }
}

/// Decoded 4004 instruction.
///
/// Register operands are raw indices (the semantics check them); pair
/// operands are already validated as even.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// No operation (0x00)
    Nop,

    // ==================== Control Transfer ====================

    /// Jump conditional to an 8-bit address: 1C AA
    Jcn { cond: Condition, addr: u8 },

    /// Jump unconditional: 4H LL
    Jun { addr: u16 },

    /// Jump to subroutine: 5H LL
    Jms { addr: u16 },

    /// Jump indirect through a pair: 3(2p+1)
    Jin { pair: RegisterPair },

    /// Increment register, jump if the result is zero: 7R AA
    Isz { reg: u8, addr: u8 },

    /// Return and load accumulator: CN
    Bbl { data: u8 },

    // ==================== Load / Move ====================

    /// Fetch immediate into a pair: 2(2p) DD
    Fim { pair: RegisterPair, data: u8 },

    /// Fetch indirect from ROM into a pair: 3(2p)
    Fin { pair: RegisterPair },

    /// Load accumulator immediate: DN
    Ldm { data: u8 },

    /// Load accumulator from register: AR
    Ld { reg: u8 },

    /// Exchange accumulator and register: BR
    Xch { reg: u8 },

    // ==================== Arithmetic ====================

    /// Increment register: 6R
    Inc { reg: u8 },

    /// Add register with carry: 8R
    Add { reg: u8 },

    /// Subtract register with borrow: 9R
    Sub { reg: u8 },

    // ==================== Memory ====================

    /// Send register control (latch data pointer): 2(2p+1)
    Src { pair: RegisterPair },

    /// Write main memory: E0
    Wrm,

    /// Write status character 0-3: E4-E7
    Wrs { index: u8 },

    /// Subtract main memory with borrow: E8
    Sbm,

    /// Read main memory: E9
    Rdm,

    /// Add main memory with carry: EB
    Adm,

    /// Read status character 0-3: EC-EF
    Rds { index: u8 },

    // ==================== Accumulator Group ====================

    Clb,
    Clc,
    Iac,
    Cmc,
    Cma,
    Ral,
    Rar,
    Tcc,
    Dac,
    Tcs,
    Stc,
    Daa,
    Kbp,
}

/// Number of bytes an opcode occupies, decided by family alone.
pub fn instruction_length(opcode: u8) -> u16 {
    let (opr, opa) = split(opcode);
    match opr {
        0x1 | 0x4 | 0x5 | 0x7 => 2,
        0x2 if opa & 1 == 0 => 2,
        _ => 1,
    }
}

/// Decode an opcode and its operand byte.
///
/// `operand` is ignored for one-byte instructions.
pub fn decode(opcode: u8, operand: u8) -> Result<Instruction, DecodeError> {
    let (opr, opa) = split(opcode);
    let pair = RegisterPair::from_number(opa >> 1);
    let odd = opa & 1 == 1;

    let instruction = match opr {
        0x0 if opa == 0 => Instruction::Nop,
        0x1 => Instruction::Jcn { cond: Condition::new(opa), addr: operand },
        0x2 if odd => Instruction::Src { pair },
        0x2 => Instruction::Fim { pair, data: operand },
        0x3 if odd => Instruction::Jin { pair },
        0x3 => Instruction::Fin { pair },
        0x4 => Instruction::Jun { addr: far_address(opa, operand) },
        0x5 => Instruction::Jms { addr: far_address(opa, operand) },
        0x6 => Instruction::Inc { reg: opa },
        0x7 => Instruction::Isz { reg: opa, addr: operand },
        0x8 => Instruction::Add { reg: opa },
        0x9 => Instruction::Sub { reg: opa },
        0xA => Instruction::Ld { reg: opa },
        0xB => Instruction::Xch { reg: opa },
        0xC => Instruction::Bbl { data: opa },
        0xD => Instruction::Ldm { data: opa },
        0xE => match opa {
            0x0 => Instruction::Wrm,
            0x4..=0x7 => Instruction::Wrs { index: opa - 0x4 },
            0x8 => Instruction::Sbm,
            0x9 => Instruction::Rdm,
            0xB => Instruction::Adm,
            0xC..=0xF => Instruction::Rds { index: opa - 0xC },
            // WMP, WRR, WPM, RDR: I/O ports are not emulated
            _ => return Err(DecodeError::IllegalOpcode(opcode)),
        },
        0xF => match opa {
            0x0 => Instruction::Clb,
            0x1 => Instruction::Clc,
            0x2 => Instruction::Iac,
            0x3 => Instruction::Cmc,
            0x4 => Instruction::Cma,
            0x5 => Instruction::Ral,
            0x6 => Instruction::Rar,
            0x7 => Instruction::Tcc,
            0x8 => Instruction::Dac,
            0x9 => Instruction::Tcs,
            0xA => Instruction::Stc,
            0xB => Instruction::Daa,
            0xC => Instruction::Kbp,
            // DCL selects RAM banks, which are not modeled; FE/FF are unassigned
            _ => return Err(DecodeError::IllegalOpcode(opcode)),
        },
        _ => return Err(DecodeError::IllegalOpcode(opcode)),
    };

    Ok(instruction)
}

fn far_address(high: u8, low: u8) -> u16 {
    ((high as u16) << 8) | low as u16
}

impl Instruction {
    /// Encoded length in bytes.
    pub fn length(&self) -> u16 {
        match self {
            Instruction::Jcn { .. }
            | Instruction::Fim { .. }
            | Instruction::Jun { .. }
            | Instruction::Jms { .. }
            | Instruction::Isz { .. } => 2,
            _ => 1,
        }
    }

    /// Clock periods consumed.
    ///
    /// One machine cycle per byte, except FIN which spends a second cycle
    /// fetching its data from ROM.
    pub fn cycles(&self) -> u32 {
        match self {
            Instruction::Fin { .. } => 2 * CLOCKS_PER_CYCLE,
            _ => self.length() as u32 * CLOCKS_PER_CYCLE,
        }
    }

    /// Assembler mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Nop => "NOP",
            Instruction::Jcn { .. } => "JCN",
            Instruction::Jun { .. } => "JUN",
            Instruction::Jms { .. } => "JMS",
            Instruction::Jin { .. } => "JIN",
            Instruction::Isz { .. } => "ISZ",
            Instruction::Bbl { .. } => "BBL",
            Instruction::Fim { .. } => "FIM",
            Instruction::Fin { .. } => "FIN",
            Instruction::Ldm { .. } => "LDM",
            Instruction::Ld { .. } => "LD",
            Instruction::Xch { .. } => "XCH",
            Instruction::Inc { .. } => "INC",
            Instruction::Add { .. } => "ADD",
            Instruction::Sub { .. } => "SUB",
            Instruction::Src { .. } => "SRC",
            Instruction::Wrm => "WRM",
            Instruction::Wrs { index } => ["WR0", "WR1", "WR2", "WR3"][(index & 0x3) as usize],
            Instruction::Sbm => "SBM",
            Instruction::Rdm => "RDM",
            Instruction::Adm => "ADM",
            Instruction::Rds { index } => ["RD0", "RD1", "RD2", "RD3"][(index & 0x3) as usize],
            Instruction::Clb => "CLB",
            Instruction::Clc => "CLC",
            Instruction::Iac => "IAC",
            Instruction::Cmc => "CMC",
            Instruction::Cma => "CMA",
            Instruction::Ral => "RAL",
            Instruction::Rar => "RAR",
            Instruction::Tcc => "TCC",
            Instruction::Dac => "DAC",
            Instruction::Tcs => "TCS",
            Instruction::Stc => "STC",
            Instruction::Daa => "DAA",
            Instruction::Kbp => "KBP",
        }
    }
}

/// Encode an instruction back to its bytes.
///
/// Operands are truncated to their field widths.
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let op = |opr: u8, opa: u8| (opr << 4) | (opa & 0xF);

    match *instr {
        Instruction::Nop => vec![0x00],
        Instruction::Jcn { cond, addr } => vec![op(0x1, cond.bits()), addr],
        Instruction::Jun { addr } => vec![op(0x4, (addr >> 8) as u8), addr as u8],
        Instruction::Jms { addr } => vec![op(0x5, (addr >> 8) as u8), addr as u8],
        Instruction::Jin { pair } => vec![op(0x3, pair.index() as u8 | 1)],
        Instruction::Isz { reg, addr } => vec![op(0x7, reg), addr],
        Instruction::Bbl { data } => vec![op(0xC, data)],
        Instruction::Fim { pair, data } => vec![op(0x2, pair.index() as u8), data],
        Instruction::Fin { pair } => vec![op(0x3, pair.index() as u8)],
        Instruction::Ldm { data } => vec![op(0xD, data)],
        Instruction::Ld { reg } => vec![op(0xA, reg)],
        Instruction::Xch { reg } => vec![op(0xB, reg)],
        Instruction::Inc { reg } => vec![op(0x6, reg)],
        Instruction::Add { reg } => vec![op(0x8, reg)],
        Instruction::Sub { reg } => vec![op(0x9, reg)],
        Instruction::Src { pair } => vec![op(0x2, pair.index() as u8 | 1)],
        Instruction::Wrm => vec![0xE0],
        Instruction::Wrs { index } => vec![0xE4 | (index & 0x3)],
        Instruction::Sbm => vec![0xE8],
        Instruction::Rdm => vec![0xE9],
        Instruction::Adm => vec![0xEB],
        Instruction::Rds { index } => vec![0xEC | (index & 0x3)],
        Instruction::Clb => vec![0xF0],
        Instruction::Clc => vec![0xF1],
        Instruction::Iac => vec![0xF2],
        Instruction::Cmc => vec![0xF3],
        Instruction::Cma => vec![0xF4],
        Instruction::Ral => vec![0xF5],
        Instruction::Rar => vec![0xF6],
        Instruction::Tcc => vec![0xF7],
        Instruction::Dac => vec![0xF8],
        Instruction::Tcs => vec![0xF9],
        Instruction::Stc => vec![0xFA],
        Instruction::Daa => vec![0xFB],
        Instruction::Kbp => vec![0xFC],
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("illegal opcode {0:#04x}")]
    IllegalOpcode(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ILLEGAL: &[u8] = &[
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07,
        0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        0xE1, 0xE2, 0xE3, 0xEA,
        0xFD, 0xFE, 0xFF,
    ];

    #[test]
    fn test_opcode_space_is_covered() {
        let mut defined = 0;
        for opcode in 0..=255u8 {
            match decode(opcode, 0x5A) {
                Ok(instr) => {
                    assert!(!ILLEGAL.contains(&opcode), "{:#04x} should be illegal", opcode);
                    assert_eq!(instr.length(), instruction_length(opcode), "{:#04x}", opcode);
                    defined += 1;
                }
                Err(DecodeError::IllegalOpcode(op)) => {
                    assert_eq!(op, opcode);
                    assert!(ILLEGAL.contains(&opcode), "{:#04x} should decode", opcode);
                }
            }
        }
        assert_eq!(defined, 256 - ILLEGAL.len());
    }

    #[test]
    fn test_encode_agrees_with_decode() {
        for opcode in 0..=255u8 {
            if let Ok(instr) = decode(opcode, 0xA7) {
                let bytes = encode(&instr);
                assert_eq!(bytes[0], opcode);
                assert_eq!(bytes.len() as u16, instr.length());
                if bytes.len() == 2 {
                    assert_eq!(bytes[1], 0xA7);
                }
                assert_eq!(decode(bytes[0], *bytes.get(1).unwrap_or(&0)), Ok(instr));
            }
        }
    }

    #[test]
    fn test_parity_splits() {
        assert_eq!(
            decode(0x24, 0x3C),
            Ok(Instruction::Fim { pair: RegisterPair::from_number(2), data: 0x3C })
        );
        assert_eq!(decode(0x25, 0), Ok(Instruction::Src { pair: RegisterPair::from_number(2) }));
        assert_eq!(decode(0x3E, 0), Ok(Instruction::Fin { pair: RegisterPair::from_number(7) }));
        assert_eq!(decode(0x3F, 0), Ok(Instruction::Jin { pair: RegisterPair::from_number(7) }));
        assert_eq!(instruction_length(0x24), 2);
        assert_eq!(instruction_length(0x25), 1);
        assert_eq!(instruction_length(0x3E), 1);
    }

    #[test]
    fn test_far_addresses() {
        assert_eq!(decode(0x4A, 0xBC), Ok(Instruction::Jun { addr: 0xABC }));
        assert_eq!(decode(0x53, 0x21), Ok(Instruction::Jms { addr: 0x321 }));
    }

    #[test]
    fn test_cycle_costs() {
        assert_eq!(decode(0xD5, 0).unwrap().cycles(), 8);
        assert_eq!(decode(0x40, 0).unwrap().cycles(), 16);
        assert_eq!(decode(0x20, 0).unwrap().cycles(), 16);
        assert_eq!(decode(0x21, 0).unwrap().cycles(), 8);
        assert_eq!(decode(0x30, 0).unwrap().cycles(), 16);
        assert_eq!(decode(0x31, 0).unwrap().cycles(), 8);
    }

    #[test]
    fn test_status_mnemonics_name_the_character() {
        let names: Vec<&str> = (0xE4..=0xE7)
            .chain(0xEC..=0xEF)
            .map(|opcode| decode(opcode, 0).unwrap().mnemonic())
            .collect();
        assert_eq!(names, ["WR0", "WR1", "WR2", "WR3", "RD0", "RD1", "RD2", "RD3"]);
    }

    #[test]
    fn test_condition_documented_forms() {
        // (acc, carry) -> expected for ZERO, NONZERO, CARRY, NO_CARRY
        let cases = [
            (0, false, [true, false, false, true]),
            (0, true, [true, false, true, false]),
            (7, false, [false, true, false, true]),
            (7, true, [false, true, true, false]),
        ];
        for (acc, carry, expected) in cases {
            let got = [
                Condition::ZERO.matches(acc, carry, true),
                Condition::NONZERO.matches(acc, carry, true),
                Condition::CARRY.matches(acc, carry, true),
                Condition::NO_CARRY.matches(acc, carry, true),
            ];
            assert_eq!(got, expected, "acc={} carry={}", acc, carry);
        }
    }

    #[test]
    fn test_condition_all_bits() {
        for bits in 0..16u8 {
            let cond = Condition::new(bits);
            for acc in [0u8, 5] {
                for carry in [false, true] {
                    for test_high in [false, true] {
                        let raw = (bits & 0x4 != 0 && acc == 0)
                            || (bits & 0x2 != 0 && carry)
                            || (bits & 0x1 != 0 && !test_high);
                        let want = if bits & 0x8 != 0 { !raw } else { raw };
                        assert_eq!(cond.matches(acc, carry, test_high), want);
                    }
                }
            }
        }
    }
}
