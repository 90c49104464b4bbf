//! 4004 CPU registers.
//!
//! The 4004 register set:
//! - A: 4-bit accumulator
//! - CY: carry/link flag
//! - PC: 12-bit program counter
//! - R0-R15: sixteen 4-bit index registers, paired as P0-P7
//! - The 8-bit data pointer latched by SRC (held in the RAM chips on the
//!   real part, kept here with the rest of the processor state)

use crate::nibble::{self, addr12, join, split};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Number of index registers.
pub const REGISTER_COUNT: usize = 16;

/// A contract the decoder must uphold when calling into the semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("register index {0} out of range (0-15)")]
    RegisterIndex(usize),

    #[error("register pair index {0} is not an even register (0-14)")]
    PairIndex(usize),

    #[error("program address {0:#05x} out of range (0x000-0xfff)")]
    ProgramAddress(usize),

    #[error("data address {0:#04x} out of range (0x00-0xff)")]
    DataAddress(usize),

    #[error("status character {0} out of range (0-3)")]
    StatusIndex(usize),
}

/// A deserialized processor snapshot that cannot be restored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("{field} holds {found} entries, expected {expected}")]
    Length { field: &'static str, expected: usize, found: usize },

    #[error("call stack depth {0} exceeds 3 levels")]
    StackDepth(usize),
}

/// An even/odd register pair addressed by its even register.
///
/// The even register holds the high nibble of the pair's 8-bit value and
/// the odd register the low nibble. A `RegisterPair` can only be built for
/// an even index, so code holding one never re-checks parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8")]
pub struct RegisterPair(u8);

impl RegisterPair {
    /// P0 (R0, R1): the implicit address source of FIN.
    pub const P0: RegisterPair = RegisterPair(0);

    /// Build a pair from the index of its even register (0, 2, ..., 14).
    pub fn new(index: usize) -> Result<Self, Precondition> {
        if index >= REGISTER_COUNT || index % 2 != 0 {
            return Err(Precondition::PairIndex(index));
        }
        Ok(Self(index as u8))
    }

    /// Build a pair from its pair number (0-7), as encoded in opcodes.
    /// Only the low 3 bits are used.
    pub const fn from_number(number: u8) -> Self {
        Self((number & 0x7) << 1)
    }

    /// Index of the even (high-nibble) register.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Pair number 0-7.
    pub const fn number(self) -> u8 {
        self.0 >> 1
    }

    const fn high(self) -> usize {
        self.0 as usize
    }

    const fn low(self) -> usize {
        self.0 as usize + 1
    }
}

impl TryFrom<u8> for RegisterPair {
    type Error = Precondition;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index as usize)
    }
}

impl std::fmt::Display for RegisterPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.number())
    }
}

/// The 4004 register file.
///
/// Every setter truncates to the field's width; truncation is the hardware
/// behavior and never an error. Snapshots are truncated the same way.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRegisters")]
pub struct Registers {
    acc: u8,
    carry: bool,
    pc: u16,
    dptr: u8,
    index: [u8; REGISTER_COUNT],
}

#[derive(Deserialize)]
struct RawRegisters {
    acc: u8,
    carry: bool,
    pc: u16,
    dptr: u8,
    index: [u8; REGISTER_COUNT],
}

impl From<RawRegisters> for Registers {
    fn from(raw: RawRegisters) -> Self {
        Self {
            acc: nibble::nibble(raw.acc),
            carry: raw.carry,
            pc: addr12(raw.pc),
            dptr: raw.dptr,
            index: raw.index.map(nibble::nibble),
        }
    }
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self {
            acc: 0,
            carry: false,
            pc: 0,
            dptr: 0,
            index: [0; REGISTER_COUNT],
        }
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn acc(&self) -> u8 {
        self.acc
    }

    #[inline]
    pub fn set_acc(&mut self, value: u8) {
        self.acc = nibble::nibble(value);
    }

    #[inline]
    pub fn carry(&self) -> bool {
        self.carry
    }

    #[inline]
    pub fn set_carry(&mut self, carry: bool) {
        self.carry = carry;
    }

    #[inline]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// Set the program counter to an absolute address (12-bit).
    #[inline]
    pub fn set_pc(&mut self, addr: u16) {
        self.pc = addr12(addr);
    }

    /// Advance the program counter by `length` bytes, wrapping at 4K.
    /// Returns the old value.
    pub fn advance_pc(&mut self, length: u16) -> u16 {
        let old = self.pc;
        self.set_pc(old.wrapping_add(length));
        old
    }

    #[inline]
    pub fn dptr(&self) -> u8 {
        self.dptr
    }

    #[inline]
    pub fn set_dptr(&mut self, value: u8) {
        self.dptr = value;
    }

    /// Read index register `index` (0-15).
    pub fn register(&self, index: usize) -> Result<u8, Precondition> {
        self.index
            .get(index)
            .copied()
            .ok_or(Precondition::RegisterIndex(index))
    }

    /// Write index register `index` (0-15), truncating the value to 4 bits.
    pub fn set_register(&mut self, index: usize, value: u8) -> Result<(), Precondition> {
        let slot = self.index
            .get_mut(index)
            .ok_or(Precondition::RegisterIndex(index))?;
        *slot = nibble::nibble(value);
        Ok(())
    }

    /// Combined 8-bit value of a register pair.
    pub fn pair(&self, pair: RegisterPair) -> u8 {
        join(self.index[pair.high()], self.index[pair.low()])
    }

    /// Write an 8-bit value into a register pair.
    pub fn set_pair(&mut self, pair: RegisterPair, value: u8) {
        let (high, low) = split(value);
        self.index[pair.high()] = high;
        self.index[pair.low()] = low;
    }

    /// All sixteen index registers.
    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.index
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
