//! CPU emulation for the Intel 4004.
//!
//! This module implements the 4004 programming model:
//! - 4-bit accumulator, carry flag and sixteen 4-bit index registers
//! - 12-bit program counter and a three-level return stack
//! - 4096 bytes of program ROM and 256 characters of data RAM
//! - the full opcode map, decoded into [`Instruction`] before execution

pub mod memory;
pub mod registers;
pub mod stack;
pub mod decode;
pub mod ops;
pub mod execute;

pub use memory::{DataStore, MemoryError, ProgramStore};
pub use registers::{Precondition, RegisterPair, Registers, SnapshotError};
pub use stack::{CallStack, StackError};
pub use decode::{Condition, DecodeError, Instruction};
pub use execute::{Cpu, CpuError, CpuState};
