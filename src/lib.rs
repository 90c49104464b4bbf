//! # i4004 Emulator
//!
//! A cycle-aware instruction-set emulator of the Intel 4004, the first
//! commercial single-chip microprocessor (1971).
//!
//! The core is [`Cpu`]: load a ROM image, then call [`Cpu::step`] to run
//! one fetch-decode-execute cycle at a time. There is no halt instruction,
//! so the host decides when to stop.

pub mod nibble;
pub mod cpu;
pub mod asm;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Instruction, Condition, RegisterPair, Registers};
pub use asm::{assemble, AssemblerError, load_image, save_hex, ImageError};
