//! Program tooling for the 4004.
//!
//! This module provides:
//! - A two-pass assembler (mnemonic text → ROM bytes)
//! - ROM image loading and saving (raw binary or hex text)

pub mod assembler;
pub mod image;

pub use assembler::{assemble, AssemblerError};
pub use image::{load_image, save_hex, ImageError};
