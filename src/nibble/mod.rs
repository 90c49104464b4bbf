//! Fixed-width value helpers for the 4004.
//!
//! The 4004 works on three widths:
//! - 4-bit nibbles (accumulator, index registers, data memory)
//! - 8-bit bytes (register pairs, data pointer, ROM words)
//! - 12-bit addresses (program counter, call stack)
//!
//! Every store into processor state goes through one of the masks below.

pub mod arith;

pub use arith::{add_with_carry, subtract_with_borrow, rotate_left, rotate_right};

/// Mask for a 4-bit nibble.
pub const NIBBLE_MASK: u8 = 0x0F;

/// Mask for a 12-bit program address.
pub const ADDR_MASK: u16 = 0x0FFF;

/// Truncate a value to 4 bits.
#[inline]
pub const fn nibble(value: u8) -> u8 {
    value & NIBBLE_MASK
}

/// Truncate a value to 12 bits.
#[inline]
pub const fn addr12(value: u16) -> u16 {
    value & ADDR_MASK
}

/// Join two nibbles into a byte (high nibble first).
#[inline]
pub const fn join(high: u8, low: u8) -> u8 {
    (nibble(high) << 4) | nibble(low)
}

/// Split a byte into (high, low) nibbles.
#[inline]
pub const fn split(byte: u8) -> (u8, u8) {
    (byte >> 4, byte & NIBBLE_MASK)
}

/// Page (top 4 bits) of a 12-bit address.
#[inline]
pub const fn page_of(addr: u16) -> u16 {
    addr12(addr) & 0x0F00
}

/// Build a 12-bit address from the page of `base` and an 8-bit offset.
#[inline]
pub const fn in_page(base: u16, offset: u8) -> u16 {
    page_of(base) | offset as u16
}
