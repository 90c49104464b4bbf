//! 4-bit ALU operations.
//!
//! All functions are pure and operate on values already truncated to a
//! nibble; inputs wider than 4 bits are masked first.

use super::{nibble, NIBBLE_MASK};

/// Add two nibbles with carry-in, returning (result, carry_out).
#[inline]
pub fn add_with_carry(a: u8, b: u8, carry: bool) -> (u8, bool) {
    let sum = nibble(a) + nibble(b) + carry as u8;
    (sum & NIBBLE_MASK, sum > NIBBLE_MASK)
}

/// Subtract `b` from `a` by complement addition: `a + (0xF - b) + carry`.
///
/// Carry uses "no borrow" polarity on both sides: a carry-in of 1 means no
/// borrow is pending, and a carry-out of 1 means the subtraction did not
/// borrow. The result therefore equals `a - b - (1 - carry)` modulo 16.
#[inline]
pub fn subtract_with_borrow(a: u8, b: u8, carry: bool) -> (u8, bool) {
    add_with_carry(a, NIBBLE_MASK - nibble(b), carry)
}

/// Rotate {carry, acc} left by one: carry enters bit 0, bit 3 leaves into carry.
#[inline]
pub fn rotate_left(acc: u8, carry: bool) -> (u8, bool) {
    let wide = (nibble(acc) << 1) | carry as u8;
    (wide & NIBBLE_MASK, wide & 0x10 != 0)
}

/// Rotate {acc, carry} right by one: carry enters bit 3, bit 0 leaves into carry.
#[inline]
pub fn rotate_right(acc: u8, carry: bool) -> (u8, bool) {
    let acc = nibble(acc);
    ((acc >> 1) | ((carry as u8) << 3), acc & 1 != 0)
}

/// Decrement, returning (result, carry) where carry is 0 only on borrow.
#[inline]
pub fn decrement(acc: u8) -> (u8, bool) {
    let acc = nibble(acc);
    (acc.wrapping_sub(1) & NIBBLE_MASK, acc != 0)
}

/// Decimal adjust: add 6 when the value left BCD range or a carry is pending.
///
/// The carry is set on overflow and otherwise left as it was.
#[inline]
pub fn decimal_adjust(acc: u8, carry: bool) -> (u8, bool) {
    let acc = nibble(acc);
    if acc > 9 || carry {
        let (result, overflow) = add_with_carry(acc, 6, false);
        (result, carry || overflow)
    } else {
        (acc, carry)
    }
}

/// Keyboard process: one-hot to index, anything else to 15.
#[inline]
pub fn keyboard_process(acc: u8) -> u8 {
    match nibble(acc) {
        0b0000 => 0,
        0b0001 => 1,
        0b0010 => 2,
        0b0100 => 3,
        0b1000 => 4,
        _ => 15,
    }
}
