//! The 4004 subroutine stack.
//!
//! Three 12-bit return address registers on chip. There is no stack
//! pointer visible to programs and no way to grow it.

use crate::cpu::registers::SnapshotError;
use crate::nibble::addr12;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Number of return address levels.
pub const STACK_DEPTH: usize = 3;

/// Fixed-capacity return address stack.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCallStack")]
pub struct CallStack {
    slots: [u16; STACK_DEPTH],
    depth: usize,
}

#[derive(Deserialize)]
struct RawCallStack {
    slots: [u16; STACK_DEPTH],
    depth: usize,
}

impl TryFrom<RawCallStack> for CallStack {
    type Error = SnapshotError;

    fn try_from(raw: RawCallStack) -> Result<Self, Self::Error> {
        if raw.depth > STACK_DEPTH {
            return Err(SnapshotError::StackDepth(raw.depth));
        }
        Ok(Self {
            slots: raw.slots.map(addr12),
            depth: raw.depth,
        })
    }
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a return address (truncated to 12 bits).
    pub fn push(&mut self, addr: u16) -> Result<(), StackError> {
        if self.depth == STACK_DEPTH {
            return Err(StackError::Overflow);
        }
        self.slots[self.depth] = addr12(addr);
        self.depth += 1;
        Ok(())
    }

    /// Pop the most recently pushed address.
    pub fn pop(&mut self) -> Result<u16, StackError> {
        if self.depth == 0 {
            return Err(StackError::Underflow);
        }
        self.depth -= 1;
        Ok(self.slots[self.depth])
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Live entries, oldest first.
    pub fn as_slice(&self) -> &[u16] {
        &self.slots[..self.depth]
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Errors raised by the call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("call stack overflow (all 3 levels in use)")]
    Overflow,

    #[error("call stack underflow")]
    Underflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_lifo() {
        let mut stack = CallStack::new();
        stack.push(0x100).unwrap();
        stack.push(0x200).unwrap();
        stack.push(0x300).unwrap();

        assert_eq!(stack.as_slice(), &[0x100, 0x200, 0x300]);
        assert_eq!(stack.pop(), Ok(0x300));
        assert_eq!(stack.pop(), Ok(0x200));
        assert_eq!(stack.pop(), Ok(0x100));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_overflow_at_capacity() {
        let mut stack = CallStack::new();
        for addr in 0..STACK_DEPTH as u16 {
            stack.push(addr).unwrap();
        }
        assert_eq!(stack.push(0xABC), Err(StackError::Overflow));
        assert_eq!(stack.depth(), STACK_DEPTH);
    }

    #[test]
    fn test_underflow_when_empty() {
        let mut stack = CallStack::new();
        assert_eq!(stack.pop(), Err(StackError::Underflow));
    }

    #[test]
    fn test_snapshot_depth_is_checked() {
        let stack: CallStack = serde_json::from_str(r#"{"slots":[4660,2,3],"depth":2}"#).unwrap();
        assert_eq!(stack.as_slice(), &[0x234, 0x002]);

        let err = serde_json::from_str::<CallStack>(r#"{"slots":[1,2,3],"depth":4}"#).unwrap_err();
        assert!(err.to_string().contains("depth 4"));
    }

    #[test]
    fn test_push_masks_to_12_bits() {
        let mut stack = CallStack::new();
        stack.push(0xF123).unwrap();
        assert_eq!(stack.pop(), Ok(0x123));
    }
}
