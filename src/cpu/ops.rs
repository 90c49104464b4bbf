//! Instruction semantics.
//!
//! One method per operation. Each checks its preconditions before touching
//! state, so a failing instruction leaves the processor unchanged.
//!
//! Control transfers assign the program counter themselves and run before
//! the loop would advance it. `JCN` and `ISZ` carry an 8-bit absolute
//! target; `JIN` stays in the page of the program counter.

use crate::cpu::decode::Condition;
use crate::cpu::execute::{Cpu, CpuError};
use crate::cpu::registers::RegisterPair;
use crate::cpu::stack::StackError;
use crate::nibble::{arith, in_page, nibble, NIBBLE_MASK};

impl Cpu {
    // ==================== Load / Move ====================

    /// LDM: A := imm
    pub fn ldm(&mut self, imm: u8) {
        self.regs.set_acc(imm);
    }

    /// LD: A := Rr
    pub fn ld(&mut self, reg: usize) -> Result<(), CpuError> {
        let value = self.regs.register(reg)?;
        self.regs.set_acc(value);
        Ok(())
    }

    /// XCH: A <-> Rr
    pub fn xch(&mut self, reg: usize) -> Result<(), CpuError> {
        let value = self.regs.register(reg)?;
        let acc = self.regs.acc();
        self.regs.set_register(reg, acc)?;
        self.regs.set_acc(value);
        Ok(())
    }

    /// FIM: Pp := imm8
    pub fn fim(&mut self, pair: RegisterPair, data: u8) {
        self.regs.set_pair(pair, data);
    }

    /// FIN: Pp := ROM[P0]
    pub fn fin(&mut self, pair: RegisterPair) -> Result<(), CpuError> {
        let addr = self.regs.pair(RegisterPair::P0) as usize;
        let data = self.rom.read(addr)?;
        self.regs.set_pair(pair, data);
        Ok(())
    }

    // ==================== Arithmetic ====================

    /// ADD: A := A + Rr + CY
    pub fn add(&mut self, reg: usize) -> Result<(), CpuError> {
        let value = self.regs.register(reg)?;
        self.add_to_acc(value);
        Ok(())
    }

    /// SUB: A := A + !Rr + CY, CY = no borrow
    pub fn sub(&mut self, reg: usize) -> Result<(), CpuError> {
        let value = self.regs.register(reg)?;
        self.sub_from_acc(value);
        Ok(())
    }

    /// INC: Rr := Rr + 1, carry untouched
    pub fn inc(&mut self, reg: usize) -> Result<(), CpuError> {
        let value = self.regs.register(reg)?;
        self.regs.set_register(reg, value.wrapping_add(1))?;
        Ok(())
    }

    /// IAC: A := A + 1, CY = overflow
    pub fn iac(&mut self) {
        self.add_to_acc_with(1, false);
    }

    /// DAC: A := A - 1, CY = 0 on borrow
    pub fn dac(&mut self) {
        let (result, carry) = arith::decrement(self.regs.acc());
        self.regs.set_acc(result);
        self.regs.set_carry(carry);
    }

    fn add_to_acc(&mut self, value: u8) {
        let carry = self.regs.carry();
        self.add_to_acc_with(value, carry);
    }

    fn add_to_acc_with(&mut self, value: u8, carry: bool) {
        let (result, carry) = arith::add_with_carry(self.regs.acc(), value, carry);
        self.regs.set_acc(result);
        self.regs.set_carry(carry);
    }

    fn sub_from_acc(&mut self, value: u8) {
        let (result, carry) =
            arith::subtract_with_borrow(self.regs.acc(), value, self.regs.carry());
        self.regs.set_acc(result);
        self.regs.set_carry(carry);
    }

    // ==================== Accumulator Group ====================

    /// CLC: CY := 0
    pub fn clc(&mut self) {
        self.regs.set_carry(false);
    }

    /// STC: CY := 1
    pub fn stc(&mut self) {
        self.regs.set_carry(true);
    }

    /// CMC: CY := !CY
    pub fn cmc(&mut self) {
        let carry = self.regs.carry();
        self.regs.set_carry(!carry);
    }

    /// CLB: A := 0, CY := 0
    pub fn clb(&mut self) {
        self.regs.set_acc(0);
        self.regs.set_carry(false);
    }

    /// CMA: A := !A
    pub fn cma(&mut self) {
        let acc = self.regs.acc();
        self.regs.set_acc(acc ^ NIBBLE_MASK);
    }

    /// RAL: rotate {CY, A} left
    pub fn ral(&mut self) {
        let (acc, carry) = arith::rotate_left(self.regs.acc(), self.regs.carry());
        self.regs.set_acc(acc);
        self.regs.set_carry(carry);
    }

    /// RAR: rotate {A, CY} right
    pub fn rar(&mut self) {
        let (acc, carry) = arith::rotate_right(self.regs.acc(), self.regs.carry());
        self.regs.set_acc(acc);
        self.regs.set_carry(carry);
    }

    /// TCC: A := CY, CY := 0
    pub fn tcc(&mut self) {
        let carry = self.regs.carry();
        self.regs.set_acc(carry as u8);
        self.regs.set_carry(false);
    }

    /// TCS: A := 10 if CY else 9, CY := 0
    pub fn tcs(&mut self) {
        let value = if self.regs.carry() { 10 } else { 9 };
        self.regs.set_acc(value);
        self.regs.set_carry(false);
    }

    /// DAA: decimal adjust accumulator
    pub fn daa(&mut self) {
        let (acc, carry) = arith::decimal_adjust(self.regs.acc(), self.regs.carry());
        self.regs.set_acc(acc);
        self.regs.set_carry(carry);
    }

    /// KBP: keyboard process
    pub fn kbp(&mut self) {
        let acc = arith::keyboard_process(self.regs.acc());
        self.regs.set_acc(acc);
    }

    // ==================== Control Transfer ====================

    /// JUN: PC := addr12
    pub fn jun(&mut self, addr: u16) {
        self.regs.set_pc(addr);
    }

    /// JMS: push PC + 2, PC := addr12
    pub fn jms(&mut self, addr: u16) -> Result<(), CpuError> {
        let pc = self.regs.pc();
        self.stack
            .push(pc.wrapping_add(2))
            .map_err(|e| self.stack_fault(e))?;
        self.regs.set_pc(addr);
        Ok(())
    }

    /// BBL: PC := pop, A := imm
    pub fn bbl(&mut self, data: u8) -> Result<(), CpuError> {
        let ret = self.stack.pop().map_err(|e| self.stack_fault(e))?;
        self.regs.set_pc(ret);
        self.regs.set_acc(data);
        Ok(())
    }

    /// JIN: PC low byte := Pp
    pub fn jin(&mut self, pair: RegisterPair) {
        let target = in_page(self.regs.pc(), self.regs.pair(pair));
        self.regs.set_pc(target);
    }

    /// ISZ: Rr := Rr + 1; PC := addr when the result is zero.
    ///
    /// Returns whether the jump was taken.
    pub fn isz(&mut self, reg: usize, addr: u8) -> Result<bool, CpuError> {
        let value = nibble(self.regs.register(reg)?.wrapping_add(1));
        self.regs.set_register(reg, value)?;

        if value != 0 {
            return Ok(false);
        }
        self.regs.set_pc(addr as u16);
        Ok(true)
    }

    /// JCN: PC := addr if the condition holds.
    ///
    /// Returns whether the jump was taken. The TEST input is not wired to
    /// anything and reads high.
    pub fn jcn(&mut self, cond: Condition, addr: u8) -> bool {
        let taken = cond.matches(self.regs.acc(), self.regs.carry(), true);
        if taken {
            self.regs.set_pc(addr as u16);
        }
        taken
    }

    fn stack_fault(&self, err: StackError) -> CpuError {
        let pc = self.regs.pc();
        match err {
            StackError::Overflow => CpuError::StackOverflow { pc },
            StackError::Underflow => CpuError::StackUnderflow { pc },
        }
    }

    // ==================== Memory ====================

    /// SRC: data pointer := Pp
    pub fn src(&mut self, pair: RegisterPair) {
        let value = self.regs.pair(pair);
        self.regs.set_dptr(value);
    }

    /// WRM: RAM[dptr] := A
    pub fn wrm(&mut self) -> Result<(), CpuError> {
        let addr = self.regs.dptr() as usize;
        self.ram.write(addr, self.regs.acc())?;
        Ok(())
    }

    /// RDM: A := RAM[dptr]
    pub fn rdm(&mut self) -> Result<(), CpuError> {
        let value = self.ram.read(self.regs.dptr() as usize)?;
        self.regs.set_acc(value);
        Ok(())
    }

    /// ADM: A := A + RAM[dptr] + CY
    pub fn adm(&mut self) -> Result<(), CpuError> {
        let value = self.ram.read(self.regs.dptr() as usize)?;
        self.add_to_acc(value);
        Ok(())
    }

    /// SBM: A := A + !RAM[dptr] + CY, CY = no borrow
    pub fn sbm(&mut self) -> Result<(), CpuError> {
        let value = self.ram.read(self.regs.dptr() as usize)?;
        self.sub_from_acc(value);
        Ok(())
    }

    /// WRn: status character n := A
    pub fn write_status(&mut self, index: usize) -> Result<(), CpuError> {
        self.ram.write_status(self.regs.dptr(), index, self.regs.acc())?;
        Ok(())
    }

    /// RDn: A := status character n
    pub fn read_status(&mut self, index: usize) -> Result<(), CpuError> {
        let value = self.ram.read_status(self.regs.dptr(), index)?;
        self.regs.set_acc(value);
        Ok(())
    }
}
