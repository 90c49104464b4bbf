//! CPU execution engine for the 4004.
//!
//! Implements the fetch-decode-execute cycle. The semantics of each
//! instruction live in [`crate::cpu::ops`]; this module owns the processor
//! state, dispatch, program counter advance and cycle accounting.

use crate::cpu::decode::{self, DecodeError, Instruction};
use crate::cpu::memory::{DataStore, MemoryError, ProgramStore};
use crate::cpu::registers::{Precondition, RegisterPair, Registers};
use crate::cpu::stack::CallStack;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// The host stopped the CPU.
    Halted,
    /// An instruction failed; the CPU will not step again until reset.
    Faulted,
}

/// What the loop does with the program counter after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Advance past the instruction.
    Next,
    /// The instruction assigned the program counter.
    Jump,
}

impl From<bool> for Flow {
    fn from(taken: bool) -> Self {
        if taken { Flow::Jump } else { Flow::Next }
    }
}

/// The 4004 CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    pub(crate) regs: Registers,
    pub(crate) stack: CallStack,
    pub(crate) rom: ProgramStore,
    pub(crate) ram: DataStore,
    state: CpuState,
    /// Clock periods consumed.
    cycles: u64,
    /// Instructions executed.
    steps: u64,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a new CPU with zeroed state and empty ROM.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            stack: CallStack::new(),
            rom: ProgramStore::new(),
            ram: DataStore::new(),
            state: CpuState::Running,
            cycles: 0,
            steps: 0,
            last_instr: None,
        }
    }

    /// Create a CPU with `image` loaded at address 0.
    pub fn with_program(image: &[u8]) -> Result<Self, MemoryError> {
        let mut cpu = Self::new();
        cpu.load_program(image)?;
        Ok(cpu)
    }

    /// Reset the CPU to its power-on state. ROM contents are kept.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.stack.clear();
        self.ram.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.steps = 0;
        self.last_instr = None;
    }

    /// Load a program image into ROM starting at address 0.
    pub fn load_program(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        self.rom.load(image)
    }

    /// Execute a single instruction.
    ///
    /// Returns the clock periods the instruction consumed. Any error is
    /// fatal: the CPU moves to [`CpuState::Faulted`] and refuses further
    /// steps.
    pub fn step(&mut self) -> Result<u32, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        self.cycle().map_err(|e| {
            self.state = CpuState::Faulted;
            e
        })
    }

    fn cycle(&mut self) -> Result<u32, CpuError> {
        // Fetch
        let pc = self.regs.pc();
        let opcode = self.rom.fetch(pc);
        let length = decode::instruction_length(opcode);
        let operand = if length == 2 { self.rom.fetch(pc.wrapping_add(1)) } else { 0 };

        // Decode
        let instr = decode::decode(opcode, operand)
            .map_err(|e| CpuError::from_decode(e, pc))?;

        // Execute
        if self.execute(instr)? == Flow::Next {
            self.regs.advance_pc(instr.length());
        }

        // Update state
        let cost = instr.cycles();
        self.cycles += cost as u64;
        self.steps += 1;
        self.last_instr = Some(instr);

        Ok(cost)
    }

    /// Run for at most `max_steps` instructions, or until the host halts
    /// the CPU.
    ///
    /// Returns the number of instructions executed.
    pub fn run_limited(&mut self, max_steps: u64) -> Result<u64, CpuError> {
        let start = self.steps;
        let limit = self.steps.saturating_add(max_steps);

        while self.state == CpuState::Running && self.steps < limit {
            self.step()?;
        }

        Ok(self.steps - start)
    }

    /// Stop the CPU. There is no halt instruction; termination is always
    /// requested by the host.
    pub fn halt(&mut self) {
        if self.state == CpuState::Running {
            self.state = CpuState::Halted;
        }
    }

    /// Dispatch a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<Flow, CpuError> {
        match instr {
            Instruction::Nop => {}

            // ==================== Control Transfer ====================

            Instruction::Jcn { cond, addr } => return Ok(self.jcn(cond, addr).into()),
            Instruction::Jun { addr } => {
                self.jun(addr);
                return Ok(Flow::Jump);
            }
            Instruction::Jms { addr } => {
                self.jms(addr)?;
                return Ok(Flow::Jump);
            }
            Instruction::Jin { pair } => {
                self.jin(pair);
                return Ok(Flow::Jump);
            }
            Instruction::Isz { reg, addr } => return Ok(self.isz(reg as usize, addr)?.into()),
            Instruction::Bbl { data } => {
                self.bbl(data)?;
                return Ok(Flow::Jump);
            }

            // ==================== Load / Move ====================

            Instruction::Fim { pair, data } => self.fim(pair, data),
            Instruction::Fin { pair } => self.fin(pair)?,
            Instruction::Ldm { data } => self.ldm(data),
            Instruction::Ld { reg } => self.ld(reg as usize)?,
            Instruction::Xch { reg } => self.xch(reg as usize)?,

            // ==================== Arithmetic ====================

            Instruction::Inc { reg } => self.inc(reg as usize)?,
            Instruction::Add { reg } => self.add(reg as usize)?,
            Instruction::Sub { reg } => self.sub(reg as usize)?,

            // ==================== Memory ====================

            Instruction::Src { pair } => self.src(pair),
            Instruction::Wrm => self.wrm()?,
            Instruction::Wrs { index } => self.write_status(index as usize)?,
            Instruction::Sbm => self.sbm()?,
            Instruction::Rdm => self.rdm()?,
            Instruction::Adm => self.adm()?,
            Instruction::Rds { index } => self.read_status(index as usize)?,

            // ==================== Accumulator Group ====================

            Instruction::Clb => self.clb(),
            Instruction::Clc => self.clc(),
            Instruction::Iac => self.iac(),
            Instruction::Cmc => self.cmc(),
            Instruction::Cma => self.cma(),
            Instruction::Ral => self.ral(),
            Instruction::Rar => self.rar(),
            Instruction::Tcc => self.tcc(),
            Instruction::Dac => self.dac(),
            Instruction::Tcs => self.tcs(),
            Instruction::Stc => self.stc(),
            Instruction::Daa => self.daa(),
            Instruction::Kbp => self.kbp(),
        }

        Ok(Flow::Next)
    }

    // ==================== Inspection ====================

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn rom(&self) -> &ProgramStore {
        &self.rom
    }

    pub fn ram(&self) -> &DataStore {
        &self.ram
    }

    pub fn acc(&self) -> u8 {
        self.regs.acc()
    }

    pub fn carry(&self) -> bool {
        self.regs.carry()
    }

    pub fn pc(&self) -> u16 {
        self.regs.pc()
    }

    pub fn dptr(&self) -> u8 {
        self.regs.dptr()
    }

    pub fn register(&self, index: usize) -> Result<u8, Precondition> {
        self.regs.register(index)
    }

    pub fn pair(&self, pair: RegisterPair) -> u8 {
        self.regs.pair(pair)
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("stack", &self.stack.as_slice())
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("call stack overflow at PC={pc:#05x}")]
    StackOverflow { pc: u16 },

    #[error("call stack underflow at PC={pc:#05x}")]
    StackUnderflow { pc: u16 },

    #[error("precondition violated: {0}")]
    PreconditionViolation(#[from] Precondition),

    #[error("illegal opcode {opcode:#04x} at PC={pc:#05x}")]
    IllegalOpcode { opcode: u8, pc: u16 },

    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

impl CpuError {
    fn from_decode(err: DecodeError, pc: u16) -> Self {
        match err {
            DecodeError::IllegalOpcode(opcode) => CpuError::IllegalOpcode { opcode, pc },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, Condition};

    fn make_program(instructions: &[Instruction]) -> Vec<u8> {
        instructions.iter().flat_map(encode).collect()
    }

    #[test]
    fn test_scenario_underflow_propagates() {
        let mut cpu = Cpu::with_program(&[0xD5, 0x60, 0xC0]).unwrap();

        assert_eq!(cpu.step(), Ok(8));
        assert_eq!((cpu.acc(), cpu.pc()), (5, 1));

        assert_eq!(cpu.step(), Ok(8));
        assert_eq!((cpu.register(0), cpu.pc()), (Ok(1), 2));

        assert_eq!(cpu.step(), Err(CpuError::StackUnderflow { pc: 2 }));
        assert_eq!(cpu.state(), CpuState::Faulted);
        assert_eq!(cpu.pc(), 2);
        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Faulted)));
        assert_eq!(cpu.steps(), 2);
    }

    #[test]
    fn test_two_byte_instructions_advance_by_two() {
        let program = make_program(&[
            Instruction::Fim { pair: RegisterPair::from_number(1), data: 0x3C },
            Instruction::Src { pair: RegisterPair::from_number(1) },
            Instruction::Ldm { data: 7 },
            Instruction::Wrm,
        ]);
        let mut cpu = Cpu::with_program(&program).unwrap();

        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.pc(), 2);
        cpu.run_limited(3).unwrap();

        assert_eq!(cpu.pc(), 5);
        assert_eq!(cpu.dptr(), 0x3C);
        assert_eq!(cpu.ram().read(0x3C), Ok(7));
        assert_eq!(cpu.cycles(), 16 + 8 * 3);
    }

    #[test]
    fn test_subroutine_call_and_return() {
        // 000: JMS 010
        // 002: XCH R3
        // 003: JUN 003
        // 010: BBL 9
        let mut image = make_program(&[
            Instruction::Jms { addr: 0x010 },
            Instruction::Xch { reg: 3 },
            Instruction::Jun { addr: 0x003 },
        ]);
        image.resize(0x10, 0);
        image.extend(make_program(&[Instruction::Bbl { data: 9 }]));
        let mut cpu = Cpu::with_program(&image).unwrap();

        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0x010);
        assert_eq!(cpu.stack().as_slice(), &[0x002]);

        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0x002);
        assert_eq!(cpu.acc(), 9);

        cpu.step().unwrap();
        assert_eq!(cpu.register(3), Ok(9));
    }

    #[test]
    fn test_jump_to_self_does_not_advance() {
        let program = make_program(&[Instruction::Nop, Instruction::Jun { addr: 0x001 }]);
        let mut cpu = Cpu::with_program(&program).unwrap();

        assert_eq!(cpu.run_limited(10), Ok(10));
        assert_eq!(cpu.pc(), 0x001);
        assert_eq!(cpu.cycles(), 8 + 16 * 9);
    }

    #[test]
    fn test_nested_calls_overflow_on_fourth() {
        // Each subroutine calls the next one
        let program = make_program(&[
            Instruction::Jms { addr: 0x002 },
            Instruction::Jms { addr: 0x004 },
            Instruction::Jms { addr: 0x006 },
            Instruction::Jms { addr: 0x008 },
        ]);
        let mut cpu = Cpu::with_program(&program).unwrap();

        assert_eq!(cpu.run_limited(3), Ok(3));
        assert_eq!(cpu.stack().as_slice(), &[0x002, 0x004, 0x006]);
        assert_eq!(cpu.step(), Err(CpuError::StackOverflow { pc: 0x006 }));
    }

    #[test]
    fn test_jms_bbl_return_for_every_target() {
        for addr in 0x002..0x1000u16 {
            let data = (addr & 0xF) as u8;
            let mut image = vec![0u8; addr as usize + 1];
            image[..2].copy_from_slice(&encode(&Instruction::Jms { addr }));
            image[addr as usize] = encode(&Instruction::Bbl { data })[0];
            let mut cpu = Cpu::with_program(&image).unwrap();

            cpu.run_limited(2).unwrap();
            assert_eq!((cpu.pc(), cpu.acc()), (0x002, data), "target {:#05x}", addr);
            assert!(cpu.stack().is_empty());
        }
    }

    #[test]
    fn test_jms_bbl_return_from_any_call_site() {
        // 0xFFE and 0xFFF return across the end of ROM
        let sites = [
            (0x001u16, 0x003u16),
            (0x0FE, 0x100),
            (0x123, 0x125),
            (0x7FF, 0x801),
            (0xFFE, 0x000),
            (0xFFF, 0x001),
        ];
        for (site, ret) in sites {
            let target = if site < 0x800 { 0xA40 } else { 0x440 };
            for data in 0..16u8 {
                let mut image = vec![0u8; 4096];
                let call = encode(&Instruction::Jms { addr: target });
                image[site as usize] = call[0];
                image[(site as usize + 1) % 4096] = call[1];
                image[target as usize] = encode(&Instruction::Bbl { data })[0];
                let mut cpu = Cpu::with_program(&image).unwrap();
                cpu.regs.set_pc(site);

                assert_eq!(cpu.step(), Ok(16));
                assert_eq!(cpu.pc(), target);
                assert_eq!(cpu.stack().as_slice(), &[ret]);

                cpu.step().unwrap();
                assert_eq!((cpu.pc(), cpu.acc()), (ret, data), "site {:#05x}", site);
                assert!(cpu.stack().is_empty());
            }
        }
    }

    #[test]
    fn test_isz_counter_loop() {
        // 00: LDM 13
        // 01: XCH R0
        // 02: INC R1
        // 03: ISZ R0, 07   ; leave once R0 wraps to zero
        // 05: JUN 02
        // 07: NOP
        let program = make_program(&[
            Instruction::Ldm { data: 13 },
            Instruction::Xch { reg: 0 },
            Instruction::Inc { reg: 1 },
            Instruction::Isz { reg: 0, addr: 0x07 },
            Instruction::Jun { addr: 0x002 },
            Instruction::Nop,
        ]);
        let mut cpu = Cpu::with_program(&program).unwrap();

        cpu.run_limited(2 + 3 * 2 + 2).unwrap();
        assert_eq!(cpu.register(1), Ok(3));
        assert_eq!(cpu.register(0), Ok(0));
        assert_eq!(cpu.pc(), 0x07);
    }

    #[test]
    fn test_isz_jumps_on_zero_through_step() {
        let mut cpu = Cpu::with_program(&[0x70, 0x10]).unwrap();
        cpu.regs.set_register(0, 15).unwrap();
        cpu.step().unwrap();
        assert_eq!((cpu.register(0), cpu.pc()), (Ok(0), 0x10));

        let mut cpu = Cpu::with_program(&[0x70, 0x10]).unwrap();
        cpu.step().unwrap();
        assert_eq!((cpu.register(0), cpu.pc()), (Ok(1), 0x02));
    }

    #[test]
    fn test_jcn_branches() {
        // 00: CLB
        // 01: JCN ZERO 05
        // 03: LDM 1
        // 04: NOP
        // 05: LDM 2
        let program = make_program(&[
            Instruction::Clb,
            Instruction::Jcn { cond: Condition::ZERO, addr: 0x05 },
            Instruction::Ldm { data: 1 },
            Instruction::Nop,
            Instruction::Ldm { data: 2 },
        ]);
        let mut cpu = Cpu::with_program(&program).unwrap();

        cpu.run_limited(2).unwrap();
        assert_eq!(cpu.pc(), 0x05);
        cpu.step().unwrap();
        assert_eq!(cpu.acc(), 2);

        // Not taken falls through two bytes
        cpu.reset();
        cpu.step().unwrap();
        cpu.ldm(4);
        assert_eq!(cpu.step(), Ok(16));
        assert_eq!(cpu.pc(), 0x03);
    }

    #[test]
    fn test_illegal_opcode_is_fatal() {
        let mut cpu = Cpu::with_program(&[0x00, 0x0F]).unwrap();

        cpu.step().unwrap();
        assert_eq!(cpu.step(), Err(CpuError::IllegalOpcode { opcode: 0x0F, pc: 1 }));
        assert_eq!(cpu.state(), CpuState::Faulted);
        assert_eq!(cpu.cycles(), 8);
    }

    #[test]
    fn test_every_opcode_steps_or_faults() {
        for opcode in 0..=255u8 {
            let mut cpu = Cpu::with_program(&[opcode, 0x00]).unwrap();
            match cpu.step() {
                Ok(cost) => {
                    assert!(cost == 8 || cost == 16, "{:#04x}", opcode);
                    assert_eq!(cpu.steps(), 1);
                }
                Err(CpuError::IllegalOpcode { opcode: op, pc: 0 }) => assert_eq!(op, opcode),
                // BBL with nothing to return to
                Err(CpuError::StackUnderflow { pc: 0 }) => assert_eq!(opcode >> 4, 0xC),
                Err(e) => panic!("{:#04x}: unexpected {}", opcode, e),
            }
        }
    }

    #[test]
    fn test_pc_wraps_at_end_of_rom() {
        let mut image = vec![0u8; 4096];
        image[0xFFF] = encode(&Instruction::Iac)[0];
        let mut cpu = Cpu::with_program(&image).unwrap();
        cpu.regs.set_pc(0xFFF);

        cpu.step().unwrap();
        assert_eq!(cpu.pc(), 0x000);
        assert_eq!(cpu.acc(), 1);
    }

    #[test]
    fn test_halt_stops_run() {
        let mut cpu = Cpu::new();
        cpu.run_limited(4).unwrap();
        cpu.halt();

        assert_eq!(cpu.run_limited(4), Ok(0));
        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Halted)));
        assert_eq!(cpu.steps(), 4);
    }

    #[test]
    fn test_reset_keeps_rom() {
        let mut cpu = Cpu::with_program(&[0xD9, 0x00]).unwrap();
        cpu.step().unwrap();
        cpu.halt();

        cpu.reset();
        assert!(cpu.is_running());
        assert_eq!((cpu.acc(), cpu.pc(), cpu.cycles()), (0, 0, 0));
        assert_eq!(cpu.rom().read(0), Ok(0xD9));
        assert!(cpu.last_instruction().is_none());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut cpu = Cpu::with_program(&[0xD3]).unwrap();
        cpu.step().unwrap();

        let json = serde_json::to_string(&cpu).unwrap();
        let restored: Cpu = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.acc(), 3);
        assert_eq!(restored.pc(), 1);
        assert_eq!(restored.last_instruction(), Some(Instruction::Ldm { data: 3 }));
    }

    #[test]
    fn test_snapshot_with_short_rom_is_rejected() {
        let mut value = serde_json::to_value(Cpu::new()).unwrap();
        value["rom"]["bytes"] = serde_json::json!([0]);
        value["regs"]["pc"] = serde_json::json!(5);

        let err = serde_json::from_value::<Cpu>(value).unwrap_err();
        assert!(err.to_string().contains("rom holds 1 entries"));
    }

    #[test]
    fn test_snapshot_rejects_broken_invariants() {
        let base = serde_json::to_value(Cpu::new()).unwrap();

        let mut value = base.clone();
        value["stack"]["depth"] = serde_json::json!(4);
        assert!(serde_json::from_value::<Cpu>(value).is_err());

        let mut value = base.clone();
        value["ram"]["status"] = serde_json::json!([]);
        assert!(serde_json::from_value::<Cpu>(value).is_err());

        let mut value = base;
        value["last_instr"] = serde_json::json!({ "Fin": { "pair": 3 } });
        assert!(serde_json::from_value::<Cpu>(value).is_err());
    }

    #[test]
    fn test_restored_snapshot_steps() {
        let mut value = serde_json::to_value(Cpu::with_program(&[0x00, 0xD7]).unwrap()).unwrap();
        value["regs"]["pc"] = serde_json::json!(0x1001);
        value["regs"]["acc"] = serde_json::json!(0x42);

        let mut cpu: Cpu = serde_json::from_value(value).unwrap();
        assert_eq!((cpu.pc(), cpu.acc()), (0x001, 0x2));
        assert_eq!(cpu.step(), Ok(8));
        assert_eq!((cpu.pc(), cpu.acc()), (0x002, 7));
    }
}
