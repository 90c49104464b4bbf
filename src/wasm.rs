//! WebAssembly bindings for the 4004 emulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use wasm_bindgen::prelude::*;
use crate::Cpu;
use crate::asm::assembler::assemble;
use crate::cpu::memory::RAM_SIZE;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly CPU wrapper.
#[wasm_bindgen]
pub struct WasmCpu {
    cpu: Cpu,
    program: Vec<u8>,
}

#[wasm_bindgen]
impl WasmCpu {
    /// Create a new CPU instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            program: Vec::new(),
        }
    }

    /// Load a raw ROM image. Returns its length.
    #[wasm_bindgen]
    pub fn load_rom(&mut self, image: &[u8]) -> Result<usize, JsError> {
        let cpu = Cpu::with_program(image)
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        self.program = image.to_vec();
        self.cpu = cpu;
        Ok(image.len())
    }

    /// Load a program from assembly source code. Returns its length in bytes.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let image = assemble(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        self.load_rom(&image)
    }

    /// Step one instruction. Returns the clock periods it took.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<u32, JsError> {
        self.cpu.step()
            .map_err(|e| JsError::new(&format!("{}", e)))
    }

    /// Run at most `max_steps` instructions. Returns the total cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_steps: u32) -> Result<u64, JsError> {
        self.cpu.run_limited(max_steps as u64)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        Ok(self.cpu.cycles())
    }

    /// Reset CPU to initial state, keeping the loaded program.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// Check if CPU is running.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.cpu.pc()
    }

    #[wasm_bindgen]
    pub fn accumulator(&self) -> u8 {
        self.cpu.acc()
    }

    #[wasm_bindgen]
    pub fn carry(&self) -> bool {
        self.cpu.carry()
    }

    /// All sixteen index registers.
    #[wasm_bindgen]
    pub fn registers(&self) -> Vec<u8> {
        self.cpu.registers().registers().to_vec()
    }

    /// Return addresses currently on the stack, oldest first.
    #[wasm_bindgen]
    pub fn stack(&self) -> Vec<u16> {
        self.cpu.stack().as_slice().to_vec()
    }

    /// Get a data memory character (0-255).
    #[wasm_bindgen]
    pub fn memory_at(&self, index: usize) -> Result<u8, JsError> {
        self.cpu.ram().read(index)
            .map_err(|e| JsError::new(&format!("{}", e)))
    }

    /// Get all data memory.
    #[wasm_bindgen]
    pub fn memory_all(&self) -> Vec<u8> {
        self.cpu.ram().dump(0, RAM_SIZE).into_iter().map(|(_, v)| v).collect()
    }

    /// Get the full processor state as a JSON string.
    #[wasm_bindgen]
    pub fn state_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.cpu)
            .map_err(|e| JsError::new(&format!("{}", e)))
    }

    /// Length of the loaded program in bytes.
    #[wasm_bindgen]
    pub fn program_len(&self) -> usize {
        self.program.len()
    }
}

impl Default for WasmCpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the image length.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<usize, JsError> {
    let image = assemble(source)
        .map_err(|e| JsError::new(&format!("{}", e)))?;
    Ok(image.len())
}
