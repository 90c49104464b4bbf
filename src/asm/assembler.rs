//! Two-pass assembler for 4004 programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//!         ORG 0x000       ; Set origin address (forward only)
//! START:  FIM P0, 0x20    ; Pair operands are P0-P7
//!         SRC P0
//!         LDM 5
//!         WRM
//!         ISZ R2, START   ; Register operands are R0-R15
//!         JCN 4, DONE     ; Condition nibble, or use JZ/JNZ/JC/JNC/JT/JNT
//!         JUN START
//! DONE:   DB 0x12, 0x34   ; Raw bytes
//! ```
//!
//! Pass one assigns addresses and collects labels; pass two resolves
//! operands and emits bytes. JCN and ISZ carry a one-byte target, so they
//! can only reach 0x000-0x0FF.

use crate::cpu::decode::{encode, Condition, Instruction};
use crate::cpu::memory::ROM_SIZE;
use crate::cpu::registers::RegisterPair;
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a ROM image starting at address 0.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// A line that produces bytes.
struct Statement {
    line: usize,
    addr: u16,
    mnemonic: String,
    operands: Vec<String>,
}

/// The assembler state.
struct Assembler {
    /// Current address (origin).
    current_addr: usize,
    /// Symbol table (label -> address).
    symbols: HashMap<String, u16>,
    /// Statements in source order, with their addresses.
    statements: Vec<Statement>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            current_addr: 0,
            symbols: HashMap::new(),
            statements: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: Collect labels and lay out statements
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: Resolve operands and emit
        let mut image = vec![0u8; self.current_addr];
        for stmt in &self.statements {
            let bytes = self.emit(stmt)?;
            let start = stmt.addr as usize;
            image[start..start + bytes.len()].copy_from_slice(&bytes);
        }

        Ok(image)
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let mut line = line.trim();

        // Check for label definition
        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            self.define_label(label, line_num)?;
            line = line[colon_idx + 1..].trim();
        }

        if line.is_empty() {
            return Ok(());
        }

        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m.to_uppercase(), rest),
            None => (line.to_uppercase(), ""),
        };
        let operands: Vec<String> = rest
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let length = match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let [target] = expect_operands::<1>(&operands, line_num)?;
                let addr = parse_number(target, line_num)?;
                if addr < self.current_addr as i64 || addr > ROM_SIZE as i64 {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: format!("ORG {:#05x} is behind the current address or past ROM", addr),
                    });
                }
                self.current_addr = addr as usize;
                return Ok(());
            }

            "DB" => {
                if operands.is_empty() {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "DB requires at least one value".into(),
                    });
                }
                operands.len()
            }

            // Instructions
            m => length_of(m).ok_or_else(|| AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: m.to_string(),
            })? as usize,
        };

        if self.current_addr + length > ROM_SIZE {
            return Err(AssemblerError::ProgramTooLarge { line: line_num });
        }

        self.statements.push(Statement {
            line: line_num,
            addr: self.current_addr as u16,
            mnemonic,
            operands,
        });
        self.current_addr += length;

        Ok(())
    }

    fn define_label(&mut self, label: String, line_num: usize) -> Result<(), AssemblerError> {
        let valid = label
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid label '{}'", label),
            });
        }
        if self.symbols.contains_key(&label) {
            return Err(AssemblerError::DuplicateLabel { line: line_num, label });
        }

        self.symbols.insert(label, self.current_addr as u16);
        Ok(())
    }

    fn emit(&self, stmt: &Statement) -> Result<Vec<u8>, AssemblerError> {
        if stmt.mnemonic == "DB" {
            return stmt.operands
                .iter()
                .map(|op| self.parse_ranged(op, 0xFF, stmt.line).map(|v| v as u8))
                .collect();
        }

        let instr = self.parse_instruction(stmt)?;
        Ok(encode(&instr))
    }

    fn parse_instruction(&self, stmt: &Statement) -> Result<Instruction, AssemblerError> {
        let line = stmt.line;
        let ops = &stmt.operands;

        if let Some(instr) = implied(&stmt.mnemonic) {
            expect_operands::<0>(ops, line)?;
            return Ok(instr);
        }

        let instr = match stmt.mnemonic.as_str() {
            "JCN" => {
                let [cond, target] = expect_operands::<2>(ops, line)?;
                Instruction::Jcn {
                    cond: Condition::new(self.parse_ranged(cond, 0xF, line)? as u8),
                    addr: self.parse_short(target, line)?,
                }
            }
            alias @ ("JC" | "JNC" | "JZ" | "JNZ" | "JT" | "JNT") => {
                let [target] = expect_operands::<1>(ops, line)?;
                let cond = match alias {
                    "JC" => Condition::CARRY,
                    "JNC" => Condition::NO_CARRY,
                    "JZ" => Condition::ZERO,
                    "JNZ" => Condition::NONZERO,
                    "JT" => Condition::TEST,
                    _ => Condition::NO_TEST,
                };
                Instruction::Jcn { cond, addr: self.parse_short(target, line)? }
            }
            "FIM" => {
                let [pair, data] = expect_operands::<2>(ops, line)?;
                Instruction::Fim {
                    pair: parse_pair(pair, line)?,
                    data: self.parse_ranged(data, 0xFF, line)? as u8,
                }
            }
            "SRC" => Instruction::Src { pair: parse_pair(single(ops, line)?, line)? },
            "FIN" => Instruction::Fin { pair: parse_pair(single(ops, line)?, line)? },
            "JIN" => Instruction::Jin { pair: parse_pair(single(ops, line)?, line)? },
            "JUN" => Instruction::Jun { addr: self.parse_ranged(single(ops, line)?, 0xFFF, line)? as u16 },
            "JMS" => Instruction::Jms { addr: self.parse_ranged(single(ops, line)?, 0xFFF, line)? as u16 },
            "INC" => Instruction::Inc { reg: parse_register(single(ops, line)?, line)? },
            "ADD" => Instruction::Add { reg: parse_register(single(ops, line)?, line)? },
            "SUB" => Instruction::Sub { reg: parse_register(single(ops, line)?, line)? },
            "LD" => Instruction::Ld { reg: parse_register(single(ops, line)?, line)? },
            "XCH" => Instruction::Xch { reg: parse_register(single(ops, line)?, line)? },
            "ISZ" => {
                let [reg, target] = expect_operands::<2>(ops, line)?;
                Instruction::Isz {
                    reg: parse_register(reg, line)?,
                    addr: self.parse_short(target, line)?,
                }
            }
            "BBL" => Instruction::Bbl { data: self.parse_ranged(single(ops, line)?, 0xF, line)? as u8 },
            "LDM" => Instruction::Ldm { data: self.parse_ranged(single(ops, line)?, 0xF, line)? as u8 },
            m => {
                return Err(AssemblerError::UnknownMnemonic { line, mnemonic: m.to_string() });
            }
        };

        Ok(instr)
    }

    /// A number or a label.
    fn parse_value(&self, token: &str, line: usize) -> Result<i64, AssemblerError> {
        let starts_numeric = token.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '-');
        if starts_numeric {
            return parse_number(token, line);
        }

        let label = token.to_uppercase();
        self.symbols
            .get(&label)
            .map(|&addr| addr as i64)
            .ok_or(AssemblerError::UndefinedLabel { line, label })
    }

    fn parse_ranged(&self, token: &str, max: i64, line: usize) -> Result<i64, AssemblerError> {
        let value = self.parse_value(token, line)?;
        if !(0..=max).contains(&value) {
            return Err(AssemblerError::ValueOutOfRange { line, value });
        }
        Ok(value)
    }

    /// A one-byte jump target: any ROM address below 0x100.
    fn parse_short(&self, token: &str, line: usize) -> Result<u8, AssemblerError> {
        let target = self.parse_ranged(token, 0xFFF, line)? as u16;
        if target > 0xFF {
            return Err(AssemblerError::OutOfPage { line, target });
        }
        Ok(target as u8)
    }
}

/// Encoded size of a mnemonic.
fn length_of(mnemonic: &str) -> Option<u16> {
    match mnemonic {
        "JCN" | "JC" | "JNC" | "JZ" | "JNZ" | "JT" | "JNT" | "FIM" | "JUN" | "JMS" | "ISZ" => Some(2),
        "SRC" | "FIN" | "JIN" | "INC" | "ADD" | "SUB" | "LD" | "XCH" | "BBL" | "LDM" => Some(1),
        m => implied(m).map(|instr| instr.length()),
    }
}

/// Instructions without operands.
fn implied(mnemonic: &str) -> Option<Instruction> {
    let instr = match mnemonic {
        "NOP" => Instruction::Nop,
        "WRM" => Instruction::Wrm,
        "WR0" => Instruction::Wrs { index: 0 },
        "WR1" => Instruction::Wrs { index: 1 },
        "WR2" => Instruction::Wrs { index: 2 },
        "WR3" => Instruction::Wrs { index: 3 },
        "SBM" => Instruction::Sbm,
        "RDM" => Instruction::Rdm,
        "ADM" => Instruction::Adm,
        "RD0" => Instruction::Rds { index: 0 },
        "RD1" => Instruction::Rds { index: 1 },
        "RD2" => Instruction::Rds { index: 2 },
        "RD3" => Instruction::Rds { index: 3 },
        "CLB" => Instruction::Clb,
        "CLC" => Instruction::Clc,
        "IAC" => Instruction::Iac,
        "CMC" => Instruction::Cmc,
        "CMA" => Instruction::Cma,
        "RAL" => Instruction::Ral,
        "RAR" => Instruction::Rar,
        "TCC" => Instruction::Tcc,
        "DAC" => Instruction::Dac,
        "TCS" => Instruction::Tcs,
        "STC" => Instruction::Stc,
        "DAA" => Instruction::Daa,
        "KBP" => Instruction::Kbp,
        _ => return None,
    };
    Some(instr)
}

fn expect_operands<const N: usize>(ops: &[String], line: usize) -> Result<[&str; N], AssemblerError> {
    if ops.len() != N {
        return Err(AssemblerError::SyntaxError {
            line,
            message: format!("expected {} operand(s), found {}", N, ops.len()),
        });
    }
    Ok(std::array::from_fn(|i| ops[i].as_str()))
}

fn single(ops: &[String], line: usize) -> Result<&str, AssemblerError> {
    let [op] = expect_operands::<1>(ops, line)?;
    Ok(op)
}

fn parse_number(token: &str, line: usize) -> Result<i64, AssemblerError> {
    let lower = token.to_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        lower.parse::<i64>()
    };

    parsed.map_err(|_| AssemblerError::SyntaxError {
        line,
        message: format!("invalid number '{}'", token),
    })
}

/// `R0`-`R15` or a bare index.
fn parse_register(token: &str, line: usize) -> Result<u8, AssemblerError> {
    let digits = token.strip_prefix(&['R', 'r'][..]).unwrap_or(token);
    let value = parse_number(digits, line)?;
    if !(0..=15).contains(&value) {
        return Err(AssemblerError::ValueOutOfRange { line, value });
    }
    Ok(value as u8)
}

/// `P0`-`P7` or a bare pair number.
fn parse_pair(token: &str, line: usize) -> Result<RegisterPair, AssemblerError> {
    let digits = token.strip_prefix(&['P', 'p'][..]).unwrap_or(token);
    let value = parse_number(digits, line)?;
    if !(0..=7).contains(&value) {
        return Err(AssemblerError::ValueOutOfRange { line, value });
    }
    Ok(RegisterPair::from_number(value as u8))
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("target {target:#05x} on line {line} is outside page 0")]
    OutOfPage { line: usize, target: u16 },

    #[error("program exceeds ROM size at line {line}")]
    ProgramTooLarge { line: usize },
}
