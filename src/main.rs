//! i4004 Emulator - CLI Entry Point
//!
//! Commands:
//! - `i4004-emu run <program>` - Run a ROM image (.bin/.hex) or ASM file
//! - `i4004-emu asm <source>` - Assemble to a hex image

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "i4004-emu")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "A cycle-aware emulator of the Intel 4004 4-bit processor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program for a bounded number of instructions
    Run {
        /// Path to the ROM image (.bin, .hex) or ASM file to execute
        program: String,
        /// Maximum number of instructions to execute (default: 10000)
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Show trace output
        #[arg(short, long)]
        trace: bool,
        /// Print the final processor state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assemble source to a hex image
    Asm {
        /// Path to the source file
        source: String,
        /// Output image file
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { program, max_steps, trace, json }) => {
            run_program(&program, max_steps, trace, json);
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output);
        }
        None => {
            println!("i4004 Emulator v0.1.0");
            println!("A cycle-aware Intel 4004 emulator");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Load a program as ROM bytes, assembling first if it is source.
fn load_program(path: &str) -> Vec<u8> {
    use i4004::{assemble, load_image};

    if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Failed to read file: {}", e);
                std::process::exit(1);
            }
        };

        match assemble(&source) {
            Ok(image) => {
                println!("📝 Assembled {} bytes", image.len());
                image
            }
            Err(e) => {
                eprintln!("❌ Assembly error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match load_image(path) {
            Ok(image) => {
                println!("📂 Loaded {} bytes", image.len());
                image
            }
            Err(e) => {
                eprintln!("❌ Failed to load image: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_program(path: &str, max_steps: u64, trace: bool, json: bool) {
    use i4004::Cpu;

    println!("🔧 Running: {}", path);

    let image = load_program(path);
    if image.is_empty() {
        eprintln!("❌ No instructions to execute");
        std::process::exit(1);
    }

    let mut cpu = match Cpu::with_program(&image) {
        Ok(cpu) => cpu,
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            std::process::exit(1);
        }
    };

    println!();
    println!("━━━ Execution ━━━");

    while cpu.is_running() && cpu.steps() < max_steps {
        let pc = cpu.pc();

        match cpu.step() {
            Ok(cost) => {
                if trace {
                    if let Some(instr) = cpu.last_instruction() {
                        println!("{:03X}: {:<4} {:?}  A={:X} CY={} cyc+{}",
                            pc, instr.mnemonic(), instr, cpu.acc(), cpu.carry() as u8, cost);
                    }
                }
            }
            Err(e) => {
                eprintln!("❌ CPU error at PC={:03X}: {}", pc, e);
                std::process::exit(1);
            }
        }
    }
    cpu.halt();

    println!();
    println!("━━━ Result ━━━");
    println!("Steps:  {}", cpu.steps());
    println!("Cycles: {}", cpu.cycles());
    println!("PC:     {:03X}", cpu.pc());
    println!("A:      {:X}", cpu.acc());
    println!("CY:     {}", cpu.carry() as u8);
    println!("Stack:  {:03X?}", cpu.stack().as_slice());
    let regs: Vec<String> = cpu.registers()
        .registers()
        .iter()
        .map(|r| format!("{:X}", r))
        .collect();
    println!("R0-R15: {}", regs.join(" "));

    if json {
        match serde_json::to_string_pretty(&cpu) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("❌ Failed to serialize state: {}", e),
        }
    }

    if cpu.steps() >= max_steps {
        println!();
        println!("⚠️  Reached step limit ({}). Use --max-steps to increase.", max_steps);
    }
}

fn assemble_file(source_path: &str, output: Option<String>) {
    use i4004::{assemble, save_hex};

    let out_path = output.unwrap_or_else(|| {
        format!("{}.hex", source_path.trim_end_matches(".asm"))
    });

    println!("📝 Assembling: {} → {}", source_path, out_path);

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    let image = match assemble(&source) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Assembly error: {}", e);
            std::process::exit(1);
        }
    };

    println!("✓ Assembled {} bytes", image.len());

    if let Err(e) = save_hex(&out_path, &image) {
        eprintln!("❌ Failed to save image: {}", e);
        std::process::exit(1);
    }

    println!("✓ Saved to {}", out_path);
}
