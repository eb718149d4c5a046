//! Intel 4004 Simulator - CLI Entry Point
//!
//! Commands:
//! - `i4004-sim run <program>` - Run a hex image or ASM file
//! - `i4004-sim asm <source>` - Assemble to a hex image
//! - `i4004-sim disasm <image>` - Disassemble a hex image

use clap::{Parser, Subcommand};
use i4004::cpu::memory::{DATA_NIBBLES, PROGRAM_NIBBLES};
use i4004::cpu::RegisterName;
use i4004::{Cpu, Memory, MemoryConfig};
use log::{debug, error};

#[derive(Parser)]
#[command(name = "i4004-sim")]
#[command(version = "0.1.0")]
#[command(about = "An instruction-set simulator, disassembler and assembler for the Intel 4004")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program for a bounded number of instructions
    Run {
        /// Path to the hex image or ASM file to execute
        program: String,
        /// Maximum number of instructions to run
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Log every executed instruction (same as RUST_LOG=trace)
        #[arg(short, long)]
        trace: bool,
        /// Print the final registers as JSON
        #[arg(long)]
        json: bool,
        /// Program memory size in nibbles
        #[arg(long, default_value_t = PROGRAM_NIBBLES)]
        rom_nibbles: usize,
        /// Data memory size in nibbles
        #[arg(long, default_value_t = DATA_NIBBLES)]
        ram_nibbles: usize,
    },
    /// Assemble source to a hex image
    Asm {
        /// Path to the source file
        source: String,
        /// Output image file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble a hex image to readable text
    Disasm {
        /// Path to the image file
        image: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; --trace only changes the default.
    let trace = matches!(cli.command, Commands::Run { trace: true, .. });
    let default_level = if trace { "trace" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match cli.command {
        Commands::Run { program, max_steps, json, rom_nibbles, ram_nibbles, .. } => {
            let config = MemoryConfig {
                program_nibbles: rom_nibbles,
                data_nibbles: ram_nibbles,
            };
            run_program(&program, max_steps, json, config);
        }
        Commands::Asm { source, output } => {
            assemble_file(&source, output);
        }
        Commands::Disasm { image } => {
            disassemble_file(&image);
        }
    }
}

/// Print a message and exit with a failure status.
fn fail(message: String) -> ! {
    error!("{message}");
    eprintln!("❌ {message}");
    std::process::exit(1);
}

/// Load a program: `.asm` files are assembled, anything else is read as
/// a hex image.
fn load_bytes(path: &str) -> Vec<u8> {
    if path.ends_with(".asm") {
        let source = std::fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("Failed to read file: {e}")));
        i4004::assemble_program(&source)
            .unwrap_or_else(|e| fail(format!("Assembly error: {e}")))
    } else {
        i4004::load_image(path).unwrap_or_else(|e| fail(format!("Failed to load image: {e}")))
    }
}

fn run_program(path: &str, max_steps: u64, json: bool, config: MemoryConfig) {
    let bytes = load_bytes(path);
    if bytes.is_empty() {
        fail("No instructions to execute".to_string());
    }
    debug!("{path}: {} bytes", bytes.len());

    let mut mem = Memory::with_config(config);
    if let Err(e) = mem.load_program(0, &bytes) {
        fail(format!("Failed to load program: {e}"));
    }
    let mut cpu = Cpu::new(mem);

    if !json {
        println!("🔧 Running: {path} ({} bytes)", bytes.len());
    }

    if let Err(e) = cpu.run_limited(max_steps) {
        fail(format!("CPU error at PC=0x{:03X}: {e}", cpu.regs.pc));
    }

    if json {
        match serde_json::to_string_pretty(&cpu.regs) {
            Ok(text) => println!("{text}"),
            Err(e) => fail(format!("Failed to serialize registers: {e}")),
        }
        return;
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Steps:  {}", cpu.steps);
    println!("Cycles: {}", cpu.cycles);
    if let Some(instr) = cpu.last_instruction() {
        println!("Last:   {instr}");
    }
    for reg in RegisterName::all() {
        let value = cpu.regs.read(reg);
        let digits = (reg.bits() as usize).div_ceil(4);
        println!("{:<9} 0x{value:0digits$X}", reg.to_string());
    }
}

fn assemble_file(source_path: &str, output: Option<String>) {
    let out_path = output.unwrap_or_else(|| match source_path.strip_suffix(".asm") {
        Some(stem) => format!("{stem}.hex"),
        None => format!("{source_path}.hex"),
    });

    println!("📝 Assembling: {source_path} → {out_path}");

    let source = std::fs::read_to_string(source_path)
        .unwrap_or_else(|e| fail(format!("Failed to read file: {e}")));
    let bytes = i4004::assemble_program(&source)
        .unwrap_or_else(|e| fail(format!("Assembly error: {e}")));

    println!("✓ Assembled {} bytes", bytes.len());

    if let Err(e) = i4004::save_image(&out_path, &bytes) {
        fail(format!("Failed to save image: {e}"));
    }

    println!("✓ Saved to {out_path}");
}

fn disassemble_file(image_path: &str) {
    let bytes = i4004::load_image(image_path)
        .unwrap_or_else(|e| fail(format!("Failed to load image: {e}")));

    match i4004::asm::disassemble_image(&bytes) {
        Ok(listing) => println!("{listing}"),
        Err(e) => fail(format!("Failed to disassemble: {e}")),
    }
}
