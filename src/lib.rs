//! # Intel 4004 Simulator
//!
//! An instruction-set simulator for the Intel 4004 (1971), with a matching
//! disassembler and assembler.
//!
//! The core executes one instruction per [`Cpu::step`] against memory it
//! reaches only through the [`MemoryPort`] trait, so the same executor runs
//! over the stock [`Memory`] or any other nibble store.

pub mod cpu;
pub mod asm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuError, Instruction, Memory, MemoryConfig, MemoryPort, Registers, Space};
pub use asm::{assemble, assemble_program, disassemble, AsmError, DisasmError, load_image, save_image};
