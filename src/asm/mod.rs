//! Assembler and disassembler for 4004 programs.
//!
//! This module provides:
//! - A single-instruction assembler and a two-pass program assembler
//! - A disassembler that reads straight from memory
//! - A hex text image format for assembled programs

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, assemble_instruction, assemble_program, AsmError};
pub use disasm::{disassemble, disassemble_image, disassemble_range, format_listing, DisasmError, Line};
pub use image::{format_image, load_image, parse_image, save_image, ImageError};
