//! Disassembler for 4004 programs.
//!
//! Reads instructions straight out of a [`MemoryPort`] and renders them
//! in the same text the assembler accepts.

use crate::cpu::decode::{fetch, fetch_byte, DecodeError};
use crate::cpu::memory::{Memory, MemoryConfig, MemoryError, MemoryPort};
use std::fmt::Write;
use thiserror::Error;

/// Disassemble the instruction at nibble address `addr`.
///
/// Returns the text and the instruction length in nibbles.
pub fn disassemble<M: MemoryPort + ?Sized>(mem: &M, addr: u16) -> Result<(String, usize), DisasmError> {
    let instr = fetch::<M, DisasmError>(mem, addr)?;
    Ok((instr.to_string(), instr.length()))
}

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Nibble address of the first nibble.
    pub addr: u16,
    /// Raw bytes as they sit in memory.
    pub bytes: Vec<u8>,
    /// Assembler text, or a `DB` directive for undecodable bytes.
    pub text: String,
    /// Length in nibbles.
    pub length: usize,
}

/// Disassemble every instruction in `[start, end)`.
///
/// Bytes that do not decode become `DB` rows so the listing keeps going.
/// Stops early, without error, at the end of the backing memory.
pub fn disassemble_range<M: MemoryPort + ?Sized>(mem: &M, start: u16, end: u16) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut addr = start;

    while addr < end {
        let (text, len) = match disassemble(mem, addr) {
            Ok(row) => row,
            Err(DisasmError::Decode(_)) => match fetch_byte(mem, addr) {
                Ok(byte) => (format!("DB 0x{byte:02X}"), 2),
                Err(_) => break,
            },
            Err(DisasmError::Memory(_)) => break,
        };

        let bytes = (0..len / 2)
            .map_while(|i| fetch_byte(mem, addr.wrapping_add(2 * i as u16)).ok())
            .collect();
        lines.push(Line { addr, bytes, text, length: len });
        addr = addr.saturating_add(len as u16);
    }

    lines
}

/// Render rows as a listing: address, raw bytes, text.
pub fn format_listing(lines: &[Line]) -> String {
    let mut output = String::new();
    output.push_str("; i4004 disassembly\n");
    output.push_str("; -----------------\n\n");

    for line in lines {
        let bytes: Vec<String> = line.bytes.iter().map(|b| format!("{b:02X}")).collect();
        let _ = writeln!(output, "{:03X}: {:<6} {}", line.addr, bytes.join(" "), line.text);
    }

    output
}

/// Disassemble a whole byte image loaded at address 0.
pub fn disassemble_image(image: &[u8]) -> Result<String, MemoryError> {
    let nibbles = image.len() * 2;
    let mut mem = Memory::with_config(MemoryConfig {
        program_nibbles: nibbles,
        ..MemoryConfig::default()
    });
    mem.load_program(0, image)?;

    let end = u16::try_from(nibbles).unwrap_or(u16::MAX);
    Ok(format_listing(&disassemble_range(&mem, 0, end)))
}

/// Errors that can occur during disassembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisasmError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}
