//! Instruction decoder for the 4004.
//!
//! Instructions are one or two bytes (two or four nibbles). The high
//! nibble of the first byte selects one of sixteen groups; the low nibble
//! is a register, pair, literal, condition or sub-opcode depending on the
//! group.
//!
//! [`Instruction`] is the one table every other component works from: the
//! executor matches on it, the disassembler prints it through `Display`, and
//! the assembler builds it and calls [`encode`].

use crate::cpu::memory::{MemoryError, MemoryPort, Space};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// JCN condition nibble.
///
/// Bit 3 inverts the test, bit 2 tests A = 0, bit 1 tests carry = 1 and
/// bit 0 tests the external TEST pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition(u8);

impl Condition {
    pub const INVERT: u8 = 0b1000;
    pub const ACC_ZERO: u8 = 0b0100;
    pub const CARRY: u8 = 0b0010;
    pub const TEST: u8 = 0b0001;

    /// Assembler names, indexed by condition nibble. The empty name is the
    /// inverted form with no tests selected, which always jumps.
    pub const NAMES: [&'static str; 16] = [
        "NEVER", "T", "C", "CT", "Z", "ZT", "ZC", "ZCT",
        "", "NT", "NC", "NCT", "NZ", "NZT", "NZC", "NZCT",
    ];

    /// Wrap a condition nibble.
    pub const fn new(bits: u8) -> Self {
        Self(bits & 0xF)
    }

    /// The raw nibble.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Look up a condition by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| Self(i as u8))
    }

    /// The assembler name of this condition.
    pub fn name(self) -> &'static str {
        Self::NAMES[usize::from(self.0)]
    }

    /// Evaluate against the accumulator, carry and TEST pin.
    ///
    /// Without the invert bit the jump is taken when any selected test
    /// holds; with it, when none of them does.
    pub fn holds(self, acc: u8, carry: bool, test_pin: bool) -> bool {
        let any = (self.0 & Self::ACC_ZERO != 0 && acc == 0)
            || (self.0 & Self::CARRY != 0 && carry)
            || (self.0 & Self::TEST != 0 && test_pin);

        if self.0 & Self::INVERT != 0 { !any } else { any }
    }
}

/// Decoded 4004 instruction.
///
/// Register operands are register numbers (0..15); pair operands are pair
/// numbers (0..7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Control ====================

    /// No operation
    Nop,
    /// Jump conditional within the page: if cond then PC := page | addr
    Jcn { cond: Condition, addr: u8 },
    /// Jump unconditional: PC := addr
    Jun { addr: u16 },
    /// Jump to subroutine: push PC + 4, PC := addr
    Jms { addr: u16 },
    /// Jump indirect: PC := page | P0
    Jin { pair: u8 },
    /// Increment and skip on zero: R := R + 1; if R != 0 then PC := page | addr
    Isz { reg: u8, addr: u8 },
    /// Branch back and load: PC := pop, A := data
    Bbl { data: u8 },

    // ==================== Register ====================

    /// Fetch immediate: P := data
    Fim { pair: u8, data: u8 },
    /// Send register control: RegCtrl := P
    Src { pair: u8 },
    /// Fetch indirect from ROM: P := ROM[page | P0]
    Fin { pair: u8 },
    /// Increment register: R := R + 1
    Inc { reg: u8 },
    /// A := A + R + C
    Add { reg: u8 },
    /// A := A - R - borrow
    Sub { reg: u8 },
    /// A := R
    Ld { reg: u8 },
    /// Exchange A and R
    Xch { reg: u8 },
    /// Load immediate: A := data
    Ldm { data: u8 },

    // ==================== RAM / IO (0xE_) ====================

    /// Write A to the selected RAM character
    Wrm,
    /// Write A to the RAM output port
    Wmp,
    /// Write A to the ROM output port
    Wrr,
    /// Write A to program RAM
    Wpm,
    /// Write A to RAM status character 0..3
    Wr { status: u8 },
    /// Subtract the RAM character from A
    Sbm,
    /// Read the RAM character into A
    Rdm,
    /// Read the ROM input port into A
    Rdr,
    /// Add the RAM character to A
    Adm,
    /// Read RAM status character 0..3 into A
    Rd { status: u8 },

    // ==================== Accumulator (0xF_) ====================

    /// Clear both: A := 0, C := 0
    Clb,
    /// Clear carry
    Clc,
    /// Increment accumulator
    Iac,
    /// Complement carry
    Cmc,
    /// Complement accumulator
    Cma,
    /// Rotate left through carry
    Ral,
    /// Rotate right through carry
    Rar,
    /// Transmit carry and clear: A := C, C := 0
    Tcc,
    /// Decrement accumulator
    Dac,
    /// Transfer carry subtract: A := C ? 10 : 9, C := 0
    Tcs,
    /// Set carry
    Stc,
    /// Decimal adjust accumulator
    Daa,
    /// Keyboard process
    Kbp,
    /// Designate command line (RAM bank)
    Dcl,
}

impl Instruction {
    /// Length in nibbles: 4 for two-byte instructions, 2 otherwise.
    pub fn length(&self) -> usize {
        match self {
            Instruction::Jcn { .. }
            | Instruction::Fim { .. }
            | Instruction::Jun { .. }
            | Instruction::Jms { .. }
            | Instruction::Isz { .. } => 4,
            _ => 2,
        }
    }

    /// Mnemonic text, as the assembler expects it.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Nop => "NOP",
            Instruction::Jcn { .. } => "JCN",
            Instruction::Jun { .. } => "JUN",
            Instruction::Jms { .. } => "JMS",
            Instruction::Jin { .. } => "JIN",
            Instruction::Isz { .. } => "ISZ",
            Instruction::Bbl { .. } => "BBL",
            Instruction::Fim { .. } => "FIM",
            Instruction::Src { .. } => "SRC",
            Instruction::Fin { .. } => "FIN",
            Instruction::Inc { .. } => "INC",
            Instruction::Add { .. } => "ADD",
            Instruction::Sub { .. } => "SUB",
            Instruction::Ld { .. } => "LD",
            Instruction::Xch { .. } => "XCH",
            Instruction::Ldm { .. } => "LDM",
            Instruction::Wrm => "WRM",
            Instruction::Wmp => "WMP",
            Instruction::Wrr => "WRR",
            Instruction::Wpm => "WPM",
            Instruction::Wr { status } => ["WR0", "WR1", "WR2", "WR3"][usize::from(status & 3)],
            Instruction::Sbm => "SBM",
            Instruction::Rdm => "RDM",
            Instruction::Rdr => "RDR",
            Instruction::Adm => "ADM",
            Instruction::Rd { status } => ["RD0", "RD1", "RD2", "RD3"][usize::from(status & 3)],
            Instruction::Clb => "CLB",
            Instruction::Clc => "CLC",
            Instruction::Iac => "IAC",
            Instruction::Cmc => "CMC",
            Instruction::Cma => "CMA",
            Instruction::Ral => "RAL",
            Instruction::Rar => "RAR",
            Instruction::Tcc => "TCC",
            Instruction::Dac => "DAC",
            Instruction::Tcs => "TCS",
            Instruction::Stc => "STC",
            Instruction::Daa => "DAA",
            Instruction::Kbp => "KBP",
            Instruction::Dcl => "DCL",
        }
    }
}

/// Renders the canonical assembler text: 8- and 12-bit operands in `0x`
/// hex, 4-bit literals in decimal.
impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = self.mnemonic();
        match self {
            Instruction::Jcn { cond, addr } if cond.name().is_empty() => {
                write!(f, "{m} 0x{addr:02X}")
            }
            Instruction::Jcn { cond, addr } => write!(f, "{m} {},0x{addr:02X}", cond.name()),
            Instruction::Jun { addr } | Instruction::Jms { addr } => write!(f, "{m} 0x{addr:03X}"),
            Instruction::Isz { reg, addr } => write!(f, "{m} R{reg},0x{addr:02X}"),
            Instruction::Fim { pair, data } => write!(f, "{m} P{pair},0x{data:02X}"),
            Instruction::Jin { pair } | Instruction::Src { pair } | Instruction::Fin { pair } => {
                write!(f, "{m} P{pair}")
            }
            Instruction::Inc { reg }
            | Instruction::Add { reg }
            | Instruction::Sub { reg }
            | Instruction::Ld { reg }
            | Instruction::Xch { reg } => write!(f, "{m} R{reg}"),
            Instruction::Bbl { data } | Instruction::Ldm { data } => write!(f, "{m} {data}"),
            _ => f.write_str(m),
        }
    }
}

/// Length in nibbles implied by the first byte, before the rest is fetched.
pub fn length_of(opcode: u8) -> usize {
    match opcode >> 4 {
        0x1 | 0x4 | 0x5 | 0x7 => 4,
        0x2 if opcode & 1 == 0 => 4,
        _ => 2,
    }
}

/// Decode an instruction from its first byte and, for four-nibble
/// instructions, its second byte.
pub fn decode(opcode: u8, operand: u8) -> Result<Instruction, DecodeError> {
    let low = opcode & 0xF;

    let instruction = match opcode >> 4 {
        0x0 if low == 0 => Instruction::Nop,
        0x0 => return Err(DecodeError::InvalidOpcode(opcode)),
        0x1 => Instruction::Jcn { cond: Condition::new(low), addr: operand },
        0x2 if low & 1 == 0 => Instruction::Fim { pair: low >> 1, data: operand },
        0x2 => Instruction::Src { pair: low >> 1 },
        0x3 if low & 1 == 0 => Instruction::Fin { pair: low >> 1 },
        0x3 => Instruction::Jin { pair: low >> 1 },
        0x4 => Instruction::Jun { addr: (u16::from(low) << 8) | u16::from(operand) },
        0x5 => Instruction::Jms { addr: (u16::from(low) << 8) | u16::from(operand) },
        0x6 => Instruction::Inc { reg: low },
        0x7 => Instruction::Isz { reg: low, addr: operand },
        0x8 => Instruction::Add { reg: low },
        0x9 => Instruction::Sub { reg: low },
        0xA => Instruction::Ld { reg: low },
        0xB => Instruction::Xch { reg: low },
        0xC => Instruction::Bbl { data: low },
        0xD => Instruction::Ldm { data: low },
        0xE => match low {
            0x0 => Instruction::Wrm,
            0x1 => Instruction::Wmp,
            0x2 => Instruction::Wrr,
            0x3 => Instruction::Wpm,
            0x4..=0x7 => Instruction::Wr { status: low - 0x4 },
            0x8 => Instruction::Sbm,
            0x9 => Instruction::Rdm,
            0xA => Instruction::Rdr,
            0xB => Instruction::Adm,
            _ => Instruction::Rd { status: low - 0xC },
        },
        _ => match low {
            0x0 => Instruction::Clb,
            0x1 => Instruction::Clc,
            0x2 => Instruction::Iac,
            0x3 => Instruction::Cmc,
            0x4 => Instruction::Cma,
            0x5 => Instruction::Ral,
            0x6 => Instruction::Rar,
            0x7 => Instruction::Tcc,
            0x8 => Instruction::Dac,
            0x9 => Instruction::Tcs,
            0xA => Instruction::Stc,
            0xB => Instruction::Daa,
            0xC => Instruction::Kbp,
            0xD => Instruction::Dcl,
            _ => return Err(DecodeError::InvalidSubOpcode(opcode)),
        },
    };

    Ok(instruction)
}

/// Encode an instruction back to its bytes (one or two).
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let op = |group: u8, low: u8| (group << 4) | (low & 0xF);

    match *instr {
        Instruction::Nop => vec![0x00],
        Instruction::Jcn { cond, addr } => vec![op(0x1, cond.bits()), addr],
        Instruction::Fim { pair, data } => vec![op(0x2, (pair & 7) << 1), data],
        Instruction::Src { pair } => vec![op(0x2, ((pair & 7) << 1) | 1)],
        Instruction::Fin { pair } => vec![op(0x3, (pair & 7) << 1)],
        Instruction::Jin { pair } => vec![op(0x3, ((pair & 7) << 1) | 1)],
        Instruction::Jun { addr } => vec![op(0x4, (addr >> 8) as u8), addr as u8],
        Instruction::Jms { addr } => vec![op(0x5, (addr >> 8) as u8), addr as u8],
        Instruction::Inc { reg } => vec![op(0x6, reg)],
        Instruction::Isz { reg, addr } => vec![op(0x7, reg), addr],
        Instruction::Add { reg } => vec![op(0x8, reg)],
        Instruction::Sub { reg } => vec![op(0x9, reg)],
        Instruction::Ld { reg } => vec![op(0xA, reg)],
        Instruction::Xch { reg } => vec![op(0xB, reg)],
        Instruction::Bbl { data } => vec![op(0xC, data)],
        Instruction::Ldm { data } => vec![op(0xD, data)],
        Instruction::Wrm => vec![0xE0],
        Instruction::Wmp => vec![0xE1],
        Instruction::Wrr => vec![0xE2],
        Instruction::Wpm => vec![0xE3],
        Instruction::Wr { status } => vec![0xE4 + (status & 3)],
        Instruction::Sbm => vec![0xE8],
        Instruction::Rdm => vec![0xE9],
        Instruction::Rdr => vec![0xEA],
        Instruction::Adm => vec![0xEB],
        Instruction::Rd { status } => vec![0xEC + (status & 3)],
        Instruction::Clb => vec![0xF0],
        Instruction::Clc => vec![0xF1],
        Instruction::Iac => vec![0xF2],
        Instruction::Cmc => vec![0xF3],
        Instruction::Cma => vec![0xF4],
        Instruction::Ral => vec![0xF5],
        Instruction::Rar => vec![0xF6],
        Instruction::Tcc => vec![0xF7],
        Instruction::Dac => vec![0xF8],
        Instruction::Tcs => vec![0xF9],
        Instruction::Stc => vec![0xFA],
        Instruction::Daa => vec![0xFB],
        Instruction::Kbp => vec![0xFC],
        Instruction::Dcl => vec![0xFD],
    }
}

/// Expand bytes into nibbles in ascending address order (low nibble of
/// each byte first), i.e. the order they occupy in a [`MemoryPort`].
pub fn to_nibbles(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|b| [b & 0xF, b >> 4]).collect()
}

/// Fetch and decode the instruction at nibble address `pc`.
///
/// The second byte is read only for four-nibble instructions, and the
/// opcode byte is decoded before it is fetched, so an illegal opcode is
/// reported as a decode error even at the very end of memory.
pub fn fetch<M, E>(mem: &M, pc: u16) -> Result<Instruction, E>
where
    M: MemoryPort + ?Sized,
    E: From<DecodeError> + From<MemoryError>,
{
    let opcode = fetch_byte(mem, pc)?;
    if length_of(opcode) == 2 {
        return Ok(decode(opcode, 0)?);
    }

    let operand = fetch_byte(mem, pc.wrapping_add(2))?;
    Ok(decode(opcode, operand)?)
}

/// Read the program byte at nibble address `addr`. Both nibble addresses
/// wrap at 12 bits, so the byte at 0xFFF takes its high nibble from 0x000.
pub fn fetch_byte<M>(mem: &M, addr: u16) -> Result<u8, MemoryError>
where
    M: MemoryPort + ?Sized,
{
    let low = mem.read_nibble(Space::Program, addr & 0xFFF)?;
    let high = mem.read_nibble(Space::Program, addr.wrapping_add(1) & 0xFFF)?;
    Ok((high << 4) | (low & 0xF))
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No instruction is assigned to this opcode byte.
    #[error("invalid opcode: 0x{0:02X}")]
    InvalidOpcode(u8),

    /// The group exists but this sub-opcode is unassigned.
    #[error("invalid sub-opcode: 0x{0:02X}")]
    InvalidSubOpcode(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nop() {
        assert_eq!(decode(0x00, 0).unwrap(), Instruction::Nop);
        assert_eq!(decode(0x05, 0), Err(DecodeError::InvalidOpcode(0x05)));
    }

    #[test]
    fn test_decode_illegal_accumulator_ops() {
        assert_eq!(decode(0xFE, 0), Err(DecodeError::InvalidSubOpcode(0xFE)));
        assert_eq!(decode(0xFF, 0), Err(DecodeError::InvalidSubOpcode(0xFF)));
    }

    #[test]
    fn test_shared_group_split_on_low_bit() {
        assert_eq!(decode(0x24, 0x5A).unwrap(), Instruction::Fim { pair: 2, data: 0x5A });
        assert_eq!(decode(0x25, 0).unwrap(), Instruction::Src { pair: 2 });
        assert_eq!(decode(0x3E, 0).unwrap(), Instruction::Fin { pair: 7 });
        assert_eq!(decode(0x3F, 0).unwrap(), Instruction::Jin { pair: 7 });
    }

    #[test]
    fn test_decode_long_address() {
        assert_eq!(decode(0x4A, 0xBC).unwrap(), Instruction::Jun { addr: 0xABC });
        assert_eq!(decode(0x51, 0x23).unwrap(), Instruction::Jms { addr: 0x123 });
    }

    #[test]
    fn test_length_of_matches_decoded_length() {
        for opcode in 0..=0xFFu8 {
            if let Ok(instr) = decode(opcode, 0x42) {
                assert_eq!(length_of(opcode), instr.length(), "opcode 0x{opcode:02X}");
            }
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for opcode in 0..=0xFFu8 {
            let Ok(instr) = decode(opcode, 0x9C) else { continue };
            let bytes = encode(&instr);
            assert_eq!(bytes[0], opcode);
            assert_eq!(bytes.len() * 2, instr.length());
            if bytes.len() == 2 {
                assert_eq!(bytes[1], 0x9C);
            }
        }
    }

    #[test]
    fn test_condition_names_unique() {
        for (i, name) in Condition::NAMES.iter().enumerate() {
            assert_eq!(Condition::from_name(name), Some(Condition::new(i as u8)));
        }
        assert_eq!(Condition::from_name("nz"), Some(Condition::new(0xC)));
        assert_eq!(Condition::from_name("XYZ"), None);
    }

    #[test]
    fn test_condition_evaluation() {
        let zero = Condition::new(Condition::ACC_ZERO);
        assert!(zero.holds(0, false, false));
        assert!(!zero.holds(3, false, false));

        let not_zero = Condition::new(Condition::INVERT | Condition::ACC_ZERO);
        assert!(not_zero.holds(3, false, false));
        assert!(!not_zero.holds(0, false, false));

        let always = Condition::from_name("").unwrap();
        assert!(always.holds(0, true, false));
        assert!(!Condition::new(0).holds(0, true, true));

        // Inverted: jump only when none of the selected tests holds.
        let nzc = Condition::from_name("NZC").unwrap();
        assert!(nzc.holds(1, false, true));
        assert!(!nzc.holds(0, false, true));
        assert!(!nzc.holds(1, true, true));
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::Jcn { cond: Condition::new(0xC), addr: 0x3A }.to_string(), "JCN NZ,0x3A");
        assert_eq!(Instruction::Jcn { cond: Condition::new(0x8), addr: 0x05 }.to_string(), "JCN 0x05");
        assert_eq!(Instruction::Fim { pair: 3, data: 0x0F }.to_string(), "FIM P3,0x0F");
        assert_eq!(Instruction::Jms { addr: 0x01F }.to_string(), "JMS 0x01F");
        assert_eq!(Instruction::Isz { reg: 12, addr: 0xFF }.to_string(), "ISZ R12,0xFF");
        assert_eq!(Instruction::Ldm { data: 9 }.to_string(), "LDM 9");
        assert_eq!(Instruction::Rd { status: 2 }.to_string(), "RD2");
    }

    #[test]
    fn test_fetch_wraps_at_end_of_program_space() {
        use crate::cpu::memory::Memory;

        let mut mem = Memory::new();
        mem.write_nibble(Space::Program, 0xFFF, 0x7).unwrap();
        mem.write_nibble(Space::Program, 0x000, 0xD).unwrap();

        assert_eq!(fetch_byte(&mem, 0xFFF).unwrap(), 0xD7);
        assert_eq!(fetch::<_, crate::cpu::CpuError>(&mem, 0xFFF).unwrap(), Instruction::Ldm { data: 7 });
    }

    #[test]
    fn test_nibble_order() {
        assert_eq!(to_nibbles(&[0x5A, 0x31]), vec![0xA, 0x5, 0x1, 0x3]);
    }
}
