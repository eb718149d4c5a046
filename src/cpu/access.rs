//! Named access to every architectural register.
//!
//! Used by debuggers and other tooling; the executor never goes through
//! here. Names are `A`, `C`, `PC`, `DtRamBnk`, `RegCtrl`, `R0`..`R15`,
//! `P0`..`P7` and `Stack0`..`Stack2` (`Stack0` is the top of the return
//! stack).

use crate::cpu::registers::{Registers, STACK_DEPTH};
use log::debug;
use std::str::FromStr;
use thiserror::Error;

/// An architectural register name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterName {
    Acc,
    Carry,
    Pc,
    DataRamBank,
    RegCtrl,
    Index(u8),
    Pair(u8),
    Stack(u8),
}

impl RegisterName {
    /// Every name, in display order.
    pub fn all() -> impl Iterator<Item = RegisterName> {
        [Self::Acc, Self::Carry, Self::Pc, Self::DataRamBank, Self::RegCtrl]
            .into_iter()
            .chain((0..16).map(Self::Index))
            .chain((0..8).map(Self::Pair))
            .chain((0..STACK_DEPTH as u8).map(Self::Stack))
    }

    /// Width in bits.
    pub fn bits(self) -> u32 {
        match self {
            Self::Acc | Self::DataRamBank | Self::Index(_) => 4,
            Self::Carry => 1,
            Self::Pc | Self::Stack(_) => 12,
            Self::RegCtrl | Self::Pair(_) => 8,
        }
    }
}

impl FromStr for RegisterName {
    type Err = RegisterError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || RegisterError::Unknown(name.to_string());

        let indexed = |prefix: &str, count: u8| -> Option<u8> {
            let digits = name.strip_prefix(prefix)?;
            // Reject forms like "R+1" or "R01" that `parse` would accept.
            if digits.is_empty()
                || !digits.bytes().all(|b| b.is_ascii_digit())
                || (digits.len() > 1 && digits.starts_with('0'))
            {
                return None;
            }
            digits.parse::<u8>().ok().filter(|n| *n < count)
        };

        match name {
            "A" => Ok(Self::Acc),
            "C" => Ok(Self::Carry),
            "PC" => Ok(Self::Pc),
            "DtRamBnk" => Ok(Self::DataRamBank),
            "RegCtrl" => Ok(Self::RegCtrl),
            _ => {
                if let Some(n) = indexed("Stack", STACK_DEPTH as u8) {
                    Ok(Self::Stack(n))
                } else if let Some(n) = indexed("R", 16) {
                    Ok(Self::Index(n))
                } else if let Some(n) = indexed("P", 8) {
                    Ok(Self::Pair(n))
                } else {
                    Err(unknown())
                }
            }
        }
    }
}

impl std::fmt::Display for RegisterName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acc => write!(f, "A"),
            Self::Carry => write!(f, "C"),
            Self::Pc => write!(f, "PC"),
            Self::DataRamBank => write!(f, "DtRamBnk"),
            Self::RegCtrl => write!(f, "RegCtrl"),
            Self::Index(n) => write!(f, "R{n}"),
            Self::Pair(n) => write!(f, "P{n}"),
            Self::Stack(n) => write!(f, "Stack{n}"),
        }
    }
}

impl Registers {
    /// Read a register by name.
    pub fn get(&self, name: &str) -> Result<u32, RegisterError> {
        Ok(self.read(name.parse()?))
    }

    /// Write a register by name. Values wider than the register are
    /// rejected, not truncated.
    pub fn set(&mut self, name: &str, value: u32) -> Result<(), RegisterError> {
        self.write(name.parse()?, value)
    }

    /// Width of a register in bits.
    pub fn size(&self, name: &str) -> Result<u32, RegisterError> {
        Ok(name.parse::<RegisterName>()?.bits())
    }

    /// Read a register.
    pub fn read(&self, reg: RegisterName) -> u32 {
        match reg {
            RegisterName::Acc => u32::from(self.acc),
            RegisterName::Carry => u32::from(self.carry),
            RegisterName::Pc => u32::from(self.pc),
            RegisterName::DataRamBank => u32::from(self.bank),
            RegisterName::RegCtrl => u32::from(self.reg_ctrl),
            RegisterName::Index(n) => u32::from(self.reg(n)),
            RegisterName::Pair(n) => u32::from(self.pair(n)),
            RegisterName::Stack(n) => u32::from(self.stack.get(usize::from(n))),
        }
    }

    /// Write a register, enforcing its width.
    pub fn write(&mut self, reg: RegisterName, value: u32) -> Result<(), RegisterError> {
        let bits = reg.bits();
        if value >> bits != 0 {
            return Err(RegisterError::IllegalValue { name: reg.to_string(), value, bits });
        }

        // Width-checked above, so the narrowing casts keep every bit.
        match reg {
            RegisterName::Acc => self.acc = value as u8,
            RegisterName::Carry => self.carry = value != 0,
            RegisterName::Pc => self.pc = value as u16,
            RegisterName::DataRamBank => self.bank = value as u8,
            RegisterName::RegCtrl => self.reg_ctrl = value as u8,
            RegisterName::Index(n) => self.set_reg(n, value as u8),
            RegisterName::Pair(n) => self.set_pair(n, value as u8),
            RegisterName::Stack(n) => self.stack.set(usize::from(n), value as u16),
        }
        debug!("{reg} := 0x{value:X}");
        Ok(())
    }
}

/// Errors from named register access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("unknown register: {0}")]
    Unknown(String),

    #[error("value 0x{value:X} does not fit {name} ({bits} bits)")]
    IllegalValue { name: String, value: u32, bits: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_decomposes() {
        let mut regs = Registers::new();
        regs.set("P3", 0x1A).unwrap();
        assert_eq!(regs.get("R6").unwrap(), 1);
        assert_eq!(regs.get("R7").unwrap(), 0xA);

        regs.set("R7", 0x4).unwrap();
        assert_eq!(regs.get("P3").unwrap(), 0x14);
    }

    #[test]
    fn test_sizes() {
        let regs = Registers::new();
        for (name, bits) in [
            ("A", 4),
            ("C", 1),
            ("PC", 12),
            ("DtRamBnk", 4),
            ("RegCtrl", 8),
            ("R15", 4),
            ("P7", 8),
            ("Stack2", 12),
        ] {
            assert_eq!(regs.size(name).unwrap(), bits, "{name}");
        }
    }

    #[test]
    fn test_width_enforced_for_every_register() {
        let mut regs = Registers::new();
        for reg in RegisterName::all() {
            let name = reg.to_string();
            let max = (1u32 << reg.bits()) - 1;

            regs.set(&name, max).unwrap();
            assert_eq!(regs.get(&name).unwrap(), max, "{name}");
            assert!(
                matches!(regs.set(&name, max + 1), Err(RegisterError::IllegalValue { .. })),
                "{name}"
            );
        }
    }

    #[test]
    fn test_unknown_names() {
        let regs = Registers::new();
        for name in ["R16", "P8", "Stack3", "a", "R", "R01", "PCX", "X"] {
            assert_eq!(regs.get(name), Err(RegisterError::Unknown(name.to_string())));
        }
    }

    #[test]
    fn test_stack_levels() {
        let mut regs = Registers::new();
        regs.stack.push(0x123);
        regs.stack.push(0x456);
        assert_eq!(regs.get("Stack0").unwrap(), 0x456);
        assert_eq!(regs.get("Stack1").unwrap(), 0x123);
        assert_eq!(regs.get("Stack2").unwrap(), 0);
    }

    #[test]
    fn test_names_round_trip() {
        for reg in RegisterName::all() {
            assert_eq!(reg.to_string().parse::<RegisterName>().unwrap(), reg);
        }
        assert_eq!(RegisterName::all().count(), 5 + 16 + 8 + 3);
    }
}
