//! 4004 memory subsystem.
//!
//! The core sees memory only through [`MemoryPort`]: two independent,
//! nibble-addressed spaces (program ROM and data RAM). [`Memory`] is the
//! stock byte-backed implementation; the port itself is the seam for any
//! other backing store.
//!
//! Storage is byte-granular. Nibble address `a` selects byte `a >> 1`; an odd
//! address holds the byte's high nibble, an even address its low nibble.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Default program capacity in nibbles (the full 12-bit PC range).
pub const PROGRAM_NIBBLES: usize = 4096;

/// Default data capacity in nibbles (16 banks of 256 characters).
pub const DATA_NIBBLES: usize = 4096;

/// One of the two address spaces the core can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Space {
    /// Program ROM; instruction fetches and FIN read from here.
    Program,
    /// Data RAM; WRM/RDM/ADM/SBM reference this space.
    Data,
}

impl std::fmt::Display for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Space::Program => write!(f, "program"),
            Space::Data => write!(f, "data"),
        }
    }
}

/// Nibble-level access to program and data memory.
///
/// Implementors only supply the two nibble primitives. Byte access is
/// derived from them: the byte at nibble address `a` is
/// `(nibble(a + 1) << 4) | nibble(a)`.
pub trait MemoryPort {
    /// Read one nibble (low 4 bits of the result).
    fn read_nibble(&self, space: Space, addr: u16) -> Result<u8, MemoryError>;

    /// Write one nibble; only the low 4 bits of `value` are stored.
    fn write_nibble(&mut self, space: Space, addr: u16, value: u8) -> Result<(), MemoryError>;

    /// Read the byte formed by nibbles `addr` (low) and `addr + 1` (high).
    fn read_byte(&self, space: Space, addr: u16) -> Result<u8, MemoryError> {
        let low = self.read_nibble(space, addr)?;
        let high = self.read_nibble(space, addr.wrapping_add(1))?;
        Ok((high << 4) | (low & 0xF))
    }

    /// Write `value` across nibbles `addr` (low) and `addr + 1` (high).
    fn write_byte(&mut self, space: Space, addr: u16, value: u8) -> Result<(), MemoryError> {
        self.write_nibble(space, addr, value & 0xF)?;
        self.write_nibble(space, addr.wrapping_add(1), value >> 4)
    }
}

impl<M: MemoryPort + ?Sized> MemoryPort for &mut M {
    fn read_nibble(&self, space: Space, addr: u16) -> Result<u8, MemoryError> {
        (**self).read_nibble(space, addr)
    }

    fn write_nibble(&mut self, space: Space, addr: u16, value: u8) -> Result<(), MemoryError> {
        (**self).write_nibble(space, addr, value)
    }
}

/// Capacities of the two spaces, in nibbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Program space size in nibbles.
    pub program_nibbles: usize,
    /// Data space size in nibbles.
    pub data_nibbles: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            program_nibbles: PROGRAM_NIBBLES,
            data_nibbles: DATA_NIBBLES,
        }
    }
}

/// Byte-backed program and data memory.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    program: Vec<u8>,
    data: Vec<u8>,
}

impl Memory {
    /// Create memory with the default capacities, all zero.
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Create memory with the given capacities. Odd nibble counts are
    /// rounded up to a whole byte.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            program: vec![0; config.program_nibbles.div_ceil(2)],
            data: vec![0; config.data_nibbles.div_ceil(2)],
        }
    }

    /// Capacity of a space in nibbles.
    pub fn nibbles(&self, space: Space) -> usize {
        self.store(space).len() * 2
    }

    /// Clear both spaces to zero.
    pub fn clear(&mut self) {
        self.program.fill(0);
        self.data.fill(0);
    }

    /// Copy a byte image into program memory, starting at byte `start`.
    pub fn load_program(&mut self, start: usize, image: &[u8]) -> Result<(), MemoryError> {
        if start > self.program.len() {
            let addr = u16::try_from(start.saturating_mul(2)).unwrap_or(u16::MAX);
            return Err(MemoryError::OutOfRange { space: Space::Program, addr });
        }

        let available = self.program.len().saturating_sub(start);
        if image.len() > available {
            return Err(MemoryError::ProgramTooLarge {
                size: image.len(),
                available,
            });
        }

        self.program[start..start + image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Program memory as raw bytes.
    pub fn program_bytes(&self) -> &[u8] {
        &self.program
    }

    fn store(&self, space: Space) -> &Vec<u8> {
        match space {
            Space::Program => &self.program,
            Space::Data => &self.data,
        }
    }

    fn store_mut(&mut self, space: Space) -> &mut Vec<u8> {
        match space {
            Space::Program => &mut self.program,
            Space::Data => &mut self.data,
        }
    }

    fn byte_index(&self, space: Space, addr: u16) -> Result<usize, MemoryError> {
        let index = usize::from(addr >> 1);
        if index >= self.store(space).len() {
            return Err(MemoryError::OutOfRange { space, addr });
        }
        Ok(index)
    }
}

impl MemoryPort for Memory {
    fn read_nibble(&self, space: Space, addr: u16) -> Result<u8, MemoryError> {
        let byte = self.store(space)[self.byte_index(space, addr)?];
        Ok(if addr & 1 == 1 { byte >> 4 } else { byte & 0xF })
    }

    fn write_nibble(&mut self, space: Space, addr: u16, value: u8) -> Result<(), MemoryError> {
        let index = self.byte_index(space, addr)?;
        let byte = &mut self.store_mut(space)[index];
        let value = value & 0xF;
        *byte = if addr & 1 == 1 {
            (*byte & 0x0F) | (value << 4)
        } else {
            (*byte & 0xF0) | value
        };
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = |bytes: &[u8]| bytes.iter().filter(|b| **b != 0).count();

        f.debug_struct("Memory")
            .field("program_nibbles", &self.nibbles(Space::Program))
            .field("program_non_zero_bytes", &used(&self.program))
            .field("data_nibbles", &self.nibbles(Space::Data))
            .field("data_non_zero_bytes", &used(&self.data))
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Address is outside the backing store.
    #[error("{space} address 0x{addr:03X} out of range")]
    OutOfRange { space: Space, addr: u16 },

    /// Program image does not fit.
    #[error("program size {size} bytes exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble_layout() {
        let mut mem = Memory::new();
        mem.load_program(0, &[0x5A]).unwrap();

        // Odd address holds the high nibble.
        assert_eq!(mem.read_nibble(Space::Program, 0).unwrap(), 0xA);
        assert_eq!(mem.read_nibble(Space::Program, 1).unwrap(), 0x5);
        assert_eq!(mem.read_byte(Space::Program, 0).unwrap(), 0x5A);
    }

    #[test]
    fn test_write_nibble_preserves_neighbour() {
        let mut mem = Memory::new();
        mem.write_nibble(Space::Data, 0x10, 0x3).unwrap();
        mem.write_nibble(Space::Data, 0x11, 0xC).unwrap();
        mem.write_nibble(Space::Data, 0x10, 0x1F).unwrap();

        assert_eq!(mem.read_nibble(Space::Data, 0x10).unwrap(), 0xF);
        assert_eq!(mem.read_nibble(Space::Data, 0x11).unwrap(), 0xC);
    }

    #[test]
    fn test_spaces_are_disjoint() {
        let mut mem = Memory::new();
        mem.write_byte(Space::Data, 4, 0xEE).unwrap();
        assert_eq!(mem.read_byte(Space::Program, 4).unwrap(), 0);
        assert_eq!(mem.read_byte(Space::Data, 4).unwrap(), 0xEE);
    }

    #[test]
    fn test_memory_bounds() {
        let mem = Memory::with_config(MemoryConfig {
            program_nibbles: 16,
            data_nibbles: 8,
        });

        assert!(mem.read_nibble(Space::Program, 15).is_ok());
        assert_eq!(
            mem.read_nibble(Space::Program, 16),
            Err(MemoryError::OutOfRange { space: Space::Program, addr: 16 })
        );
        assert!(mem.read_nibble(Space::Data, 8).is_err());
        // The high half of a byte read can fall off the end too.
        assert!(mem.read_byte(Space::Program, 15).is_err());
    }

    #[test]
    fn test_load_program() {
        let mut mem = Memory::new();
        mem.load_program(2, &[0x20, 0x5A]).unwrap();
        assert_eq!(mem.program_bytes()[2], 0x20);
        assert_eq!(mem.read_byte(Space::Program, 6).unwrap(), 0x5A);

        let big = vec![0; mem.program_bytes().len()];
        assert!(matches!(
            mem.load_program(1, &big),
            Err(MemoryError::ProgramTooLarge { .. })
        ));
    }

    #[test]
    fn test_load_program_past_end() {
        let mut mem = Memory::new();
        let end = mem.program_bytes().len();

        mem.load_program(end, &[]).unwrap();
        assert_eq!(
            mem.load_program(5000, &[]),
            Err(MemoryError::OutOfRange { space: Space::Program, addr: 10000 })
        );
        assert!(mem.load_program(end + 1, &[0x12]).is_err());
    }

    #[test]
    fn test_port_through_reference() {
        fn poke<M: MemoryPort>(mut port: M) {
            port.write_nibble(Space::Data, 0, 7).unwrap();
        }

        let mut mem = Memory::new();
        poke(&mut mem);
        assert_eq!(mem.read_nibble(Space::Data, 0).unwrap(), 7);
    }
}
