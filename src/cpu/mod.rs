//! CPU emulation for the Intel 4004.
//!
//! This module implements the 4004 architecture:
//! - 4-bit accumulator and carry, sixteen 4-bit index registers
//! - 12-bit program counter with a 3-level return stack
//! - nibble-addressed program and data memory behind [`MemoryPort`]
//! - 46 instructions of one or two bytes

pub mod memory;
pub mod registers;
pub mod access;
pub mod decode;
pub mod execute;
pub mod io;

pub use memory::{Memory, MemoryConfig, MemoryError, MemoryPort, Space};
pub use registers::{Registers, ReturnStack};
pub use access::{RegisterError, RegisterName};
pub use decode::{Condition, Instruction, DecodeError};
pub use execute::{Cpu, CpuError};
pub use io::{IoError, IoPort, Unconnected};
