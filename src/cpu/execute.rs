//! CPU execution engine for the 4004.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::{Memory, Registers};
use crate::cpu::decode::{self, Instruction, DecodeError};
use crate::cpu::io::{IoError, IoPort, Unconnected};
use crate::cpu::memory::{MemoryError, MemoryPort, Space};
use crate::cpu::registers::{ADDR_MASK, NIBBLE_MASK};
use log::{debug, trace};
use thiserror::Error;

/// The TEST input is not modelled and always reads as asserted.
const TEST_PIN: bool = true;

/// The 4004 CPU.
///
/// Memory and I/O devices are injected: `M` may be an owned [`Memory`] or a
/// `&mut` reference to any [`MemoryPort`].
pub struct Cpu<M: MemoryPort = Memory, I: IoPort = Unconnected> {
    /// CPU registers.
    pub regs: Registers,
    /// Program and data memory.
    pub mem: M,
    /// RAM/ROM port devices.
    pub io: I,
    /// Nibbles fetched so far (the cycle-cost proxy).
    pub cycles: u64,
    /// Instructions executed so far.
    pub steps: u64,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl<M: MemoryPort> Cpu<M, Unconnected> {
    /// Create a CPU with zeroed registers over `mem`, with no I/O devices.
    pub fn new(mem: M) -> Self {
        Self::with_io(mem, Unconnected)
    }
}

impl<M: MemoryPort, I: IoPort> Cpu<M, I> {
    /// Create a CPU with zeroed registers over `mem` and `io`.
    pub fn with_io(mem: M, io: I) -> Self {
        Self {
            regs: Registers::new(),
            mem,
            io,
            cycles: 0,
            steps: 0,
            last_instr: None,
        }
    }

    /// Reset registers and counters. Memory belongs to the caller and is
    /// left untouched.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.cycles = 0;
        self.steps = 0;
        self.last_instr = None;
    }

    /// Write a byte image into program memory starting at nibble `origin`.
    /// Addresses wrap at 12 bits, the same way fetches do.
    pub fn load_program(&mut self, origin: u16, image: &[u8]) -> Result<(), MemoryError> {
        for (offset, nibble) in (0u16..).zip(decode::to_nibbles(image)) {
            let addr = origin.wrapping_add(offset) & ADDR_MASK;
            self.mem.write_nibble(Space::Program, addr, nibble)?;
        }
        debug!("loaded {} bytes at 0x{:03X}", image.len(), origin);
        Ok(())
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction's length in nibbles. On error the registers
    /// are left as they were before the call.
    pub fn step(&mut self) -> Result<usize, CpuError> {
        let pc = self.regs.pc;
        let instr = decode::fetch::<_, CpuError>(&self.mem, pc)?;

        self.execute(instr)?;

        let len = instr.length();
        self.cycles += len as u64;
        self.steps += 1;
        self.last_instr = Some(instr);
        trace!("{pc:03X}: {instr}  A={:X} C={}", self.regs.acc, u8::from(self.regs.carry));

        Ok(len)
    }

    /// Run for at most `max_steps` instructions.
    ///
    /// Returns the number of instructions executed. The 4004 has no halt
    /// instruction, so the step budget is the only stopping condition
    /// besides an error.
    pub fn run_limited(&mut self, max_steps: u64) -> Result<u64, CpuError> {
        for executed in 0..max_steps {
            if let Err(e) = self.step() {
                debug!("stopped after {executed} steps");
                return Err(e);
            }
        }
        Ok(max_steps)
    }

    /// Execute a decoded instruction. Each arm leaves PC where the next
    /// fetch must happen.
    fn execute(&mut self, instr: Instruction) -> Result<(), CpuError> {
        let len = instr.length();
        let pc = self.regs.pc;

        match instr {
            // ==================== Control ====================

            Instruction::Nop => self.regs.advance_pc(len),

            Instruction::Jcn { cond, addr } => {
                if cond.holds(self.regs.acc, self.regs.carry, TEST_PIN) {
                    self.regs.jump(jcn_page(pc) | u16::from(addr));
                } else {
                    self.regs.advance_pc(len);
                }
            }

            Instruction::Jun { addr } => self.regs.jump(addr),

            Instruction::Jms { addr } => {
                self.regs.stack.push(pc.wrapping_add(len as u16) & ADDR_MASK);
                self.regs.jump(addr);
            }

            Instruction::Jin { .. } => {
                let target = page(pc) | u16::from(self.regs.pair(0));
                self.regs.jump(target);
            }

            Instruction::Isz { reg, addr } => {
                let value = (self.regs.reg(reg) + 1) & NIBBLE_MASK;
                self.regs.set_reg(reg, value);
                if value != 0 {
                    self.regs.jump(page(pc) | u16::from(addr));
                } else {
                    self.regs.advance_pc(len);
                }
            }

            Instruction::Bbl { data } => {
                let ret = self.regs.stack.pop();
                self.regs.set_acc(data);
                self.regs.jump(ret);
            }

            // ==================== Register ====================

            Instruction::Fim { pair, data } => {
                self.regs.set_pair(pair, data);
                self.regs.advance_pc(len);
            }

            Instruction::Src { pair } => {
                self.regs.reg_ctrl = self.regs.pair(pair);
                self.regs.advance_pc(len);
            }

            Instruction::Fin { pair } => {
                let addr = page(pc) | u16::from(self.regs.pair(0));
                let value = decode::fetch_byte(&self.mem, addr)?;
                self.regs.set_pair(pair, value);
                self.regs.advance_pc(len);
            }

            Instruction::Inc { reg } => {
                self.regs.set_reg(reg, self.regs.reg(reg) + 1);
                self.regs.advance_pc(len);
            }

            Instruction::Add { reg } => {
                self.regs.add_with_carry(self.regs.reg(reg));
                self.regs.advance_pc(len);
            }

            Instruction::Sub { reg } => {
                self.regs.sub_with_borrow(self.regs.reg(reg));
                self.regs.advance_pc(len);
            }

            Instruction::Ld { reg } => {
                self.regs.set_acc(self.regs.reg(reg));
                self.regs.advance_pc(len);
            }

            Instruction::Xch { reg } => {
                let value = self.regs.reg(reg);
                self.regs.set_reg(reg, self.regs.acc);
                self.regs.set_acc(value);
                self.regs.advance_pc(len);
            }

            Instruction::Ldm { data } => {
                self.regs.set_acc(data);
                self.regs.advance_pc(len);
            }

            // ==================== RAM / IO ====================

            Instruction::Wrm => {
                let addr = self.regs.data_address();
                self.mem.write_nibble(Space::Data, addr, self.regs.acc)?;
                self.regs.advance_pc(len);
            }

            Instruction::Rdm => {
                let value = self.mem.read_nibble(Space::Data, self.regs.data_address())?;
                self.regs.set_acc(value);
                self.regs.advance_pc(len);
            }

            Instruction::Adm => {
                let value = self.mem.read_nibble(Space::Data, self.regs.data_address())?;
                self.regs.add_with_carry(value);
                self.regs.advance_pc(len);
            }

            Instruction::Sbm => {
                let value = self.mem.read_nibble(Space::Data, self.regs.data_address())?;
                self.regs.sub_with_borrow(value);
                self.regs.advance_pc(len);
            }

            Instruction::Wmp => {
                self.io.write_ram_port(self.regs.reg_ctrl, self.regs.acc)?;
                self.regs.advance_pc(len);
            }

            Instruction::Wrr => {
                self.io.write_rom_port(self.regs.reg_ctrl, self.regs.acc)?;
                self.regs.advance_pc(len);
            }

            Instruction::Rdr => {
                let value = self.io.read_rom_port(self.regs.reg_ctrl)?;
                self.regs.set_acc(value);
                self.regs.advance_pc(len);
            }

            Instruction::Wpm | Instruction::Wr { .. } | Instruction::Rd { .. } => {
                return Err(CpuError::Unimplemented(instr.mnemonic()));
            }

            // ==================== Accumulator ====================

            Instruction::Clb => {
                self.regs.acc = 0;
                self.regs.carry = false;
                self.regs.advance_pc(len);
            }

            Instruction::Clc => {
                self.regs.carry = false;
                self.regs.advance_pc(len);
            }

            Instruction::Iac => {
                let sum = self.regs.acc + 1;
                self.regs.carry = sum > NIBBLE_MASK;
                self.regs.set_acc(sum);
                self.regs.advance_pc(len);
            }

            Instruction::Cmc => {
                self.regs.carry = !self.regs.carry;
                self.regs.advance_pc(len);
            }

            Instruction::Cma => {
                self.regs.set_acc(!self.regs.acc);
                self.regs.advance_pc(len);
            }

            Instruction::Ral => {
                let rotated = (self.regs.acc << 1) | u8::from(self.regs.carry);
                self.regs.carry = rotated & 0x10 != 0;
                self.regs.set_acc(rotated);
                self.regs.advance_pc(len);
            }

            Instruction::Rar => {
                let out = self.regs.acc & 1 != 0;
                self.regs.set_acc((self.regs.acc >> 1) | (u8::from(self.regs.carry) << 3));
                self.regs.carry = out;
                self.regs.advance_pc(len);
            }

            Instruction::Tcc => {
                self.regs.acc = u8::from(self.regs.carry);
                self.regs.carry = false;
                self.regs.advance_pc(len);
            }

            Instruction::Dac => {
                // Carry set afterwards means no borrow.
                let sum = self.regs.acc + NIBBLE_MASK;
                self.regs.carry = sum > NIBBLE_MASK;
                self.regs.set_acc(sum);
                self.regs.advance_pc(len);
            }

            Instruction::Tcs => {
                self.regs.acc = if self.regs.carry { 10 } else { 9 };
                self.regs.carry = false;
                self.regs.advance_pc(len);
            }

            Instruction::Stc => {
                self.regs.carry = true;
                self.regs.advance_pc(len);
            }

            // DAA only ever sets carry; a carry already set stays set.
            Instruction::Daa => {
                if self.regs.carry || self.regs.acc > 9 {
                    let sum = self.regs.acc + 6;
                    if sum > NIBBLE_MASK {
                        self.regs.carry = true;
                    }
                    self.regs.set_acc(sum);
                }
                self.regs.advance_pc(len);
            }

            Instruction::Kbp => {
                self.regs.acc = keyboard_process(self.regs.acc);
                self.regs.advance_pc(len);
            }

            Instruction::Dcl => {
                self.regs.bank = self.regs.acc & 0x7;
                self.regs.advance_pc(len);
            }
        }

        Ok(())
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }
}

impl Default for Cpu<Memory, Unconnected> {
    fn default() -> Self {
        Self::new(Memory::new())
    }
}

impl<M: MemoryPort, I: IoPort> std::fmt::Debug for Cpu<M, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("cycles", &self.cycles)
            .field("steps", &self.steps)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Page (high 4 bits) of a program address.
fn page(pc: u16) -> u16 {
    pc & 0xF00
}

/// JCN issued from the last two slots of a page lands in the next page.
fn jcn_page(pc: u16) -> u16 {
    if pc & 0xFF >= 0xFE {
        page(pc.wrapping_add(0x100) & ADDR_MASK)
    } else {
        page(pc)
    }
}

/// KBP: one-hot keyboard column to its index, 15 for anything else.
fn keyboard_process(acc: u8) -> u8 {
    match acc {
        0 => 0,
        1 => 1,
        2 => 2,
        4 => 3,
        8 => 4,
        _ => 15,
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// A valid instruction this simulator does not model.
    #[error("unimplemented operation: {0}")]
    Unimplemented(&'static str),
}

impl From<IoError> for CpuError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::Unimplemented(op) => CpuError::Unimplemented(op),
        }
    }
}
