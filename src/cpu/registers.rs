//! 4004 register file.
//!
//! The 4004 has:
//! - A: 4-bit accumulator
//! - C: carry/link flag
//! - R0..R15: 4-bit index registers, also addressed as pairs P0..P7
//! - PC: 12-bit program counter (nibble units in this simulator)
//! - a 3-level return address stack
//! - the RAM bank selector (DCL) and the register-control latch (SRC)

use serde::{Serialize, Deserialize};

/// Mask for 4-bit values.
pub const NIBBLE_MASK: u8 = 0xF;

/// Mask for 12-bit addresses.
pub const ADDR_MASK: u16 = 0xFFF;

/// Depth of the return address stack.
pub const STACK_DEPTH: usize = 3;

/// Fixed-depth return address stack.
///
/// A ring buffer with an explicit head. Pushing onto a full stack
/// overwrites the oldest entry; popping clears the slot it vacates, so
/// popping more often than pushing yields 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnStack {
    slots: [u16; STACK_DEPTH],
    head: usize,
}

impl ReturnStack {
    /// Create an all-zero stack.
    pub const fn new() -> Self {
        Self { slots: [0; STACK_DEPTH], head: 0 }
    }

    /// Push an address, discarding the oldest entry.
    pub fn push(&mut self, addr: u16) {
        self.head = (self.head + 1) % STACK_DEPTH;
        self.slots[self.head] = addr & ADDR_MASK;
    }

    /// Pop the most recent address. The vacated bottom slot becomes 0.
    pub fn pop(&mut self) -> u16 {
        let addr = self.slots[self.head];
        self.slots[self.head] = 0;
        self.head = (self.head + STACK_DEPTH - 1) % STACK_DEPTH;
        addr
    }

    /// Entry `level` counted from the top (0 = most recent).
    pub fn get(&self, level: usize) -> u16 {
        self.slots[self.slot(level)]
    }

    /// Overwrite entry `level` counted from the top.
    pub fn set(&mut self, level: usize, addr: u16) {
        let slot = self.slot(level);
        self.slots[slot] = addr & ADDR_MASK;
    }

    /// All entries, top first.
    pub fn entries(&self) -> [u16; STACK_DEPTH] {
        [self.get(0), self.get(1), self.get(2)]
    }

    fn slot(&self, level: usize) -> usize {
        (self.head + STACK_DEPTH - level % STACK_DEPTH) % STACK_DEPTH
    }
}

/// The 4004 register file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// A: 4-bit accumulator
    pub acc: u8,

    /// C: carry flag. After SUB-class ops, set means "no borrow".
    pub carry: bool,

    /// R0..R15, each masked to 4 bits.
    index: [u8; 16],

    /// PC: 12-bit program counter, in nibble units
    pub pc: u16,

    /// Return address stack
    pub stack: ReturnStack,

    /// Data RAM bank selector (DCL); only the low 3 bits are meaningful
    pub bank: u8,

    /// Register-control latch (SRC)
    pub reg_ctrl: u8,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read index register `r` (0..15).
    #[inline]
    pub fn reg(&self, r: u8) -> u8 {
        self.index[usize::from(r & NIBBLE_MASK)]
    }

    /// Write index register `r`; the value is masked to 4 bits.
    #[inline]
    pub fn set_reg(&mut self, r: u8, value: u8) {
        self.index[usize::from(r & NIBBLE_MASK)] = value & NIBBLE_MASK;
    }

    /// Read pair `p` (0..7) as `(R[2p] << 4) | R[2p + 1]`.
    #[inline]
    pub fn pair(&self, p: u8) -> u8 {
        let r = (p & 0x7) * 2;
        (self.reg(r) << 4) | self.reg(r + 1)
    }

    /// Write pair `p`: high nibble to R[2p], low nibble to R[2p + 1].
    #[inline]
    pub fn set_pair(&mut self, p: u8, value: u8) {
        let r = (p & 0x7) * 2;
        self.set_reg(r, value >> 4);
        self.set_reg(r + 1, value);
    }

    /// Set the accumulator, masked to 4 bits.
    #[inline]
    pub fn set_acc(&mut self, value: u8) {
        self.acc = value & NIBBLE_MASK;
    }

    /// Advance the program counter by `nibbles`, wrapping at 12 bits.
    pub fn advance_pc(&mut self, nibbles: usize) {
        // Lengths are 2 or 4, so the narrowing cast cannot lose bits.
        self.pc = self.pc.wrapping_add(nibbles as u16) & ADDR_MASK;
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u16) {
        self.pc = addr & ADDR_MASK;
    }

    /// Data RAM address selected by the bank and register-control latch.
    pub fn data_address(&self) -> u16 {
        (u16::from(self.bank) << 8) | u16::from(self.reg_ctrl)
    }

    /// Add `operand` plus carry-in to the accumulator, setting carry from bit 4.
    pub fn add_with_carry(&mut self, operand: u8) {
        let sum = self.acc + (operand & NIBBLE_MASK) + u8::from(self.carry);
        self.carry = sum > NIBBLE_MASK;
        self.set_acc(sum);
    }

    /// One's-complement subtract with borrow: carry afterwards means "no borrow".
    pub fn sub_with_borrow(&mut self, operand: u8) {
        let sum = self.acc + (!operand & NIBBLE_MASK) + u8::from(!self.carry);
        self.carry = sum > NIBBLE_MASK;
        self.set_acc(sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_view() {
        let mut regs = Registers::new();
        regs.set_pair(3, 0x1A);
        assert_eq!(regs.reg(6), 0x1);
        assert_eq!(regs.reg(7), 0xA);

        regs.set_reg(7, 0x2);
        assert_eq!(regs.pair(3), 0x12);
    }

    #[test]
    fn test_register_masking() {
        let mut regs = Registers::new();
        regs.set_reg(0, 0x37);
        regs.set_acc(0x2B);
        assert_eq!(regs.reg(0), 0x7);
        assert_eq!(regs.acc, 0xB);
    }

    #[test]
    fn test_stack_lifo() {
        let mut stack = ReturnStack::new();
        stack.push(0x100);
        stack.push(0x200);
        assert_eq!(stack.entries(), [0x200, 0x100, 0]);
        assert_eq!(stack.pop(), 0x200);
        assert_eq!(stack.pop(), 0x100);
        assert_eq!(stack.pop(), 0);
    }

    #[test]
    fn test_stack_overflow_discards_oldest() {
        let mut stack = ReturnStack::new();
        for addr in [0x1, 0x2, 0x3, 0x4] {
            stack.push(addr);
        }
        assert_eq!(stack.entries(), [0x4, 0x3, 0x2]);
        assert_eq!(stack.pop(), 0x4);
        assert_eq!(stack.entries(), [0x3, 0x2, 0]);
        assert_eq!(stack.pop(), 0x3);
        assert_eq!(stack.pop(), 0x2);
        assert_eq!(stack.pop(), 0);
    }

    #[test]
    fn test_stack_set_by_level() {
        let mut stack = ReturnStack::new();
        stack.push(0x010);
        stack.set(2, 0xABC);
        stack.set(0, 0x1FFF);
        assert_eq!(stack.entries(), [0xFFF, 0, 0xABC]);
    }

    #[test]
    fn test_advance_pc_wraps() {
        let mut regs = Registers::new();
        regs.pc = 0xFFE;
        regs.advance_pc(4);
        assert_eq!(regs.pc, 0x002);
    }

    #[test]
    fn test_sub_borrow_convention() {
        let mut regs = Registers::new();
        regs.acc = 5;
        regs.carry = false;
        regs.sub_with_borrow(3);
        assert_eq!(regs.acc, 2);
        assert!(regs.carry, "no borrow");

        // Carry-in set subtracts one more.
        regs.sub_with_borrow(1);
        assert_eq!(regs.acc, 0);
        assert!(regs.carry);

        regs.carry = false;
        regs.sub_with_borrow(4);
        assert_eq!(regs.acc, 0xC);
        assert!(!regs.carry, "borrow");
    }
}
