use i4004::asm::{assemble, disassemble};
use i4004::cpu::decode::{decode, encode, to_nibbles};
use i4004::cpu::{Instruction, RegisterName};
use i4004::{Cpu, Memory, Registers};
use proptest::prelude::*;

fn cpu_with(program: &[u8]) -> Cpu {
    let mut cpu = Cpu::new(Memory::new());
    cpu.load_program(0, program).unwrap();
    cpu
}

proptest! {
    #[test]
    fn add_matches_nibble_arithmetic(acc in 0u8..16, operand in 0u8..16, reg in 0u8..16, carry in any::<bool>()) {
        let mut cpu = cpu_with(&encode(&Instruction::Add { reg }));
        cpu.regs.acc = acc;
        cpu.regs.carry = carry;
        cpu.regs.set_reg(reg, operand);
        cpu.step().unwrap();

        let sum = acc + operand + u8::from(carry);
        prop_assert_eq!(cpu.regs.acc, sum & 0xF);
        prop_assert_eq!(cpu.regs.carry, sum > 0xF);
        prop_assert_eq!(cpu.regs.pc, 2);
    }

    #[test]
    fn sub_is_add_of_complement(acc in 0u8..16, operand in 0u8..16, reg in 0u8..16, carry in any::<bool>()) {
        let mut cpu = cpu_with(&encode(&Instruction::Sub { reg }));
        cpu.regs.acc = acc;
        cpu.regs.carry = carry;
        cpu.regs.set_reg(reg, operand);
        cpu.step().unwrap();

        let sum = acc + (operand ^ 0xF) + u8::from(!carry);
        prop_assert_eq!(cpu.regs.acc, sum & 0xF);
        prop_assert_eq!(cpu.regs.carry, sum > 0xF);
    }

    #[test]
    fn inc_wraps_without_touching_flags(value in 0u8..16, reg in 0u8..16, acc in 0u8..16, carry in any::<bool>()) {
        let mut cpu = cpu_with(&encode(&Instruction::Inc { reg }));
        cpu.regs.acc = acc;
        cpu.regs.carry = carry;
        cpu.regs.set_reg(reg, value);
        cpu.step().unwrap();

        prop_assert_eq!(cpu.regs.reg(reg), (value + 1) & 0xF);
        prop_assert_eq!(cpu.regs.acc, acc);
        prop_assert_eq!(cpu.regs.carry, carry);
    }

    #[test]
    fn jms_then_bbl_returns_past_the_call(call in 0u16..=0xFFF, target in 0u16..=0xFFF, data in 0u8..16) {
        let occupied = |start: u16, len: u16| (0..len).map(move |i| start.wrapping_add(i) & 0xFFF);
        prop_assume!(occupied(call, 4).all(|a| occupied(target, 2).all(|b| a != b)));

        let mut cpu = Cpu::new(Memory::new());
        cpu.load_program(call, &encode(&Instruction::Jms { addr: target })).unwrap();
        cpu.load_program(target, &encode(&Instruction::Bbl { data })).unwrap();
        cpu.regs.pc = call;
        let ret = call.wrapping_add(4) & 0xFFF;

        cpu.step().unwrap();
        prop_assert_eq!(cpu.regs.pc, target);
        prop_assert_eq!(cpu.regs.get("Stack0").unwrap(), u32::from(ret));

        cpu.step().unwrap();
        prop_assert_eq!(cpu.regs.pc, ret);
        prop_assert_eq!(cpu.regs.acc, data);
        prop_assert_eq!(cpu.regs.get("Stack0").unwrap(), 0);
    }

    #[test]
    fn disassembly_reassembles(opcode in any::<u8>(), operand in any::<u8>()) {
        let Ok(instr) = decode(opcode, operand) else {
            return Ok(());
        };
        let bytes = encode(&instr);
        let mut mem = Memory::new();
        mem.load_program(0, &bytes).unwrap();

        let (text, len) = disassemble(&mem, 0).unwrap();
        let nibbles = assemble(&text).unwrap();
        prop_assert_eq!(len, nibbles.len());
        prop_assert_eq!(nibbles, to_nibbles(&bytes));
    }

    #[test]
    fn register_writes_read_back(index in 0usize..32, value in any::<u32>()) {
        let reg = RegisterName::all().nth(index).unwrap();
        let name = reg.to_string();
        let mut regs = Registers::new();

        let fits = value >> reg.bits() == 0;
        prop_assert_eq!(regs.set(&name, value).is_ok(), fits);
        if fits {
            prop_assert_eq!(regs.get(&name).unwrap(), value);
        }
    }
}
