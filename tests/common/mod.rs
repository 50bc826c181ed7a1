//! Register-level simulators for the instruction subsets trampolines are made of.
//!
//! Each simulator runs code until an indirect jump and reports the register file at that
//! point together with the jump target.

#![allow(dead_code)]

use iced_x86::{Decoder, DecoderOptions, Mnemonic, OpKind, Register};

pub struct Machine {
    pub regs: [u64; 32],
    pub target: u64,
}

impl Machine {
    pub fn new(regs: [u64; 32]) -> Self {
        Self { regs, target: 0 }
    }
}

fn amd64_read(regs: &[u64; 32], reg: Register) -> u64 {
    let value = regs[reg.full_register().number()];
    if reg.is_gpr32() {
        value & 0xffff_ffff
    } else {
        value
    }
}

pub fn run_amd64(code: &[u8], regs: [u64; 32]) -> Machine {
    let mut m = Machine::new(regs);
    let mut decoder = Decoder::with_ip(64, code, 0, DecoderOptions::NONE);

    while decoder.can_decode() {
        let ins = decoder.decode();
        assert!(!ins.is_invalid(), "undecodable bytes in {:02x?}", code);
        match ins.mnemonic() {
            Mnemonic::Mov => {
                let dst = ins.op0_register();
                assert!(dst.is_gpr64() || dst.is_gpr32(), "unexpected mov {}", ins);
                let value = match ins.op1_kind() {
                    OpKind::Register => amd64_read(&m.regs, ins.op1_register()),
                    OpKind::Immediate64 => ins.immediate64(),
                    kind => panic!("unexpected mov operand {:?} in {}", kind, ins),
                };
                // 32-bit writes zero-extend
                let value = if dst.is_gpr32() { value & 0xffff_ffff } else { value };
                m.regs[dst.full_register().number()] = value;
            }
            Mnemonic::Lea => {
                let dst = ins.op0_register();
                let base = m.regs[ins.memory_base().full_register().number()];
                m.regs[dst.full_register().number()] = base.wrapping_add(ins.memory_displacement64());
            }
            Mnemonic::Jmp => {
                assert_eq!(ins.op0_kind(), OpKind::Register);
                m.target = amd64_read(&m.regs, ins.op0_register());
                assert!(!decoder.can_decode(), "code after the tail jump");
                return m;
            }
            other => panic!("unexpected instruction {:?}: {}", other, ins),
        }
    }
    panic!("no tail jump in {:02x?}", code);
}

fn words(code: &[u8]) -> Vec<u32> {
    assert_eq!(code.len() % 4, 0);
    code.chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn run_aarch64(code: &[u8], regs: [u64; 32]) -> Machine {
    let mut m = Machine::new(regs);
    let words = words(code);

    for (i, &w) in words.iter().enumerate() {
        let rd = (w & 31) as usize;
        let rn = ((w >> 5) & 31) as usize;
        let rm = ((w >> 16) & 31) as usize;
        if w & 0xffe0_ffe0 == 0xaa00_03e0 {
            m.regs[rd] = m.regs[rm];
        } else if w & 0xffe0_ffe0 == 0x2a00_03e0 {
            m.regs[rd] = m.regs[rm] & 0xffff_ffff;
        } else if w & 0xffc0_0000 == 0x9100_0000 {
            m.regs[rd] = m.regs[rn].wrapping_add(((w >> 10) & 0xfff) as u64);
        } else if w & 0xff80_0000 == 0xd280_0000 {
            let shift = ((w >> 21) & 3) * 16;
            m.regs[rd] = (((w >> 5) & 0xffff) as u64) << shift;
        } else if w & 0xff80_0000 == 0xf280_0000 {
            let shift = ((w >> 21) & 3) * 16;
            let imm = (((w >> 5) & 0xffff) as u64) << shift;
            m.regs[rd] = (m.regs[rd] & !(0xffff << shift)) | imm;
        } else if w & 0xffff_fc1f == 0xd61f_0000 {
            assert_eq!(i, words.len() - 1, "code after the tail jump");
            m.target = m.regs[rn];
            return m;
        } else {
            panic!("unexpected instruction {:#010x}", w);
        }
    }
    panic!("no tail jump");
}

pub fn run_riscv64(code: &[u8], regs: [u64; 32]) -> Machine {
    let mut m = Machine::new(regs);
    let words = words(code);

    for (i, &w) in words.iter().enumerate() {
        let rd = ((w >> 7) & 31) as usize;
        let rs1 = ((w >> 15) & 31) as usize;
        let funct3 = (w >> 12) & 7;
        let imm_i = ((w as i32) >> 20) as i64 as u64;
        let value = match (w & 0x7f, funct3) {
            (0x37, _) => (w & 0xffff_f000) as i32 as i64 as u64,
            (0x13, 0) => m.regs[rs1].wrapping_add(imm_i),
            (0x13, 1) => m.regs[rs1] << ((w >> 20) & 0x3f),
            (0x67, 0) => {
                assert_eq!(rd, 0, "jalr must not link");
                assert_eq!(i, words.len() - 1, "code after the tail jump");
                m.target = m.regs[rs1].wrapping_add(imm_i) & !1;
                return m;
            }
            _ => panic!("unexpected instruction {:#010x}", w),
        };
        if rd != 0 {
            m.regs[rd] = value;
        }
    }
    panic!("no tail jump");
}
