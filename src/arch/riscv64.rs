//! RISC-V 64 translator.
//!
//! Managed and native code both pass integer arguments in x10..x17, so nothing is shuffled;
//! only reference arguments get their base offset added in place.

use super::{ArchitectureProfile, CallingConvention, RegisterMap};
use crate::buffer::TrampolineBuffer;
use crate::error::{LinkError, Result};
use crate::metadata::ArgumentDescriptor;
use crate::shuffle::{MoveKind, Step};

const ARGS: &[u8] = &[10, 11, 12, 13, 14, 15, 16, 17];

const REGS: RegisterMap = RegisterMap {
    managed: ARGS,
    native: ARGS,
    scratch: 6, // t1
    positional: false,
};

const ZERO: u32 = 0;
const T0: u32 = 5;

const OP_IMM: u32 = 0b0010011;
const LUI: u32 = 0b0110111;
const JALR: u32 = 0b1100111;

const MAX_ADDI_IMM: u32 = 0x7ff;

pub struct Riscv64;

impl CallingConvention for Riscv64 {
    fn profile(&self) -> ArchitectureProfile {
        ArchitectureProfile::Riscv64
    }

    fn emit_prologue(&self, buf: &mut TrampolineBuffer, args: &[ArgumentDescriptor]) -> Result<()> {
        for step in REGS.plan(args)? {
            if let Step::Move(m) = step {
                if let MoveKind::Address(offset) = m.kind {
                    if offset > MAX_ADDI_IMM {
                        return Err(LinkError::OffsetOutOfRange {
                            offset,
                            max: MAX_ADDI_IMM,
                        });
                    }
                    buf.put_u32(addi(m.dst as u32, m.src as u32, offset))?;
                }
            }
        }
        Ok(())
    }

    /// Builds the address 17 bits at a time from the top: `lui`+`addi` give bits 17 and up,
    /// then two shift-and-add steps bring in 11 and 6 more bits, and the final 6 bits ride
    /// in the `jalr` offset.
    fn emit_call(&self, buf: &mut TrampolineBuffer, address: u64) -> Result<()> {
        let imm = (address as i64) >> 17;
        // addi sign-extends its 12-bit immediate, so the upper part absorbs the difference
        let lower = (imm << 52) >> 52;
        let upper = imm - lower;
        if upper < i32::MIN as i64 || upper > i32::MAX as i64 {
            return Err(LinkError::AddressOutOfRange { address });
        }

        let mid = ((address >> 6) & 0x7ff) as u32;
        let low = (address & 0x3f) as u32;

        buf.put_u32(LUI | T0 << 7 | (upper as u32 & 0xffff_f000))?; // lui t0, upper
        buf.put_u32(addi(T0, T0, lower as u32 & 0xfff))?; // addi t0, t0, lower
        buf.put_u32(slli(T0, T0, 11))?;
        buf.put_u32(addi(T0, T0, mid))?;
        buf.put_u32(slli(T0, T0, 6))?;
        buf.put_u32(JALR | ZERO << 7 | T0 << 15 | low << 20) // jalr zero, low(t0)
    }
}

/// addi rd, rs1, imm (imm already masked to 12 bits)
fn addi(rd: u32, rs1: u32, imm: u32) -> u32 {
    OP_IMM | rd << 7 | rs1 << 15 | imm << 20
}

/// slli rd, rs1, shamt
fn slli(rd: u32, rs1: u32, shamt: u32) -> u32 {
    OP_IMM | rd << 7 | 0b001 << 12 | rs1 << 15 | shamt << 20
}
