//! AArch64 translator.
//!
//! ```text
//! managed: x1, x2, x3, x4, x5, x6, x7, x0
//! native:  x0, x1, x2, x3, x4, x5, x6, x7
//! ```

use super::{ArchitectureProfile, CallingConvention, RegisterMap};
use crate::buffer::TrampolineBuffer;
use crate::error::{LinkError, Result};
use crate::metadata::ArgumentDescriptor;
use crate::shuffle::{MoveKind, Step};

const REGS: RegisterMap = RegisterMap {
    managed: &[1, 2, 3, 4, 5, 6, 7, 0],
    native: &[0, 1, 2, 3, 4, 5, 6, 7],
    scratch: 8,
    positional: false,
};

/// Holds the call target; not an argument register in either convention.
const CALL_REG: u32 = 9;

/// Largest unsigned immediate of `add (immediate)`.
const MAX_ADD_IMM: u32 = 0xfff;

pub struct AArch64;

impl CallingConvention for AArch64 {
    fn profile(&self) -> ArchitectureProfile {
        ArchitectureProfile::AArch64
    }

    fn emit_prologue(&self, buf: &mut TrampolineBuffer, args: &[ArgumentDescriptor]) -> Result<()> {
        for step in REGS.plan(args)? {
            let ins = match step {
                Step::Save { scratch, reg } => mov_x(scratch, reg),
                Step::Move(m) => match m.kind {
                    MoveKind::Int32 => mov_w(m.dst, m.src),
                    MoveKind::Int64 => mov_x(m.dst, m.src),
                    MoveKind::Address(offset) => add_imm(m.dst, m.src, offset)?,
                },
            };
            buf.put_u32(ins)?;
        }
        Ok(())
    }

    fn emit_call(&self, buf: &mut TrampolineBuffer, address: u64) -> Result<()> {
        let chunk = |shift: u32| ((address >> shift) & 0xffff) as u32;

        buf.put_u32(0xd2800000 | chunk(0) << 5 | CALL_REG)?; // movz x9, #imm
        for (hw, shift) in [(1u32, 16u32), (2, 32), (3, 48)] {
            if chunk(shift) != 0 {
                // movk x9, #imm, lsl #shift
                buf.put_u32(0xf2800000 | hw << 21 | chunk(shift) << 5 | CALL_REG)?;
            }
        }
        buf.put_u32(0xd61f0000 | CALL_REG << 5) // br x9
    }
}

/// mov x<dst>, x<src> (orr x<dst>, xzr, x<src>)
fn mov_x(dst: u8, src: u8) -> u32 {
    0xaa0003e0 | (src as u32) << 16 | dst as u32
}

/// mov w<dst>, w<src>
fn mov_w(dst: u8, src: u8) -> u32 {
    0x2a0003e0 | (src as u32) << 16 | dst as u32
}

/// add x<dst>, x<src>, #<imm>
fn add_imm(dst: u8, src: u8, imm: u32) -> Result<u32> {
    if imm > MAX_ADD_IMM {
        return Err(LinkError::OffsetOutOfRange {
            offset: imm,
            max: MAX_ADD_IMM,
        });
    }
    Ok(0x91000000 | imm << 10 | (src as u32) << 5 | dst as u32)
}
