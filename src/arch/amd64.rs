//! x86-64 translators.
//!
//! Managed code passes integer arguments one register to the right of the native ABI and
//! wraps the last register slot around, so the native ABI's first argument register is also
//! the managed ABI's last one:
//!
//! ```text
//! System V   managed: rsi, rdx, rcx, r8,  r9,  rdi
//!            native:  rdi, rsi, rdx, rcx, r8,  r9
//! Windows    managed: rdx, r8,  r9,  rdi, rsi, rcx
//!            native:  rcx, rdx, r8,  r9
//! ```

use super::{ArchitectureProfile, CallingConvention, RegisterMap};
use crate::buffer::TrampolineBuffer;
use crate::error::{LinkError, Result};
use crate::metadata::ArgumentDescriptor;
use crate::shuffle::{MoveKind, Step};

pub const RAX: u8 = 0;
pub const RCX: u8 = 1;
pub const RDX: u8 = 2;
pub const RSI: u8 = 6;
pub const RDI: u8 = 7;
pub const R8: u8 = 8;
pub const R9: u8 = 9;

const SYSTEM_V: RegisterMap = RegisterMap {
    managed: &[RSI, RDX, RCX, R8, R9, RDI],
    native: &[RDI, RSI, RDX, RCX, R8, R9],
    scratch: RAX,
    positional: false,
};

const WINDOWS: RegisterMap = RegisterMap {
    managed: &[RDX, R8, R9, RDI, RSI, RCX],
    native: &[RCX, RDX, R8, R9],
    scratch: RAX,
    // an argument's register is fixed by its position, whether it is a float or not
    positional: true,
};

/// The x86-64 backend, parameterized by ABI.
pub struct Amd64 {
    profile: ArchitectureProfile,
    regs: RegisterMap,
}

impl Amd64 {
    pub fn system_v() -> Self {
        Self {
            profile: ArchitectureProfile::Amd64SystemV,
            regs: SYSTEM_V,
        }
    }

    pub fn windows() -> Self {
        Self {
            profile: ArchitectureProfile::Amd64Windows,
            regs: WINDOWS,
        }
    }
}

impl CallingConvention for Amd64 {
    fn profile(&self) -> ArchitectureProfile {
        self.profile
    }

    fn emit_prologue(&self, buf: &mut TrampolineBuffer, args: &[ArgumentDescriptor]) -> Result<()> {
        for step in self.regs.plan(args)? {
            match step {
                Step::Save { scratch, reg } => mov(buf, scratch, reg, true)?,
                Step::Move(m) => match m.kind {
                    MoveKind::Int32 => mov(buf, m.dst, m.src, false)?,
                    MoveKind::Int64 => mov(buf, m.dst, m.src, true)?,
                    MoveKind::Address(offset) => lea(buf, m.dst, m.src, offset)?,
                },
            }
        }
        Ok(())
    }

    fn emit_call(&self, buf: &mut TrampolineBuffer, address: u64) -> Result<()> {
        buf.put_u16(0xb848)?; // mov rax, imm64
        buf.put_u64(address)?;
        buf.put_u16(0xe0ff) // jmp rax
    }
}

fn rex(w: bool, reg: u8, rm: u8) -> Option<u8> {
    let bits = (w as u8) << 3 | (reg >> 3) << 2 | (rm >> 3);
    (bits != 0).then_some(0x40 | bits)
}

fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    mode << 6 | (reg & 7) << 3 | (rm & 7)
}

/// mov dst, src (`89 /r`); the 32-bit form zero-extends into the full register.
fn mov(buf: &mut TrampolineBuffer, dst: u8, src: u8, wide: bool) -> Result<()> {
    if let Some(prefix) = rex(wide, src, dst) {
        buf.put_u8(prefix)?;
    }
    buf.put_u8(0x89)?;
    buf.put_u8(modrm(0b11, src, dst))
}

/// lea dst, [base + offset] (`8d /r`), with a disp8 whenever the offset fits one.
fn lea(buf: &mut TrampolineBuffer, dst: u8, base: u8, offset: u32) -> Result<()> {
    if offset > i32::MAX as u32 {
        return Err(LinkError::OffsetOutOfRange {
            offset,
            max: i32::MAX as u32,
        });
    }
    let short = offset <= i8::MAX as u32;

    if let Some(prefix) = rex(true, dst, base) {
        buf.put_u8(prefix)?;
    }
    buf.put_u8(0x8d)?;
    buf.put_u8(modrm(if short { 0b01 } else { 0b10 }, dst, base))?;
    if base & 7 == 4 {
        // rsp/r12 as a base needs a SIB byte
        buf.put_u8(0x24)?;
    }
    if short {
        buf.put_u8(offset as u8)
    } else {
        buf.put_u32(offset)
    }
}
