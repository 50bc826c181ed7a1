//! Architecture abstraction.
//!
//! This module defines the `CallingConvention` trait, which encapsulates everything
//! ISA-specific about a trampoline: how managed-convention arguments are moved into the
//! native ABI's registers and how control is handed to the resolved native address.

use crate::buffer::TrampolineBuffer;
use crate::error::{LinkError, Result};
use crate::metadata::ArgumentDescriptor;
use crate::platform::{Arch, Os};
use crate::shuffle::{self, Move, MoveKind, Step};

pub mod aarch64;
pub mod amd64;
pub mod riscv64;

/// The calling convention pair a trampoline is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchitectureProfile {
    Amd64SystemV,
    Amd64Windows,
    AArch64,
    Riscv64,
}

impl ArchitectureProfile {
    pub fn select(os: Os, arch: Arch) -> Result<Self> {
        match arch {
            Arch::Amd64 if os == Os::Windows => Ok(ArchitectureProfile::Amd64Windows),
            Arch::Amd64 => Ok(ArchitectureProfile::Amd64SystemV),
            Arch::AArch64 => Ok(ArchitectureProfile::AArch64),
            Arch::Riscv64 => Ok(ArchitectureProfile::Riscv64),
            Arch::Unknown => Err(LinkError::UnsupportedPlatform { os, arch }),
        }
    }

    pub fn calling_convention(self) -> Box<dyn CallingConvention> {
        match self {
            ArchitectureProfile::Amd64SystemV => Box::new(amd64::Amd64::system_v()),
            ArchitectureProfile::Amd64Windows => Box::new(amd64::Amd64::windows()),
            ArchitectureProfile::AArch64 => Box::new(aarch64::AArch64),
            ArchitectureProfile::Riscv64 => Box::new(riscv64::Riscv64),
        }
    }
}

/// A managed-to-native calling convention translator for one ISA.
pub trait CallingConvention: Send + Sync {
    fn profile(&self) -> ArchitectureProfile;

    /// Emits code moving every register-passed argument from its managed position to its
    /// native position. Float arguments travel in vector registers in both conventions and
    /// are left alone; integer arguments past the register count are not translated.
    fn emit_prologue(&self, buf: &mut TrampolineBuffer, args: &[ArgumentDescriptor]) -> Result<()>;

    /// Emits a tail jump to `address`, leaving the caller's return address in place.
    fn emit_call(&self, buf: &mut TrampolineBuffer, address: u64) -> Result<()>;
}

/// Integer argument registers of both conventions, by hardware number.
#[derive(Debug, Clone, Copy)]
pub struct RegisterMap {
    /// Managed argument registers, in argument order.
    pub managed: &'static [u8],
    /// Native argument registers, in argument order.
    pub native: &'static [u8],
    /// Free register used to break move cycles.
    pub scratch: u8,
    /// Whether the native convention assigns registers by argument position, so that a
    /// float argument uses up the integer register of its position.
    pub positional: bool,
}

impl RegisterMap {
    /// Plans the ordered register moves for `args`.
    ///
    /// Managed integer registers are always taken in order, skipping floats. Native ones are
    /// too unless the map is positional, in which case every argument advances the native slot.
    pub fn plan(&self, args: &[ArgumentDescriptor]) -> Result<Vec<Step>> {
        let slots = self.native.len().min(self.managed.len());
        let mut moves = Vec::with_capacity(slots);
        let mut managed = 0;
        let mut native = 0;

        for arg in args {
            let kind = match *arg {
                ArgumentDescriptor::Float32 | ArgumentDescriptor::Float64 => {
                    if self.positional {
                        native += 1;
                    }
                    continue;
                }
                ArgumentDescriptor::Int32 => MoveKind::Int32,
                ArgumentDescriptor::Int64 => MoveKind::Int64,
                ArgumentDescriptor::Reference { base_offset } => {
                    if native >= slots {
                        return Err(LinkError::TooManyReferenceArguments { registers: slots });
                    }
                    MoveKind::Address(base_offset)
                }
            };
            if native >= slots {
                continue;
            }
            moves.push(Move {
                dst: self.native[native],
                src: self.managed[managed],
                kind,
            });
            managed += 1;
            native += 1;
        }

        shuffle::sequence(moves, self.scratch)
    }
}
