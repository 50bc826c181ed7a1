//! Relocatable object output.
//!
//! Finished trampolines are written into the `.text` section of an object file, one global
//! function symbol per stub method, so they can be inspected with ordinary disassemblers.
//! The embedded jump targets are absolute addresses from the generating process.

use anyhow::{Context, Result};
use object::write::{Object, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope};
use std::path::Path;

use crate::arch::ArchitectureProfile;

const TEXT_ALIGN: u64 = 16;

fn target(profile: ArchitectureProfile) -> (BinaryFormat, Architecture) {
    match profile {
        ArchitectureProfile::Amd64SystemV => (BinaryFormat::Elf, Architecture::X86_64),
        ArchitectureProfile::Amd64Windows => (BinaryFormat::Coff, Architecture::X86_64),
        ArchitectureProfile::AArch64 => (BinaryFormat::Elf, Architecture::Aarch64),
        ArchitectureProfile::Riscv64 => (BinaryFormat::Elf, Architecture::Riscv64),
    }
}

/// Builds an object file holding `trampolines` as `(symbol, code)` pairs.
pub fn object_bytes(profile: ArchitectureProfile, trampolines: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let (format, arch) = target(profile);
    let mut obj = Object::new(format, arch, Endianness::Little);
    let text = obj.section_id(object::write::StandardSection::Text);

    for (name, code) in trampolines {
        let offset = obj.append_section_data(text, code, TEXT_ALIGN);
        obj.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value: offset,
            size: code.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
        tracing::debug!("placed {} at .text+{:#x} ({} bytes)", name, offset, code.len());
    }

    obj.write().context("failed to serialize object file")
}

/// Writes an object file holding `trampolines` to `path`.
pub fn write_object(path: &Path, profile: ArchitectureProfile, trampolines: &[(String, Vec<u8>)]) -> Result<()> {
    let bytes = object_bytes(profile, trampolines)?;
    std::fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
