//! Platform identification.
//!
//! The running OS family and CPU architecture are derived once from their name strings.
//! Anything unrecognized collapses to `Unknown`; it only becomes an error where a
//! calling convention has to be chosen.

use serde::Deserialize;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Windows,
    MacOs,
    #[serde(skip_deserializing)]
    Unknown,
}

impl Os {
    pub fn from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("linux") {
            Os::Linux
        } else if name.contains("windows") {
            Os::Windows
        } else if name.contains("mac") || name.contains("darwin") || name.contains("os x") {
            Os::MacOs
        } else {
            Os::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    AArch64,
    Riscv64,
    #[serde(skip_deserializing)]
    Unknown,
}

impl Arch {
    pub fn from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if !name.contains("64") {
            Arch::Unknown
        } else if name.contains("x86") || name.contains("amd64") {
            Arch::Amd64
        } else if name.contains("aarch") || name.contains("arm") {
            Arch::AArch64
        } else if name.contains("riscv") {
            Arch::Riscv64
        } else {
            Arch::Unknown
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub fn current_os() -> Os {
    static CURRENT: OnceLock<Os> = OnceLock::new();
    *CURRENT.get_or_init(|| Os::from_name(std::env::consts::OS))
}

pub fn current_arch() -> Arch {
    static CURRENT: OnceLock<Arch> = OnceLock::new();
    *CURRENT.get_or_init(|| Arch::from_name(std::env::consts::ARCH))
}
