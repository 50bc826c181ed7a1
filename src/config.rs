//! Configuration module.
//!
//! This module defines the command-line interface (CLI) for the trampoline generator using
//! `clap`: the stub manifest, an optional target platform override and the output file.

use clap::Parser;
use std::path::PathBuf;

use crate::platform::{current_arch, current_os, Arch, Os};

/// Generates native-call trampolines for the stub methods declared in a manifest.
///
/// Symbols are resolved in the running process and the libraries the manifest names, so
/// the generated code is only valid for this process's address space.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Stub manifest (TOML)
    pub manifest: PathBuf,

    /// Target OS name, e.g. linux, windows, macos
    #[arg(long, help = "Override the target operating system")]
    pub os: Option<String>,

    /// Target CPU name, e.g. x86_64, aarch64, riscv64
    #[arg(long, help = "Override the target architecture")]
    pub arch: Option<String>,

    /// Output object file
    #[arg(short, long, help = "Write the trampolines to a relocatable object file")]
    pub output: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

impl Config {
    pub fn target_os(&self) -> Os {
        self.os.as_deref().map_or_else(current_os, Os::from_name)
    }

    pub fn target_arch(&self) -> Arch {
        self.arch.as_deref().map_or_else(current_arch, Arch::from_name)
    }
}
