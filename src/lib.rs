//! Managed-to-native trampoline generation.
//!
//! This library links stub methods to native functions by generating small machine-code
//! trampolines that move arguments from the managed calling convention into the native one
//! and tail-jump to the resolved symbol.
//! It is organized into several modules:
//! - `platform`: OS and CPU identification.
//! - `matcher`: Platform-qualified directive selection.
//! - `metadata`: Stub methods, their directives and argument descriptors.
//! - `arch`: Per-ISA calling convention translators.
//! - `shuffle`: Ordering of parallel register moves.
//! - `library`, `symbol`: Native library loading and symbol lookup.
//! - `install`: Handing finished code to its consumer.
//! - `linker`: The trampoline assembly orchestration.
//! - `manifest`, `config`, `writer`: The command-line front end's input and output.

pub mod arch;
pub mod buffer;
pub mod config;
pub mod error;
pub mod install;
pub mod library;
pub mod linker;
pub mod manifest;
pub mod matcher;
pub mod metadata;
pub mod platform;
pub mod shuffle;
pub mod symbol;
pub mod utils;
pub mod writer;

pub use error::{ErrorKind, LinkError, Result};
pub use linker::Linker;
