//! Error taxonomy.
//!
//! Every failure here reflects a static mismatch between declared stub metadata and the
//! running environment, so nothing is ever retried.

use thiserror::Error;

use crate::platform::{Arch, Os};

/// Coarse classification of a [`LinkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A declaration-time mistake: bad platform, argument kind, hex, offset.
    Configuration,
    /// A symbol could not be found in any loaded library.
    Resolution,
    /// A native library could not be loaded.
    Io,
    /// The installation collaborator rejected the code.
    Install,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("unsupported platform: os={os:?}, arch={arch:?}")]
    UnsupportedPlatform { os: Os, arch: Arch },

    #[error("unsupported argument type in {method}: {param}")]
    UnsupportedArgument { method: String, param: String },

    #[error("too many object arguments: only {registers} argument registers available")]
    TooManyReferenceArguments { registers: usize },

    #[error("base offset {offset} does not fit the {max} immediate limit")]
    OffsetOutOfRange { offset: u32, max: u32 },

    #[error("address 0x{address:x} cannot be materialized on this architecture")]
    AddressOutOfRange { address: u64 },

    #[error("argument shuffle needs more than one scratch register")]
    UnresolvableShuffle,

    #[error("trampoline exceeds {capacity} bytes")]
    BufferOverflow { capacity: usize },

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("method must be static native: {0}")]
    IneligibleMethod(String),

    #[error("no such field: {class}.{field}")]
    NoSuchField { class: String, field: String },

    #[error("{0} does not have instance fields")]
    NoInstanceFields(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("failed to load library {name}: {reason}")]
    LibraryLoad { name: String, reason: String },

    #[error("failed to install code for {method}: {reason}")]
    Install { method: String, reason: String },

    #[error("{} method(s) of {class} failed to link", failures.len())]
    ClassLink {
        class: String,
        failures: Vec<(String, LinkError)>,
    },
}

impl LinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::SymbolNotFound(_) => ErrorKind::Resolution,
            LinkError::LibraryLoad { .. } => ErrorKind::Io,
            LinkError::Install { .. } => ErrorKind::Install,
            LinkError::ClassLink { failures, .. } => failures
                .first()
                .map(|(_, e)| e.kind())
                .unwrap_or(ErrorKind::Configuration),
            _ => ErrorKind::Configuration,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
