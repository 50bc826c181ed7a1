//! Symbol resolution.
//!
//! Looks names up across every library loaded so far, in load order.

use std::sync::Arc;

use crate::error::{LinkError, Result};
use crate::library::NativeLibraries;

pub struct SymbolResolver {
    libraries: Arc<NativeLibraries>,
}

impl SymbolResolver {
    pub fn new(libraries: Arc<NativeLibraries>) -> Self {
        Self { libraries }
    }

    /// Absolute address of `name`. A null address counts as not found.
    pub fn resolve(&self, name: &str) -> Result<u64> {
        self.libraries
            .find(name)
            .ok_or_else(|| LinkError::SymbolNotFound(name.to_string()))
    }

    pub fn libraries(&self) -> &Arc<NativeLibraries> {
        &self.libraries
    }
}
