//! Code installation.
//!
//! A finished trampoline is handed to a [`CodeInstaller`], which makes it the body of the
//! stub method. Two installers live here: one that maps the code executable in this
//! process, and one that only records it for offline output.

use dashmap::DashMap;
use memmap2::{Mmap, MmapMut};
use parking_lot::Mutex;

use crate::error::{LinkError, Result};
use crate::metadata::StubMethod;

pub trait CodeInstaller: Send + Sync {
    fn install(&self, method: &StubMethod, code: &[u8]) -> Result<()>;
}

fn install_error(method: &StubMethod, reason: impl ToString) -> LinkError {
    LinkError::Install {
        method: method.name.clone(),
        reason: reason.to_string(),
    }
}

/// Maps each trampoline into its own executable anonymous mapping.
///
/// Mappings stay alive as long as the installer does. Reinstalling a method swaps in the
/// new mapping before the old one is released.
#[derive(Default)]
pub struct ExecutableMemory {
    entries: DashMap<String, Mmap>,
}

impl ExecutableMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry point of the code installed for `method`.
    pub fn entry(&self, method: &str) -> Option<*const u8> {
        self.entries.get(method).map(|map| map.as_ptr())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CodeInstaller for ExecutableMemory {
    fn install(&self, method: &StubMethod, code: &[u8]) -> Result<()> {
        if code.is_empty() {
            return Err(install_error(method, "empty code"));
        }

        let mut map = MmapMut::map_anon(code.len()).map_err(|e| install_error(method, e))?;
        map.copy_from_slice(code);
        let exec = map.make_exec().map_err(|e| install_error(method, e))?;

        self.entries.insert(method.name.clone(), exec);
        Ok(())
    }
}

/// Records installed code in order instead of running it.
#[derive(Default)]
pub struct CollectingInstaller {
    installed: Mutex<Vec<(String, Vec<u8>)>>,
}

impl CollectingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, method: &str) -> Option<Vec<u8>> {
        self.installed
            .lock()
            .iter()
            .rev()
            .find(|(name, _)| name == method)
            .map(|(_, code)| code.clone())
    }

    pub fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.installed.lock())
    }
}

impl CodeInstaller for CollectingInstaller {
    fn install(&self, method: &StubMethod, code: &[u8]) -> Result<()> {
        if code.is_empty() {
            return Err(install_error(method, "empty code"));
        }
        self.installed.lock().push((method.name.clone(), code.to_vec()));
        Ok(())
    }
}
