//! Trampoline assembly.
//!
//! The `Linker` turns a stub method into installed machine code:
//! 1. Eligibility: only static native stubs can be linked.
//! 2. Literal code: a matching code directive is installed verbatim and nothing else runs.
//! 3. Libraries: the best matching class- and method-level libraries are loaded.
//! 4. Prologue: unless the link is naked, arguments are moved into the native convention.
//! 5. Resolution: the native symbol is looked up in the loaded libraries.
//! 6. Tail call: a jump to the resolved address ends the trampoline, which is installed.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::arch::{ArchitectureProfile, CallingConvention};
use crate::buffer::TrampolineBuffer;
use crate::error::{LinkError, Result};
use crate::install::CodeInstaller;
use crate::library::NativeLibraries;
use crate::matcher::select_best;
use crate::metadata::{HeapLayout, ObjectLayout, StubClass, StubMethod};
use crate::platform::{current_arch, current_os, Arch, Os};
use crate::symbol::SymbolResolver;
use crate::utils::{parse_hex, to_hex};

pub struct Linker<I: CodeInstaller> {
    os: Os,
    arch: Arch,
    convention: Box<dyn CallingConvention>,
    resolver: SymbolResolver,
    layout: Box<dyn ObjectLayout>,
    installer: I,
}

impl<I: CodeInstaller> Linker<I> {
    /// A linker for the running platform, backed by the process-wide library registry.
    pub fn new(installer: I) -> Result<Self> {
        Self::with_platform(
            current_os(),
            current_arch(),
            NativeLibraries::global(),
            Box::new(HeapLayout::default()),
            installer,
        )
    }

    pub fn with_platform(
        os: Os,
        arch: Arch,
        libraries: Arc<NativeLibraries>,
        layout: Box<dyn ObjectLayout>,
        installer: I,
    ) -> Result<Self> {
        let profile = ArchitectureProfile::select(os, arch)?;
        debug!(?os, ?arch, ?profile, "selected calling convention");
        Ok(Self {
            os,
            arch,
            convention: profile.calling_convention(),
            resolver: SymbolResolver::new(libraries),
            layout,
            installer,
        })
    }

    pub fn profile(&self) -> ArchitectureProfile {
        self.convention.profile()
    }

    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// Loads a native library unless one of that name already is. Returns whether a load
    /// happened.
    pub fn load_library(&self, name: &str) -> Result<bool> {
        self.resolver.libraries().load(name)
    }

    pub fn find_address(&self, symbol: &str) -> Result<u64> {
        self.resolver.resolve(symbol)
    }

    /// Installs literal machine code as the body of `method`.
    pub fn install_code(&self, method: &StubMethod, code: &[u8]) -> Result<()> {
        debug!(method = %method.name, code = %to_hex(code), "installing literal code");
        self.installer.install(method, code)
    }

    /// Links `method` to the native function `symbol`.
    ///
    /// A naked link jumps straight to the target, which must already follow the managed
    /// calling convention. The method's own library requirement is loaded first.
    pub fn link_symbol(&self, method: &StubMethod, symbol: &str, naked: bool) -> Result<()> {
        if !method.is_linkable() {
            return Err(LinkError::IneligibleMethod(method.name.clone()));
        }
        if let Some(lib) = select_best(&method.libraries, self.os, self.arch) {
            self.load_library(&lib.name)?;
        }

        let mut buf = TrampolineBuffer::new();
        if !naked {
            let args = method.descriptors(self.layout.as_ref())?;
            self.convention.emit_prologue(&mut buf, &args)?;
        }

        let address = self.resolver.resolve(symbol)?;
        self.convention.emit_call(&mut buf, address)?;

        debug!(
            method = %method.name,
            symbol,
            address = format_args!("{:#x}", address),
            code = %to_hex(buf.as_bytes()),
            "assembled trampoline"
        );
        self.installer.install(method, buf.as_bytes())
    }

    /// Links one method of `class` according to its directives.
    pub fn link_method(&self, class: &StubClass, method: &StubMethod) -> Result<()> {
        if !method.is_linkable() {
            return Err(LinkError::IneligibleMethod(format!("{}.{}", class.name, method.name)));
        }

        if let Some(code) = select_best(&method.code, self.os, self.arch) {
            let bytes = parse_hex(&code.hex)?;
            return self.install_code(method, &bytes);
        }

        if let Some(lib) = select_best(&class.libraries, self.os, self.arch) {
            self.load_library(&lib.name)?;
        }

        let link = select_best(&method.links, self.os, self.arch);
        // an empty name means the method's own
        let symbol = link
            .and_then(|l| l.name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(&method.name);
        self.link_symbol(method, symbol, link.is_some_and(|l| l.naked))
    }

    /// Links every static native method of `class`.
    ///
    /// Other methods are skipped. Every eligible method is attempted even after a failure;
    /// the failures are then reported together. Returns the number of methods linked.
    pub fn link_class(&self, class: &StubClass) -> Result<usize> {
        if let Some(lib) = select_best(&class.libraries, self.os, self.arch) {
            self.load_library(&lib.name)?;
        }

        let mut linked = 0;
        let mut failures = Vec::new();
        for method in &class.methods {
            if !method.is_linkable() {
                warn!(class = %class.name, method = %method.name, "skipping method that is not static native");
                continue;
            }
            match self.link_method(class, method) {
                Ok(()) => linked += 1,
                Err(e) => {
                    error!(class = %class.name, method = %method.name, "link failed: {}", e);
                    failures.push((method.name.clone(), e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(LinkError::ClassLink {
                class: class.name.clone(),
                failures,
            });
        }
        info!(class = %class.name, methods = linked, "linked class");
        Ok(linked)
    }
}
