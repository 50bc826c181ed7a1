//! Stub declarations.
//!
//! Stub classes are declared in a TOML manifest:
//!
//! ```toml
//! [layout]
//! array_base_offset = 16
//!
//! [[class]]
//! name = "Libc"
//! library = [{ name = "c", os = "linux" }, { name = "msvcrt", os = "windows" }]
//! fields = [{ name = "sec", offset = 12 }]
//!
//! [[class.method]]
//! name = "add"
//! params = ["int", "int", "Libc@sec", "byte[]"]
//! link = [{ name = "native_add" }]
//! code = [{ hex = "c3", arch = "amd64" }]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::metadata::{
    CodeDirective, FieldDecl, HeapLayout, LibraryDirective, LinkDirective, ParamType, StubClass,
    StubMethod, DEFAULT_ARRAY_BASE_OFFSET,
};
use crate::platform::{Arch, Os};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub layout: LayoutEntry,
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutEntry {
    #[serde(default = "default_array_base_offset")]
    pub array_base_offset: u32,
}

impl Default for LayoutEntry {
    fn default() -> Self {
        Self {
            array_base_offset: DEFAULT_ARRAY_BASE_OFFSET,
        }
    }
}

fn default_array_base_offset() -> u32 {
    DEFAULT_ARRAY_BASE_OFFSET
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassEntry {
    pub name: String,
    #[serde(default)]
    pub library: Vec<LibraryEntry>,
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
    #[serde(default, rename = "method")]
    pub methods: Vec<MethodEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryEntry {
    pub name: String,
    pub os: Option<Os>,
    pub arch: Option<Arch>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldEntry {
    pub name: String,
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodEntry {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "yes", rename = "static")]
    pub is_static: bool,
    #[serde(default = "yes", rename = "native")]
    pub is_native: bool,
    #[serde(default)]
    pub library: Vec<LibraryEntry>,
    #[serde(default)]
    pub link: Vec<LinkEntry>,
    #[serde(default)]
    pub code: Vec<CodeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkEntry {
    pub name: Option<String>,
    #[serde(default)]
    pub naked: bool,
    pub os: Option<Os>,
    pub arch: Option<Arch>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeEntry {
    pub hex: String,
    pub os: Option<Os>,
    pub arch: Option<Arch>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid manifest {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Builds the object layout and the stub classes the manifest declares.
    pub fn into_parts(self) -> Result<(HeapLayout, Vec<StubClass>)> {
        let mut layout = HeapLayout::new(self.layout.array_base_offset);
        let mut classes = Vec::with_capacity(self.classes.len());

        for entry in self.classes {
            let fields: Vec<FieldDecl> = entry
                .fields
                .into_iter()
                .map(|f| FieldDecl { name: f.name, offset: f.offset })
                .collect();
            layout.declare_class(&entry.name, fields.clone());

            let mut class = StubClass::new(&entry.name);
            class.fields = fields;
            class.libraries = entry.library.into_iter().map(library).collect();
            for method in entry.methods {
                let method = stub_method(method)
                    .with_context(|| format!("in class {}", entry.name))?;
                class.methods.push(method);
            }
            classes.push(class);
        }

        Ok((layout, classes))
    }
}

fn library(entry: LibraryEntry) -> LibraryDirective {
    LibraryDirective::new(entry.name).on(entry.os, entry.arch)
}

fn stub_method(entry: MethodEntry) -> Result<StubMethod> {
    let mut method = StubMethod::new(&entry.name);
    method.is_static = entry.is_static;
    method.is_native = entry.is_native;

    for param in &entry.params {
        let ty: ParamType = param
            .parse()
            .with_context(|| format!("bad parameter type {:?} of method {}", param, entry.name))?;
        method.params.push(ty);
    }

    method.libraries = entry.library.into_iter().map(library).collect();
    method.links = entry
        .link
        .into_iter()
        .map(|l| LinkDirective {
            name: l.name,
            naked: l.naked,
            os: l.os,
            arch: l.arch,
        })
        .collect();
    method.code = entry
        .code
        .into_iter()
        .map(|c| CodeDirective::new(c.hex).on(c.os, c.arch))
        .collect();
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ElementKind, ObjectLayout};

    const LIBC: &str = r#"
        [layout]
        array_base_offset = 24

        [[class]]
        name = "Time"
        fields = [{ name = "sec", offset = 12 }, { name = "nsec", offset = 20 }]

        [[class]]
        name = "Libc"
        library = [{ name = "c", os = "linux" }, { name = "msvcrt", os = "windows" }]

        [[class.method]]
        name = "clock_gettime"
        params = ["int", "Time@"]

        [[class.method]]
        name = "write"
        params = ["int", "byte[]", "long"]
        link = [{ name = "_write", os = "windows" }, { name = "write" }]

        [[class.method]]
        name = "trap"
        static = false
        code = [{ hex = "cc", arch = "amd64" }]
    "#;

    #[test]
    fn builds_classes_and_layout() {
        let (layout, classes) = Manifest::parse(LIBC).unwrap().into_parts().unwrap();

        assert_eq!(layout.array_base_offset(ElementKind::Byte), 24);
        assert_eq!(layout.field_offset("Time", "nsec").unwrap(), 20);

        assert_eq!(classes.len(), 2);
        let libc = &classes[1];
        assert_eq!(libc.libraries[1], LibraryDirective::new("msvcrt").on(Some(Os::Windows), None));
        assert_eq!(libc.methods.len(), 3);

        let write = &libc.methods[1];
        assert_eq!(write.params[1], ParamType::Array(ElementKind::Byte));
        assert_eq!(write.links[0].name.as_deref(), Some("_write"));
        assert_eq!(write.links[0].os, Some(Os::Windows));
        assert!(!write.links[1].naked);

        let trap = &libc.methods[2];
        assert!(!trap.is_linkable());
        assert_eq!(trap.code[0].arch, Some(Arch::Amd64));
    }

    #[test]
    fn defaults_layout() {
        let (layout, classes) = Manifest::parse("").unwrap().into_parts().unwrap();
        assert_eq!(layout.array_base_offset(ElementKind::Int), DEFAULT_ARRAY_BASE_OFFSET);
        assert!(classes.is_empty());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Manifest::parse("[[class]]\nname = \"A\"\nbogus = 1").is_err());
        assert!(Manifest::parse("[[class]]\nname = \"A\"\nlibrary = [{ name = \"c\", os = \"plan9\" }]").is_err());

        let bad_param = "[[class]]\nname = \"A\"\n[[class.method]]\nname = \"f\"\nparams = [\"[]\"]";
        let err = Manifest::parse(bad_param).unwrap().into_parts().unwrap_err();
        assert!(format!("{:#}", err).contains("method f"));
    }
}
