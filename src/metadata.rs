//! Stub method metadata.
//!
//! This is the read-only view the linker has of a managed stub method: its parameters, the
//! directives that say how its native counterpart is found, and the host's object layout
//! needed to point reference arguments at their raw data.

use std::collections::HashMap;
use std::fmt;

use crate::error::{LinkError, Result};
use crate::matcher::Qualified;
use crate::platform::{Arch, Os};

/// Element kind of a primitive array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl ElementKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => ElementKind::Boolean,
            "byte" => ElementKind::Byte,
            "char" => ElementKind::Char,
            "short" => ElementKind::Short,
            "int" => ElementKind::Int,
            "long" => ElementKind::Long,
            "float" => ElementKind::Float,
            "double" => ElementKind::Double,
            _ => return None,
        })
    }
}

/// A formal parameter type as declared on the stub method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// An array of primitives.
    Array(ElementKind),
    /// An array of references; never passable to native code.
    ObjectArray(String),
    /// An object reference. `field` selects the field whose address is passed;
    /// an empty name selects the first instance field.
    Object { class: String, field: Option<String> },
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Array(elem) => write!(f, "{:?}[]", elem),
            ParamType::ObjectArray(class) => write!(f, "{}[]", class),
            ParamType::Object { class, field: Some(field) } => write!(f, "{}@{}", class, field),
            ParamType::Object { class, field: None } => f.write_str(class),
            other => write!(f, "{:?}", other),
        }
    }
}

impl std::str::FromStr for ParamType {
    type Err = LinkError;

    /// Parses `int`, `long[]`, `Time`, `Time@sec` or `Time@` (first field).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let unsupported = || LinkError::UnsupportedArgument {
            method: String::new(),
            param: s.to_string(),
        };

        if let Some(elem) = s.strip_suffix("[]") {
            return match ElementKind::from_name(elem) {
                Some(kind) => Ok(ParamType::Array(kind)),
                None if !elem.is_empty() => Ok(ParamType::ObjectArray(elem.to_string())),
                None => Err(unsupported()),
            };
        }

        Ok(match s {
            "boolean" => ParamType::Boolean,
            "byte" => ParamType::Byte,
            "char" => ParamType::Char,
            "short" => ParamType::Short,
            "int" => ParamType::Int,
            "long" => ParamType::Long,
            "float" => ParamType::Float,
            "double" => ParamType::Double,
            "" => return Err(unsupported()),
            _ => match s.split_once('@') {
                Some((class, field)) if !class.is_empty() => ParamType::Object {
                    class: class.to_string(),
                    field: Some(field.to_string()),
                },
                Some(_) => return Err(unsupported()),
                None => ParamType::Object { class: s.to_string(), field: None },
            },
        })
    }
}

/// How an argument travels once translated for native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentDescriptor {
    Int32,
    Int64,
    Float32,
    Float64,
    /// A reference whose raw data starts `base_offset` bytes past the reference itself.
    Reference { base_offset: u32 },
}

impl ArgumentDescriptor {
    pub fn is_float(&self) -> bool {
        matches!(self, ArgumentDescriptor::Float32 | ArgumentDescriptor::Float64)
    }

    /// Derives the descriptor for one declared parameter of `method`.
    pub fn derive(method: &str, param: &ParamType, layout: &dyn ObjectLayout) -> Result<Self> {
        Ok(match param {
            ParamType::Boolean | ParamType::Byte | ParamType::Char | ParamType::Short | ParamType::Int => {
                ArgumentDescriptor::Int32
            }
            ParamType::Long => ArgumentDescriptor::Int64,
            ParamType::Float => ArgumentDescriptor::Float32,
            ParamType::Double => ArgumentDescriptor::Float64,
            ParamType::Array(elem) => ArgumentDescriptor::Reference {
                base_offset: layout.array_base_offset(*elem),
            },
            ParamType::Object { class, field: Some(field) } => ArgumentDescriptor::Reference {
                base_offset: layout.field_offset(class, field)?,
            },
            ParamType::ObjectArray(_) | ParamType::Object { field: None, .. } => {
                return Err(LinkError::UnsupportedArgument {
                    method: method.to_string(),
                    param: param.to_string(),
                })
            }
        })
    }
}

/// Host object layout, as far as native code needs to see it.
pub trait ObjectLayout: Send + Sync {
    /// Offset of element 0 from the start of an array of `elem`.
    fn array_base_offset(&self, elem: ElementKind) -> u32;

    /// Offset of `field` within an instance of `class`. An empty name means the first
    /// instance field.
    fn field_offset(&self, class: &str, field: &str) -> Result<u32>;
}

/// Header size of a 64-bit heap object with compressed class pointers, plus the array length.
pub const DEFAULT_ARRAY_BASE_OFFSET: u32 = 16;

/// A table-driven [`ObjectLayout`].
#[derive(Debug, Clone)]
pub struct HeapLayout {
    array_base_offset: u32,
    classes: HashMap<String, Vec<FieldDecl>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub offset: u32,
}

impl HeapLayout {
    pub fn new(array_base_offset: u32) -> Self {
        Self {
            array_base_offset,
            classes: HashMap::new(),
        }
    }

    /// Declares the instance fields of `class`, in declaration order.
    pub fn declare_class(&mut self, class: &str, fields: Vec<FieldDecl>) {
        self.classes.insert(class.to_string(), fields);
    }
}

impl Default for HeapLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ARRAY_BASE_OFFSET)
    }
}

impl ObjectLayout for HeapLayout {
    fn array_base_offset(&self, _elem: ElementKind) -> u32 {
        self.array_base_offset
    }

    fn field_offset(&self, class: &str, field: &str) -> Result<u32> {
        let fields = match self.classes.get(class) {
            Some(fields) if !fields.is_empty() => fields,
            _ => return Err(LinkError::NoInstanceFields(class.to_string())),
        };

        if field.is_empty() {
            return Ok(fields[0].offset);
        }

        fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.offset)
            .ok_or_else(|| LinkError::NoSuchField {
                class: class.to_string(),
                field: field.to_string(),
            })
    }
}

/// Names the native function a stub links to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDirective {
    /// Native symbol; the method's own name when `None`.
    pub name: Option<String>,
    /// The target already uses the managed calling convention; no argument translation.
    pub naked: bool,
    pub os: Option<Os>,
    pub arch: Option<Arch>,
}

/// Literal machine code installed verbatim in place of a generated trampoline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDirective {
    pub hex: String,
    pub os: Option<Os>,
    pub arch: Option<Arch>,
}

/// A native library that must be loaded before linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryDirective {
    pub name: String,
    pub os: Option<Os>,
    pub arch: Option<Arch>,
}

macro_rules! impl_qualified {
    ($($ty:ty),*) => {$(
        impl Qualified for $ty {
            fn os(&self) -> Option<Os> {
                self.os
            }
            fn arch(&self) -> Option<Arch> {
                self.arch
            }
        }
    )*};
}

impl_qualified!(LinkDirective, CodeDirective, LibraryDirective);

impl CodeDirective {
    pub fn new(hex: impl Into<String>) -> Self {
        Self {
            hex: hex.into(),
            os: None,
            arch: None,
        }
    }

    pub fn on(mut self, os: Option<Os>, arch: Option<Arch>) -> Self {
        self.os = os;
        self.arch = arch;
        self
    }
}

impl LibraryDirective {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            os: None,
            arch: None,
        }
    }

    pub fn on(mut self, os: Option<Os>, arch: Option<Arch>) -> Self {
        self.os = os;
        self.arch = arch;
        self
    }
}

impl LinkDirective {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn naked(mut self) -> Self {
        self.naked = true;
        self
    }

    pub fn on(mut self, os: Option<Os>, arch: Option<Arch>) -> Self {
        self.os = os;
        self.arch = arch;
        self
    }
}

/// A managed method whose body is to be supplied by a trampoline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubMethod {
    pub name: String,
    pub is_static: bool,
    pub is_native: bool,
    pub params: Vec<ParamType>,
    pub links: Vec<LinkDirective>,
    pub code: Vec<CodeDirective>,
    pub libraries: Vec<LibraryDirective>,
}

impl StubMethod {
    /// A static native stub with no parameters or directives.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_static: true,
            is_native: true,
            params: Vec::new(),
            links: Vec::new(),
            code: Vec::new(),
            libraries: Vec::new(),
        }
    }

    pub fn param(mut self, ty: ParamType) -> Self {
        self.params.push(ty);
        self
    }

    pub fn link(mut self, link: LinkDirective) -> Self {
        self.links.push(link);
        self
    }

    pub fn code(mut self, code: CodeDirective) -> Self {
        self.code.push(code);
        self
    }

    pub fn library(mut self, library: LibraryDirective) -> Self {
        self.libraries.push(library);
        self
    }

    /// Only static native methods with no managed body can be linked.
    pub fn is_linkable(&self) -> bool {
        self.is_static && self.is_native
    }

    pub fn descriptors(&self, layout: &dyn ObjectLayout) -> Result<Vec<ArgumentDescriptor>> {
        self.params
            .iter()
            .map(|p| ArgumentDescriptor::derive(&self.name, p, layout))
            .collect()
    }
}

/// A declaring class: a group of stubs sharing library requirements and a field layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubClass {
    pub name: String,
    pub libraries: Vec<LibraryDirective>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<StubMethod>,
}

impl StubClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn library(mut self, library: LibraryDirective) -> Self {
        self.libraries.push(library);
        self
    }

    pub fn method(mut self, method: StubMethod) -> Self {
        self.methods.push(method);
        self
    }
}
