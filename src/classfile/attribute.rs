//! Class, field and method attributes understood by the model.
//!
//! Attributes that carry symbolic references a remapping pass has to see are decoded
//! into [`crate::classfile::attribute::Attribute`] variants. Everything else is kept as an
//! [`crate::classfile::attribute::UnknownAttribute`]: its bytes are carried verbatim and
//! remain valid only while the class is written with the constant pool it was read from.

use std::{fmt, sync::Arc};

use crate::{
    classfile::{constpool::ConstantPool, flags::AccessFlags, symbol::Symbol},
    code::Constant,
};

/// One entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
    /// The inner class
    pub inner: Symbol,
    /// The enclosing class, `None` for local and anonymous classes
    pub outer: Option<Symbol>,
    /// Simple source name, `None` for anonymous classes
    pub name: Option<String>,
    /// Flags as declared in source
    pub flags: AccessFlags,
}

/// A decoded attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// Generic signature of a class, field or method
    Signature(String),
    /// Name of the source file
    SourceFile(String),
    /// Initial value of a static field
    ConstantValue(Constant),
    /// Checked exceptions a method declares
    Exceptions(Vec<Symbol>),
    /// The element is deprecated
    Deprecated,
    /// The element does not appear in source code
    Synthetic,
    /// Inner class table
    InnerClasses(Vec<InnerClass>),
    /// Innermost enclosing class and method of a local or anonymous class
    EnclosingMethod {
        /// The enclosing class
        class: Symbol,
        /// Name and descriptor of the enclosing method, if any
        method: Option<(String, String)>,
    },
    /// The nest host of a nest member
    NestHost(Symbol),
    /// Members of the nest hosted by this class
    NestMembers(Vec<Symbol>),
    /// Any other attribute, carried verbatim
    Unknown(UnknownAttribute),
}

impl Attribute {
    /// The attribute name as written in the class file.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Attribute::Signature(_) => "Signature",
            Attribute::SourceFile(_) => "SourceFile",
            Attribute::ConstantValue(_) => "ConstantValue",
            Attribute::Exceptions(_) => "Exceptions",
            Attribute::Deprecated => "Deprecated",
            Attribute::Synthetic => "Synthetic",
            Attribute::InnerClasses(_) => "InnerClasses",
            Attribute::EnclosingMethod { .. } => "EnclosingMethod",
            Attribute::NestHost(_) => "NestHost",
            Attribute::NestMembers(_) => "NestMembers",
            Attribute::Unknown(unknown) => unknown.name(),
        }
    }
}

/// An attribute this crate does not interpret.
///
/// Its payload may contain constant pool indices, so it remembers the pool it was read
/// from. Writers only emit it when they are building on that same pool.
#[derive(Clone)]
pub struct UnknownAttribute {
    name: String,
    data: Arc<[u8]>,
    origin: Arc<ConstantPool>,
}

impl UnknownAttribute {
    pub(crate) fn new(name: String, data: &[u8], origin: Arc<ConstantPool>) -> Self {
        UnknownAttribute {
            name,
            data: Arc::from(data),
            origin,
        }
    }

    /// The attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw attribute payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns `true` if the payload's indices refer to `pool`.
    #[must_use]
    pub fn is_from(&self, pool: &Arc<ConstantPool>) -> bool {
        Arc::ptr_eq(&self.origin, pool)
    }
}

impl PartialEq for UnknownAttribute {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data == other.data && Arc::ptr_eq(&self.origin, &other.origin)
    }
}

impl fmt::Debug for UnknownAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnknownAttribute")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}
