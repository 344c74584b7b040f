//! Symbolic references: type symbols, member references, method handles and bootstrap data.
//!
//! The model never stores raw constant pool indices. Every reference the reader finds is
//! resolved into one of the value types in this module, and the writer interns them again.
//!
//! # Key Components
//!
//! - [`crate::classfile::symbol::Symbol`] - Canonical identifier for a declared type
//! - [`crate::classfile::symbol::MemberRef`] - Owner, name and descriptor of a field or method
//! - [`crate::classfile::symbol::MethodHandle`] - A `CONSTANT_MethodHandle` value
//! - [`crate::classfile::symbol::BootstrapMethod`] - A bootstrap method with static arguments
//! - [`crate::classfile::symbol::DynamicConstant`] - Target of `invokedynamic` or a dynamic `ldc`

use std::{fmt, sync::Arc};

use strum::{EnumIter, FromRepr, IntoStaticStr};

use crate::code::Constant;

/// An immutable canonical identifier for a declared type.
///
/// The canonical form is the class file's internal form: `/`-separated binary names
/// (`java/lang/String`) for classes and interfaces, and field descriptors (`[I`,
/// `[Ljava/lang/Object;`) for array types. Two symbols are equal iff their canonical
/// strings are equal. Cloning is cheap since the string is shared.
///
/// # Examples
///
/// ```rust
/// use classweave::Symbol;
///
/// let dotted = Symbol::from_dotted("java.lang.String");
/// assert_eq!(dotted, Symbol::new("java/lang/String"));
/// assert_eq!(dotted.descriptor(), "Ljava/lang/String;");
/// assert!(Symbol::new("[I").is_array());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Create a symbol from its internal form.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Symbol(Arc::from(name.as_ref()))
    }

    /// Create a symbol from a dotted binary name such as `java.lang.Object`.
    #[must_use]
    pub fn from_dotted(name: &str) -> Self {
        Symbol(Arc::from(name.replace('.', "/").as_str()))
    }

    /// The canonical internal form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this symbol names an array type.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    /// The field descriptor denoting this type.
    #[must_use]
    pub fn descriptor(&self) -> String {
        if self.is_array() {
            self.0.to_string()
        } else {
            format!("L{};", self.0)
        }
    }

    /// The unqualified name after the last package separator.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol::new(value)
    }
}

/// A reference to a field or method: owner type, member name and descriptor.
///
/// The descriptor embeds further symbols (`Ljava/lang/String;`) which a remapping pass
/// rewrites under the same mapping as `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// The type declaring the member
    pub owner: Symbol,
    /// The simple member name
    pub name: String,
    /// Field descriptor or method descriptor
    pub descriptor: String,
}

impl MemberRef {
    /// Create a new member reference.
    #[must_use]
    pub fn new(owner: Symbol, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        MemberRef {
            owner,
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Returns `true` if the descriptor is a method descriptor.
    #[must_use]
    pub fn is_method(&self) -> bool {
        self.descriptor.starts_with('(')
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

/// The `reference_kind` of a method handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, EnumIter, IntoStaticStr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum HandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl HandleKind {
    /// Returns `true` for the four field accessor kinds.
    #[must_use]
    pub fn is_field(self) -> bool {
        matches!(
            self,
            HandleKind::GetField | HandleKind::GetStatic | HandleKind::PutField | HandleKind::PutStatic
        )
    }
}

/// A resolved `CONSTANT_MethodHandle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodHandle {
    /// How the handle behaves when invoked
    pub kind: HandleKind,
    /// The referenced field or method
    pub member: MemberRef,
    /// Whether the referenced method is declared by an interface
    pub interface: bool,
}

/// A bootstrap method specifier from the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapMethod {
    /// Handle of the bootstrap method
    pub handle: MethodHandle,
    /// Static arguments passed to the bootstrap method
    pub arguments: Vec<Constant>,
}

/// A dynamically computed call site or constant.
///
/// Used for `invokedynamic` (where `descriptor` is a method descriptor) and for
/// `CONSTANT_Dynamic` loads (where it is a field descriptor).
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicConstant {
    /// Name passed to the bootstrap method
    pub name: String,
    /// Descriptor of the call site or constant type
    pub descriptor: String,
    /// The bootstrap method computing the value
    pub bootstrap: Arc<BootstrapMethod>,
}
