//! The structural model of one class file.
//!
//! A [`crate::classfile::container::Container`] is immutable once created. Edits are made
//! by replaying its elements ([`crate::classfile::container::ClassElement`]) through a
//! transform into a fresh builder, see [`crate::transform`].

use std::sync::Arc;

use crate::{
    classfile::{
        attribute::Attribute,
        constpool::ConstantPool,
        descriptor::MethodDescriptor,
        flags::AccessFlags,
        reader::{self, ReadOptions},
        symbol::Symbol,
        writer,
    },
    code::CodeBody,
    Result,
};

/// Default major version for classes built from scratch (Java 5, verified without stack maps).
pub const DEFAULT_MAJOR_VERSION: u16 = 49;

/// Version, flags and type hierarchy of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    /// Minor class file version
    pub minor_version: u16,
    /// Major class file version
    pub major_version: u16,
    /// Class access flags
    pub flags: AccessFlags,
    /// The class itself
    pub this_symbol: Symbol,
    /// Direct superclass, `None` only for `java/lang/Object` and module descriptors
    pub super_symbol: Option<Symbol>,
    /// Directly implemented interfaces
    pub interfaces: Vec<Symbol>,
}

impl ClassHeader {
    /// A public class header with the default version.
    #[must_use]
    pub fn new(this_symbol: Symbol, super_symbol: Option<Symbol>) -> Self {
        ClassHeader {
            minor_version: 0,
            major_version: DEFAULT_MAJOR_VERSION,
            flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
            this_symbol,
            super_symbol,
            interfaces: Vec::new(),
        }
    }
}

/// A field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Field access flags
    pub flags: AccessFlags,
    /// Field attributes
    pub attributes: Vec<Attribute>,
}

/// A method declaration, with its code if it has any.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Method access flags
    pub flags: AccessFlags,
    /// The method body; `None` for abstract and native methods
    pub code: Option<CodeBody>,
    /// Method attributes other than `Code`
    pub attributes: Vec<Attribute>,
}

impl MethodDecl {
    /// Parse the method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidDescriptor`] if the descriptor is malformed.
    pub fn method_descriptor(&self) -> Result<MethodDescriptor> {
        MethodDescriptor::parse(&self.descriptor)
    }

    /// Returns `true` if name and descriptor equal the given ones.
    #[must_use]
    pub fn matches(&self, name: &str, descriptor: &str) -> bool {
        self.name == name && self.descriptor == descriptor
    }

    /// The method's elements in replay order: code first, then attributes.
    #[must_use]
    pub fn elements(&self) -> Vec<MethodElement> {
        self.code
            .iter()
            .cloned()
            .map(MethodElement::Code)
            .chain(self.attributes.iter().cloned().map(MethodElement::Attribute))
            .collect()
    }
}

/// A top-level element of a class, as seen by a class transform.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassElement {
    /// Version, flags, this class, superclass and interfaces
    Header(ClassHeader),
    /// A field declaration
    Field(FieldDecl),
    /// A method declaration
    Method(MethodDecl),
    /// A class attribute
    Attribute(Attribute),
}

/// An element of a method, as seen by a method transform.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodElement {
    /// The method body
    Code(CodeBody),
    /// A method attribute
    Attribute(Attribute),
}

/// A parsed or built class file.
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::Container;
///
/// let bytes = std::fs::read("Target.class")?;
/// let container = Container::parse(&bytes)?;
/// println!("{} extends {:?}", container.this_symbol(), container.super_symbol());
/// for method in container.methods() {
///     println!("  {}{}", method.name, method.descriptor);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct Container {
    header: ClassHeader,
    fields: Vec<FieldDecl>,
    methods: Vec<MethodDecl>,
    attributes: Vec<Attribute>,
    pool: Option<Arc<ConstantPool>>,
}

impl Container {
    pub(crate) fn from_parts(
        header: ClassHeader,
        fields: Vec<FieldDecl>,
        methods: Vec<MethodDecl>,
        attributes: Vec<Attribute>,
        pool: Option<Arc<ConstantPool>>,
    ) -> Self {
        Container {
            header,
            fields,
            methods,
            attributes,
            pool,
        }
    }

    /// Parse a class file with default [`ReadOptions`].
    ///
    /// # Errors
    /// Returns an error if the bytes are not a well-formed class file.
    pub fn parse(data: &[u8]) -> Result<Container> {
        reader::read(data, &ReadOptions::default())
    }

    /// Parse a class file with explicit options.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a well-formed class file.
    pub fn parse_with(data: &[u8], options: &ReadOptions) -> Result<Container> {
        reader::read(data, options)
    }

    /// Serialize into class file bytes.
    ///
    /// # Errors
    /// Returns an error if a structural limit of the format is exceeded.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        writer::write(self)
    }

    /// The class header.
    #[must_use]
    pub fn header(&self) -> &ClassHeader {
        &self.header
    }

    /// The class's own symbol.
    #[must_use]
    pub fn this_symbol(&self) -> &Symbol {
        &self.header.this_symbol
    }

    /// The superclass symbol.
    #[must_use]
    pub fn super_symbol(&self) -> Option<&Symbol> {
        self.header.super_symbol.as_ref()
    }

    /// Declared fields in order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// Declared methods in order.
    #[must_use]
    pub fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }

    /// Class attributes in order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Find a method by name and descriptor.
    #[must_use]
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.matches(name, descriptor))
    }

    /// Find a field by name and descriptor.
    #[must_use]
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldDecl> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// The constant pool this class was read from, if it was parsed.
    #[must_use]
    pub fn constant_pool(&self) -> Option<&Arc<ConstantPool>> {
        self.pool.as_ref()
    }

    /// All top-level elements in replay order: header, fields, methods, attributes.
    pub fn elements(&self) -> impl Iterator<Item = ClassElement> + '_ {
        std::iter::once(ClassElement::Header(self.header.clone()))
            .chain(self.fields.iter().cloned().map(ClassElement::Field))
            .chain(self.methods.iter().cloned().map(ClassElement::Method))
            .chain(self.attributes.iter().cloned().map(ClassElement::Attribute))
    }
}
