//! The constant pool, for both reading and writing.
//!
//! Reading produces a [`crate::classfile::constpool::ConstantPool`]: the raw, index-based
//! entries of a parsed class plus its resolved bootstrap methods. The rest of the reader
//! uses it to turn indices into model values. Writing goes through
//! [`crate::classfile::constpool::ConstantPoolBuilder`], which interns model values back
//! into deduplicated entries.
//!
//! A builder can be seeded from a parsed pool so every original entry keeps its index.
//! Attributes this crate carries verbatim stay valid in the rewritten class that way.
//!
//! # Entry Layout
//!
//! Index 0 is unused. `CONSTANT_Long` and `CONSTANT_Double` entries take two indices; the
//! second is unusable. The pool holds at most 65534 usable indices.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    classfile::symbol::{BootstrapMethod, DynamicConstant, HandleKind, MemberRef, MethodHandle, Symbol},
    code::Constant,
    file::{io::write_be, parser::Parser},
    Error, Result,
};

/// Nesting limit for dynamic constants used as bootstrap arguments.
pub const MAX_BOOTSTRAP_DEPTH: usize = 64;

/// `CONSTANT_Utf8`
pub const TAG_UTF8: u8 = 1;
/// `CONSTANT_Integer`
pub const TAG_INTEGER: u8 = 3;
/// `CONSTANT_Float`
pub const TAG_FLOAT: u8 = 4;
/// `CONSTANT_Long`
pub const TAG_LONG: u8 = 5;
/// `CONSTANT_Double`
pub const TAG_DOUBLE: u8 = 6;
/// `CONSTANT_Class`
pub const TAG_CLASS: u8 = 7;
/// `CONSTANT_String`
pub const TAG_STRING: u8 = 8;
/// `CONSTANT_Fieldref`
pub const TAG_FIELDREF: u8 = 9;
/// `CONSTANT_Methodref`
pub const TAG_METHODREF: u8 = 10;
/// `CONSTANT_InterfaceMethodref`
pub const TAG_INTERFACE_METHODREF: u8 = 11;
/// `CONSTANT_NameAndType`
pub const TAG_NAME_AND_TYPE: u8 = 12;
/// `CONSTANT_MethodHandle`
pub const TAG_METHOD_HANDLE: u8 = 15;
/// `CONSTANT_MethodType`
pub const TAG_METHOD_TYPE: u8 = 16;
/// `CONSTANT_Dynamic`
pub const TAG_DYNAMIC: u8 = 17;
/// `CONSTANT_InvokeDynamic`
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
/// `CONSTANT_Module`
pub const TAG_MODULE: u8 = 19;
/// `CONSTANT_Package`
pub const TAG_PACKAGE: u8 = 20;

/// A constant pool entry in its on-disk, index-based form.
///
/// Floating point values are kept as their bit patterns so entries can be hashed and
/// `NaN` payloads survive a rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RawConstant {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl RawConstant {
    /// The entry's tag byte.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            RawConstant::Utf8(_) => TAG_UTF8,
            RawConstant::Integer(_) => TAG_INTEGER,
            RawConstant::Float(_) => TAG_FLOAT,
            RawConstant::Long(_) => TAG_LONG,
            RawConstant::Double(_) => TAG_DOUBLE,
            RawConstant::Class(_) => TAG_CLASS,
            RawConstant::String(_) => TAG_STRING,
            RawConstant::FieldRef { .. } => TAG_FIELDREF,
            RawConstant::MethodRef { .. } => TAG_METHODREF,
            RawConstant::InterfaceMethodRef { .. } => TAG_INTERFACE_METHODREF,
            RawConstant::NameAndType { .. } => TAG_NAME_AND_TYPE,
            RawConstant::MethodHandle { .. } => TAG_METHOD_HANDLE,
            RawConstant::MethodType(_) => TAG_METHOD_TYPE,
            RawConstant::Dynamic { .. } => TAG_DYNAMIC,
            RawConstant::InvokeDynamic { .. } => TAG_INVOKE_DYNAMIC,
            RawConstant::Module(_) => TAG_MODULE,
            RawConstant::Package(_) => TAG_PACKAGE,
        }
    }

    /// Returns `true` if the entry occupies two pool indices.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, RawConstant::Long(_) | RawConstant::Double(_))
    }

    fn parse(parser: &mut Parser) -> Result<RawConstant> {
        let tag = parser.read_be::<u8>()?;
        Ok(match tag {
            TAG_UTF8 => {
                let len = parser.read_be::<u16>()?;
                RawConstant::Utf8(decode_modified_utf8(parser.read_bytes(usize::from(len))?)?)
            }
            TAG_INTEGER => RawConstant::Integer(parser.read_be()?),
            TAG_FLOAT => RawConstant::Float(parser.read_be()?),
            TAG_LONG => RawConstant::Long(parser.read_be()?),
            TAG_DOUBLE => RawConstant::Double(parser.read_be()?),
            TAG_CLASS => RawConstant::Class(parser.read_be()?),
            TAG_STRING => RawConstant::String(parser.read_be()?),
            TAG_FIELDREF => RawConstant::FieldRef {
                class: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_METHODREF => RawConstant::MethodRef {
                class: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_INTERFACE_METHODREF => RawConstant::InterfaceMethodRef {
                class: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_NAME_AND_TYPE => RawConstant::NameAndType {
                name: parser.read_be()?,
                descriptor: parser.read_be()?,
            },
            TAG_METHOD_HANDLE => RawConstant::MethodHandle {
                kind: parser.read_be()?,
                reference: parser.read_be()?,
            },
            TAG_METHOD_TYPE => RawConstant::MethodType(parser.read_be()?),
            TAG_DYNAMIC => RawConstant::Dynamic {
                bootstrap: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_INVOKE_DYNAMIC => RawConstant::InvokeDynamic {
                bootstrap: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_MODULE => RawConstant::Module(parser.read_be()?),
            TAG_PACKAGE => RawConstant::Package(parser.read_be()?),
            other => {
                return Err(malformed_error!(
                    "Unknown constant pool tag {} at offset {}",
                    other,
                    parser.pos() - 1
                ))
            }
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        write_be(out, self.tag());
        match self {
            RawConstant::Utf8(value) => {
                let bytes = encode_modified_utf8(value);
                let len = u16::try_from(bytes.len()).map_err(|_| {
                    Error::LimitExceeded(format!("string constant of {} bytes", bytes.len()))
                })?;
                write_be(out, len);
                out.extend_from_slice(&bytes);
            }
            RawConstant::Integer(value) => write_be(out, *value),
            RawConstant::Float(bits) => write_be(out, *bits),
            RawConstant::Long(value) => write_be(out, *value),
            RawConstant::Double(bits) => write_be(out, *bits),
            RawConstant::Class(index)
            | RawConstant::String(index)
            | RawConstant::MethodType(index)
            | RawConstant::Module(index)
            | RawConstant::Package(index) => write_be(out, *index),
            RawConstant::FieldRef { class, name_and_type }
            | RawConstant::MethodRef { class, name_and_type }
            | RawConstant::InterfaceMethodRef { class, name_and_type } => {
                write_be(out, *class);
                write_be(out, *name_and_type);
            }
            RawConstant::NameAndType { name, descriptor } => {
                write_be(out, *name);
                write_be(out, *descriptor);
            }
            RawConstant::MethodHandle { kind, reference } => {
                write_be(out, *kind);
                write_be(out, *reference);
            }
            RawConstant::Dynamic {
                bootstrap,
                name_and_type,
            }
            | RawConstant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                write_be(out, *bootstrap);
                write_be(out, *name_and_type);
            }
        }
        Ok(())
    }
}

/// One entry of the `BootstrapMethods` attribute in index form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawBootstrap {
    /// Index of the `CONSTANT_MethodHandle`
    pub handle: u16,
    /// Indices of the loadable static arguments
    pub arguments: Vec<u16>,
}

impl RawBootstrap {
    pub(crate) fn parse(parser: &mut Parser) -> Result<RawBootstrap> {
        let handle = parser.read_be::<u16>()?;
        let count = parser.read_be::<u16>()?;
        let mut arguments = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            arguments.push(parser.read_be::<u16>()?);
        }
        Ok(RawBootstrap { handle, arguments })
    }
}

/// The constant pool of a parsed class file.
///
/// Lookups validate both the index and the entry kind; a mismatch is reported as
/// [`crate::Error::InvalidConstantIndex`].
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<Option<RawConstant>>,
    raw_bootstrap: Vec<RawBootstrap>,
    bootstrap: Vec<Arc<BootstrapMethod>>,
}

impl ConstantPool {
    /// Parse `constant_pool_count` followed by the pool entries.
    ///
    /// # Errors
    /// Returns an error on truncated input, unknown tags or invalid modified UTF-8.
    pub fn parse(parser: &mut Parser) -> Result<ConstantPool> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("constant_pool_count must be at least 1"));
        }

        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(None);
        while entries.len() < usize::from(count) {
            let entry = RawConstant::parse(parser)?;
            let wide = entry.is_wide();
            entries.push(Some(entry));
            if wide {
                if entries.len() >= usize::from(count) {
                    return Err(malformed_error!("Wide constant occupies the last pool index"));
                }
                entries.push(None);
            }
        }

        Ok(ConstantPool {
            entries,
            raw_bootstrap: Vec::new(),
            bootstrap: Vec::new(),
        })
    }

    /// Number of indices including the unused index 0 (`constant_pool_count`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool has no usable entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// The raw entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidConstantIndex`] for index 0, out of range indices and
    /// the unusable second index of wide entries.
    pub fn get(&self, index: u16) -> Result<&RawConstant> {
        self.entries
            .get(usize::from(index))
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidConstantIndex(index))
    }

    /// The string of the `CONSTANT_Utf8` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidConstantIndex`] if the entry is missing or not UTF-8.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            RawConstant::Utf8(value) => Ok(value),
            _ => Err(Error::InvalidConstantIndex(index)),
        }
    }

    /// The symbol named by the `CONSTANT_Class` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidConstantIndex`] if the entry is missing or not a class.
    pub fn class(&self, index: u16) -> Result<Symbol> {
        match self.get(index)? {
            RawConstant::Class(name) => Ok(Symbol::new(self.utf8(*name)?)),
            _ => Err(Error::InvalidConstantIndex(index)),
        }
    }

    /// Like [`ConstantPool::class`], but index 0 yields `None`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidConstantIndex`] for a non-zero index that is not a class.
    pub fn optional_class(&self, index: u16) -> Result<Option<Symbol>> {
        if index == 0 {
            Ok(None)
        } else {
            self.class(index).map(Some)
        }
    }

    /// Name and descriptor of the `CONSTANT_NameAndType` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidConstantIndex`] if the entry is missing or of another kind.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            RawConstant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::InvalidConstantIndex(index)),
        }
    }

    /// Resolve a field, method or interface method reference.
    ///
    /// Returns the member and whether it was an interface method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidConstantIndex`] if the entry is not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<(MemberRef, bool)> {
        let (class, name_and_type, interface) = match self.get(index)? {
            RawConstant::FieldRef {
                class,
                name_and_type,
            }
            | RawConstant::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            RawConstant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            _ => return Err(Error::InvalidConstantIndex(index)),
        };

        let owner = self.class(class)?;
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok((MemberRef::new(owner, name, descriptor), interface))
    }

    /// Resolve the `CONSTANT_MethodHandle` at `index`.
    ///
    /// # Errors
    /// Returns an error if the entry is not a method handle or has an invalid kind.
    pub fn method_handle(&self, index: u16) -> Result<MethodHandle> {
        let RawConstant::MethodHandle { kind, reference } = self.get(index)? else {
            return Err(Error::InvalidConstantIndex(index));
        };
        let kind = HandleKind::from_repr(*kind)
            .ok_or_else(|| malformed_error!("Invalid method handle kind {}", kind))?;
        let (member, interface) = self.member_ref(*reference)?;
        Ok(MethodHandle {
            kind,
            member,
            interface,
        })
    }

    /// Resolve the loadable constant at `index`, as used by `ldc` and `ConstantValue`.
    ///
    /// # Errors
    /// Returns an error if the entry is not loadable or references missing bootstrap data.
    pub fn loadable(&self, index: u16) -> Result<Constant> {
        match self.get(index)? {
            RawConstant::Dynamic {
                bootstrap,
                name_and_type,
            } => {
                let bootstrap = self
                    .bootstrap
                    .get(usize::from(*bootstrap))
                    .cloned()
                    .ok_or_else(|| malformed_error!("Missing bootstrap method {}", bootstrap))?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(Constant::Dynamic(DynamicConstant {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    bootstrap,
                }))
            }
            _ => self.simple_loadable(index),
        }
    }

    /// Resolve the `CONSTANT_InvokeDynamic` at `index`.
    ///
    /// # Errors
    /// Returns an error if the entry is not an invokedynamic call site.
    pub fn invoke_dynamic(&self, index: u16) -> Result<DynamicConstant> {
        let RawConstant::InvokeDynamic {
            bootstrap,
            name_and_type,
        } = self.get(index)?
        else {
            return Err(Error::InvalidConstantIndex(index));
        };
        let bootstrap = self
            .bootstrap
            .get(usize::from(*bootstrap))
            .cloned()
            .ok_or_else(|| malformed_error!("Missing bootstrap method {}", bootstrap))?;
        let (name, descriptor) = self.name_and_type(*name_and_type)?;
        Ok(DynamicConstant {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            bootstrap,
        })
    }

    /// The bootstrap methods in attribute order.
    #[must_use]
    pub fn bootstrap_methods(&self) -> &[Arc<BootstrapMethod>] {
        &self.bootstrap
    }

    pub(crate) fn raw_entries(&self) -> &[Option<RawConstant>] {
        &self.entries
    }

    pub(crate) fn raw_bootstrap(&self) -> &[RawBootstrap] {
        &self.raw_bootstrap
    }

    /// Install the `BootstrapMethods` table and resolve every entry.
    ///
    /// Arguments may themselves be dynamic constants referring to other entries; those
    /// are resolved recursively up to [`MAX_BOOTSTRAP_DEPTH`].
    pub(crate) fn install_bootstrap(&mut self, raw: Vec<RawBootstrap>) -> Result<()> {
        self.raw_bootstrap = raw;
        let mut resolved = vec![None; self.raw_bootstrap.len()];
        for index in 0..self.raw_bootstrap.len() {
            self.resolve_bootstrap(index, &mut resolved, 0)?;
        }
        self.bootstrap = resolved.into_iter().flatten().collect();
        Ok(())
    }

    fn resolve_bootstrap(
        &self,
        index: usize,
        resolved: &mut [Option<Arc<BootstrapMethod>>],
        depth: usize,
    ) -> Result<Arc<BootstrapMethod>> {
        if depth > MAX_BOOTSTRAP_DEPTH {
            return Err(Error::RecursionLimit(MAX_BOOTSTRAP_DEPTH));
        }
        if let Some(Some(done)) = resolved.get(index) {
            return Ok(done.clone());
        }

        let raw = self
            .raw_bootstrap
            .get(index)
            .ok_or_else(|| malformed_error!("Missing bootstrap method {}", index))?;
        let handle = self.method_handle(raw.handle)?;

        let mut arguments = Vec::with_capacity(raw.arguments.len());
        for argument in &raw.arguments {
            let value = match self.get(*argument)? {
                RawConstant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    let nested =
                        self.resolve_bootstrap(usize::from(*bootstrap), resolved, depth + 1)?;
                    let (name, descriptor) = self.name_and_type(*name_and_type)?;
                    Constant::Dynamic(DynamicConstant {
                        name: name.to_string(),
                        descriptor: descriptor.to_string(),
                        bootstrap: nested,
                    })
                }
                _ => self.simple_loadable(*argument)?,
            };
            arguments.push(value);
        }

        let method = Arc::new(BootstrapMethod { handle, arguments });
        resolved[index] = Some(method.clone());
        Ok(method)
    }

    fn simple_loadable(&self, index: u16) -> Result<Constant> {
        Ok(match self.get(index)? {
            RawConstant::Integer(value) => Constant::Int(*value),
            RawConstant::Float(bits) => Constant::Float(f32::from_bits(*bits)),
            RawConstant::Long(value) => Constant::Long(*value),
            RawConstant::Double(bits) => Constant::Double(f64::from_bits(*bits)),
            RawConstant::String(value) => Constant::String(self.utf8(*value)?.to_string()),
            RawConstant::Class(_) => Constant::Class(self.class(index)?),
            RawConstant::MethodType(descriptor) => {
                Constant::MethodType(self.utf8(*descriptor)?.to_string())
            }
            RawConstant::MethodHandle { .. } => Constant::MethodHandle(self.method_handle(index)?),
            _ => return Err(Error::InvalidConstantIndex(index)),
        })
    }
}

/// Interns model values into a fresh, deduplicated constant pool.
///
/// # Examples
///
/// ```rust
/// use classweave::classfile::constpool::ConstantPoolBuilder;
/// use classweave::Symbol;
///
/// let mut pool = ConstantPoolBuilder::new();
/// let first = pool.class(&Symbol::new("java/lang/Object"))?;
/// let again = pool.class(&Symbol::new("java/lang/Object"))?;
/// assert_eq!(first, again);
/// assert_eq!(pool.len(), 3);
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug)]
pub struct ConstantPoolBuilder {
    entries: Vec<Option<RawConstant>>,
    lookup: FxHashMap<RawConstant, u16>,
    bootstrap: Vec<RawBootstrap>,
    bootstrap_lookup: FxHashMap<RawBootstrap, u16>,
}

impl Default for ConstantPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPoolBuilder {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        ConstantPoolBuilder {
            entries: vec![None],
            lookup: FxHashMap::default(),
            bootstrap: Vec::new(),
            bootstrap_lookup: FxHashMap::default(),
        }
    }

    /// Create a pool that starts with every entry and bootstrap method of `source`
    /// at its original index.
    #[must_use]
    pub fn seeded(source: &ConstantPool) -> Self {
        let mut builder = ConstantPoolBuilder {
            entries: source.raw_entries().to_vec(),
            lookup: FxHashMap::default(),
            bootstrap: source.raw_bootstrap().to_vec(),
            bootstrap_lookup: FxHashMap::default(),
        };
        if builder.entries.is_empty() {
            builder.entries.push(None);
        }

        for (index, entry) in builder.entries.iter().enumerate() {
            if let (Some(entry), Ok(index)) = (entry, u16::try_from(index)) {
                builder.lookup.entry(entry.clone()).or_insert(index);
            }
        }
        for (index, entry) in builder.bootstrap.iter().enumerate() {
            if let Ok(index) = u16::try_from(index) {
                builder.bootstrap_lookup.entry(entry.clone()).or_insert(index);
            }
        }
        builder
    }

    /// `constant_pool_count` of the pool built so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Intern a raw entry, returning its index.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] once the pool would exceed 65535 indices.
    pub fn add(&mut self, entry: RawConstant) -> Result<u16> {
        if let Some(index) = self.lookup.get(&entry) {
            return Ok(*index);
        }

        let width = if entry.is_wide() { 2 } else { 1 };
        let index = self.entries.len();
        if index + width > usize::from(u16::MAX) {
            return Err(Error::LimitExceeded(
                "constant pool exceeds 65535 entries".to_string(),
            ));
        }
        let index = u16::try_from(index)
            .map_err(|_| Error::LimitExceeded("constant pool exceeds 65535 entries".to_string()))?;

        self.entries.push(Some(entry.clone()));
        if width == 2 {
            self.entries.push(None);
        }
        self.lookup.insert(entry, index);
        Ok(index)
    }

    /// Intern a `CONSTANT_Utf8`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn utf8(&mut self, value: &str) -> Result<u16> {
        self.add(RawConstant::Utf8(value.to_string()))
    }

    /// Intern a `CONSTANT_Class` for `symbol`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn class(&mut self, symbol: &Symbol) -> Result<u16> {
        let name = self.utf8(symbol.as_str())?;
        self.add(RawConstant::Class(name))
    }

    /// Intern a `CONSTANT_String`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.utf8(value)?;
        self.add(RawConstant::String(utf8))
    }

    /// Intern a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.add(RawConstant::NameAndType { name, descriptor })
    }

    /// Intern a `CONSTANT_Fieldref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn field_ref(&mut self, field: &MemberRef) -> Result<u16> {
        let class = self.class(&field.owner)?;
        let name_and_type = self.name_and_type(&field.name, &field.descriptor)?;
        self.add(RawConstant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Intern a `CONSTANT_Methodref` or, if `interface`, a `CONSTANT_InterfaceMethodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn method_ref(&mut self, method: &MemberRef, interface: bool) -> Result<u16> {
        let class = self.class(&method.owner)?;
        let name_and_type = self.name_and_type(&method.name, &method.descriptor)?;
        self.add(if interface {
            RawConstant::InterfaceMethodRef {
                class,
                name_and_type,
            }
        } else {
            RawConstant::MethodRef {
                class,
                name_and_type,
            }
        })
    }

    /// Intern a `CONSTANT_MethodHandle`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn method_handle(&mut self, handle: &MethodHandle) -> Result<u16> {
        let reference = if handle.kind.is_field() {
            self.field_ref(&handle.member)?
        } else {
            self.method_ref(&handle.member, handle.interface)?
        };
        self.add(RawConstant::MethodHandle {
            kind: handle.kind as u8,
            reference,
        })
    }

    /// Intern a bootstrap method, returning its index in the `BootstrapMethods` table.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool or the table is full.
    pub fn bootstrap_method(&mut self, method: &BootstrapMethod) -> Result<u16> {
        let handle = self.method_handle(&method.handle)?;
        let mut arguments = Vec::with_capacity(method.arguments.len());
        for argument in &method.arguments {
            arguments.push(self.constant(argument)?);
        }

        let raw = RawBootstrap { handle, arguments };
        if let Some(index) = self.bootstrap_lookup.get(&raw) {
            return Ok(*index);
        }
        let index = u16::try_from(self.bootstrap.len())
            .map_err(|_| Error::LimitExceeded("more than 65535 bootstrap methods".to_string()))?;
        self.bootstrap.push(raw.clone());
        self.bootstrap_lookup.insert(raw, index);
        Ok(index)
    }

    /// Intern a `CONSTANT_InvokeDynamic` call site.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn invoke_dynamic(&mut self, call_site: &DynamicConstant) -> Result<u16> {
        let bootstrap = self.bootstrap_method(&call_site.bootstrap)?;
        let name_and_type = self.name_and_type(&call_site.name, &call_site.descriptor)?;
        self.add(RawConstant::InvokeDynamic {
            bootstrap,
            name_and_type,
        })
    }

    /// Intern a loadable constant, as referenced by `ldc` or `ConstantValue`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn constant(&mut self, constant: &Constant) -> Result<u16> {
        match constant {
            Constant::Int(value) => self.add(RawConstant::Integer(*value)),
            Constant::Float(value) => self.add(RawConstant::Float(value.to_bits())),
            Constant::Long(value) => self.add(RawConstant::Long(*value)),
            Constant::Double(value) => self.add(RawConstant::Double(value.to_bits())),
            Constant::String(value) => self.string(value),
            Constant::Class(symbol) => self.class(symbol),
            Constant::MethodType(descriptor) => {
                let utf8 = self.utf8(descriptor)?;
                self.add(RawConstant::MethodType(utf8))
            }
            Constant::MethodHandle(handle) => self.method_handle(handle),
            Constant::Dynamic(dynamic) => {
                let bootstrap = self.bootstrap_method(&dynamic.bootstrap)?;
                let name_and_type = self.name_and_type(&dynamic.name, &dynamic.descriptor)?;
                self.add(RawConstant::Dynamic {
                    bootstrap,
                    name_and_type,
                })
            }
        }
    }

    /// The `BootstrapMethods` table accumulated so far.
    #[must_use]
    pub fn bootstrap_methods(&self) -> &[RawBootstrap] {
        &self.bootstrap
    }

    /// Serialize `constant_pool_count` and all entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if a string exceeds 65535 encoded bytes.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(self.entries.len())
            .map_err(|_| Error::LimitExceeded("constant pool exceeds 65535 entries".to_string()))?;
        write_be(out, count);
        for entry in self.entries.iter().flatten() {
            entry.write(out)?;
        }
        Ok(())
    }
}

/// Decode the JVM's modified UTF-8 (`\0` as two bytes, supplementary characters as
/// surrogate pairs).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on invalid byte sequences or unpaired surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if bytes.iter().all(|b| (0x01..0x80).contains(b)) {
        return String::from_utf8(bytes.to_vec())
            .map_err(|_| malformed_error!("Invalid modified UTF-8"));
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x01..=0x7F => {
                units.push(u16::from(b));
                i += 1;
            }
            0xC0..=0xDF => {
                let b2 = continuation(bytes, i + 1)?;
                units.push((u16::from(b & 0x1F) << 6) | u16::from(b2));
                i += 2;
            }
            0xE0..=0xEF => {
                let b2 = continuation(bytes, i + 1)?;
                let b3 = continuation(bytes, i + 2)?;
                units.push((u16::from(b & 0x0F) << 12) | (u16::from(b2) << 6) | u16::from(b3));
                i += 3;
            }
            _ => return Err(malformed_error!("Invalid modified UTF-8 byte 0x{:02X}", b)),
        }
    }

    String::from_utf16(&units).map_err(|_| malformed_error!("Unpaired surrogate in string constant"))
}

fn continuation(bytes: &[u8], index: usize) -> Result<u8> {
    match bytes.get(index) {
        Some(b) if b & 0xC0 == 0x80 => Ok(b & 0x3F),
        _ => Err(malformed_error!("Truncated modified UTF-8 sequence")),
    }
}

/// Encode a string as modified UTF-8.
#[must_use]
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_utf8_special_cases() -> Result<()> {
        let value = "a\u{0}\u{e9}\u{1F600}";
        let encoded = encode_modified_utf8(value);
        assert_eq!(&encoded[..3], &[b'a', 0xC0, 0x80]);
        assert_eq!(encoded.len(), 1 + 2 + 2 + 6);
        assert_eq!(decode_modified_utf8(&encoded)?, value);
        Ok(())
    }

    #[test]
    fn modified_utf8_rejects_nul_byte() {
        assert!(decode_modified_utf8(&[b'a', 0x00]).is_err());
        assert!(decode_modified_utf8(&[0xE0, 0x80]).is_err());
    }

    #[test]
    fn builder_deduplicates() -> Result<()> {
        let mut pool = ConstantPoolBuilder::new();
        let owner = Symbol::new("demo/Target");
        let field = MemberRef::new(owner.clone(), "count", "I");

        let a = pool.field_ref(&field)?;
        let b = pool.field_ref(&field)?;
        assert_eq!(a, b);
        // utf8 x3, class, name_and_type, fieldref
        assert_eq!(pool.len(), 7);

        let long = pool.constant(&Constant::Long(7))?;
        let next = pool.utf8("next")?;
        assert_eq!(next, long + 2);
        Ok(())
    }

    #[test]
    fn float_constants_keyed_by_bits() -> Result<()> {
        let mut pool = ConstantPoolBuilder::new();
        let zero = pool.constant(&Constant::Float(0.0))?;
        let negative_zero = pool.constant(&Constant::Float(-0.0))?;
        assert_ne!(zero, negative_zero);
        assert_eq!(pool.constant(&Constant::Float(0.0))?, zero);
        Ok(())
    }

    #[test]
    fn parse_and_seed() -> Result<()> {
        let mut pool = ConstantPoolBuilder::new();
        let class = pool.class(&Symbol::new("demo/Target"))?;
        pool.constant(&Constant::Double(1.5))?;
        let string = pool.string("hello")?;

        let mut bytes = Vec::new();
        pool.write(&mut bytes)?;

        let mut parser = Parser::new(&bytes);
        let parsed = ConstantPool::parse(&mut parser)?;
        assert!(!parser.has_more_data());
        assert_eq!(parsed.len(), pool.len());
        assert_eq!(parsed.class(class)?, Symbol::new("demo/Target"));
        assert!(matches!(parsed.loadable(string)?, Constant::String(ref s) if s == "hello"));
        assert!(parsed.utf8(class).is_err());

        let mut seeded = ConstantPoolBuilder::seeded(&parsed);
        assert_eq!(seeded.string("hello")?, string);
        assert_eq!(seeded.len(), pool.len());
        Ok(())
    }

    #[test]
    fn pool_limit() {
        let mut pool = ConstantPoolBuilder::new();
        let mut result = Ok(0);
        for i in 0..70_000 {
            result = pool.add(RawConstant::Integer(i));
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(Error::LimitExceeded(_))));
        assert_eq!(pool.len(), 65535);
    }
}
