//! Field descriptors, method descriptors and generic signatures.
//!
//! Descriptors are the only place the class file format spells types out as text, so
//! they are also where a remapping pass must find the symbols it rewrites. This module
//! parses descriptors into [`crate::classfile::descriptor::FieldType`] and
//! [`crate::classfile::descriptor::MethodDescriptor`], computes local slot footprints
//! from them, and rewrites the symbols embedded in descriptors and `Signature` strings.
//!
//! # Slot Footprint
//!
//! On method entry the receiver (for instance methods) occupies slot 0, followed by the
//! parameters in declaration order. `long` and `double` parameters occupy two slots.
//!
//! ```rust
//! use classweave::{AccessFlags, MethodDescriptor};
//!
//! let descriptor = MethodDescriptor::parse("(JI)V")?;
//! assert_eq!(descriptor.footprint(AccessFlags::PUBLIC), 4);
//! assert_eq!(descriptor.footprint(AccessFlags::STATIC), 3);
//! # Ok::<(), classweave::Error>(())
//! ```

use std::fmt;

use strum::{EnumIter, IntoStaticStr};

use crate::{
    classfile::{flags::AccessFlags, symbol::Symbol},
    Error, Result,
};

/// Maximum number of array dimensions a descriptor may declare.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// The kind of a value as far as local slots and the operand stack are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum TypeKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference,
    Void,
}

impl TypeKind {
    /// Number of local slots (and stack words) a value of this kind occupies.
    #[must_use]
    pub fn slot_size(self) -> u16 {
        match self {
            TypeKind::Long | TypeKind::Double => 2,
            TypeKind::Void => 0,
            _ => 1,
        }
    }

    /// Returns `true` for category-2 kinds.
    #[must_use]
    pub fn is_wide(self) -> bool {
        self.slot_size() == 2
    }

    /// The kind the JVM computes with: sub-int integral kinds widen to `Int`.
    #[must_use]
    pub fn computational(self) -> TypeKind {
        match self {
            TypeKind::Boolean | TypeKind::Byte | TypeKind::Char | TypeKind::Short => TypeKind::Int,
            other => other,
        }
    }

    /// Kind for a primitive descriptor character, or `V`.
    #[must_use]
    pub fn from_descriptor_char(c: u8) -> Option<TypeKind> {
        Some(match c {
            b'Z' => TypeKind::Boolean,
            b'B' => TypeKind::Byte,
            b'C' => TypeKind::Char,
            b'S' => TypeKind::Short,
            b'I' => TypeKind::Int,
            b'J' => TypeKind::Long,
            b'F' => TypeKind::Float,
            b'D' => TypeKind::Double,
            b'V' => TypeKind::Void,
            b'L' | b'[' => TypeKind::Reference,
            _ => return None,
        })
    }

    /// Kind of the value described by a field descriptor, judged by its first character.
    #[must_use]
    pub fn of_descriptor(descriptor: &str) -> Option<TypeKind> {
        descriptor
            .as_bytes()
            .first()
            .and_then(|c| TypeKind::from_descriptor_char(*c))
    }

    /// The primitive descriptor character, `None` for references.
    #[must_use]
    pub fn descriptor_char(self) -> Option<char> {
        Some(match self {
            TypeKind::Boolean => 'Z',
            TypeKind::Byte => 'B',
            TypeKind::Char => 'C',
            TypeKind::Short => 'S',
            TypeKind::Int => 'I',
            TypeKind::Long => 'J',
            TypeKind::Float => 'F',
            TypeKind::Double => 'D',
            TypeKind::Void => 'V',
            TypeKind::Reference => return None,
        })
    }

    /// The `atype` operand of `newarray` for this primitive kind.
    #[must_use]
    pub fn array_type_code(self) -> Option<u8> {
        Some(match self {
            TypeKind::Boolean => 4,
            TypeKind::Char => 5,
            TypeKind::Float => 6,
            TypeKind::Double => 7,
            TypeKind::Byte => 8,
            TypeKind::Short => 9,
            TypeKind::Int => 10,
            TypeKind::Long => 11,
            TypeKind::Reference | TypeKind::Void => return None,
        })
    }

    /// Inverse of [`TypeKind::array_type_code`].
    #[must_use]
    pub fn from_array_type_code(code: u8) -> Option<TypeKind> {
        Some(match code {
            4 => TypeKind::Boolean,
            5 => TypeKind::Char,
            6 => TypeKind::Float,
            7 => TypeKind::Double,
            8 => TypeKind::Byte,
            9 => TypeKind::Short,
            10 => TypeKind::Int,
            11 => TypeKind::Long,
            _ => return None,
        })
    }

    /// Lower-case name, as used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// A parsed field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A primitive type
    Base(TypeKind),
    /// A class or interface type
    Object(Symbol),
    /// An array of the boxed component type
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidDescriptor`] if `descriptor` is not exactly one field type.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut pos = 0;
        let ty = parse_field_type(descriptor, &mut pos)?;
        if pos != descriptor.len() {
            return Err(Error::InvalidDescriptor(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// The slot kind of a value of this type.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        match self {
            FieldType::Base(kind) => *kind,
            FieldType::Object(_) | FieldType::Array(_) => TypeKind::Reference,
        }
    }

    /// Rewrite every class symbol inside this type, including array component types.
    #[must_use]
    pub fn map_symbols(&self, mapping: &dyn Fn(&Symbol) -> Symbol) -> FieldType {
        match self {
            FieldType::Base(kind) => FieldType::Base(*kind),
            FieldType::Object(symbol) => FieldType::Object(mapping(symbol)),
            FieldType::Array(component) => FieldType::Array(Box::new(component.map_symbols(mapping))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(kind) => match kind.descriptor_char() {
                Some(c) => write!(f, "{c}"),
                None => f.write_str("Ljava/lang/Object;"),
            },
            FieldType::Object(symbol) => write!(f, "L{symbol};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

fn parse_field_type(descriptor: &str, pos: &mut usize) -> Result<FieldType> {
    let bytes = descriptor.as_bytes();
    let invalid = || Error::InvalidDescriptor(descriptor.to_string());

    let mut dimensions = 0;
    while bytes.get(*pos) == Some(&b'[') {
        dimensions += 1;
        *pos += 1;
    }
    if dimensions > MAX_ARRAY_DIMENSIONS {
        return Err(invalid());
    }

    let Some(&c) = bytes.get(*pos) else {
        return Err(invalid());
    };
    *pos += 1;

    let mut ty = match c {
        b'L' => {
            let start = *pos;
            let Some(len) = descriptor[start..].find(';') else {
                return Err(invalid());
            };
            let name = &descriptor[start..start + len];
            if name.is_empty() || name.contains(&['.', '['][..]) {
                return Err(invalid());
            }
            *pos = start + len + 1;
            FieldType::Object(Symbol::new(name))
        }
        b'V' => return Err(invalid()),
        other => FieldType::Base(TypeKind::from_descriptor_char(other).ok_or_else(invalid)?),
    };

    for _ in 0..dimensions {
        ty = FieldType::Array(Box::new(ty));
    }
    Ok(ty)
}

/// A parsed method descriptor.
///
/// # Examples
///
/// ```rust
/// use classweave::{MethodDescriptor, TypeKind};
///
/// let descriptor = MethodDescriptor::parse("(I[Ljava/lang/String;)J")?;
/// assert_eq!(descriptor.params.len(), 2);
/// assert_eq!(descriptor.return_kind(), TypeKind::Long);
/// assert_eq!(descriptor.to_string(), "(I[Ljava/lang/String;)J");
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for `void`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(IJ)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidDescriptor`] on malformed input.
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
        let invalid = || Error::InvalidDescriptor(descriptor.to_string());
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(invalid());
        }

        let mut pos = 1;
        let mut params = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => params.push(parse_field_type(descriptor, &mut pos)?),
                None => return Err(invalid()),
            }
        }

        let ret = if bytes.get(pos) == Some(&b'V') {
            pos += 1;
            None
        } else {
            Some(parse_field_type(descriptor, &mut pos)?)
        };

        if pos != descriptor.len() {
            return Err(invalid());
        }
        Ok(MethodDescriptor { params, ret })
    }

    /// Slots occupied by the parameters alone.
    #[must_use]
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(|p| p.kind().slot_size()).sum()
    }

    /// Slots occupied on entry by the receiver (unless `flags` is static) and parameters.
    #[must_use]
    pub fn footprint(&self, flags: AccessFlags) -> u16 {
        let receiver = u16::from(!flags.contains(AccessFlags::STATIC));
        receiver + self.param_slots()
    }

    /// Kind and starting slot of each entry local, receiver first.
    #[must_use]
    pub fn entry_locals(&self, flags: AccessFlags) -> Vec<(TypeKind, u16)> {
        let mut locals = Vec::with_capacity(self.params.len() + 1);
        let mut slot = 0;
        if !flags.contains(AccessFlags::STATIC) {
            locals.push((TypeKind::Reference, 0));
            slot = 1;
        }
        for param in &self.params {
            let kind = param.kind();
            locals.push((kind, slot));
            slot += kind.slot_size();
        }
        locals
    }

    /// The return kind, [`TypeKind::Void`] for `void`.
    #[must_use]
    pub fn return_kind(&self) -> TypeKind {
        self.ret.as_ref().map_or(TypeKind::Void, FieldType::kind)
    }

    /// Rewrite every class symbol in the parameter and return types.
    #[must_use]
    pub fn map_symbols(&self, mapping: &dyn Fn(&Symbol) -> Symbol) -> MethodDescriptor {
        MethodDescriptor {
            params: self.params.iter().map(|p| p.map_symbols(mapping)).collect(),
            ret: self.ret.as_ref().map(|r| r.map_symbols(mapping)),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ret) => write!(f, "{ret}"),
            None => f.write_str("V"),
        }
    }
}

/// Rewrite the symbols in a field descriptor. Unparseable input is returned unchanged.
#[must_use]
pub fn remap_field_descriptor(descriptor: &str, mapping: &dyn Fn(&Symbol) -> Symbol) -> String {
    match FieldType::parse(descriptor) {
        Ok(ty) => ty.map_symbols(mapping).to_string(),
        Err(_) => descriptor.to_string(),
    }
}

/// Rewrite the symbols in a method descriptor. Unparseable input is returned unchanged.
#[must_use]
pub fn remap_method_descriptor(descriptor: &str, mapping: &dyn Fn(&Symbol) -> Symbol) -> String {
    match MethodDescriptor::parse(descriptor) {
        Ok(md) => md.map_symbols(mapping).to_string(),
        Err(_) => descriptor.to_string(),
    }
}

/// Rewrite the symbols in a class, method or field `Signature` string.
///
/// Inner class suffixes (`Lpkg/Outer<TT;>.Inner;`) are resolved against the mapped
/// `Outer$Inner` name. Input that does not follow the signature grammar is returned
/// unchanged.
#[must_use]
pub fn remap_signature(signature: &str, mapping: &dyn Fn(&Symbol) -> Symbol) -> String {
    SignatureRemapper {
        signature,
        pos: 0,
        out: String::with_capacity(signature.len()),
        mapping,
    }
    .run()
    .unwrap_or_else(|| signature.to_string())
}

struct SignatureRemapper<'s, 'm> {
    signature: &'s str,
    pos: usize,
    out: String,
    mapping: &'m dyn Fn(&Symbol) -> Symbol,
}

impl<'s> SignatureRemapper<'s, '_> {
    fn run(mut self) -> Option<String> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }

        if self.peek() == Some(b'(') {
            self.copy(b'(')?;
            while self.peek()? != b')' {
                self.java_type()?;
            }
            self.copy(b')')?;
            if self.peek()? == b'V' {
                self.copy(b'V')?;
            } else {
                self.java_type()?;
            }
            while self.peek() == Some(b'^') {
                self.copy(b'^')?;
                self.reference_type()?;
            }
        } else {
            while self.peek().is_some() {
                self.reference_type()?;
            }
        }

        (self.pos == self.signature.len()).then_some(self.out)
    }

    fn peek(&self) -> Option<u8> {
        self.signature.as_bytes().get(self.pos).copied()
    }

    fn copy(&mut self, expected: u8) -> Option<()> {
        if self.peek()? != expected {
            return None;
        }
        self.pos += 1;
        self.out.push(char::from(expected));
        Some(())
    }

    fn identifier(&mut self, stops: &[u8]) -> Option<&'s str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if stops.contains(&b) {
                break;
            }
            self.pos += 1;
        }
        (self.pos > start).then(|| &self.signature[start..self.pos])
    }

    fn type_parameters(&mut self) -> Option<()> {
        self.copy(b'<')?;
        while self.peek()? != b'>' {
            let name = self.identifier(b":>")?;
            self.out.push_str(name);
            self.copy(b':')?;
            if matches!(self.peek()?, b'L' | b'T' | b'[') {
                self.reference_type()?;
            }
            while self.peek() == Some(b':') {
                self.copy(b':')?;
                self.reference_type()?;
            }
        }
        self.copy(b'>')
    }

    fn java_type(&mut self) -> Option<()> {
        match self.peek()? {
            c @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => self.copy(c),
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                self.copy(b'T')?;
                let name = self.identifier(b";")?;
                self.out.push_str(name);
                self.copy(b';')
            }
            b'[' => {
                self.copy(b'[')?;
                self.java_type()
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.copy(b'L')?;
        let name = self.identifier(b"<.;")?;
        let mut original = name.to_string();
        let mut mapped = (self.mapping)(&Symbol::new(name)).as_str().to_string();
        self.out.push_str(&mapped);

        loop {
            match self.peek()? {
                b'<' => self.type_arguments()?,
                b'.' => {
                    self.copy(b'.')?;
                    let inner = self.identifier(b"<.;")?;
                    original = format!("{original}${inner}");
                    let outer_prefix = format!("{mapped}$");
                    mapped = (self.mapping)(&Symbol::new(&original)).as_str().to_string();
                    let simple = match mapped.strip_prefix(outer_prefix.as_str()) {
                        Some(simple) => simple,
                        None => mapped.rsplit('$').next().unwrap_or(mapped.as_str()),
                    };
                    self.out.push_str(simple);
                }
                b';' => return self.copy(b';'),
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.copy(b'<')?;
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => self.copy(b'*')?,
                c @ (b'+' | b'-') => {
                    self.copy(c)?;
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.copy(b'>')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rename(symbol: &Symbol) -> Symbol {
        match symbol.as_str() {
            "demo/Probe" => Symbol::new("demo/Target"),
            "demo/Probe$Inner" => Symbol::new("demo/Target$Inner"),
            _ => symbol.clone(),
        }
    }

    #[test]
    fn parse_field_types() -> Result<()> {
        assert_eq!(FieldType::parse("I")?, FieldType::Base(TypeKind::Int));
        assert_eq!(
            FieldType::parse("[[Ljava/lang/String;")?,
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Object(
                Symbol::new("java/lang/String")
            )))))
        );
        assert!(FieldType::parse("V").is_err());
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("L;").is_err());
        Ok(())
    }

    #[test]
    fn parse_method_descriptors() -> Result<()> {
        let md = MethodDescriptor::parse("(JID[J)V")?;
        assert_eq!(md.params.len(), 4);
        assert_eq!(md.param_slots(), 6);
        assert_eq!(md.return_kind(), TypeKind::Void);
        assert_eq!(
            md.entry_locals(AccessFlags::empty()),
            vec![
                (TypeKind::Reference, 0),
                (TypeKind::Long, 1),
                (TypeKind::Int, 3),
                (TypeKind::Double, 4),
                (TypeKind::Reference, 6),
            ]
        );

        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(I)VV").is_err());
        Ok(())
    }

    #[test]
    fn too_many_dimensions() {
        let descriptor = format!("{}I", "[".repeat(256));
        assert!(FieldType::parse(&descriptor).is_err());
    }

    #[test]
    fn remap_descriptors() {
        assert_eq!(
            remap_method_descriptor("(Ldemo/Probe;[Ldemo/Probe;I)Ldemo/Other;", &rename),
            "(Ldemo/Target;[Ldemo/Target;I)Ldemo/Other;"
        );
        assert_eq!(remap_field_descriptor("[[Ldemo/Probe;", &rename), "[[Ldemo/Target;");
        assert_eq!(remap_field_descriptor("not a descriptor", &rename), "not a descriptor");
    }

    #[test]
    fn remap_class_signature() {
        let signature = "<T:Ldemo/Probe;U::Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;";
        assert_eq!(
            remap_signature(signature, &rename),
            "<T:Ldemo/Target;U::Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;"
        );
    }

    #[test]
    fn remap_method_signature() {
        let signature = "<E:Ljava/lang/Exception;>(Ljava/util/List<+Ldemo/Probe;>;[TE;)TE;^TE;^Ldemo/Probe;";
        assert_eq!(
            remap_signature(signature, &rename),
            "<E:Ljava/lang/Exception;>(Ljava/util/List<+Ldemo/Target;>;[TE;)TE;^TE;^Ldemo/Target;"
        );
    }

    #[test]
    fn remap_inner_class_signature() {
        let signature = "Ldemo/Probe<*>.Inner<Ldemo/Probe;>;";
        assert_eq!(
            remap_signature(signature, &rename),
            "Ldemo/Target<*>.Inner<Ldemo/Target;>;"
        );
    }

    #[test]
    fn malformed_signature_is_unchanged() {
        assert_eq!(remap_signature("Ldemo/Probe", &rename), "Ldemo/Probe");
        assert_eq!(remap_signature("<T>V", &rename), "<T>V");
    }
}
