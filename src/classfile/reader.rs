//! Class file parsing.
//!
//! Reading happens in two phases. The first pass walks the file, keeping fields, methods
//! and attributes as raw byte ranges, so the class-level `BootstrapMethods` table is known
//! before any code is decoded. The second pass resolves every raw member into the model.

use std::sync::Arc;

use log::trace;

use crate::{
    classfile::{
        attribute::{Attribute, InnerClass, UnknownAttribute},
        constpool::{ConstantPool, RawBootstrap},
        container::{ClassHeader, Container, FieldDecl, MethodDecl},
        flags::AccessFlags,
    },
    code::{decoder, CodeBody},
    file::parser::Parser,
    Error, Result,
};

/// The class file magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Options controlling what the reader keeps.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Keep attributes the model does not interpret as [`UnknownAttribute`]s.
    pub keep_unknown_attributes: bool,
    /// Keep `SourceFile`, line numbers and local variable tables.
    pub keep_debug_info: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            keep_unknown_attributes: true,
            keep_debug_info: true,
        }
    }
}

pub(crate) struct RawAttribute<'a> {
    pub(crate) name: u16,
    pub(crate) data: &'a [u8],
}

struct RawMember<'a> {
    flags: AccessFlags,
    name: u16,
    descriptor: u16,
    attributes: Vec<RawAttribute<'a>>,
}

pub(crate) fn read_attributes<'a>(parser: &mut Parser<'a>) -> Result<Vec<RawAttribute<'a>>> {
    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = parser.read_be::<u16>()?;
        let len = parser.read_be::<u32>()?;
        let len = usize::try_from(len).map_err(|_| Error::OutOfBounds)?;
        attributes.push(RawAttribute {
            name,
            data: parser.read_bytes(len)?,
        });
    }
    Ok(attributes)
}

fn read_members<'a>(parser: &mut Parser<'a>) -> Result<Vec<RawMember<'a>>> {
    let count = parser.read_be::<u16>()?;
    let mut members = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        members.push(RawMember {
            flags: AccessFlags::from_bits_retain(parser.read_be()?),
            name: parser.read_be()?,
            descriptor: parser.read_be()?,
            attributes: read_attributes(parser)?,
        });
    }
    Ok(members)
}

pub(crate) fn read(data: &[u8], options: &ReadOptions) -> Result<Container> {
    if data.is_empty() {
        return Err(Error::Empty);
    }

    let mut parser = Parser::new(data);
    let magic = parser.read_be::<u32>()?;
    if magic != MAGIC {
        return Err(Error::InvalidMagic(magic));
    }
    let minor_version = parser.read_be::<u16>()?;
    let major_version = parser.read_be::<u16>()?;

    let mut pool = ConstantPool::parse(&mut parser)?;
    let flags = AccessFlags::from_bits_retain(parser.read_be()?);
    let this_symbol = pool.class(parser.read_be()?)?;
    let super_symbol = pool.optional_class(parser.read_be()?)?;

    let interface_count = parser.read_be::<u16>()?;
    let mut interfaces = Vec::with_capacity(usize::from(interface_count));
    for _ in 0..interface_count {
        interfaces.push(pool.class(parser.read_be()?)?);
    }

    let raw_fields = read_members(&mut parser)?;
    let raw_methods = read_members(&mut parser)?;
    let raw_attributes = read_attributes(&mut parser)?;
    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after class attributes",
            parser.remaining()
        ));
    }

    let mut bootstrap = Vec::new();
    for attribute in &raw_attributes {
        if pool.utf8(attribute.name)? == "BootstrapMethods" {
            let mut body = Parser::new(attribute.data);
            let count = body.read_be::<u16>()?;
            for _ in 0..count {
                bootstrap.push(RawBootstrap::parse(&mut body)?);
            }
        }
    }
    pool.install_bootstrap(bootstrap)?;
    let pool = Arc::new(pool);

    trace!("reading class {this_symbol} version {major_version}.{minor_version}");

    let mut fields = Vec::with_capacity(raw_fields.len());
    for raw in &raw_fields {
        let mut attributes = Vec::new();
        for attribute in &raw.attributes {
            if let Some(decoded) = decode_attribute(&pool, attribute, options)? {
                attributes.push(decoded);
            }
        }
        fields.push(FieldDecl {
            name: pool.utf8(raw.name)?.to_string(),
            descriptor: pool.utf8(raw.descriptor)?.to_string(),
            flags: raw.flags,
            attributes,
        });
    }

    let mut methods = Vec::with_capacity(raw_methods.len());
    for raw in &raw_methods {
        let name = pool.utf8(raw.name)?.to_string();
        let descriptor = pool.utf8(raw.descriptor)?.to_string();

        let mut code: Option<CodeBody> = None;
        let mut attributes = Vec::new();
        for attribute in &raw.attributes {
            if pool.utf8(attribute.name)? == "Code" {
                if code.is_some() {
                    return Err(malformed_error!("Method {}{} has two Code attributes", name, descriptor));
                }
                code = Some(decoder::decode(&pool, attribute.data, options)?);
            } else if let Some(decoded) = decode_attribute(&pool, attribute, options)? {
                attributes.push(decoded);
            }
        }

        methods.push(MethodDecl {
            name,
            descriptor,
            flags: raw.flags,
            code,
            attributes,
        });
    }

    let mut attributes = Vec::new();
    for attribute in &raw_attributes {
        if pool.utf8(attribute.name)? == "BootstrapMethods" {
            continue;
        }
        if let Some(decoded) = decode_attribute(&pool, attribute, options)? {
            attributes.push(decoded);
        }
    }

    let header = ClassHeader {
        minor_version,
        major_version,
        flags,
        this_symbol,
        super_symbol,
        interfaces,
    };
    Ok(Container::from_parts(
        header,
        fields,
        methods,
        attributes,
        Some(pool),
    ))
}

fn decode_attribute(
    pool: &Arc<ConstantPool>,
    raw: &RawAttribute,
    options: &ReadOptions,
) -> Result<Option<Attribute>> {
    let name = pool.utf8(raw.name)?;
    let mut parser = Parser::new(raw.data);

    let attribute = match name {
        "Signature" => Attribute::Signature(pool.utf8(parser.read_be()?)?.to_string()),
        "SourceFile" => {
            if !options.keep_debug_info {
                return Ok(None);
            }
            Attribute::SourceFile(pool.utf8(parser.read_be()?)?.to_string())
        }
        "ConstantValue" => Attribute::ConstantValue(pool.loadable(parser.read_be()?)?),
        "Exceptions" => {
            let count = parser.read_be::<u16>()?;
            let mut exceptions = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                exceptions.push(pool.class(parser.read_be()?)?);
            }
            Attribute::Exceptions(exceptions)
        }
        "Deprecated" => Attribute::Deprecated,
        "Synthetic" => Attribute::Synthetic,
        "InnerClasses" => {
            let count = parser.read_be::<u16>()?;
            let mut classes = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                let inner = pool.class(parser.read_be()?)?;
                let outer = pool.optional_class(parser.read_be()?)?;
                let name_index = parser.read_be::<u16>()?;
                let name = if name_index == 0 {
                    None
                } else {
                    Some(pool.utf8(name_index)?.to_string())
                };
                classes.push(InnerClass {
                    inner,
                    outer,
                    name,
                    flags: AccessFlags::from_bits_retain(parser.read_be()?),
                });
            }
            Attribute::InnerClasses(classes)
        }
        "EnclosingMethod" => {
            let class = pool.class(parser.read_be()?)?;
            let method_index = parser.read_be::<u16>()?;
            let method = if method_index == 0 {
                None
            } else {
                let (name, descriptor) = pool.name_and_type(method_index)?;
                Some((name.to_string(), descriptor.to_string()))
            };
            Attribute::EnclosingMethod { class, method }
        }
        "NestHost" => Attribute::NestHost(pool.class(parser.read_be()?)?),
        "NestMembers" => {
            let count = parser.read_be::<u16>()?;
            let mut members = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                members.push(pool.class(parser.read_be()?)?);
            }
            Attribute::NestMembers(members)
        }
        other => {
            if !options.keep_unknown_attributes {
                trace!("skipping attribute {other}");
                return Ok(None);
            }
            return Ok(Some(Attribute::Unknown(UnknownAttribute::new(
                other.to_string(),
                raw.data,
                pool.clone(),
            ))));
        }
    };

    if parser.has_more_data() {
        return Err(malformed_error!("Attribute {} has {} extra bytes", name, parser.remaining()));
    }
    Ok(Some(attribute))
}
