//! Class file serialization.
//!
//! Members are serialized into a body buffer first, interning constants as they are met.
//! The constant pool is emitted last but placed in front of the body, followed by the
//! regenerated `BootstrapMethods` attribute as the final class attribute.

use std::sync::Arc;

use log::warn;

use crate::{
    classfile::{
        attribute::Attribute,
        constpool::{ConstantPool, ConstantPoolBuilder},
        container::Container,
        reader::MAGIC,
    },
    code::encoder,
    file::io::{write_attribute, write_be, write_u16_len},
    Result,
};

pub(crate) fn write(container: &Container) -> Result<Vec<u8>> {
    let origin = container.constant_pool();
    let mut pool = match origin {
        Some(source) => ConstantPoolBuilder::seeded(source),
        None => ConstantPoolBuilder::new(),
    };

    let header = container.header();
    let mut body = Vec::new();
    write_be(&mut body, header.flags.bits());
    write_be(&mut body, pool.class(&header.this_symbol)?);
    let super_index = match &header.super_symbol {
        Some(symbol) => pool.class(symbol)?,
        None => 0,
    };
    write_be(&mut body, super_index);
    write_u16_len(&mut body, header.interfaces.len(), "interface")?;
    for interface in &header.interfaces {
        write_be(&mut body, pool.class(interface)?);
    }

    write_u16_len(&mut body, container.fields().len(), "field")?;
    for field in container.fields() {
        write_be(&mut body, field.flags.bits());
        write_be(&mut body, pool.utf8(&field.name)?);
        write_be(&mut body, pool.utf8(&field.descriptor)?);
        write_attributes(&mut body, &mut pool, &field.attributes, origin, None)?;
    }

    write_u16_len(&mut body, container.methods().len(), "method")?;
    for method in container.methods() {
        write_be(&mut body, method.flags.bits());
        write_be(&mut body, pool.utf8(&method.name)?);
        write_be(&mut body, pool.utf8(&method.descriptor)?);

        let code = match &method.code {
            Some(code) => Some(encoder::encode(code, &mut pool)?),
            None => None,
        };
        write_attributes(&mut body, &mut pool, &method.attributes, origin, code)?;
    }

    let mut class_attributes = Vec::new();
    let mut count = 0usize;
    for attribute in container.attributes() {
        if write_one(&mut class_attributes, &mut pool, attribute, origin)? {
            count += 1;
        }
    }
    if !pool.bootstrap_methods().is_empty() {
        let mut table = Vec::new();
        write_u16_len(&mut table, pool.bootstrap_methods().len(), "bootstrap method")?;
        for method in pool.bootstrap_methods() {
            write_be(&mut table, method.handle);
            write_u16_len(&mut table, method.arguments.len(), "bootstrap argument")?;
            for argument in &method.arguments {
                write_be(&mut table, *argument);
            }
        }
        let name = pool.utf8("BootstrapMethods")?;
        write_attribute(&mut class_attributes, name, &table)?;
        count += 1;
    }
    write_u16_len(&mut body, count, "class attribute")?;
    body.extend_from_slice(&class_attributes);

    let mut out = Vec::with_capacity(body.len() + pool.len() * 8 + 10);
    write_be(&mut out, MAGIC);
    write_be(&mut out, header.minor_version);
    write_be(&mut out, header.major_version);
    pool.write(&mut out)?;
    out.extend_from_slice(&body);
    Ok(out)
}

fn write_attributes(
    out: &mut Vec<u8>,
    pool: &mut ConstantPoolBuilder,
    attributes: &[Attribute],
    origin: Option<&Arc<ConstantPool>>,
    code: Option<Vec<u8>>,
) -> Result<()> {
    let mut buffer = Vec::new();
    let mut count = 0usize;

    if let Some(code) = code {
        let name = pool.utf8("Code")?;
        write_attribute(&mut buffer, name, &code)?;
        count += 1;
    }
    for attribute in attributes {
        if write_one(&mut buffer, pool, attribute, origin)? {
            count += 1;
        }
    }

    write_u16_len(out, count, "attribute")?;
    out.extend_from_slice(&buffer);
    Ok(())
}

fn write_one(
    out: &mut Vec<u8>,
    pool: &mut ConstantPoolBuilder,
    attribute: &Attribute,
    origin: Option<&Arc<ConstantPool>>,
) -> Result<bool> {
    let mut data = Vec::new();
    match attribute {
        Attribute::Signature(value) | Attribute::SourceFile(value) => {
            write_be(&mut data, pool.utf8(value)?);
        }
        Attribute::ConstantValue(constant) => write_be(&mut data, pool.constant(constant)?),
        Attribute::Exceptions(classes) | Attribute::NestMembers(classes) => {
            write_u16_len(&mut data, classes.len(), "class")?;
            for class in classes {
                write_be(&mut data, pool.class(class)?);
            }
        }
        Attribute::Deprecated | Attribute::Synthetic => {}
        Attribute::InnerClasses(classes) => {
            write_u16_len(&mut data, classes.len(), "inner class")?;
            for class in classes {
                write_be(&mut data, pool.class(&class.inner)?);
                let outer = match &class.outer {
                    Some(outer) => pool.class(outer)?,
                    None => 0,
                };
                write_be(&mut data, outer);
                let name = match &class.name {
                    Some(name) => pool.utf8(name)?,
                    None => 0,
                };
                write_be(&mut data, name);
                write_be(&mut data, class.flags.bits());
            }
        }
        Attribute::EnclosingMethod { class, method } => {
            write_be(&mut data, pool.class(class)?);
            let method = match method {
                Some((name, descriptor)) => pool.name_and_type(name, descriptor)?,
                None => 0,
            };
            write_be(&mut data, method);
        }
        Attribute::NestHost(host) => write_be(&mut data, pool.class(host)?),
        Attribute::Unknown(unknown) => {
            if !origin.is_some_and(|source| unknown.is_from(source)) {
                warn!(
                    "dropping attribute {} read from a different constant pool",
                    unknown.name()
                );
                return Ok(false);
            }
            data.extend_from_slice(unknown.data());
        }
    }

    let name = pool.utf8(attribute.name())?;
    write_attribute(out, name, &data)?;
    Ok(true)
}
