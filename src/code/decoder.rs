//! `Code` attribute decoding.
//!
//! Decoding is two passes. The first walks the code array and records every instruction
//! with its branch targets as absolute offsets. The second assigns a label to every offset
//! referenced by a branch, an exception range or a debug table, and emits the element
//! stream: exception ranges and local variable entries first, then for each instruction
//! its label mark and line number followed by the instruction itself.

use log::debug;
use rustc_hash::FxHashMap;

use crate::{
    classfile::{
        constpool::ConstantPool, descriptor::TypeKind, reader::read_attributes, ReadOptions,
    },
    code::{
        body::CodeBody,
        instruction::{next_scope, CodeElement, Constant, ExceptionRange, Instruction, Label, LocalVariable},
        opcodes::*,
    },
    file::parser::Parser,
    Error, Result,
};

/// Largest code array the format allows.
pub const MAX_CODE_LENGTH: usize = 65535;

enum Decoded {
    Ready(Instruction),
    Branch {
        opcode: u8,
        target: usize,
    },
    Table {
        low: i32,
        high: i32,
        default: usize,
        targets: Vec<usize>,
    },
    Lookup {
        default: usize,
        pairs: Vec<(i32, usize)>,
    },
}

struct Labels {
    scope: u32,
    by_offset: FxHashMap<usize, Label>,
    boundaries: Vec<bool>,
}

impl Labels {
    fn at(&mut self, offset: usize) -> Result<Label> {
        if !self.boundaries.get(offset).copied().unwrap_or(false) {
            return Err(malformed_error!(
                "Offset {} is not an instruction boundary",
                offset
            ));
        }
        let next = u32::try_from(self.by_offset.len())
            .map_err(|_| Error::LimitExceeded("too many labels".to_string()))?;
        let scope = self.scope;
        Ok(*self
            .by_offset
            .entry(offset)
            .or_insert_with(|| Label::new(scope, next)))
    }
}

fn relative(base: usize, displacement: i32, code_len: usize) -> Result<usize> {
    let target = i64::try_from(base).map_err(|_| Error::OutOfBounds)? + i64::from(displacement);
    usize::try_from(target)
        .ok()
        .filter(|t| *t < code_len)
        .ok_or_else(|| malformed_error!("Branch at {} targets {} outside the code", base, target))
}

fn load(kind: TypeKind, slot: u16) -> Decoded {
    Decoded::Ready(Instruction::Load { kind, slot })
}

fn store(kind: TypeKind, slot: u16) -> Decoded {
    Decoded::Ready(Instruction::Store { kind, slot })
}

fn local_kind(opcode: u8) -> TypeKind {
    match opcode {
        ILOAD | ISTORE => TypeKind::Int,
        LLOAD | LSTORE => TypeKind::Long,
        FLOAD | FSTORE => TypeKind::Float,
        DLOAD | DSTORE => TypeKind::Double,
        _ => TypeKind::Reference,
    }
}

fn decode_instruction(
    pool: &ConstantPool,
    parser: &mut Parser,
    code_len: usize,
) -> Result<Decoded> {
    let offset = parser.pos();
    let opcode = parser.read_be::<u8>()?;

    Ok(match opcode {
        ICONST_M1..=ICONST_5 => {
            Decoded::Ready(Instruction::Constant(Constant::Int(i32::from(opcode) - 3)))
        }
        LCONST_0 | LCONST_1 => Decoded::Ready(Instruction::Constant(Constant::Long(
            i64::from(opcode - LCONST_0),
        ))),
        FCONST_0..=FCONST_2 => Decoded::Ready(Instruction::Constant(Constant::Float(
            f32::from(opcode - FCONST_0),
        ))),
        DCONST_0 | DCONST_1 => Decoded::Ready(Instruction::Constant(Constant::Double(
            f64::from(opcode - DCONST_0),
        ))),
        BIPUSH => Decoded::Ready(Instruction::Constant(Constant::Int(i32::from(
            parser.read_be::<i8>()?,
        )))),
        SIPUSH => Decoded::Ready(Instruction::Constant(Constant::Int(i32::from(
            parser.read_be::<i16>()?,
        )))),
        LDC => Decoded::Ready(Instruction::Constant(
            pool.loadable(u16::from(parser.read_be::<u8>()?))?,
        )),
        LDC_W | LDC2_W => Decoded::Ready(Instruction::Constant(pool.loadable(parser.read_be()?)?)),

        ILOAD | LLOAD | FLOAD | DLOAD | ALOAD => {
            load(local_kind(opcode), u16::from(parser.read_be::<u8>()?))
        }
        ILOAD_0..=ILOAD_3 => load(TypeKind::Int, u16::from(opcode - ILOAD_0)),
        LLOAD_0..=LLOAD_3 => load(TypeKind::Long, u16::from(opcode - LLOAD_0)),
        FLOAD_0..=FLOAD_3 => load(TypeKind::Float, u16::from(opcode - FLOAD_0)),
        DLOAD_0..=DLOAD_3 => load(TypeKind::Double, u16::from(opcode - DLOAD_0)),
        ALOAD_0..=ALOAD_3 => load(TypeKind::Reference, u16::from(opcode - ALOAD_0)),

        ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => {
            store(local_kind(opcode), u16::from(parser.read_be::<u8>()?))
        }
        ISTORE_0..=ISTORE_3 => store(TypeKind::Int, u16::from(opcode - ISTORE_0)),
        LSTORE_0..=LSTORE_3 => store(TypeKind::Long, u16::from(opcode - LSTORE_0)),
        FSTORE_0..=FSTORE_3 => store(TypeKind::Float, u16::from(opcode - FSTORE_0)),
        DSTORE_0..=DSTORE_3 => store(TypeKind::Double, u16::from(opcode - DSTORE_0)),
        ASTORE_0..=ASTORE_3 => store(TypeKind::Reference, u16::from(opcode - ASTORE_0)),

        IINC => Decoded::Ready(Instruction::Increment {
            slot: u16::from(parser.read_be::<u8>()?),
            delta: i16::from(parser.read_be::<i8>()?),
        }),
        RET => Decoded::Ready(Instruction::Ret {
            slot: u16::from(parser.read_be::<u8>()?),
        }),

        IFEQ..=JSR | IFNULL | IFNONNULL => Decoded::Branch {
            opcode,
            target: relative(offset, i32::from(parser.read_be::<i16>()?), code_len)?,
        },
        GOTO_W | JSR_W => Decoded::Branch {
            opcode: if opcode == GOTO_W { GOTO } else { JSR },
            target: relative(offset, parser.read_be::<i32>()?, code_len)?,
        },

        TABLESWITCH => {
            parser.align(4)?;
            let default = relative(offset, parser.read_be()?, code_len)?;
            let low = parser.read_be::<i32>()?;
            let high = parser.read_be::<i32>()?;
            if high < low {
                return Err(malformed_error!("tableswitch at {} has high < low", offset));
            }
            let count = usize::try_from(i64::from(high) - i64::from(low) + 1)
                .map_err(|_| Error::OutOfBounds)?;
            if count > code_len {
                return Err(Error::OutOfBounds);
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(relative(offset, parser.read_be()?, code_len)?);
            }
            Decoded::Table {
                low,
                high,
                default,
                targets,
            }
        }
        LOOKUPSWITCH => {
            parser.align(4)?;
            let default = relative(offset, parser.read_be()?, code_len)?;
            let count = parser.read_be::<i32>()?;
            let count = usize::try_from(count)
                .ok()
                .filter(|c| *c <= code_len)
                .ok_or_else(|| malformed_error!("lookupswitch at {} has invalid npairs", offset))?;
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = parser.read_be::<i32>()?;
                pairs.push((key, relative(offset, parser.read_be()?, code_len)?));
            }
            Decoded::Lookup { default, pairs }
        }

        IRETURN => Decoded::Ready(Instruction::Return(TypeKind::Int)),
        LRETURN => Decoded::Ready(Instruction::Return(TypeKind::Long)),
        FRETURN => Decoded::Ready(Instruction::Return(TypeKind::Float)),
        DRETURN => Decoded::Ready(Instruction::Return(TypeKind::Double)),
        ARETURN => Decoded::Ready(Instruction::Return(TypeKind::Reference)),
        RETURN => Decoded::Ready(Instruction::Return(TypeKind::Void)),

        GETSTATIC..=PUTFIELD => {
            let (field, _) = pool.member_ref(parser.read_be()?)?;
            Decoded::Ready(Instruction::Field { opcode, field })
        }
        INVOKEVIRTUAL..=INVOKESTATIC => {
            let (method, interface) = pool.member_ref(parser.read_be()?)?;
            Decoded::Ready(Instruction::Invoke {
                opcode,
                method,
                interface,
            })
        }
        INVOKEINTERFACE => {
            let (method, _) = pool.member_ref(parser.read_be()?)?;
            parser.advance_by(2)?;
            Decoded::Ready(Instruction::Invoke {
                opcode,
                method,
                interface: true,
            })
        }
        INVOKEDYNAMIC => {
            let call_site = pool.invoke_dynamic(parser.read_be()?)?;
            parser.advance_by(2)?;
            Decoded::Ready(Instruction::InvokeDynamic(call_site))
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Decoded::Ready(Instruction::Type {
            opcode,
            symbol: pool.class(parser.read_be()?)?,
        }),
        NEWARRAY => {
            let code = parser.read_be::<u8>()?;
            let kind = TypeKind::from_array_type_code(code)
                .ok_or_else(|| malformed_error!("Invalid newarray type {} at {}", code, offset))?;
            Decoded::Ready(Instruction::NewPrimitiveArray(kind))
        }
        MULTIANEWARRAY => {
            let symbol = pool.class(parser.read_be()?)?;
            let dimensions = parser.read_be::<u8>()?;
            if dimensions == 0 {
                return Err(malformed_error!("multianewarray at {} with zero dimensions", offset));
            }
            Decoded::Ready(Instruction::MultiNewArray { symbol, dimensions })
        }

        WIDE => {
            let modified = parser.read_be::<u8>()?;
            let slot = parser.read_be::<u16>()?;
            match modified {
                ILOAD | LLOAD | FLOAD | DLOAD | ALOAD => load(local_kind(modified), slot),
                ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => store(local_kind(modified), slot),
                IINC => Decoded::Ready(Instruction::Increment {
                    slot,
                    delta: parser.read_be::<i16>()?,
                }),
                RET => Decoded::Ready(Instruction::Ret { slot }),
                other => {
                    return Err(malformed_error!(
                        "wide at {} modifies unsupported opcode 0x{:02X}",
                        offset,
                        other
                    ))
                }
            }
        }

        other if is_simple(other) => Decoded::Ready(Instruction::Operation(other)),
        other => return Err(Error::UnknownOpcode { opcode: other, offset }),
    })
}

/// Decode the body of a `Code` attribute.
///
/// # Errors
/// Returns an error for unknown opcodes, branches into the middle of instructions,
/// out-of-range pool references and truncated input.
pub(crate) fn decode(pool: &ConstantPool, data: &[u8], options: &ReadOptions) -> Result<CodeBody> {
    let mut parser = Parser::new(data);
    let max_stack = parser.read_be::<u16>()?;
    let max_locals = parser.read_be::<u16>()?;
    let code_len = usize::try_from(parser.read_be::<u32>()?).map_err(|_| Error::OutOfBounds)?;
    if code_len == 0 || code_len > MAX_CODE_LENGTH {
        return Err(malformed_error!("Invalid code length {}", code_len));
    }
    let code = parser.read_bytes(code_len)?;

    let mut instructions = Vec::new();
    let mut boundaries = vec![false; code_len + 1];
    let mut code_parser = Parser::new(code);
    while code_parser.has_more_data() {
        let offset = code_parser.pos();
        boundaries[offset] = true;
        instructions.push((offset, decode_instruction(pool, &mut code_parser, code_len)?));
    }
    boundaries[code_len] = true;

    let mut labels = Labels {
        scope: next_scope(),
        by_offset: FxHashMap::default(),
        boundaries,
    };
    let mut prologue = Vec::new();

    let exception_count = parser.read_be::<u16>()?;
    for _ in 0..exception_count {
        let start = usize::from(parser.read_be::<u16>()?);
        let end = usize::from(parser.read_be::<u16>()?);
        let handler = usize::from(parser.read_be::<u16>()?);
        let catch_type = pool.optional_class(parser.read_be()?)?;
        if start >= end || handler >= code_len {
            return Err(Error::MalformedExceptionRange(format!(
                "[{start}, {end}) -> {handler}"
            )));
        }
        prologue.push(CodeElement::ExceptionRange(ExceptionRange {
            start: labels.at(start)?,
            end: labels.at(end)?,
            handler: labels.at(handler)?,
            catch_type,
        }));
    }

    let mut lines: FxHashMap<usize, Vec<u16>> = FxHashMap::default();
    for attribute in read_attributes(&mut parser)? {
        let name = pool.utf8(attribute.name)?;
        let mut body = Parser::new(attribute.data);
        match name {
            "LineNumberTable" if options.keep_debug_info => {
                let count = body.read_be::<u16>()?;
                for _ in 0..count {
                    let start = usize::from(body.read_be::<u16>()?);
                    let line = body.read_be::<u16>()?;
                    if !labels.boundaries.get(start).copied().unwrap_or(false) || start == code_len {
                        return Err(malformed_error!("Line number entry at invalid offset {}", start));
                    }
                    lines.entry(start).or_default().push(line);
                }
            }
            "LocalVariableTable" | "LocalVariableTypeTable" if options.keep_debug_info => {
                let count = body.read_be::<u16>()?;
                for _ in 0..count {
                    let start = usize::from(body.read_be::<u16>()?);
                    let length = usize::from(body.read_be::<u16>()?);
                    let local_name = pool.utf8(body.read_be()?)?.to_string();
                    let descriptor = pool.utf8(body.read_be()?)?.to_string();
                    let slot = body.read_be::<u16>()?;
                    let local = LocalVariable {
                        slot,
                        name: local_name,
                        descriptor,
                        start: labels.at(start)?,
                        end: labels.at(start + length)?,
                    };
                    prologue.push(if name == "LocalVariableTable" {
                        CodeElement::LocalVariable(local)
                    } else {
                        CodeElement::LocalVariableType(local)
                    });
                }
            }
            "StackMapTable" => debug!("dropping StackMapTable, frames are not maintained"),
            other => debug!("dropping code attribute {other}"),
        }
    }
    if parser.has_more_data() {
        return Err(malformed_error!("Code attribute has {} extra bytes", parser.remaining()));
    }

    let mut resolved = Vec::with_capacity(instructions.len());
    for (offset, decoded) in instructions {
        let instruction = match decoded {
            Decoded::Ready(instruction) => instruction,
            Decoded::Branch { opcode, target } => Instruction::Branch {
                opcode,
                target: labels.at(target)?,
            },
            Decoded::Table {
                low,
                high,
                default,
                targets,
            } => Instruction::TableSwitch {
                low,
                high,
                default: labels.at(default)?,
                targets: targets
                    .into_iter()
                    .map(|t| labels.at(t))
                    .collect::<Result<Vec<_>>>()?,
            },
            Decoded::Lookup { default, pairs } => Instruction::LookupSwitch {
                default: labels.at(default)?,
                pairs: pairs
                    .into_iter()
                    .map(|(key, t)| Ok((key, labels.at(t)?)))
                    .collect::<Result<Vec<_>>>()?,
            },
        };
        resolved.push((offset, instruction));
    }

    let mut elements = prologue;
    elements.reserve(resolved.len() * 2 + 1);
    for (offset, instruction) in resolved {
        if let Some(label) = labels.by_offset.get(&offset) {
            elements.push(CodeElement::Label(*label));
        }
        if let Some(numbers) = lines.get(&offset) {
            elements.extend(numbers.iter().map(|line| CodeElement::LineNumber(*line)));
        }
        elements.push(CodeElement::Instruction(instruction));
    }
    if let Some(label) = labels.by_offset.get(&code_len) {
        elements.push(CodeElement::Label(*label));
    }

    let label_count = u32::try_from(labels.by_offset.len())
        .map_err(|_| Error::LimitExceeded("too many labels".to_string()))?;
    Ok(CodeBody::from_parts(
        labels.scope,
        label_count,
        elements,
        max_stack,
        max_locals,
    ))
}
