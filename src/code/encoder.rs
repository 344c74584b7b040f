//! `Code` attribute encoding.
//!
//! Encoding resolves labels to offsets and picks the shortest encoding of every
//! instruction. Branches start out in their 16-bit form; a layout pass computes offsets and
//! widens every branch whose displacement does not fit, and the pass repeats until no
//! branch changes. Widening only ever grows the code, so the loop terminates.
//!
//! A widened `goto` or `jsr` becomes `goto_w` or `jsr_w`. A widened conditional branch
//! becomes the inverted condition jumping over a `goto_w` to the original target.

use std::collections::hash_map::Entry;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    classfile::{constpool::ConstantPoolBuilder, descriptor::MethodDescriptor},
    code::{
        body::CodeBody,
        decoder::MAX_CODE_LENGTH,
        instruction::{CodeElement, Constant, Instruction, Label, LocalVariable},
        opcodes::*,
    },
    file::io::{write_attribute, write_be, write_u16_len},
    Error, Result,
};

/// Check that every label is marked once and every referenced label is marked.
///
/// # Errors
/// Returns [`Error::DuplicateLabel`] or [`Error::UnresolvedLabel`].
pub fn validate_labels(elements: &[CodeElement]) -> Result<()> {
    let mut marks = FxHashSet::default();
    for element in elements {
        if let CodeElement::Label(label) = element {
            if !marks.insert(*label) {
                return Err(Error::DuplicateLabel(*label));
            }
        }
    }
    for element in elements {
        if let Some(label) = element
            .referenced_labels()
            .into_iter()
            .find(|label| !marks.contains(label))
        {
            return Err(Error::UnresolvedLabel(label));
        }
    }
    Ok(())
}

fn short_int(value: i32) -> bool {
    i16::try_from(value).is_ok()
}

fn float_shortcut(value: f32) -> Option<u8> {
    match value.to_bits() {
        bits if bits == 0f32.to_bits() => Some(FCONST_0),
        bits if bits == 1f32.to_bits() => Some(FCONST_1),
        bits if bits == 2f32.to_bits() => Some(FCONST_2),
        _ => None,
    }
}

fn double_shortcut(value: f64) -> Option<u8> {
    match value.to_bits() {
        bits if bits == 0f64.to_bits() => Some(DCONST_0),
        bits if bits == 1f64.to_bits() => Some(DCONST_1),
        _ => None,
    }
}

/// Whether `constant` is pushed without a constant pool entry.
fn inline_constant(constant: &Constant) -> bool {
    match constant {
        Constant::Int(value) => short_int(*value),
        Constant::Long(value) => *value == 0 || *value == 1,
        Constant::Float(value) => float_shortcut(*value).is_some(),
        Constant::Double(value) => double_shortcut(*value).is_some(),
        _ => false,
    }
}

/// Intern the constant pool operand of `instruction`, `0` if it has none.
fn intern(instruction: &Instruction, pool: &mut ConstantPoolBuilder) -> Result<u16> {
    match instruction {
        Instruction::Constant(constant) if !inline_constant(constant) => pool.constant(constant),
        Instruction::Field { field, .. } => pool.field_ref(field),
        Instruction::Invoke {
            method, interface, ..
        } => pool.method_ref(method, *interface),
        Instruction::InvokeDynamic(call_site) => pool.invoke_dynamic(call_site),
        Instruction::Type { symbol, .. } | Instruction::MultiNewArray { symbol, .. } => {
            pool.class(symbol)
        }
        _ => Ok(0),
    }
}

fn padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

fn size(instruction: &Instruction, offset: usize, index: u16, wide: bool) -> Result<usize> {
    Ok(match instruction {
        Instruction::Operation(_) | Instruction::Return(_) => 1,
        Instruction::Constant(constant) => match constant {
            Constant::Int(value) if (-1..=5).contains(value) => 1,
            Constant::Int(value) if i8::try_from(*value).is_ok() => 2,
            Constant::Int(value) if short_int(*value) => 3,
            Constant::Long(_) | Constant::Float(_) | Constant::Double(_)
                if inline_constant(constant) =>
            {
                1
            }
            other if other.kind().is_wide() => 3,
            _ if index <= 0xFF => 2,
            _ => 3,
        },
        Instruction::Load { slot, .. } | Instruction::Store { slot, .. } => match *slot {
            0..=3 => 1,
            4..=0xFF => 2,
            _ => 4,
        },
        Instruction::Increment { slot, delta } => {
            if *slot <= 0xFF && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Instruction::Ret { slot } => {
            if *slot <= 0xFF {
                2
            } else {
                4
            }
        }
        Instruction::Branch { opcode, .. } => match (wide, is_conditional_branch(*opcode)) {
            (false, _) => 3,
            (true, false) => 5,
            (true, true) => 8,
        },
        Instruction::TableSwitch { targets, .. } => 1 + padding(offset) + 12 + 4 * targets.len(),
        Instruction::LookupSwitch { pairs, .. } => 1 + padding(offset) + 8 + 8 * pairs.len(),
        Instruction::Field { .. } | Instruction::Type { .. } => 3,
        Instruction::Invoke { opcode, .. } => {
            if *opcode == INVOKEINTERFACE {
                5
            } else {
                3
            }
        }
        Instruction::InvokeDynamic(_) => 5,
        Instruction::NewPrimitiveArray(_) => 2,
        Instruction::MultiNewArray { .. } => 4,
    })
}

fn validate(instruction: &Instruction) -> Result<()> {
    match instruction {
        Instruction::Operation(opcode) if !is_simple(*opcode) => Err(malformed_error!(
            "Opcode {} cannot be encoded as a plain operation",
            mnemonic(*opcode)
        )),
        Instruction::Branch { opcode, .. } if !is_branch(*opcode) => Err(malformed_error!(
            "Opcode {} is not a branch",
            mnemonic(*opcode)
        )),
        Instruction::TableSwitch {
            low, high, targets, ..
        } => {
            let expected = i64::from(*high) - i64::from(*low) + 1;
            if expected < 1 || usize::try_from(expected).ok() != Some(targets.len()) {
                return Err(malformed_error!(
                    "tableswitch {}..{} has {} targets",
                    low,
                    high,
                    targets.len()
                ));
            }
            Ok(())
        }
        Instruction::LookupSwitch { pairs, .. } => {
            let mut keys = FxHashSet::default();
            match pairs.iter().find(|(key, _)| !keys.insert(*key)) {
                Some((key, _)) => Err(malformed_error!("lookupswitch has duplicate key {}", key)),
                None => Ok(()),
            }
        }
        Instruction::Field { opcode, .. } if !(GETSTATIC..=PUTFIELD).contains(opcode) => Err(
            malformed_error!("Opcode {} is not a field access", mnemonic(*opcode)),
        ),
        Instruction::Invoke { opcode, .. } if !(INVOKEVIRTUAL..=INVOKEINTERFACE).contains(opcode) => {
            Err(malformed_error!("Opcode {} is not an invocation", mnemonic(*opcode)))
        }
        Instruction::Type { opcode, .. }
            if !matches!(*opcode, NEW | ANEWARRAY | CHECKCAST | INSTANCEOF) =>
        {
            Err(malformed_error!("Opcode {} takes no type operand", mnemonic(*opcode)))
        }
        Instruction::NewPrimitiveArray(kind) if kind.array_type_code().is_none() => Err(
            malformed_error!("newarray of {} is not a primitive array", kind.name()),
        ),
        Instruction::MultiNewArray { dimensions: 0, .. } => {
            Err(malformed_error!("multianewarray with zero dimensions"))
        }
        _ => Ok(()),
    }
}

struct Layout {
    /// Start offset of each element; pseudo elements get the offset of the next instruction.
    offsets: Vec<usize>,
    labels: FxHashMap<Label, usize>,
    length: usize,
}

fn layout(
    elements: &[CodeElement],
    indices: &[u16],
    wide: &[bool],
) -> Result<Layout> {
    let mut offsets = Vec::with_capacity(elements.len());
    let mut labels = FxHashMap::default();
    let mut offset = 0usize;
    for (position, element) in elements.iter().enumerate() {
        offsets.push(offset);
        match element {
            CodeElement::Instruction(instruction) => {
                offset += size(instruction, offset, indices[position], wide[position])?;
            }
            CodeElement::Label(label) => {
                if let Entry::Vacant(entry) = labels.entry(*label) {
                    entry.insert(offset);
                } else {
                    return Err(Error::DuplicateLabel(*label));
                }
            }
            _ => {}
        }
    }
    Ok(Layout {
        offsets,
        labels,
        length: offset,
    })
}

impl Layout {
    fn offset_of(&self, label: Label) -> Result<usize> {
        self.labels
            .get(&label)
            .copied()
            .ok_or(Error::UnresolvedLabel(label))
    }

    fn displacement(&self, from: usize, label: Label) -> Result<i32> {
        let to = self.offset_of(label)?;
        let delta = i64::try_from(to).map_err(|_| Error::OutOfBounds)?
            - i64::try_from(from).map_err(|_| Error::OutOfBounds)?;
        i32::try_from(delta).map_err(|_| Error::InvalidBranch(format!("{from} -> {to}")))
    }
}

fn local_opcode(base: u8, short_base: u8, slot: u16, out: &mut Vec<u8>, opcode: u8) {
    let kind_index = opcode - base;
    match slot {
        0..=3 => out.push(short_base + kind_index * 4 + slot as u8),
        4..=0xFF => {
            out.push(opcode);
            out.push(slot as u8);
        }
        _ => {
            out.push(WIDE);
            out.push(opcode);
            write_be(out, slot);
        }
    }
}

fn emit(
    out: &mut Vec<u8>,
    instruction: &Instruction,
    at: usize,
    index: u16,
    wide: bool,
    layout: &Layout,
) -> Result<()> {
    match instruction {
        Instruction::Operation(opcode) => out.push(*opcode),
        Instruction::Constant(constant) => match constant {
            Constant::Int(value) if (-1..=5).contains(value) => {
                out.push((ICONST_0 as i32 + *value) as u8);
            }
            Constant::Int(value) if i8::try_from(*value).is_ok() => {
                out.push(BIPUSH);
                out.push(*value as i8 as u8);
            }
            Constant::Int(value) if short_int(*value) => {
                out.push(SIPUSH);
                write_be(out, *value as i16);
            }
            Constant::Long(value) if *value == 0 || *value == 1 => {
                out.push(LCONST_0 + *value as u8);
            }
            Constant::Float(value) if float_shortcut(*value).is_some() => {
                out.extend(float_shortcut(*value));
            }
            Constant::Double(value) if double_shortcut(*value).is_some() => {
                out.extend(double_shortcut(*value));
            }
            other if other.kind().is_wide() => {
                out.push(LDC2_W);
                write_be(out, index);
            }
            _ if index <= 0xFF => {
                out.push(LDC);
                out.push(index as u8);
            }
            _ => {
                out.push(LDC_W);
                write_be(out, index);
            }
        },
        Instruction::Load { slot, .. } => {
            local_opcode(ILOAD, ILOAD_0, *slot, out, instruction.opcode());
        }
        Instruction::Store { slot, .. } => {
            local_opcode(ISTORE, ISTORE_0, *slot, out, instruction.opcode());
        }
        Instruction::Increment { slot, delta } => {
            if *slot <= 0xFF && i8::try_from(*delta).is_ok() {
                out.push(IINC);
                out.push(*slot as u8);
                out.push(*delta as i8 as u8);
            } else {
                out.push(WIDE);
                out.push(IINC);
                write_be(out, *slot);
                write_be(out, *delta);
            }
        }
        Instruction::Ret { slot } => {
            if *slot <= 0xFF {
                out.push(RET);
                out.push(*slot as u8);
            } else {
                out.push(WIDE);
                out.push(RET);
                write_be(out, *slot);
            }
        }
        Instruction::Branch { opcode, target } => {
            if !wide {
                let displacement = layout.displacement(at, *target)?;
                let displacement = i16::try_from(displacement)
                    .map_err(|_| Error::InvalidBranch(format!("{displacement} at {at}")))?;
                out.push(*opcode);
                write_be(out, displacement);
            } else if let Some(inverted) = invert_branch(*opcode) {
                out.push(inverted);
                write_be(out, 8i16);
                out.push(GOTO_W);
                write_be(out, layout.displacement(at + 3, *target)?);
            } else {
                out.push(if *opcode == JSR { JSR_W } else { GOTO_W });
                write_be(out, layout.displacement(at, *target)?);
            }
        }
        Instruction::TableSwitch {
            low,
            high,
            default,
            targets,
        } => {
            out.push(TABLESWITCH);
            out.extend(std::iter::repeat(0).take(padding(at)));
            write_be(out, layout.displacement(at, *default)?);
            write_be(out, *low);
            write_be(out, *high);
            for target in targets {
                write_be(out, layout.displacement(at, *target)?);
            }
        }
        Instruction::LookupSwitch { default, pairs } => {
            out.push(LOOKUPSWITCH);
            out.extend(std::iter::repeat(0).take(padding(at)));
            write_be(out, layout.displacement(at, *default)?);
            let count = i32::try_from(pairs.len())
                .map_err(|_| Error::LimitExceeded("lookupswitch pairs".to_string()))?;
            write_be(out, count);
            let mut sorted: Vec<&(i32, Label)> = pairs.iter().collect();
            sorted.sort_by_key(|(key, _)| *key);
            for (key, target) in sorted {
                write_be(out, *key);
                write_be(out, layout.displacement(at, *target)?);
            }
        }
        Instruction::Return(_) => out.push(instruction.opcode()),
        Instruction::Field { opcode, .. } | Instruction::Type { opcode, .. } => {
            out.push(*opcode);
            write_be(out, index);
        }
        Instruction::Invoke { opcode, method, .. } => {
            out.push(*opcode);
            write_be(out, index);
            if *opcode == INVOKEINTERFACE {
                let count = MethodDescriptor::parse(&method.descriptor)?.param_slots() + 1;
                let count = u8::try_from(count).map_err(|_| {
                    Error::LimitExceeded(format!("invokeinterface {method} argument words"))
                })?;
                out.push(count);
                out.push(0);
            }
        }
        Instruction::InvokeDynamic(_) => {
            out.push(INVOKEDYNAMIC);
            write_be(out, index);
            write_be(out, 0u16);
        }
        Instruction::NewPrimitiveArray(kind) => {
            out.push(NEWARRAY);
            out.extend(kind.array_type_code());
        }
        Instruction::MultiNewArray { dimensions, .. } => {
            out.push(MULTIANEWARRAY);
            write_be(out, index);
            out.push(*dimensions);
        }
    }
    Ok(())
}

fn local_table(
    locals: &[&LocalVariable],
    layout: &Layout,
    pool: &mut ConstantPoolBuilder,
) -> Result<Vec<u8>> {
    let mut table = Vec::new();
    write_u16_len(&mut table, locals.len(), "local variable")?;
    for local in locals {
        let start = layout.offset_of(local.start)?;
        let end = layout.offset_of(local.end)?;
        let length = end
            .checked_sub(start)
            .ok_or_else(|| malformed_error!("Local {} ends before it starts", local.name))?;
        write_be(&mut table, start as u16);
        write_be(&mut table, length as u16);
        write_be(&mut table, pool.utf8(&local.name)?);
        write_be(&mut table, pool.utf8(&local.descriptor)?);
        write_be(&mut table, local.slot);
    }
    Ok(table)
}

/// Encode `body` into the contents of a `Code` attribute, interning operands into `pool`.
///
/// `max_stack` and `max_locals` are taken from the body.
///
/// # Errors
/// Returns an error for unresolved or duplicated labels, inverted exception ranges,
/// malformed instructions, or code longer than 65535 bytes.
pub(crate) fn encode(body: &CodeBody, pool: &mut ConstantPoolBuilder) -> Result<Vec<u8>> {
    let elements = body.elements();
    validate_labels(elements)?;

    let mut indices = Vec::with_capacity(elements.len());
    for element in elements {
        indices.push(match element {
            CodeElement::Instruction(instruction) => {
                validate(instruction)?;
                intern(instruction, pool)?
            }
            _ => 0,
        });
    }

    let mut wide = vec![false; elements.len()];
    let layout = loop {
        let layout = layout(elements, &indices, &wide)?;
        let mut changed = false;
        for (position, element) in elements.iter().enumerate() {
            if let CodeElement::Instruction(Instruction::Branch { target, .. }) = element {
                if wide[position] {
                    continue;
                }
                let displacement = layout.displacement(layout.offsets[position], *target)?;
                if i16::try_from(displacement).is_err() {
                    wide[position] = true;
                    changed = true;
                }
            }
        }
        if !changed {
            break layout;
        }
    };
    if layout.length == 0 {
        return Err(malformed_error!("Code body has no instructions"));
    }
    if layout.length > MAX_CODE_LENGTH {
        return Err(Error::CodeTooLarge(layout.length));
    }

    let mut code = Vec::with_capacity(layout.length);
    for (position, element) in elements.iter().enumerate() {
        if let CodeElement::Instruction(instruction) = element {
            emit(
                &mut code,
                instruction,
                layout.offsets[position],
                indices[position],
                wide[position],
                &layout,
            )?;
        }
    }

    let mut out = Vec::with_capacity(code.len() + 32);
    write_be(&mut out, body.max_stack());
    write_be(&mut out, body.max_locals());
    write_be(&mut out, code.len() as u32);
    out.extend_from_slice(&code);

    let ranges: Vec<_> = elements
        .iter()
        .filter_map(|element| match element {
            CodeElement::ExceptionRange(range) => Some(range),
            _ => None,
        })
        .collect();
    write_u16_len(&mut out, ranges.len(), "exception table")?;
    for range in ranges {
        let start = layout.offset_of(range.start)?;
        let end = layout.offset_of(range.end)?;
        let handler = layout.offset_of(range.handler)?;
        if start >= end || handler >= layout.length {
            return Err(Error::MalformedExceptionRange(format!(
                "[{start}, {end}) -> {handler}"
            )));
        }
        write_be(&mut out, start as u16);
        write_be(&mut out, end as u16);
        write_be(&mut out, handler as u16);
        let catch = match &range.catch_type {
            Some(symbol) => pool.class(symbol)?,
            None => 0,
        };
        write_be(&mut out, catch);
    }

    let mut lines = Vec::new();
    let mut locals = Vec::new();
    let mut local_types = Vec::new();
    for (position, element) in elements.iter().enumerate() {
        match element {
            CodeElement::LineNumber(line) if layout.offsets[position] < layout.length => {
                lines.push((layout.offsets[position] as u16, *line));
            }
            CodeElement::LocalVariable(local) => locals.push(local),
            CodeElement::LocalVariableType(local) => local_types.push(local),
            _ => {}
        }
    }

    let mut attributes: Vec<(u16, Vec<u8>)> = Vec::new();
    if !lines.is_empty() {
        let mut table = Vec::with_capacity(2 + lines.len() * 4);
        write_u16_len(&mut table, lines.len(), "line number")?;
        for (pc, line) in lines {
            write_be(&mut table, pc);
            write_be(&mut table, line);
        }
        attributes.push((pool.utf8("LineNumberTable")?, table));
    }
    if !locals.is_empty() {
        let table = local_table(&locals, &layout, pool)?;
        attributes.push((pool.utf8("LocalVariableTable")?, table));
    }
    if !local_types.is_empty() {
        let table = local_table(&local_types, &layout, pool)?;
        attributes.push((pool.utf8("LocalVariableTypeTable")?, table));
    }
    write_u16_len(&mut out, attributes.len(), "code attribute")?;
    for (name, table) in attributes {
        write_attribute(&mut out, name, &table)?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{constpool::ConstantPool, descriptor::TypeKind, ReadOptions},
        code::{decoder::decode, instruction::next_scope},
        file::parser::Parser,
    };

    fn body(elements: Vec<CodeElement>, max_locals: u16) -> CodeBody {
        CodeBody::from_parts(next_scope(), 0, elements, 4, max_locals)
    }

    fn code_bytes(encoded: &[u8]) -> &[u8] {
        let len = u32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]) as usize;
        &encoded[8..8 + len]
    }

    fn insn(instruction: Instruction) -> CodeElement {
        CodeElement::Instruction(instruction)
    }

    #[test]
    fn shortest_forms() -> Result<()> {
        let mut pool = ConstantPoolBuilder::new();
        let encoded = encode(
            &body(
                vec![
                    insn(Instruction::Constant(Constant::Int(5))),
                    insn(Instruction::Constant(Constant::Int(-100))),
                    insn(Instruction::Constant(Constant::Int(1000))),
                    insn(Instruction::Load { kind: TypeKind::Int, slot: 2 }),
                    insn(Instruction::Load { kind: TypeKind::Reference, slot: 7 }),
                    insn(Instruction::Store { kind: TypeKind::Long, slot: 300 }),
                    insn(Instruction::Increment { slot: 1, delta: 200 }),
                    insn(Instruction::Return(TypeKind::Void)),
                ],
                302,
            ),
            &mut pool,
        )?;
        assert_eq!(
            code_bytes(&encoded),
            &[
                ICONST_5,
                BIPUSH, 0x9C,
                SIPUSH, 0x03, 0xE8,
                ILOAD_2,
                ALOAD, 7,
                WIDE, LSTORE, 0x01, 0x2C,
                WIDE, IINC, 0x00, 0x01, 0x00, 0xC8,
                RETURN,
            ][..]
        );
        Ok(())
    }

    #[test]
    fn large_int_uses_pool() -> Result<()> {
        let mut pool = ConstantPoolBuilder::new();
        let encoded = encode(
            &body(
                vec![
                    insn(Instruction::Constant(Constant::Int(100_000))),
                    insn(Instruction::Constant(Constant::Long(2))),
                    insn(Instruction::Return(TypeKind::Void)),
                ],
                0,
            ),
            &mut pool,
        )?;
        let code = code_bytes(&encoded);
        assert_eq!(code[0], LDC);
        assert_eq!(code[2], LDC2_W);
        assert_eq!(pool.len(), 4);
        Ok(())
    }

    #[test]
    fn far_branches_are_widened() -> Result<()> {
        let scope = next_scope();
        let far = Label::new(scope, 0);
        let mut elements = vec![
            insn(Instruction::Load { kind: TypeKind::Int, slot: 0 }),
            insn(Instruction::Branch { opcode: IFEQ, target: far }),
        ];
        elements.extend((0..40_000).map(|_| insn(Instruction::Operation(NOP))));
        elements.push(CodeElement::Label(far));
        elements.push(insn(Instruction::Return(TypeKind::Void)));

        let mut pool = ConstantPoolBuilder::new();
        let encoded = encode(&body(elements, 1), &mut pool)?;
        let code = code_bytes(&encoded);
        assert_eq!(code[1], IFNE);
        assert_eq!(&code[2..4], &[0, 8]);
        assert_eq!(code[4], GOTO_W);
        assert_eq!(i32::from_be_bytes([code[5], code[6], code[7], code[8]]), 40_005);
        assert_eq!(code.len(), 1 + 8 + 40_000 + 1);
        Ok(())
    }

    #[test]
    fn switch_padding_and_sorting() -> Result<()> {
        let scope = next_scope();
        let (a, b) = (Label::new(scope, 0), Label::new(scope, 1));
        let elements = vec![
            insn(Instruction::Load { kind: TypeKind::Int, slot: 0 }),
            insn(Instruction::LookupSwitch {
                default: a,
                pairs: vec![(9, b), (-3, a)],
            }),
            CodeElement::Label(a),
            CodeElement::Label(b),
            insn(Instruction::Return(TypeKind::Void)),
        ];
        let mut pool = ConstantPoolBuilder::new();
        let encoded = encode(&body(elements, 1), &mut pool)?;
        let code = code_bytes(&encoded);
        // offset 1, padded to 4
        assert_eq!(&code[1..4], &[LOOKUPSWITCH, 0, 0]);
        assert_eq!(i32::from_be_bytes([code[12], code[13], code[14], code[15]]), -3);
        assert_eq!(code.len(), 4 + 8 + 16 + 1);
        Ok(())
    }

    #[test]
    fn duplicate_switch_keys_rejected() {
        let label = Label::new(next_scope(), 0);
        let elements = vec![
            insn(Instruction::Load { kind: TypeKind::Int, slot: 0 }),
            insn(Instruction::LookupSwitch {
                default: label,
                pairs: vec![(1, label), (1, label)],
            }),
            CodeElement::Label(label),
            insn(Instruction::Return(TypeKind::Void)),
        ];
        let mut pool = ConstantPoolBuilder::new();
        assert!(matches!(
            encode(&body(elements, 1), &mut pool),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn label_errors() {
        let scope = next_scope();
        let label = Label::new(scope, 0);
        let mut pool = ConstantPoolBuilder::new();

        let unresolved = vec![insn(Instruction::Branch { opcode: GOTO, target: label })];
        assert!(matches!(
            encode(&body(unresolved, 0), &mut pool),
            Err(Error::UnresolvedLabel(l)) if l == label
        ));

        let duplicated = vec![
            CodeElement::Label(label),
            insn(Instruction::Operation(NOP)),
            CodeElement::Label(label),
            insn(Instruction::Return(TypeKind::Void)),
        ];
        assert!(matches!(
            encode(&body(duplicated, 0), &mut pool),
            Err(Error::DuplicateLabel(l)) if l == label
        ));
    }

    #[test]
    fn empty_exception_range_rejected() {
        let scope = next_scope();
        let (start, handler) = (Label::new(scope, 0), Label::new(scope, 1));
        let elements = vec![
            CodeElement::ExceptionRange(crate::code::instruction::ExceptionRange {
                start,
                end: start,
                handler,
                catch_type: None,
            }),
            CodeElement::Label(start),
            CodeElement::Label(handler),
            insn(Instruction::Return(TypeKind::Void)),
        ];
        let mut pool = ConstantPoolBuilder::new();
        assert!(matches!(
            encode(&body(elements, 0), &mut pool),
            Err(Error::MalformedExceptionRange(_))
        ));
    }

    #[test]
    fn decode_reads_what_encode_writes() -> Result<()> {
        let scope = next_scope();
        let (top, done) = (Label::new(scope, 0), Label::new(scope, 1));
        let elements = vec![
            CodeElement::Label(top),
            CodeElement::LineNumber(12),
            insn(Instruction::Load { kind: TypeKind::Int, slot: 0 }),
            insn(Instruction::Branch { opcode: IFLE, target: done }),
            insn(Instruction::Increment { slot: 0, delta: -1 }),
            insn(Instruction::Branch { opcode: GOTO, target: top }),
            CodeElement::Label(done),
            insn(Instruction::Return(TypeKind::Void)),
        ];
        let mut builder = ConstantPoolBuilder::new();
        let encoded = encode(&body(elements, 1), &mut builder)?;

        let mut pool_bytes = Vec::new();
        builder.write(&mut pool_bytes)?;
        let pool = ConstantPool::parse(&mut Parser::new(&pool_bytes))?;
        let decoded = decode(&pool, &encoded, &ReadOptions::default())?;

        let instructions: Vec<_> = decoded.instructions().cloned().collect();
        assert_eq!(instructions.len(), 5);
        assert!(matches!(
            instructions[3],
            Instruction::Branch { opcode: GOTO, target } if decoded.labels().next() == Some(target)
        ));
        assert!(decoded
            .elements()
            .iter()
            .any(|element| *element == CodeElement::LineNumber(12)));
        Ok(())
    }
}
