//! Static analysis over code element streams.
//!
//! Three passes are provided, all of which work on the symbolic element stream rather than
//! encoded bytes:
//!
//! - [`max_stack`]: a worklist flow analysis computing the deepest operand stack any path
//!   reaches, in words.
//! - [`max_locals`]: the number of local slots the body touches, including the entry
//!   footprint of the method.
//! - [`check_slot_widths`]: rejects instructions that address the upper half of a
//!   category-2 local as an independent slot.

use rustc_hash::FxHashMap;

use crate::{
    classfile::descriptor::{MethodDescriptor, TypeKind},
    code::{
        instruction::{CodeElement, Instruction, Label},
        opcodes::{self, StackEffect},
    },
    Error, Result,
};

/// Upper bound for both `max_stack` and `max_locals`.
pub const MAX_WORDS: u32 = 65535;

fn field_words(descriptor: &str) -> Result<u32> {
    TypeKind::of_descriptor(descriptor)
        .map(|kind| u32::from(kind.slot_size()))
        .ok_or_else(|| Error::InvalidDescriptor(descriptor.to_string()))
}

/// Words popped and pushed by `instruction`.
///
/// # Errors
/// Returns [`Error::InvalidDescriptor`] if a member descriptor operand cannot be parsed.
pub fn stack_effect(instruction: &Instruction) -> Result<(u32, u32)> {
    let words = |kind: &TypeKind| u32::from(kind.slot_size());
    Ok(match instruction {
        Instruction::Constant(constant) => (0, words(&constant.kind())),
        Instruction::Load { kind, .. } => (0, words(kind)),
        Instruction::Store { kind, .. } => (words(kind), 0),
        Instruction::Return(kind) => (words(kind), 0),
        Instruction::Field { opcode, field } => {
            let value = field_words(&field.descriptor)?;
            match *opcode {
                opcodes::GETSTATIC => (0, value),
                opcodes::PUTSTATIC => (value, 0),
                opcodes::GETFIELD => (1, value),
                _ => (1 + value, 0),
            }
        }
        Instruction::Invoke { opcode, method, .. } => {
            let descriptor = MethodDescriptor::parse(&method.descriptor)?;
            let receiver = u32::from(*opcode != opcodes::INVOKESTATIC);
            (
                u32::from(descriptor.param_slots()) + receiver,
                u32::from(descriptor.return_kind().slot_size()),
            )
        }
        Instruction::InvokeDynamic(call_site) => {
            let descriptor = MethodDescriptor::parse(&call_site.descriptor)?;
            (
                u32::from(descriptor.param_slots()),
                u32::from(descriptor.return_kind().slot_size()),
            )
        }
        Instruction::MultiNewArray { dimensions, .. } => (u32::from(*dimensions), 1),
        other => match opcodes::info(other.opcode()).map(|info| info.stack) {
            Some(StackEffect::Fixed { pops, pushes }) => (u32::from(pops), u32::from(pushes)),
            _ => {
                return Err(malformed_error!(
                    "No stack effect for {}",
                    opcodes::mnemonic(other.opcode())
                ))
            }
        },
    })
}

fn label_positions(elements: &[CodeElement]) -> FxHashMap<Label, usize> {
    elements
        .iter()
        .enumerate()
        .filter_map(|(index, element)| match element {
            CodeElement::Label(label) => Some((*label, index)),
            _ => None,
        })
        .collect()
}

/// Compute the maximum operand stack depth of `elements`.
///
/// The analysis starts at the first element with an empty stack and at every exception
/// handler with the caught exception on the stack. A position reached again with a deeper
/// stack is walked again, so the result is the deepest depth of any path.
///
/// # Errors
/// Returns an error on stack underflow, on a branch to a label without a mark, or if the
/// depth exceeds 65535 words.
pub fn max_stack(elements: &[CodeElement]) -> Result<u16> {
    let positions = label_positions(elements);
    let position_of = |label: &Label| {
        positions
            .get(label)
            .copied()
            .ok_or(Error::UnresolvedLabel(*label))
    };

    let mut seen: Vec<Option<u32>> = vec![None; elements.len()];
    let mut pending: Vec<(usize, u32)> = vec![(0, 0)];
    for element in elements {
        if let CodeElement::ExceptionRange(range) = element {
            pending.push((position_of(&range.handler)?, 1));
        }
    }

    let mut deepest = 0u32;
    while let Some((start, depth)) = pending.pop() {
        let mut index = start;
        let mut depth = depth;
        while index < elements.len() {
            if seen[index].is_some_and(|known| known >= depth) {
                break;
            }
            seen[index] = Some(depth);
            deepest = deepest.max(depth);

            let CodeElement::Instruction(instruction) = &elements[index] else {
                index += 1;
                continue;
            };

            let (pops, pushes) = stack_effect(instruction)?;
            let before = depth;
            depth = depth.checked_sub(pops).ok_or_else(|| {
                malformed_error!("Stack underflow at element {} ({})", index, instruction)
            })? + pushes;
            if depth > MAX_WORDS {
                return Err(Error::LimitExceeded(format!("operand stack of {depth} words")));
            }
            deepest = deepest.max(depth);

            for target in instruction.targets() {
                pending.push((position_of(&target)?, depth));
            }
            if instruction.ends_flow() {
                break;
            }
            if let Instruction::Branch {
                opcode: opcodes::JSR,
                ..
            } = instruction
            {
                // The subroutine returns with the address consumed.
                depth = before;
            }
            index += 1;
        }
    }

    u16::try_from(deepest).map_err(|_| Error::LimitExceeded("max_stack".to_string()))
}

/// Compute the number of local slots touched by `elements`, at least `footprint`.
///
/// # Errors
/// Returns [`Error::LimitExceeded`] if a slot reference reaches past slot 65534.
pub fn max_locals(elements: &[CodeElement], footprint: u16) -> Result<u16> {
    let mut limit = u32::from(footprint);
    for element in elements {
        let reach = match element {
            CodeElement::Instruction(
                Instruction::Load { kind, slot } | Instruction::Store { kind, slot },
            ) => u32::from(*slot) + u32::from(kind.slot_size()),
            CodeElement::Instruction(
                Instruction::Increment { slot, .. } | Instruction::Ret { slot },
            ) => u32::from(*slot) + 1,
            CodeElement::LocalVariable(local) => {
                let width = TypeKind::of_descriptor(&local.descriptor)
                    .map_or(1, |kind| kind.slot_size().max(1));
                u32::from(local.slot) + u32::from(width)
            }
            _ => continue,
        };
        limit = limit.max(reach);
    }
    if limit > MAX_WORDS {
        return Err(Error::LimitExceeded(format!("{limit} local slots")));
    }
    u16::try_from(limit).map_err(|_| Error::LimitExceeded("max_locals".to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Narrow,
    WideLow,
    WideHigh,
}

/// The known width of each local at one position. Absent slots are unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SlotMap {
    slots: FxHashMap<u16, Slot>,
}

impl SlotMap {
    fn forget(&mut self, slot: u16) {
        match self.slots.remove(&slot) {
            Some(Slot::WideLow) => {
                if let Some(high) = slot.checked_add(1) {
                    self.slots.remove(&high);
                }
            }
            Some(Slot::WideHigh) => {
                if let Some(low) = slot.checked_sub(1) {
                    self.slots.remove(&low);
                }
            }
            Some(Slot::Narrow) | None => {}
        }
    }

    fn define(&mut self, kind: TypeKind, slot: u16) {
        self.forget(slot);
        if kind.is_wide() {
            if let Some(high) = slot.checked_add(1) {
                self.forget(high);
                self.slots.insert(slot, Slot::WideLow);
                self.slots.insert(high, Slot::WideHigh);
                return;
            }
        }
        self.slots.insert(slot, Slot::Narrow);
    }

    /// Keep only the slots both paths agree on. Returns whether anything was dropped.
    fn merge(&mut self, other: &SlotMap) -> bool {
        let before = self.slots.len();
        self.slots
            .retain(|slot, state| other.slots.get(slot) == Some(state));
        self.slots.len() != before
    }

    fn apply(&mut self, instruction: &Instruction) {
        if let Instruction::Store { kind, slot } = instruction {
            self.define(*kind, *slot);
        }
    }

    /// A read of `kind` at `slot` starting in the upper half of a wide local, or a wide
    /// read overlapping the upper half of a different one.
    fn misreads(&self, kind: TypeKind, slot: u16) -> bool {
        match self.slots.get(&slot) {
            Some(Slot::WideHigh) => true,
            Some(Slot::WideLow) => false,
            Some(Slot::Narrow) | None => {
                kind.is_wide()
                    && slot
                        .checked_add(1)
                        .is_some_and(|high| self.slots.get(&high) == Some(&Slot::WideHigh))
            }
        }
    }

    fn misread_slot(&self, instruction: &Instruction) -> Option<u16> {
        match instruction {
            Instruction::Load { kind, slot } if self.misreads(*kind, *slot) => Some(*slot),
            Instruction::Increment { slot, .. } | Instruction::Ret { slot }
                if self.misreads(TypeKind::Int, *slot) =>
            {
                Some(*slot)
            }
            _ => None,
        }
    }
}

/// Verify that no instruction reads the upper half of a category-2 local.
///
/// `entry` lists the locals defined on method entry (see
/// [`MethodDescriptor::entry_locals`]). Slot widths flow along branches, switch targets
/// and exception handlers the same way [`max_stack`] walks them. Where paths join, a slot
/// the paths disagree on becomes unknown, and only reads of a slot that is the upper half
/// of a wide value on every path are reported.
///
/// # Errors
/// Returns [`Error::SlotWidthViolation`] for the first offending element, or
/// [`Error::UnresolvedLabel`] for a branch to a label without a mark.
pub fn check_slot_widths(elements: &[CodeElement], entry: &[(TypeKind, u16)]) -> Result<()> {
    let positions = label_positions(elements);
    let position_of = |label: &Label| {
        positions
            .get(label)
            .copied()
            .ok_or(Error::UnresolvedLabel(*label))
    };

    let mut handlers = Vec::new();
    for element in elements {
        if let CodeElement::ExceptionRange(range) = element {
            handlers.push((
                position_of(&range.start)?..position_of(&range.end)?,
                position_of(&range.handler)?,
            ));
        }
    }

    let mut initial = SlotMap::default();
    for (kind, slot) in entry {
        initial.define(*kind, *slot);
    }

    let mut states: Vec<Option<SlotMap>> = vec![None; elements.len()];
    let mut pending: Vec<(usize, SlotMap)> = vec![(0, initial)];
    while let Some((start, incoming)) = pending.pop() {
        let mut index = start;
        let mut map = incoming;
        while index < elements.len() {
            if let Some(known) = &mut states[index] {
                if !known.merge(&map) {
                    break;
                }
                map = known.clone();
            } else {
                states[index] = Some(map.clone());
            }

            let CodeElement::Instruction(instruction) = &elements[index] else {
                index += 1;
                continue;
            };

            let mut after = map.clone();
            after.apply(instruction);
            for (covered, handler) in &handlers {
                if covered.contains(&index) {
                    pending.push((*handler, map.clone()));
                    pending.push((*handler, after.clone()));
                }
            }
            for target in instruction.targets() {
                pending.push((position_of(&target)?, after.clone()));
            }
            if instruction.ends_flow() {
                break;
            }
            if let Instruction::Branch {
                opcode: opcodes::JSR,
                ..
            } = instruction
            {
                // Nothing is known about what the subroutine stored.
                after = SlotMap::default();
            }
            map = after;
            index += 1;
        }
    }

    for (position, (element, state)) in elements.iter().zip(&states).enumerate() {
        let (CodeElement::Instruction(instruction), Some(map)) = (element, state) else {
            continue;
        };
        if let Some(slot) = map.misread_slot(instruction) {
            return Err(Error::SlotWidthViolation { slot, position });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{flags::AccessFlags, symbol::{MemberRef, Symbol}},
        code::instruction::{next_scope, Constant, ExceptionRange},
    };

    fn insn(instruction: Instruction) -> CodeElement {
        CodeElement::Instruction(instruction)
    }

    #[test]
    fn straight_line_depth() -> Result<()> {
        let elements = vec![
            insn(Instruction::Constant(Constant::Long(7))),
            insn(Instruction::Constant(Constant::Int(1))),
            insn(Instruction::Operation(opcodes::I2L)),
            insn(Instruction::Operation(opcodes::LADD)),
            insn(Instruction::Return(TypeKind::Long)),
        ];
        assert_eq!(max_stack(&elements)?, 4);
        Ok(())
    }

    #[test]
    fn invoke_uses_descriptor() -> Result<()> {
        let target = MemberRef::new(Symbol::new("demo/A"), "f", "(JI)D");
        let elements = vec![
            insn(Instruction::Load { kind: TypeKind::Reference, slot: 0 }),
            insn(Instruction::Load { kind: TypeKind::Long, slot: 1 }),
            insn(Instruction::Load { kind: TypeKind::Int, slot: 3 }),
            insn(Instruction::Invoke {
                opcode: opcodes::INVOKEVIRTUAL,
                method: target,
                interface: false,
            }),
            insn(Instruction::Return(TypeKind::Double)),
        ];
        assert_eq!(max_stack(&elements)?, 4);
        assert_eq!(max_locals(&elements, 1)?, 4);
        Ok(())
    }

    #[test]
    fn branches_and_handlers() -> Result<()> {
        let scope = next_scope();
        let l = |i| Label::new(scope, i);
        let elements = vec![
            CodeElement::ExceptionRange(ExceptionRange {
                start: l(0),
                end: l(1),
                handler: l(2),
                catch_type: None,
            }),
            CodeElement::Label(l(0)),
            insn(Instruction::Load { kind: TypeKind::Int, slot: 0 }),
            insn(Instruction::Branch { opcode: opcodes::IFEQ, target: l(1) }),
            insn(Instruction::Constant(Constant::Int(3))),
            insn(Instruction::Constant(Constant::Int(4))),
            insn(Instruction::Operation(opcodes::IADD)),
            insn(Instruction::Operation(opcodes::POP)),
            CodeElement::Label(l(1)),
            insn(Instruction::Return(TypeKind::Void)),
            CodeElement::Label(l(2)),
            insn(Instruction::Operation(opcodes::DUP)),
            insn(Instruction::Operation(opcodes::POP)),
            insn(Instruction::Operation(opcodes::ATHROW)),
        ];
        assert_eq!(max_stack(&elements)?, 2);
        Ok(())
    }

    #[test]
    fn underflow_is_malformed() {
        let elements = vec![insn(Instruction::Operation(opcodes::POP))];
        assert!(matches!(max_stack(&elements), Err(Error::Malformed { .. })));
    }

    #[test]
    fn missing_mark_is_unresolved() {
        let target = Label::new(next_scope(), 0);
        let elements = vec![insn(Instruction::Branch { opcode: opcodes::GOTO, target })];
        assert!(matches!(max_stack(&elements), Err(Error::UnresolvedLabel(l)) if l == target));
    }

    #[test]
    fn upper_half_read_is_rejected() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(J)V")?;
        let entry = descriptor.entry_locals(AccessFlags::STATIC);
        let good = vec![insn(Instruction::Load { kind: TypeKind::Long, slot: 0 })];
        check_slot_widths(&good, &entry)?;

        let bad = vec![insn(Instruction::Load { kind: TypeKind::Int, slot: 1 })];
        assert!(matches!(
            check_slot_widths(&bad, &entry),
            Err(Error::SlotWidthViolation { slot: 1, position: 0 })
        ));
        Ok(())
    }

    #[test]
    fn store_redefines_width() -> Result<()> {
        let entry = [(TypeKind::Long, 0)];
        let elements = vec![
            insn(Instruction::Constant(Constant::Int(0))),
            insn(Instruction::Store { kind: TypeKind::Int, slot: 1 }),
            insn(Instruction::Increment { slot: 1, delta: 1 }),
            insn(Instruction::Load { kind: TypeKind::Int, slot: 1 }),
        ];
        check_slot_widths(&elements, &entry)?;
        Ok(())
    }

    #[test]
    fn widths_follow_control_flow() -> Result<()> {
        // goto L2; L1: iload 1; ireturn; L2: iconst_0; istore 1; goto L1
        let entry = MethodDescriptor::parse("(J)I")?.entry_locals(AccessFlags::STATIC);
        let scope = next_scope();
        let l = |i| Label::new(scope, i);
        let elements = vec![
            insn(Instruction::Branch { opcode: opcodes::GOTO, target: l(2) }),
            CodeElement::Label(l(1)),
            insn(Instruction::Load { kind: TypeKind::Int, slot: 1 }),
            insn(Instruction::Return(TypeKind::Int)),
            CodeElement::Label(l(2)),
            insn(Instruction::Constant(Constant::Int(0))),
            insn(Instruction::Store { kind: TypeKind::Int, slot: 1 }),
            insn(Instruction::Branch { opcode: opcodes::GOTO, target: l(1) }),
        ];
        check_slot_widths(&elements, &entry)?;
        Ok(())
    }

    #[test]
    fn disagreeing_paths_make_a_slot_unknown() -> Result<()> {
        // Only one path overwrites the upper half before the join.
        let entry = MethodDescriptor::parse("(JI)I")?.entry_locals(AccessFlags::STATIC);
        let scope = next_scope();
        let l = |i| Label::new(scope, i);
        let elements = vec![
            insn(Instruction::Load { kind: TypeKind::Int, slot: 2 }),
            insn(Instruction::Branch { opcode: opcodes::IFEQ, target: l(0) }),
            insn(Instruction::Constant(Constant::Int(1))),
            insn(Instruction::Store { kind: TypeKind::Int, slot: 1 }),
            CodeElement::Label(l(0)),
            insn(Instruction::Load { kind: TypeKind::Int, slot: 1 }),
            insn(Instruction::Return(TypeKind::Int)),
        ];
        check_slot_widths(&elements, &entry)?;
        Ok(())
    }

    #[test]
    fn agreeing_paths_still_reject_upper_half_reads() -> Result<()> {
        let entry = MethodDescriptor::parse("(JI)I")?.entry_locals(AccessFlags::STATIC);
        let scope = next_scope();
        let l = |i| Label::new(scope, i);
        let elements = vec![
            insn(Instruction::Load { kind: TypeKind::Int, slot: 2 }),
            insn(Instruction::Branch { opcode: opcodes::IFEQ, target: l(0) }),
            insn(Instruction::Constant(Constant::Long(1))),
            insn(Instruction::Store { kind: TypeKind::Long, slot: 0 }),
            CodeElement::Label(l(0)),
            insn(Instruction::Load { kind: TypeKind::Int, slot: 1 }),
            insn(Instruction::Return(TypeKind::Int)),
        ];
        assert!(matches!(
            check_slot_widths(&elements, &entry),
            Err(Error::SlotWidthViolation { slot: 1, position: 5 })
        ));
        Ok(())
    }
}
