//! Renumbering of local variable slots.
//!
//! [`LocalSlotShifter`] adds a fixed base to every slot a body references: loads,
//! stores, `iinc`, `ret` and the local variable debug tables. Category-2 locals move as a
//! unit because both halves receive the same offset, so distinct locals of the source
//! body stay distinct and non-overlapping after the shift.
//!
//! The shifter only guarantees consistent renumbering. Choosing a base that keeps the
//! shifted locals clear of the destination's own locals is up to the caller;
//! [`LocalSlotShifter::of`] picks the entry footprint of a method, which is the minimum
//! for splicing a body into that method.

use crate::{
    classfile::{descriptor::MethodDescriptor, flags::AccessFlags},
    code::instruction::{CodeElement, Instruction, LocalVariable},
    transform::{CodeTransform, ElementBuilder},
    Error, Result,
};

/// Adds a fixed base to every local slot of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSlotShifter {
    base: u16,
}

impl LocalSlotShifter {
    /// Shift past the receiver and parameters of a method with `flags` and `descriptor`.
    #[must_use]
    pub fn of(flags: AccessFlags, descriptor: &MethodDescriptor) -> Self {
        LocalSlotShifter {
            base: descriptor.footprint(flags),
        }
    }

    /// Shift by an explicit base.
    #[must_use]
    pub fn with_base(base: u16) -> Self {
        LocalSlotShifter { base }
    }

    /// The offset added to every slot.
    #[must_use]
    pub fn base(&self) -> u16 {
        self.base
    }

    fn slot(&self, slot: u16) -> Result<u16> {
        slot.checked_add(self.base).ok_or_else(|| {
            Error::LimitExceeded(format!("local {slot} shifted by {} overflows", self.base))
        })
    }

    fn local(&self, local: LocalVariable) -> Result<LocalVariable> {
        Ok(LocalVariable {
            slot: self.slot(local.slot)?,
            ..local
        })
    }

    /// Shift the slots referenced by one element.
    ///
    /// # Errors
    /// Returns [`Error::LimitExceeded`] if a shifted slot would not fit in 16 bits.
    pub fn shift(&self, element: CodeElement) -> Result<CodeElement> {
        Ok(match element {
            CodeElement::Instruction(instruction) => CodeElement::Instruction(match instruction {
                Instruction::Load { kind, slot } => Instruction::Load {
                    kind,
                    slot: self.slot(slot)?,
                },
                Instruction::Store { kind, slot } => Instruction::Store {
                    kind,
                    slot: self.slot(slot)?,
                },
                Instruction::Increment { slot, delta } => Instruction::Increment {
                    slot: self.slot(slot)?,
                    delta,
                },
                Instruction::Ret { slot } => Instruction::Ret {
                    slot: self.slot(slot)?,
                },
                other => other,
            }),
            CodeElement::LocalVariable(local) => CodeElement::LocalVariable(self.local(local)?),
            CodeElement::LocalVariableType(local) => {
                CodeElement::LocalVariableType(self.local(local)?)
            }
            other @ (CodeElement::Label(_)
            | CodeElement::LineNumber(_)
            | CodeElement::ExceptionRange(_)) => other,
        })
    }

    /// A code transform shifting every element and reserving the shifted slots.
    #[must_use]
    pub fn as_code_transform(&self) -> CodeTransform {
        let shifter = *self;
        CodeTransform::of(move |builder, element| {
            let shifted = shifter.shift(element)?;
            builder.with(shifted);
            Ok(())
        })
    }
}

impl From<LocalSlotShifter> for CodeTransform {
    fn from(shifter: LocalSlotShifter) -> Self {
        shifter.as_code_transform()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        classfile::descriptor::TypeKind,
        code::body::CodeBody,
        transform::builder::{transform_code, BuildOptions, CodeBuilder},
    };

    fn slots(body: &CodeBody) -> BTreeSet<(u16, u16)> {
        body.instructions()
            .filter_map(|instruction| match instruction {
                Instruction::Load { kind, slot } | Instruction::Store { kind, slot } => {
                    Some((*slot, kind.slot_size()))
                }
                Instruction::Increment { slot, .. } => Some((*slot, 1)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn base_is_the_entry_footprint() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(JLjava/lang/String;D)V")?;
        assert_eq!(LocalSlotShifter::of(AccessFlags::STATIC, &descriptor).base(), 5);
        assert_eq!(LocalSlotShifter::of(AccessFlags::PUBLIC, &descriptor).base(), 6);
        Ok(())
    }

    #[test]
    fn shifting_is_injective_and_width_preserving() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(JI)J")?;
        let mut code = CodeBuilder::new(AccessFlags::STATIC, descriptor.clone(), BuildOptions::default());
        let sum = code.allocate_local(TypeKind::Long)?;
        code.load(TypeKind::Long, 0)
            .load(TypeKind::Int, 2)
            .operation(crate::code::opcodes::I2L)
            .operation(crate::code::opcodes::LADD)
            .store(TypeKind::Long, sum)
            .iinc(2, 1)
            .load(TypeKind::Long, sum)
            .return_(TypeKind::Long);
        let body = code.finish()?;

        let shifter = LocalSlotShifter::with_base(7);
        let shifted = transform_code(&body, AccessFlags::STATIC, &descriptor, &shifter.into())?;
        let before = slots(&body);
        let after = slots(&shifted);
        let expected: BTreeSet<_> = before.iter().map(|(slot, width)| (slot + 7, *width)).collect();
        assert_eq!(after, expected);

        let mut ranges: Vec<(u16, u16)> = after.iter().map(|(slot, width)| (*slot, slot + width)).collect();
        ranges.sort_unstable();
        ranges.dedup();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "{pair:?} overlap");
        }
        assert_eq!(shifted.max_locals(), body.max_locals() + 7);
        Ok(())
    }

    #[test]
    fn overflow_is_reported() {
        let shifter = LocalSlotShifter::with_base(u16::MAX);
        let element = CodeElement::Instruction(Instruction::Ret { slot: 1 });
        assert!(matches!(shifter.shift(element), Err(Error::LimitExceeded(_))));
    }
}
