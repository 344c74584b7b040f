//! Immutable method bodies.

use std::sync::Arc;

use crate::code::instruction::{CodeElement, Instruction, Label};

/// The ordered element stream of one method body, plus its frame sizes.
///
/// Bodies are cheap to clone and never change. Their labels all share one scope and are
/// numbered densely from zero in order of their label marks.
#[derive(Debug, Clone)]
pub struct CodeBody {
    inner: Arc<CodeBodyData>,
}

#[derive(Debug)]
struct CodeBodyData {
    scope: u32,
    label_count: u32,
    elements: Vec<CodeElement>,
    max_stack: u16,
    max_locals: u16,
}

impl CodeBody {
    pub(crate) fn from_parts(
        scope: u32,
        label_count: u32,
        elements: Vec<CodeElement>,
        max_stack: u16,
        max_locals: u16,
    ) -> Self {
        CodeBody {
            inner: Arc::new(CodeBodyData {
                scope,
                label_count,
                elements,
                max_stack,
                max_locals,
            }),
        }
    }

    /// The elements in order.
    #[must_use]
    pub fn elements(&self) -> &[CodeElement] {
        &self.inner.elements
    }

    /// Iterate over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, CodeElement> {
        self.inner.elements.iter()
    }

    /// Iterate over the instructions only.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.inner.elements.iter().filter_map(|element| match element {
            CodeElement::Instruction(instruction) => Some(instruction),
            _ => None,
        })
    }

    /// The labels marked in this body, in order.
    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.inner.elements.iter().filter_map(|element| match element {
            CodeElement::Label(label) => Some(*label),
            _ => None,
        })
    }

    /// Operand stack size in words.
    #[must_use]
    pub fn max_stack(&self) -> u16 {
        self.inner.max_stack
    }

    /// Local variable array size in slots.
    #[must_use]
    pub fn max_locals(&self) -> u16 {
        self.inner.max_locals
    }

    /// The scope shared by all labels of this body.
    #[must_use]
    pub fn scope(&self) -> u32 {
        self.inner.scope
    }

    /// Number of labels marked in this body.
    #[must_use]
    pub fn label_count(&self) -> u32 {
        self.inner.label_count
    }
}

impl PartialEq for CodeBody {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.max_stack == other.inner.max_stack
                && self.inner.max_locals == other.inner.max_locals
                && self.inner.elements == other.inner.elements)
    }
}

impl<'a> IntoIterator for &'a CodeBody {
    type Item = &'a CodeElement;
    type IntoIter = std::slice::Iter<'a, CodeElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
