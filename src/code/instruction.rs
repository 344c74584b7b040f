//! Code elements: instructions, label marks, exception ranges and debug pseudo-elements.
//!
//! Instructions are modeled as a closed [`Instruction`] enum. The decoder normalizes
//! encoding variants (`iload_0` and `wide iload`, `iconst_1` and `ldc`, `goto_w` and
//! `goto`), and the encoder picks the shortest encoding again. Branch targets are
//! [`Label`]s rather than offsets, so transforms never see bytecode positions.

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{
    classfile::{
        descriptor::TypeKind,
        symbol::{DynamicConstant, MemberRef, MethodHandle, Symbol},
    },
    code::opcodes,
};

static NEXT_SCOPE: AtomicU32 = AtomicU32::new(1);

/// Allocate a label scope that has never been handed out before.
pub(crate) fn next_scope() -> u32 {
    NEXT_SCOPE.fetch_add(1, Ordering::Relaxed)
}

/// An opaque branch-target identity.
///
/// Labels are handles into the label table of the builder or body that created them:
/// `scope` identifies the table and `index` the entry. Labels from different scopes are
/// never equal, so bodies built independently cannot confuse each other's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    scope: u32,
    index: u32,
}

impl Label {
    pub(crate) fn new(scope: u32, index: u32) -> Self {
        Label { scope, index }
    }

    /// The label table this label belongs to.
    #[must_use]
    pub fn scope(&self) -> u32 {
        self.scope
    }

    /// Position of the label within its table.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}#{}", self.scope, self.index)
    }
}

/// A value `ldc` or a `ConstantValue` attribute can load.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `int` (also `boolean`, `byte`, `char`, `short`)
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `java/lang/String`
    String(String),
    /// `java/lang/Class`
    Class(Symbol),
    /// `java/lang/invoke/MethodType`
    MethodType(String),
    /// `java/lang/invoke/MethodHandle`
    MethodHandle(MethodHandle),
    /// A dynamically computed constant
    Dynamic(DynamicConstant),
}

impl Constant {
    /// Slot kind of the loaded value.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        match self {
            Constant::Int(_) => TypeKind::Int,
            Constant::Long(_) => TypeKind::Long,
            Constant::Float(_) => TypeKind::Float,
            Constant::Double(_) => TypeKind::Double,
            Constant::Dynamic(dynamic) => TypeKind::of_descriptor(&dynamic.descriptor)
                .map_or(TypeKind::Reference, TypeKind::computational),
            Constant::String(_)
            | Constant::Class(_)
            | Constant::MethodType(_)
            | Constant::MethodHandle(_) => TypeKind::Reference,
        }
    }
}

/// A single JVM instruction with symbolic operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// An operand-less opcode such as `iadd`, `dup`, `athrow` or `arraylength`
    Operation(u8),
    /// Push a constant (`aconst_null` excluded, which is an operation)
    Constant(Constant),
    /// Push the local at `slot`
    Load {
        /// Computational kind of the local
        kind: TypeKind,
        /// Local slot
        slot: u16,
    },
    /// Pop into the local at `slot`
    Store {
        /// Computational kind of the local
        kind: TypeKind,
        /// Local slot
        slot: u16,
    },
    /// `iinc`
    Increment {
        /// Local slot of the `int`
        slot: u16,
        /// Signed increment
        delta: i16,
    },
    /// `ret` from a subroutine
    Ret {
        /// Local slot holding the return address
        slot: u16,
    },
    /// A conditional branch, `goto` or `jsr`
    Branch {
        /// Short-form branch opcode
        opcode: u8,
        /// Branch target
        target: Label,
    },
    /// `tableswitch`
    TableSwitch {
        /// Lowest matched key
        low: i32,
        /// Highest matched key
        high: i32,
        /// Target when the key is out of range
        default: Label,
        /// Targets for `low..=high`
        targets: Vec<Label>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Target when no key matches
        default: Label,
        /// Key and target pairs
        pairs: Vec<(i32, Label)>,
    },
    /// A return of the given kind, [`TypeKind::Void`] for `return`
    Return(TypeKind),
    /// `getstatic`, `putstatic`, `getfield` or `putfield`
    Field {
        /// Field access opcode
        opcode: u8,
        /// The field
        field: MemberRef,
    },
    /// `invokevirtual`, `invokespecial`, `invokestatic` or `invokeinterface`
    Invoke {
        /// Invocation opcode
        opcode: u8,
        /// The method
        method: MemberRef,
        /// Whether the owner is an interface
        interface: bool,
    },
    /// `invokedynamic`
    InvokeDynamic(DynamicConstant),
    /// `new`, `anewarray`, `checkcast` or `instanceof`
    Type {
        /// Type instruction opcode
        opcode: u8,
        /// The class or array type operand
        symbol: Symbol,
    },
    /// `newarray` of a primitive component kind
    NewPrimitiveArray(TypeKind),
    /// `multianewarray`
    MultiNewArray {
        /// The array type created
        symbol: Symbol,
        /// Number of dimensions popped from the stack
        dimensions: u8,
    },
}

impl Instruction {
    /// The opcode this instruction is encoded with in its canonical form.
    #[must_use]
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Operation(opcode)
            | Instruction::Branch { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Invoke { opcode, .. }
            | Instruction::Type { opcode, .. } => *opcode,
            Instruction::Constant(constant) => {
                if constant.kind().is_wide() {
                    opcodes::LDC2_W
                } else {
                    opcodes::LDC
                }
            }
            Instruction::Load { kind, .. } => match kind.computational() {
                TypeKind::Long => opcodes::LLOAD,
                TypeKind::Float => opcodes::FLOAD,
                TypeKind::Double => opcodes::DLOAD,
                TypeKind::Reference => opcodes::ALOAD,
                _ => opcodes::ILOAD,
            },
            Instruction::Store { kind, .. } => match kind.computational() {
                TypeKind::Long => opcodes::LSTORE,
                TypeKind::Float => opcodes::FSTORE,
                TypeKind::Double => opcodes::DSTORE,
                TypeKind::Reference => opcodes::ASTORE,
                _ => opcodes::ISTORE,
            },
            Instruction::Increment { .. } => opcodes::IINC,
            Instruction::Ret { .. } => opcodes::RET,
            Instruction::TableSwitch { .. } => opcodes::TABLESWITCH,
            Instruction::LookupSwitch { .. } => opcodes::LOOKUPSWITCH,
            Instruction::Return(kind) => match kind.computational() {
                TypeKind::Void => opcodes::RETURN,
                TypeKind::Long => opcodes::LRETURN,
                TypeKind::Float => opcodes::FRETURN,
                TypeKind::Double => opcodes::DRETURN,
                TypeKind::Reference => opcodes::ARETURN,
                _ => opcodes::IRETURN,
            },
            Instruction::InvokeDynamic(_) => opcodes::INVOKEDYNAMIC,
            Instruction::NewPrimitiveArray(_) => opcodes::NEWARRAY,
            Instruction::MultiNewArray { .. } => opcodes::MULTIANEWARRAY,
        }
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub fn ends_flow(&self) -> bool {
        match self {
            Instruction::Operation(opcode) => *opcode == opcodes::ATHROW,
            Instruction::Branch { opcode, .. } => *opcode == opcodes::GOTO,
            Instruction::Return(_)
            | Instruction::Ret { .. }
            | Instruction::TableSwitch { .. }
            | Instruction::LookupSwitch { .. } => true,
            _ => false,
        }
    }

    /// Every label this instruction refers to.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instruction::Branch { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Instruction::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, label)| *label))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Rewrite every label operand through `f`.
    #[must_use]
    pub fn map_labels(self, f: &mut impl FnMut(Label) -> Label) -> Instruction {
        match self {
            Instruction::Branch { opcode, target } => Instruction::Branch {
                opcode,
                target: f(target),
            },
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            } => Instruction::TableSwitch {
                low,
                high,
                default: f(default),
                targets: targets.into_iter().map(&mut *f).collect(),
            },
            Instruction::LookupSwitch { default, pairs } => Instruction::LookupSwitch {
                default: f(default),
                pairs: pairs.into_iter().map(|(key, label)| (key, f(label))).collect(),
            },
            other @ (Instruction::Operation(_)
            | Instruction::Constant(_)
            | Instruction::Load { .. }
            | Instruction::Store { .. }
            | Instruction::Increment { .. }
            | Instruction::Ret { .. }
            | Instruction::Return(_)
            | Instruction::Field { .. }
            | Instruction::Invoke { .. }
            | Instruction::InvokeDynamic(_)
            | Instruction::Type { .. }
            | Instruction::NewPrimitiveArray(_)
            | Instruction::MultiNewArray { .. }) => other,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = opcodes::mnemonic(self.opcode());
        match self {
            Instruction::Operation(_) => f.write_str(mnemonic),
            Instruction::Constant(constant) => write!(f, "{mnemonic} {constant:?}"),
            Instruction::Load { slot, .. }
            | Instruction::Store { slot, .. }
            | Instruction::Ret { slot } => write!(f, "{mnemonic} {slot}"),
            Instruction::Increment { slot, delta } => write!(f, "{mnemonic} {slot} {delta}"),
            Instruction::Branch { target, .. } => write!(f, "{mnemonic} {target}"),
            Instruction::TableSwitch { low, high, .. } => write!(f, "{mnemonic} {low}..{high}"),
            Instruction::LookupSwitch { pairs, .. } => write!(f, "{mnemonic} [{}]", pairs.len()),
            Instruction::Return(_) => f.write_str(mnemonic),
            Instruction::Field { field, .. } => write!(f, "{mnemonic} {field}"),
            Instruction::Invoke { method, .. } => write!(f, "{mnemonic} {method}"),
            Instruction::InvokeDynamic(call_site) => {
                write!(f, "{mnemonic} {}{}", call_site.name, call_site.descriptor)
            }
            Instruction::Type { symbol, .. } => write!(f, "{mnemonic} {symbol}"),
            Instruction::NewPrimitiveArray(kind) => write!(f, "{mnemonic} {}", kind.name()),
            Instruction::MultiNewArray { symbol, dimensions } => {
                write!(f, "{mnemonic} {symbol} {dimensions}")
            }
        }
    }
}

/// A protected range and its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRange {
    /// First protected instruction
    pub start: Label,
    /// End of the range, exclusive
    pub end: Label,
    /// Handler entry point
    pub handler: Label,
    /// Caught type, `None` catches everything
    pub catch_type: Option<Symbol>,
}

/// A `LocalVariableTable` or `LocalVariableTypeTable` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Local slot
    pub slot: u16,
    /// Source name
    pub name: String,
    /// Field descriptor, or generic signature for type table entries
    pub descriptor: String,
    /// Start of the scope
    pub start: Label,
    /// End of the scope, exclusive
    pub end: Label,
}

/// An element of a code body.
///
/// Only [`CodeElement::Instruction`] occupies space in the encoded code array; the other
/// variants are positional or tabular information attached to it.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeElement {
    /// An instruction
    Instruction(Instruction),
    /// Marks the position of a label
    Label(Label),
    /// An exception table entry
    ExceptionRange(ExceptionRange),
    /// A source line starting at the next instruction
    LineNumber(u16),
    /// A local variable debug entry
    LocalVariable(LocalVariable),
    /// A local variable generic signature debug entry
    LocalVariableType(LocalVariable),
}

impl CodeElement {
    /// Rewrite every label this element declares or references through `f`.
    #[must_use]
    pub fn map_labels(self, mut f: impl FnMut(Label) -> Label) -> CodeElement {
        match self {
            CodeElement::Instruction(instruction) => {
                CodeElement::Instruction(instruction.map_labels(&mut f))
            }
            CodeElement::Label(label) => CodeElement::Label(f(label)),
            CodeElement::ExceptionRange(range) => CodeElement::ExceptionRange(ExceptionRange {
                start: f(range.start),
                end: f(range.end),
                handler: f(range.handler),
                catch_type: range.catch_type,
            }),
            CodeElement::LineNumber(line) => CodeElement::LineNumber(line),
            CodeElement::LocalVariable(local) => {
                CodeElement::LocalVariable(local.map_scope(&mut f))
            }
            CodeElement::LocalVariableType(local) => {
                CodeElement::LocalVariableType(local.map_scope(&mut f))
            }
        }
    }

    /// Every label this element references (targets and range bounds, not label marks).
    #[must_use]
    pub fn referenced_labels(&self) -> Vec<Label> {
        match self {
            CodeElement::Instruction(instruction) => instruction.targets(),
            CodeElement::ExceptionRange(range) => vec![range.start, range.end, range.handler],
            CodeElement::LocalVariable(local) | CodeElement::LocalVariableType(local) => {
                vec![local.start, local.end]
            }
            CodeElement::Label(_) | CodeElement::LineNumber(_) => Vec::new(),
        }
    }
}

impl LocalVariable {
    fn map_scope(self, f: &mut impl FnMut(Label) -> Label) -> LocalVariable {
        LocalVariable {
            start: f(self.start),
            end: f(self.end),
            ..self
        }
    }
}

impl From<Instruction> for CodeElement {
    fn from(instruction: Instruction) -> Self {
        CodeElement::Instruction(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_unique() {
        let a = next_scope();
        let b = next_scope();
        assert_ne!(a, b);
        assert_ne!(Label::new(a, 0), Label::new(b, 0));
    }

    #[test]
    fn map_labels_covers_switches() {
        let scope = next_scope();
        let l = |i| Label::new(scope, i);
        let switch = Instruction::LookupSwitch {
            default: l(0),
            pairs: vec![(1, l(1)), (5, l(2))],
        };

        let shifted = switch.map_labels(&mut |label: Label| Label::new(label.scope(), label.index() + 10));
        assert_eq!(shifted.targets(), vec![l(10), l(11), l(12)]);
    }

    #[test]
    fn element_references() {
        let scope = next_scope();
        let range = CodeElement::ExceptionRange(ExceptionRange {
            start: Label::new(scope, 0),
            end: Label::new(scope, 1),
            handler: Label::new(scope, 2),
            catch_type: None,
        });
        assert_eq!(range.referenced_labels().len(), 3);
        assert!(CodeElement::Label(Label::new(scope, 0)).referenced_labels().is_empty());
    }

    #[test]
    fn constant_kinds() {
        assert_eq!(Constant::Long(1).kind(), TypeKind::Long);
        assert_eq!(Constant::String("x".into()).kind(), TypeKind::Reference);
        assert!(Constant::Double(0.5).kind().is_wide());
    }
}
