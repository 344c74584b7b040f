//! A small interpreter over [`CodeBody`] elements.
//!
//! Covers the `int`/`long` subset the factories use: locals, arithmetic, conditional
//! branches, field access and invocations between the loaded classes. Every field
//! write is recorded as `("owner.name", value)` so tests can compare traces.

use rustc_hash::FxHashMap;

use crate::{
    classfile::{
        container::{Container, MethodDecl},
        descriptor::{MethodDescriptor, TypeKind},
        flags::AccessFlags,
    },
    code::{
        body::CodeBody,
        instruction::{CodeElement, Constant, Instruction, Label},
        opcodes,
    },
    Error, Result,
};

const MAX_DEPTH: usize = 64;

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Reference(usize),
    Null,
}

impl Value {
    fn default_for(descriptor: &str) -> Value {
        match descriptor.as_bytes().first() {
            Some(b'J') => Value::Long(0),
            Some(b'L' | b'[') => Value::Null,
            _ => Value::Int(0),
        }
    }

    fn int(self) -> Result<i32> {
        match self {
            Value::Int(value) => Ok(value),
            other => Err(unsupported(format!("expected int, found {other:?}"))),
        }
    }

    fn long(self) -> Result<i64> {
        match self {
            Value::Long(value) => Ok(value),
            other => Err(unsupported(format!("expected long, found {other:?}"))),
        }
    }

    fn reference(self) -> Result<usize> {
        match self {
            Value::Reference(id) => Ok(id),
            other => Err(unsupported(format!("expected reference, found {other:?}"))),
        }
    }
}

fn unsupported(message: String) -> Error {
    Error::NotSupported(message)
}

/// Executes methods of a fixed set of classes.
pub struct Machine {
    classes: Vec<Container>,
    objects: Vec<FxHashMap<String, Value>>,
    statics: FxHashMap<String, Value>,
    writes: Vec<(String, i64)>,
}

struct Frame<'a> {
    elements: &'a [CodeElement],
    marks: FxHashMap<Label, usize>,
    locals: Vec<Option<Value>>,
    stack: Vec<Value>,
}

impl<'a> Frame<'a> {
    fn new(
        body: &'a CodeBody,
        method: &MethodDecl,
        descriptor: &MethodDescriptor,
        args: Vec<Value>,
    ) -> Result<Self> {
        let entry = descriptor.entry_locals(method.flags);
        if entry.len() != args.len() {
            return Err(unsupported(format!(
                "{}{} takes {} arguments, got {}",
                method.name,
                method.descriptor,
                entry.len(),
                args.len()
            )));
        }
        let mut locals = vec![None; usize::from(body.max_locals())];
        for ((_, slot), value) in entry.into_iter().zip(args) {
            locals[usize::from(slot)] = Some(value);
        }
        let marks = body
            .iter()
            .enumerate()
            .filter_map(|(index, element)| match element {
                CodeElement::Label(label) => Some((*label, index)),
                _ => None,
            })
            .collect();
        Ok(Frame {
            elements: body.elements(),
            marks,
            locals,
            stack: Vec::new(),
        })
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| unsupported("operand stack underflow".to_string()))
    }

    fn target(&self, label: Label) -> Result<usize> {
        self.marks
            .get(&label)
            .copied()
            .ok_or(Error::UnresolvedLabel(label))
    }

    fn load(&self, slot: u16) -> Result<Value> {
        self.locals
            .get(usize::from(slot))
            .copied()
            .flatten()
            .ok_or_else(|| unsupported(format!("read of undefined local {slot}")))
    }

    fn store(&mut self, kind: TypeKind, slot: u16, value: Value) -> Result<()> {
        let index = usize::from(slot);
        let width = usize::from(kind.slot_size());
        if index + width > self.locals.len() {
            return Err(unsupported(format!("local {slot} beyond max_locals")));
        }
        self.locals[index] = Some(value);
        if width == 2 {
            self.locals[index + 1] = None;
        }
        Ok(())
    }
}

impl Machine {
    /// A machine with `classes` loaded and no objects.
    pub fn new(classes: Vec<Container>) -> Self {
        Machine {
            classes,
            objects: Vec::new(),
            statics: FxHashMap::default(),
            writes: Vec::new(),
        }
    }

    /// Field writes recorded so far, in execution order.
    pub fn writes(&self) -> &[(String, i64)] {
        &self.writes
    }

    /// Allocate an instance of `class` and run its `<init>()V` if it has one.
    pub fn instantiate(&mut self, class: &str) -> Result<Value> {
        let object = self.allocate();
        if self.find(class, "<init>", "()V").is_ok() {
            self.invoke(class, "<init>", "()V", vec![object])?;
        }
        Ok(object)
    }

    /// Run `owner.name` with `args` (receiver first for instance methods).
    pub fn invoke(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        self.call(owner, name, descriptor, args, 0)
    }

    fn allocate(&mut self) -> Value {
        self.objects.push(FxHashMap::default());
        Value::Reference(self.objects.len() - 1)
    }

    fn find(&self, owner: &str, name: &str, descriptor: &str) -> Result<MethodDecl> {
        self.classes
            .iter()
            .find(|class| class.this_symbol().as_str() == owner)
            .and_then(|class| class.find_method(name, descriptor))
            .cloned()
            .ok_or_else(|| unsupported(format!("no method {owner}.{name}{descriptor}")))
    }

    fn record(&mut self, key: String, value: Value) {
        match value {
            Value::Int(number) => self.writes.push((key, i64::from(number))),
            Value::Long(number) => self.writes.push((key, number)),
            Value::Reference(_) | Value::Null => {}
        }
    }

    fn call(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Option<Value>> {
        if depth > MAX_DEPTH {
            return Err(Error::RecursionLimit(MAX_DEPTH));
        }
        let method = self.find(owner, name, descriptor)?;
        let body = method
            .code
            .clone()
            .ok_or_else(|| unsupported(format!("{owner}.{name}{descriptor} has no code")))?;
        let parsed = method.method_descriptor()?;
        let mut frame = Frame::new(&body, &method, &parsed, args)?;
        self.run(&mut frame, depth)
    }

    fn run(&mut self, frame: &mut Frame<'_>, depth: usize) -> Result<Option<Value>> {
        let elements = frame.elements;
        let mut pc = 0;
        while let Some(element) = elements.get(pc) {
            pc += 1;
            let CodeElement::Instruction(instruction) = element else {
                continue;
            };
            match instruction {
                Instruction::Operation(opcode) => self.operation(frame, *opcode)?,
                Instruction::Constant(Constant::Int(value)) => frame.stack.push(Value::Int(*value)),
                Instruction::Constant(Constant::Long(value)) => {
                    frame.stack.push(Value::Long(*value));
                }
                Instruction::Load { slot, .. } => {
                    let value = frame.load(*slot)?;
                    frame.stack.push(value);
                }
                Instruction::Store { kind, slot } => {
                    let value = frame.pop()?;
                    frame.store(*kind, *slot, value)?;
                }
                Instruction::Increment { slot, delta } => {
                    let value = frame.load(*slot)?.int()?;
                    frame.store(TypeKind::Int, *slot, Value::Int(value.wrapping_add(i32::from(*delta))))?;
                }
                Instruction::Branch { opcode, target } => {
                    if Self::taken(frame, *opcode)? {
                        pc = frame.target(*target)?;
                    }
                }
                Instruction::Return(TypeKind::Void) => return Ok(None),
                Instruction::Return(_) => return frame.pop().map(Some),
                Instruction::Field { opcode, field } => {
                    let key = format!("{}.{}", field.owner, field.name);
                    match *opcode {
                        opcodes::GETSTATIC => {
                            let value = self
                                .statics
                                .get(&key)
                                .copied()
                                .unwrap_or_else(|| Value::default_for(&field.descriptor));
                            frame.stack.push(value);
                        }
                        opcodes::PUTSTATIC => {
                            let value = frame.pop()?;
                            self.statics.insert(key.clone(), value);
                            self.record(key, value);
                        }
                        opcodes::GETFIELD => {
                            let object = frame.pop()?.reference()?;
                            let value = self.objects[object]
                                .get(&field.name)
                                .copied()
                                .unwrap_or_else(|| Value::default_for(&field.descriptor));
                            frame.stack.push(value);
                        }
                        _ => {
                            let value = frame.pop()?;
                            let object = frame.pop()?.reference()?;
                            self.objects[object].insert(field.name.clone(), value);
                            self.record(key, value);
                        }
                    }
                }
                Instruction::Invoke { opcode, method, .. } => {
                    let descriptor = MethodDescriptor::parse(&method.descriptor)?;
                    let flags = if *opcode == opcodes::INVOKESTATIC {
                        AccessFlags::STATIC
                    } else {
                        AccessFlags::empty()
                    };
                    let count = descriptor.entry_locals(flags).len();
                    let split = frame.stack.len().checked_sub(count).ok_or_else(|| {
                        unsupported("operand stack underflow".to_string())
                    })?;
                    let args = frame.stack.split_off(split);
                    if method.owner.as_str() == "java/lang/Object" && method.name == "<init>" {
                        continue;
                    }
                    let owner = method.owner.as_str().to_string();
                    if let Some(value) =
                        self.call(&owner, &method.name, &method.descriptor, args, depth + 1)?
                    {
                        frame.stack.push(value);
                    }
                }
                Instruction::Type {
                    opcode: opcodes::NEW,
                    ..
                } => {
                    let object = self.allocate();
                    frame.stack.push(object);
                }
                other => return Err(unsupported(format!("instruction {other:?}"))),
            }
        }
        Err(unsupported("fell off the end of the code".to_string()))
    }

    fn operation(&mut self, frame: &mut Frame<'_>, opcode: u8) -> Result<()> {
        match opcode {
            opcodes::NOP => {}
            opcodes::ACONST_NULL => frame.stack.push(Value::Null),
            opcodes::DUP => {
                let top = frame.pop()?;
                frame.stack.extend([top, top]);
            }
            opcodes::POP => {
                frame.pop()?;
            }
            opcodes::IADD | opcodes::ISUB | opcodes::IMUL => {
                let right = frame.pop()?.int()?;
                let left = frame.pop()?.int()?;
                frame.stack.push(Value::Int(match opcode {
                    opcodes::IADD => left.wrapping_add(right),
                    opcodes::ISUB => left.wrapping_sub(right),
                    _ => left.wrapping_mul(right),
                }));
            }
            opcodes::LADD | opcodes::LSUB => {
                let right = frame.pop()?.long()?;
                let left = frame.pop()?.long()?;
                frame.stack.push(Value::Long(if opcode == opcodes::LADD {
                    left.wrapping_add(right)
                } else {
                    left.wrapping_sub(right)
                }));
            }
            opcodes::I2L => {
                let value = frame.pop()?.int()?;
                frame.stack.push(Value::Long(i64::from(value)));
            }
            opcodes::L2I => {
                let value = frame.pop()?.long()?;
                frame.stack.push(Value::Int(value as i32));
            }
            other => return Err(unsupported(format!("opcode {other:#04x}"))),
        }
        Ok(())
    }

    fn taken(frame: &mut Frame<'_>, opcode: u8) -> Result<bool> {
        Ok(match opcode {
            opcodes::GOTO => true,
            opcodes::IFEQ..=opcodes::IFLE => {
                let value = frame.pop()?.int()?;
                match opcode {
                    opcodes::IFEQ => value == 0,
                    opcodes::IFNE => value != 0,
                    opcodes::IFLT => value < 0,
                    opcodes::IFGE => value >= 0,
                    opcodes::IFGT => value > 0,
                    _ => value <= 0,
                }
            }
            opcodes::IF_ICMPEQ..=opcodes::IF_ICMPLE => {
                let right = frame.pop()?.int()?;
                let left = frame.pop()?.int()?;
                match opcode {
                    opcodes::IF_ICMPEQ => left == right,
                    opcodes::IF_ICMPNE => left != right,
                    opcodes::IF_ICMPLT => left < right,
                    opcodes::IF_ICMPGE => left >= right,
                    opcodes::IF_ICMPGT => left > right,
                    _ => left <= right,
                }
            }
            other => return Err(unsupported(format!("branch {other:#04x}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::counter_class;

    #[test]
    fn runs_the_counter_fixture() -> Result<()> {
        let mut machine = Machine::new(vec![counter_class()?]);
        let object = machine.instantiate("demo/Target")?;
        machine.invoke("demo/Target", "bump", "()V", vec![object])?;
        machine.invoke("demo/Target", "bump", "()V", vec![object])?;
        assert_eq!(
            machine.writes(),
            &[
                ("demo/Target.count".to_string(), 1),
                ("demo/Target.count".to_string(), 2)
            ]
        );
        let negative = machine.invoke("demo/Target", "next", "(I)I", vec![object, Value::Int(-3)])?;
        assert_eq!(negative, Some(Value::Int(0)));
        let sum = machine.invoke("demo/Target", "add", "(JI)J", vec![Value::Long(1), Value::Int(2)])?;
        assert_eq!(sum, Some(Value::Long(3)));
        Ok(())
    }
}
