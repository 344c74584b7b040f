//! Consistent rewriting of type symbols.
//!
//! A [`Remapper`] wraps a total function from [`Symbol`] to [`Symbol`] and applies it to
//! every place a class file names a type: the header, member owners, descriptors,
//! generic signatures, constants, bootstrap arguments, exception tables, local variable
//! tables and the symbol-carrying attributes. Symbols the function leaves alone come out
//! unchanged, so an identity mapping produces an equivalent class.
//!
//! Member names are never changed; only the types they are declared on and typed with.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//!
//! let bytes = std::fs::read("Probe.class")?;
//! let probe = Container::parse(&bytes)?;
//! let remapper = Remapper::from_map([(Symbol::new("demo/Probe"), Symbol::new("demo/Target"))]);
//! let moved = build(&probe, &remapper.as_class_transform())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    classfile::{
        attribute::{Attribute, InnerClass},
        container::{ClassElement, ClassHeader, FieldDecl, MethodElement},
        descriptor::{remap_field_descriptor, remap_method_descriptor, remap_signature},
        symbol::{BootstrapMethod, DynamicConstant, MemberRef, MethodHandle, Symbol},
    },
    code::instruction::{CodeElement, Constant, ExceptionRange, Instruction, LocalVariable},
    transform::{ClassTransform, CodeTransform, ElementBuilder, MethodTransform},
};

type Mapping = dyn Fn(&Symbol) -> Symbol + Send + Sync;

/// Rewrites every type symbol of a class through one mapping function.
#[derive(Clone)]
pub struct Remapper {
    mapping: Arc<Mapping>,
}

impl Remapper {
    /// Remap through `mapping`, which is called with non-array class symbols only.
    pub fn of<F>(mapping: F) -> Self
    where
        F: Fn(&Symbol) -> Symbol + Send + Sync + 'static,
    {
        Remapper {
            mapping: Arc::new(mapping),
        }
    }

    /// Remap the symbols found in `map`, keep all others.
    pub fn from_map(map: impl IntoIterator<Item = (Symbol, Symbol)>) -> Self {
        let map: FxHashMap<Symbol, Symbol> = map.into_iter().collect();
        Remapper::of(move |symbol| map.get(symbol).cloned().unwrap_or_else(|| symbol.clone()))
    }

    /// The remapper that changes nothing.
    #[must_use]
    pub fn identity() -> Self {
        Remapper::of(Symbol::clone)
    }

    fn class_mapping(&self) -> &dyn Fn(&Symbol) -> Symbol {
        &*self.mapping
    }

    /// Map a class or array symbol. Array symbols map their element type.
    #[must_use]
    pub fn map_symbol(&self, symbol: &Symbol) -> Symbol {
        if symbol.is_array() {
            Symbol::new(remap_field_descriptor(symbol.as_str(), self.class_mapping()))
        } else {
            (self.mapping)(symbol)
        }
    }

    /// Map a field descriptor.
    #[must_use]
    pub fn map_descriptor(&self, descriptor: &str) -> String {
        remap_field_descriptor(descriptor, self.class_mapping())
    }

    /// Map a method descriptor.
    #[must_use]
    pub fn map_method_descriptor(&self, descriptor: &str) -> String {
        remap_method_descriptor(descriptor, self.class_mapping())
    }

    /// Map a `Signature` attribute value.
    #[must_use]
    pub fn map_signature(&self, signature: &str) -> String {
        remap_signature(signature, self.class_mapping())
    }

    fn map_any_descriptor(&self, descriptor: &str) -> String {
        if descriptor.starts_with('(') {
            self.map_method_descriptor(descriptor)
        } else {
            self.map_descriptor(descriptor)
        }
    }

    /// Map the owner and descriptor of a field or method reference.
    #[must_use]
    pub fn map_member(&self, member: &MemberRef) -> MemberRef {
        MemberRef {
            owner: self.map_symbol(&member.owner),
            name: member.name.clone(),
            descriptor: self.map_any_descriptor(&member.descriptor),
        }
    }

    /// Map a method handle.
    #[must_use]
    pub fn map_handle(&self, handle: &MethodHandle) -> MethodHandle {
        MethodHandle {
            kind: handle.kind,
            member: self.map_member(&handle.member),
            interface: handle.interface,
        }
    }

    /// Map a bootstrap method and its static arguments.
    #[must_use]
    pub fn map_bootstrap(&self, bootstrap: &BootstrapMethod) -> Arc<BootstrapMethod> {
        Arc::new(BootstrapMethod {
            handle: self.map_handle(&bootstrap.handle),
            arguments: bootstrap
                .arguments
                .iter()
                .map(|argument| self.map_constant(argument))
                .collect(),
        })
    }

    /// Map a dynamic call site or constant.
    #[must_use]
    pub fn map_dynamic(&self, dynamic: &DynamicConstant) -> DynamicConstant {
        DynamicConstant {
            name: dynamic.name.clone(),
            descriptor: self.map_any_descriptor(&dynamic.descriptor),
            bootstrap: self.map_bootstrap(&dynamic.bootstrap),
        }
    }

    /// Map a loadable constant.
    #[must_use]
    pub fn map_constant(&self, constant: &Constant) -> Constant {
        match constant {
            Constant::Class(symbol) => Constant::Class(self.map_symbol(symbol)),
            Constant::MethodType(descriptor) => {
                Constant::MethodType(self.map_method_descriptor(descriptor))
            }
            Constant::MethodHandle(handle) => Constant::MethodHandle(self.map_handle(handle)),
            Constant::Dynamic(dynamic) => Constant::Dynamic(self.map_dynamic(dynamic)),
            Constant::Int(_)
            | Constant::Long(_)
            | Constant::Float(_)
            | Constant::Double(_)
            | Constant::String(_) => constant.clone(),
        }
    }

    fn map_inner_class(&self, entry: &InnerClass) -> InnerClass {
        let inner = self.map_symbol(&entry.inner);
        let name = match &entry.name {
            Some(name) if inner != entry.inner => {
                let simple = inner
                    .as_str()
                    .rsplit_once('$')
                    .map(|(_, tail)| tail.trim_start_matches(|c: char| c.is_ascii_digit()));
                match simple {
                    Some(simple) if !simple.is_empty() => Some(simple.to_string()),
                    _ => Some(name.clone()),
                }
            }
            other => other.clone(),
        };
        InnerClass {
            inner,
            outer: entry.outer.as_ref().map(|outer| self.map_symbol(outer)),
            name,
            flags: entry.flags,
        }
    }

    /// Map the symbols inside an attribute. Unknown attributes are returned as is.
    #[must_use]
    pub fn map_attribute(&self, attribute: &Attribute) -> Attribute {
        match attribute {
            Attribute::Signature(signature) => Attribute::Signature(self.map_signature(signature)),
            Attribute::ConstantValue(constant) => {
                Attribute::ConstantValue(self.map_constant(constant))
            }
            Attribute::Exceptions(exceptions) => Attribute::Exceptions(
                exceptions.iter().map(|symbol| self.map_symbol(symbol)).collect(),
            ),
            Attribute::InnerClasses(entries) => Attribute::InnerClasses(
                entries.iter().map(|entry| self.map_inner_class(entry)).collect(),
            ),
            Attribute::EnclosingMethod { class, method } => Attribute::EnclosingMethod {
                class: self.map_symbol(class),
                method: method
                    .as_ref()
                    .map(|(name, descriptor)| (name.clone(), self.map_method_descriptor(descriptor))),
            },
            Attribute::NestHost(host) => Attribute::NestHost(self.map_symbol(host)),
            Attribute::NestMembers(members) => Attribute::NestMembers(
                members.iter().map(|symbol| self.map_symbol(symbol)).collect(),
            ),
            Attribute::SourceFile(_)
            | Attribute::Deprecated
            | Attribute::Synthetic
            | Attribute::Unknown(_) => attribute.clone(),
        }
    }

    /// Map the class, superclass and interfaces of a header.
    #[must_use]
    pub fn map_header(&self, header: &ClassHeader) -> ClassHeader {
        ClassHeader {
            minor_version: header.minor_version,
            major_version: header.major_version,
            flags: header.flags,
            this_symbol: self.map_symbol(&header.this_symbol),
            super_symbol: header.super_symbol.as_ref().map(|s| self.map_symbol(s)),
            interfaces: header
                .interfaces
                .iter()
                .map(|symbol| self.map_symbol(symbol))
                .collect(),
        }
    }

    /// Map a field's descriptor and attributes.
    #[must_use]
    pub fn map_field(&self, field: &FieldDecl) -> FieldDecl {
        FieldDecl {
            name: field.name.clone(),
            descriptor: self.map_descriptor(&field.descriptor),
            flags: field.flags,
            attributes: field
                .attributes
                .iter()
                .map(|attribute| self.map_attribute(attribute))
                .collect(),
        }
    }

    /// Map the symbolic operands of an instruction.
    #[must_use]
    pub fn map_instruction(&self, instruction: Instruction) -> Instruction {
        match instruction {
            Instruction::Constant(constant) => Instruction::Constant(self.map_constant(&constant)),
            Instruction::Field { opcode, field } => Instruction::Field {
                opcode,
                field: self.map_member(&field),
            },
            Instruction::Invoke {
                opcode,
                method,
                interface,
            } => Instruction::Invoke {
                opcode,
                method: self.map_member(&method),
                interface,
            },
            Instruction::InvokeDynamic(call_site) => {
                Instruction::InvokeDynamic(self.map_dynamic(&call_site))
            }
            Instruction::Type { opcode, symbol } => Instruction::Type {
                opcode,
                symbol: self.map_symbol(&symbol),
            },
            Instruction::MultiNewArray { symbol, dimensions } => Instruction::MultiNewArray {
                symbol: self.map_symbol(&symbol),
                dimensions,
            },
            other @ (Instruction::Operation(_)
            | Instruction::Load { .. }
            | Instruction::Store { .. }
            | Instruction::Increment { .. }
            | Instruction::Ret { .. }
            | Instruction::Branch { .. }
            | Instruction::TableSwitch { .. }
            | Instruction::LookupSwitch { .. }
            | Instruction::Return(_)
            | Instruction::NewPrimitiveArray(_)) => other,
        }
    }

    /// Map the symbolic content of a code element.
    #[must_use]
    pub fn map_code_element(&self, element: CodeElement) -> CodeElement {
        match element {
            CodeElement::Instruction(instruction) => {
                CodeElement::Instruction(self.map_instruction(instruction))
            }
            CodeElement::ExceptionRange(range) => CodeElement::ExceptionRange(ExceptionRange {
                catch_type: range.catch_type.as_ref().map(|s| self.map_symbol(s)),
                ..range
            }),
            CodeElement::LocalVariable(local) => CodeElement::LocalVariable(LocalVariable {
                descriptor: self.map_descriptor(&local.descriptor),
                ..local
            }),
            CodeElement::LocalVariableType(local) => CodeElement::LocalVariableType(LocalVariable {
                descriptor: self.map_signature(&local.descriptor),
                ..local
            }),
            other @ (CodeElement::Label(_) | CodeElement::LineNumber(_)) => other,
        }
    }

    /// A code transform applying this remapper to every element.
    #[must_use]
    pub fn as_code_transform(&self) -> CodeTransform {
        let remapper = self.clone();
        CodeTransform::of(move |builder, element| {
            builder.with(remapper.map_code_element(element));
            Ok(())
        })
    }

    /// A method transform remapping the body and the method attributes.
    #[must_use]
    pub fn as_method_transform(&self) -> MethodTransform {
        let remapper = self.clone();
        let code = self.as_code_transform();
        MethodTransform::of(move |builder, element| {
            match element {
                MethodElement::Code(body) => {
                    builder.transform_code(&body, &code)?;
                }
                MethodElement::Attribute(attribute) => {
                    builder.with(MethodElement::Attribute(remapper.map_attribute(&attribute)));
                }
            }
            Ok(())
        })
    }

    /// A class transform remapping every element of a class.
    #[must_use]
    pub fn as_class_transform(&self) -> ClassTransform {
        let remapper = self.clone();
        let method_transform = self.as_method_transform();
        ClassTransform::of(move |builder, element| {
            match element {
                ClassElement::Header(header) => {
                    builder.with(ClassElement::Header(remapper.map_header(&header)));
                }
                ClassElement::Field(field) => {
                    builder.with(ClassElement::Field(remapper.map_field(&field)));
                }
                ClassElement::Method(method) => {
                    let descriptor = remapper.map_method_descriptor(&method.descriptor);
                    builder.with_method(&method.name, &descriptor, method.flags, |target| {
                        target.transform(&method, &method_transform)
                    })?;
                }
                ClassElement::Attribute(attribute) => {
                    builder.with(ClassElement::Attribute(remapper.map_attribute(&attribute)));
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{container::Container, descriptor::TypeKind, flags::AccessFlags},
        test::factories::{counter_class, probe_class},
        transform::builder::{build, ClassBuilder},
        Result,
    };

    fn probe_to_target() -> Remapper {
        Remapper::from_map([(Symbol::new("demo/Probe"), Symbol::new("demo/Target"))])
    }

    #[test]
    fn symbols_and_descriptors() {
        let remapper = probe_to_target();
        assert_eq!(remapper.map_symbol(&Symbol::new("demo/Probe")).as_str(), "demo/Target");
        assert_eq!(remapper.map_symbol(&Symbol::new("[[Ldemo/Probe;")).as_str(), "[[Ldemo/Target;");
        assert_eq!(remapper.map_symbol(&Symbol::new("demo/Other")).as_str(), "demo/Other");
        assert_eq!(
            remapper.map_method_descriptor("(Ldemo/Probe;[I)Ldemo/Probe;"),
            "(Ldemo/Target;[I)Ldemo/Target;"
        );
        assert_eq!(
            remapper.map_signature("Ljava/util/List<Ldemo/Probe;>;"),
            "Ljava/util/List<Ldemo/Target;>;"
        );
    }

    #[test]
    fn member_names_are_kept() {
        let remapper = probe_to_target();
        let member = MemberRef::new(Symbol::new("demo/Probe"), "count", "Ldemo/Probe;");
        let mapped = remapper.map_member(&member);
        assert_eq!(mapped.owner.as_str(), "demo/Target");
        assert_eq!(mapped.name, "count");
        assert_eq!(mapped.descriptor, "Ldemo/Target;");
    }

    #[test]
    fn inner_class_names_follow_renames() {
        let remapper = Remapper::from_map([(
            Symbol::new("demo/Outer$Old"),
            Symbol::new("demo/Outer$New"),
        )]);
        let attribute = Attribute::InnerClasses(vec![InnerClass {
            inner: Symbol::new("demo/Outer$Old"),
            outer: Some(Symbol::new("demo/Outer")),
            name: Some("Old".to_string()),
            flags: crate::classfile::flags::AccessFlags::PUBLIC,
        }]);
        let Attribute::InnerClasses(entries) = remapper.map_attribute(&attribute) else {
            panic!("attribute kind changed");
        };
        assert_eq!(entries[0].name.as_deref(), Some("New"));
    }

    #[test]
    fn identity_remap_builds_identical_bytes() -> Result<()> {
        let source = Container::parse(&counter_class()?.to_bytes()?)?;
        let plain = build(&source, &ClassTransform::identity())?;
        let remapped = build(&source, &Remapper::identity().as_class_transform())?;
        assert_eq!(plain, remapped);
        Ok(())
    }

    #[test]
    fn identity_remap_accepts_slots_reused_across_jumps() -> Result<()> {
        // The `long` parameter's upper half is overwritten before it is read, but only
        // along the path control takes, not in listing order.
        let mut class = ClassBuilder::new(Symbol::new("demo/Jumps"), Some(Symbol::new("java/lang/Object")));
        class.with_method("f", "(J)I", AccessFlags::STATIC, |method| {
            method.with_code(|code| {
                let read = code.new_label();
                let write = code.new_label();
                code.goto(write)
                    .label(read)
                    .load(TypeKind::Int, 1)
                    .return_(TypeKind::Int)
                    .label(write)
                    .constant(Constant::Int(0))
                    .store(TypeKind::Int, 1)
                    .goto(read);
                Ok(())
            })?;
            Ok(())
        })?;
        let source = Container::parse(&class.finish().to_bytes()?)?;

        let plain = build(&source, &ClassTransform::identity())?;
        let remapped = build(&source, &Remapper::identity().as_class_transform())?;
        assert_eq!(plain, remapped);
        Ok(())
    }

    #[test]
    fn class_transform_moves_self_references() -> Result<()> {
        let probe = probe_class()?;
        let moved = crate::transform::builder::transform_class(&probe, &probe_to_target().as_class_transform())?;
        assert_eq!(moved.this_symbol().as_str(), "demo/Target");
        let mentions_probe = moved.methods().iter().filter_map(|m| m.code.as_ref()).any(|code| {
            code.instructions().any(|instruction| match instruction {
                Instruction::Field { field, .. } => field.owner.as_str() == "demo/Probe",
                Instruction::Invoke { method, .. } => method.owner.as_str() == "demo/Probe",
                _ => false,
            })
        });
        assert!(!mentions_probe);
        Ok(())
    }
}
