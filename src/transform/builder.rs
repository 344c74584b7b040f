//! Builders for classes, methods and method bodies.
//!
//! Builders are the write side of a replay. A [`ClassBuilder`] collects
//! [`ClassElement`]s, a [`MethodBuilder`] collects [`MethodElement`]s and a
//! [`CodeBuilder`] collects [`CodeElement`]s; each folds its elements into the immutable
//! model type when finished. Transforms only ever append to a builder, so the source of
//! a replay is never touched.
//!
//! [`CodeBuilder::finish`] is where body-level structure is checked and where
//! `max_stack`/`max_locals` are recomputed, so every body that reaches the writer has
//! resolved labels, well-ordered exception ranges and correct frame sizes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//!
//! let mut class = ClassBuilder::new(Symbol::new("demo/Hello"), Some(Symbol::new("java/lang/Object")));
//! class.with_method("answer", "()I", AccessFlags::PUBLIC | AccessFlags::STATIC, |method| {
//!     method.with_code(|code| {
//!         code.constant(Constant::Int(42)).return_(TypeKind::Int);
//!         Ok(())
//!     })?;
//!     Ok(())
//! })?;
//! let bytes = class.finish().to_bytes()?;
//! # Ok::<(), classweave::Error>(())
//! ```

use std::sync::Arc;

use log::trace;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::{
    classfile::{
        attribute::Attribute,
        constpool::ConstantPool,
        container::{ClassElement, ClassHeader, Container, FieldDecl, MethodDecl, MethodElement},
        descriptor::{MethodDescriptor, TypeKind},
        flags::AccessFlags,
        symbol::{MemberRef, Symbol},
    },
    code::{
        analysis,
        body::CodeBody,
        encoder::validate_labels,
        instruction::{next_scope, CodeElement, Constant, ExceptionRange, Instruction, Label},
        opcodes,
    },
    transform::{ClassTransform, CodeTransform, ElementBuilder, MethodTransform},
    Error, Result,
};

/// Options applied while finishing built bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Reject bodies that read the upper half of a category-2 local (default `true`)
    pub verify_slot_widths: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            verify_slot_widths: true,
        }
    }
}

/// Collects class elements into a new [`Container`].
pub struct ClassBuilder {
    header: ClassHeader,
    elements: Vec<ClassElement>,
    pool: Option<Arc<ConstantPool>>,
    options: BuildOptions,
}

impl ClassBuilder {
    /// Start a new class from scratch.
    #[must_use]
    pub fn new(this_symbol: Symbol, super_symbol: Option<Symbol>) -> Self {
        ClassBuilder {
            header: ClassHeader::new(this_symbol, super_symbol),
            elements: Vec::new(),
            pool: None,
            options: BuildOptions::default(),
        }
    }

    /// Start the new version of `source`.
    ///
    /// The result is written on top of the source's constant pool, so attributes carried
    /// verbatim stay valid.
    #[must_use]
    pub fn from_source(source: &Container, options: BuildOptions) -> Self {
        ClassBuilder {
            header: source.header().clone(),
            elements: Vec::new(),
            pool: source.constant_pool().cloned(),
            options,
        }
    }

    /// Replace the build options.
    pub fn set_options(&mut self, options: BuildOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// The options used for nested method and code builders.
    #[must_use]
    pub fn options(&self) -> BuildOptions {
        self.options
    }

    /// The class's own symbol, as of the most recent header.
    #[must_use]
    pub fn this_symbol(&self) -> &Symbol {
        self.elements
            .iter()
            .rev()
            .find_map(|element| match element {
                ClassElement::Header(header) => Some(&header.this_symbol),
                _ => None,
            })
            .unwrap_or(&self.header.this_symbol)
    }

    /// Declare a field without attributes.
    pub fn with_field(
        &mut self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        flags: AccessFlags,
    ) -> &mut Self {
        self.with(ClassElement::Field(FieldDecl {
            name: name.into(),
            descriptor: descriptor.into(),
            flags,
            attributes: Vec::new(),
        }))
    }

    /// Declare a method and fill it in with `build`.
    ///
    /// # Errors
    /// Returns an error if the descriptor is invalid or `build` fails.
    pub fn with_method<F>(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: AccessFlags,
        build: F,
    ) -> Result<&mut Self>
    where
        F: FnOnce(&mut MethodBuilder) -> Result<()>,
    {
        let mut method = MethodBuilder::new(name, descriptor, flags, self.options)?;
        build(&mut method)?;
        let method = method.finish()?;
        Ok(self.with(ClassElement::Method(method)))
    }

    /// Add the result of replaying `method` through `transform`.
    ///
    /// # Errors
    /// Returns whatever the transform or the nested builders report.
    pub fn transform_method(
        &mut self,
        method: &MethodDecl,
        transform: &MethodTransform,
    ) -> Result<&mut Self> {
        self.with_method(&method.name, &method.descriptor, method.flags, |builder| {
            builder.transform(method, transform)
        })
    }

    /// Replay every element of `source` through `transform` into this builder.
    ///
    /// # Errors
    /// Returns the first error raised by the transform.
    pub fn transform(&mut self, source: &Container, transform: &ClassTransform) -> Result<()> {
        trace!("replaying class {}", source.this_symbol());
        let mut stage = transform.start();
        for element in source.elements() {
            stage.accept(self, element)?;
        }
        stage.at_end(self)
    }

    /// Fold the collected elements into a [`Container`]. The last header wins.
    #[must_use]
    pub fn finish(self) -> Container {
        let mut header = self.header;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut attributes = Vec::new();
        for element in self.elements {
            match element {
                ClassElement::Header(replacement) => header = replacement,
                ClassElement::Field(field) => fields.push(field),
                ClassElement::Method(method) => methods.push(method),
                ClassElement::Attribute(attribute) => attributes.push(attribute),
            }
        }
        Container::from_parts(header, fields, methods, attributes, self.pool)
    }
}

impl ElementBuilder for ClassBuilder {
    type Element = ClassElement;

    fn with(&mut self, element: ClassElement) -> &mut Self {
        self.elements.push(element);
        self
    }

    fn swap_output(&mut self, output: Vec<ClassElement>) -> Vec<ClassElement> {
        std::mem::replace(&mut self.elements, output)
    }
}

/// Collects method elements into a new [`MethodDecl`].
pub struct MethodBuilder {
    name: String,
    descriptor: String,
    flags: AccessFlags,
    parsed: MethodDescriptor,
    elements: Vec<MethodElement>,
    options: BuildOptions,
}

impl MethodBuilder {
    /// Start a method with the given signature.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDescriptor`] if `descriptor` is not a method descriptor.
    pub fn new(
        name: &str,
        descriptor: &str,
        flags: AccessFlags,
        options: BuildOptions,
    ) -> Result<Self> {
        Ok(MethodBuilder {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags,
            parsed: MethodDescriptor::parse(descriptor)?,
            elements: Vec::new(),
            options,
        })
    }

    /// The method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method descriptor string.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// The parsed method descriptor.
    #[must_use]
    pub fn method_descriptor(&self) -> &MethodDescriptor {
        &self.parsed
    }

    /// The method access flags.
    #[must_use]
    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    fn code_builder(&self) -> CodeBuilder {
        CodeBuilder::new(self.flags, self.parsed.clone(), self.options)
    }

    /// Build the method body with `build`.
    ///
    /// # Errors
    /// Returns an error if `build` fails or the finished body is structurally invalid.
    pub fn with_code<F>(&mut self, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut CodeBuilder) -> Result<()>,
    {
        let mut code = self.code_builder();
        build(&mut code)?;
        let body = code.finish()?;
        Ok(self.with(MethodElement::Code(body)))
    }

    /// Build the method body by replaying `body` through `transform`.
    ///
    /// The new body reserves at least as many locals as `body` declared.
    ///
    /// # Errors
    /// Returns the first error raised by the transform or by body finalisation.
    pub fn transform_code(&mut self, body: &CodeBody, transform: &CodeTransform) -> Result<&mut Self> {
        let mut code = self.code_builder();
        code.ensure_locals(body.max_locals());
        code.transform(body, transform)?;
        let body = code.finish()?;
        Ok(self.with(MethodElement::Code(body)))
    }

    /// Replay the elements of `method` through `transform` into this builder.
    ///
    /// # Errors
    /// Returns the first error raised by the transform.
    pub fn transform(&mut self, method: &MethodDecl, transform: &MethodTransform) -> Result<()> {
        trace!("replaying method {}{}", method.name, method.descriptor);
        let mut stage = transform.start();
        for element in method.elements() {
            stage.accept(self, element)?;
        }
        stage.at_end(self)
    }

    /// Fold the collected elements into a [`MethodDecl`].
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if more than one body was emitted, or a body was
    /// emitted for an abstract or native method.
    pub fn finish(self) -> Result<MethodDecl> {
        let mut code = None;
        let mut attributes: Vec<Attribute> = Vec::new();
        for element in self.elements {
            match element {
                MethodElement::Code(body) => {
                    if code.replace(body).is_some() {
                        return Err(malformed_error!(
                            "Method {}{} received more than one body",
                            self.name,
                            self.descriptor
                        ));
                    }
                }
                MethodElement::Attribute(attribute) => attributes.push(attribute),
            }
        }
        if code.is_some() && self.flags.forbids_code() {
            return Err(malformed_error!(
                "Abstract or native method {}{} cannot have code",
                self.name,
                self.descriptor
            ));
        }
        Ok(MethodDecl {
            name: self.name,
            descriptor: self.descriptor,
            flags: self.flags,
            code,
            attributes,
        })
    }
}

impl ElementBuilder for MethodBuilder {
    type Element = MethodElement;

    fn with(&mut self, element: MethodElement) -> &mut Self {
        self.elements.push(element);
        self
    }

    fn swap_output(&mut self, output: Vec<MethodElement>) -> Vec<MethodElement> {
        std::mem::replace(&mut self.elements, output)
    }
}

/// Collects code elements into a new [`CodeBody`].
///
/// Labels handed out by [`CodeBuilder::new_label`] belong to this builder's scope. Local
/// slots handed out by [`CodeBuilder::allocate_local`] start above the method's entry
/// footprint and above every slot reserved with [`CodeBuilder::ensure_locals`].
pub struct CodeBuilder {
    scope: u32,
    next_label: u32,
    elements: Vec<CodeElement>,
    flags: AccessFlags,
    descriptor: MethodDescriptor,
    next_local: u16,
    options: BuildOptions,
}

impl CodeBuilder {
    pub(crate) fn new(flags: AccessFlags, descriptor: MethodDescriptor, options: BuildOptions) -> Self {
        let next_local = descriptor.footprint(flags);
        CodeBuilder {
            scope: next_scope(),
            next_label: 0,
            elements: Vec::new(),
            flags,
            descriptor,
            next_local,
            options,
        }
    }

    /// Access flags of the method being built.
    #[must_use]
    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    /// Descriptor of the method being built.
    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// A new label, not yet placed.
    pub fn new_label(&mut self) -> Label {
        let label = Label::new(self.scope, self.next_label);
        self.next_label += 1;
        label
    }

    /// Place `label` before the next instruction.
    pub fn label(&mut self, label: Label) -> &mut Self {
        self.with(CodeElement::Label(label))
    }

    /// The first local slot not yet reserved.
    #[must_use]
    pub fn next_local(&self) -> u16 {
        self.next_local
    }

    /// Reserve a fresh local of `kind` and return its slot.
    ///
    /// # Errors
    /// Returns [`Error::LimitExceeded`] once the slot space is exhausted.
    pub fn allocate_local(&mut self, kind: TypeKind) -> Result<u16> {
        let slot = self.next_local;
        self.next_local = slot
            .checked_add(kind.slot_size().max(1))
            .ok_or_else(|| Error::LimitExceeded("local slots exhausted".to_string()))?;
        Ok(slot)
    }

    /// Reserve every slot below `limit`.
    pub fn ensure_locals(&mut self, limit: u16) -> &mut Self {
        self.next_local = self.next_local.max(limit);
        self
    }

    /// Emit `build`'s code followed by the label passed to it.
    ///
    /// Branching to the label leaves the block.
    ///
    /// # Errors
    /// Returns whatever `build` returns.
    pub fn block<F>(&mut self, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut CodeBuilder, Label) -> Result<()>,
    {
        let exit = self.new_label();
        build(self, exit)?;
        Ok(self.label(exit))
    }

    /// Emit an instruction.
    pub fn instruction(&mut self, instruction: Instruction) -> &mut Self {
        self.with(CodeElement::Instruction(instruction))
    }

    /// Emit an operand-less opcode.
    pub fn operation(&mut self, opcode: u8) -> &mut Self {
        self.instruction(Instruction::Operation(opcode))
    }

    /// Push a constant.
    pub fn constant(&mut self, constant: Constant) -> &mut Self {
        self.instruction(Instruction::Constant(constant))
    }

    /// Push a local.
    pub fn load(&mut self, kind: TypeKind, slot: u16) -> &mut Self {
        self.instruction(Instruction::Load {
            kind: kind.computational(),
            slot,
        })
    }

    /// Pop into a local.
    pub fn store(&mut self, kind: TypeKind, slot: u16) -> &mut Self {
        self.instruction(Instruction::Store {
            kind: kind.computational(),
            slot,
        })
    }

    /// Increment an `int` local.
    pub fn iinc(&mut self, slot: u16, delta: i16) -> &mut Self {
        self.instruction(Instruction::Increment { slot, delta })
    }

    /// Emit a field access.
    pub fn field(&mut self, opcode: u8, owner: &Symbol, name: &str, descriptor: &str) -> &mut Self {
        self.instruction(Instruction::Field {
            opcode,
            field: MemberRef::new(owner.clone(), name, descriptor),
        })
    }

    /// `getstatic`
    pub fn get_static(&mut self, owner: &Symbol, name: &str, descriptor: &str) -> &mut Self {
        self.field(opcodes::GETSTATIC, owner, name, descriptor)
    }

    /// `putstatic`
    pub fn put_static(&mut self, owner: &Symbol, name: &str, descriptor: &str) -> &mut Self {
        self.field(opcodes::PUTSTATIC, owner, name, descriptor)
    }

    /// `getfield`
    pub fn get_field(&mut self, owner: &Symbol, name: &str, descriptor: &str) -> &mut Self {
        self.field(opcodes::GETFIELD, owner, name, descriptor)
    }

    /// `putfield`
    pub fn put_field(&mut self, owner: &Symbol, name: &str, descriptor: &str) -> &mut Self {
        self.field(opcodes::PUTFIELD, owner, name, descriptor)
    }

    /// Emit a method invocation on a class (`interface` is `false`).
    pub fn invoke(&mut self, opcode: u8, owner: &Symbol, name: &str, descriptor: &str) -> &mut Self {
        self.instruction(Instruction::Invoke {
            opcode,
            method: MemberRef::new(owner.clone(), name, descriptor),
            interface: opcode == opcodes::INVOKEINTERFACE,
        })
    }

    /// `invokestatic`
    pub fn invoke_static(&mut self, owner: &Symbol, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(opcodes::INVOKESTATIC, owner, name, descriptor)
    }

    /// `invokevirtual`
    pub fn invoke_virtual(&mut self, owner: &Symbol, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(opcodes::INVOKEVIRTUAL, owner, name, descriptor)
    }

    /// `invokespecial`
    pub fn invoke_special(&mut self, owner: &Symbol, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(opcodes::INVOKESPECIAL, owner, name, descriptor)
    }

    /// `new`
    pub fn new_object(&mut self, symbol: &Symbol) -> &mut Self {
        self.instruction(Instruction::Type {
            opcode: opcodes::NEW,
            symbol: symbol.clone(),
        })
    }

    /// A conditional branch, `goto` or `jsr` to `target`.
    pub fn branch(&mut self, opcode: u8, target: Label) -> &mut Self {
        self.instruction(Instruction::Branch { opcode, target })
    }

    /// `goto target`
    pub fn goto(&mut self, target: Label) -> &mut Self {
        self.branch(opcodes::GOTO, target)
    }

    /// Return a value of `kind`, or nothing for [`TypeKind::Void`].
    pub fn return_(&mut self, kind: TypeKind) -> &mut Self {
        self.instruction(Instruction::Return(kind.computational()))
    }

    /// Protect `[start, end)` with the handler at `handler`.
    pub fn exception_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<Symbol>,
    ) -> &mut Self {
        self.with(CodeElement::ExceptionRange(ExceptionRange {
            start,
            end,
            handler,
            catch_type,
        }))
    }

    /// Attribute the next instruction to source `line`.
    pub fn line_number(&mut self, line: u16) -> &mut Self {
        self.with(CodeElement::LineNumber(line))
    }

    /// Replay the elements of `body` through `transform` into this builder.
    ///
    /// # Errors
    /// Returns the first error raised by the transform.
    pub fn transform(&mut self, body: &CodeBody, transform: &CodeTransform) -> Result<&mut Self> {
        let mut stage = transform.start();
        for element in body {
            stage.accept(self, element.clone())?;
        }
        stage.at_end(self)?;
        Ok(self)
    }

    fn check_ranges(elements: &[CodeElement]) -> Result<()> {
        let mut ordinals = FxHashMap::default();
        let mut ordinal = 0usize;
        for element in elements {
            match element {
                CodeElement::Label(label) => {
                    ordinals.insert(*label, ordinal);
                }
                CodeElement::Instruction(_) => ordinal += 1,
                _ => {}
            }
        }
        for element in elements {
            if let CodeElement::ExceptionRange(range) = element {
                let start = ordinals.get(&range.start).copied().unwrap_or(0);
                let end = ordinals.get(&range.end).copied().unwrap_or(0);
                let handler = ordinals.get(&range.handler).copied().unwrap_or(0);
                if start >= end {
                    return Err(Error::MalformedExceptionRange(format!(
                        "{} to {} covers no instruction",
                        range.start, range.end
                    )));
                }
                if handler >= ordinal {
                    return Err(Error::MalformedExceptionRange(format!(
                        "handler {} is past the last instruction",
                        range.handler
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate the collected elements and fold them into a [`CodeBody`].
    ///
    /// Labels are renumbered densely into a fresh scope, `max_stack` is recomputed and
    /// `max_locals` covers every referenced and reserved slot.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateLabel`], [`Error::UnresolvedLabel`],
    /// [`Error::MalformedExceptionRange`], [`Error::SlotWidthViolation`] or an analysis
    /// error.
    pub fn finish(self) -> Result<CodeBody> {
        let elements = self.elements;
        if !elements
            .iter()
            .any(|element| matches!(element, CodeElement::Instruction(_)))
        {
            return Err(malformed_error!("Code body has no instructions"));
        }
        validate_labels(&elements)?;
        Self::check_ranges(&elements)?;
        if self.options.verify_slot_widths {
            analysis::check_slot_widths(&elements, &self.descriptor.entry_locals(self.flags))?;
        }

        let scope = next_scope();
        let mut count = 0u32;
        let mut renumbered: FxHashMap<Label, Label> = FxHashMap::default();
        let mut renumber = |label: Label| {
            *renumbered.entry(label).or_insert_with(|| {
                let fresh = Label::new(scope, count);
                count += 1;
                fresh
            })
        };
        for element in &elements {
            if let CodeElement::Label(label) = element {
                renumber(*label);
            }
        }
        let elements: Vec<CodeElement> = elements
            .into_iter()
            .map(|element| element.map_labels(&mut renumber))
            .collect();

        let max_stack = analysis::max_stack(&elements)?;
        let max_locals = analysis::max_locals(&elements, self.descriptor.footprint(self.flags))?
            .max(self.next_local);
        Ok(CodeBody::from_parts(scope, count, elements, max_stack, max_locals))
    }
}

impl ElementBuilder for CodeBuilder {
    type Element = CodeElement;

    fn with(&mut self, element: CodeElement) -> &mut Self {
        self.elements.push(element);
        self
    }

    fn swap_output(&mut self, output: Vec<CodeElement>) -> Vec<CodeElement> {
        std::mem::replace(&mut self.elements, output)
    }
}

/// Replay `source` through `transform` into a new container.
///
/// # Errors
/// Returns the first error raised while replaying or finishing.
pub fn transform_class(source: &Container, transform: &ClassTransform) -> Result<Container> {
    transform_class_with(source, transform, BuildOptions::default())
}

/// [`transform_class`] with explicit build options.
///
/// # Errors
/// Returns the first error raised while replaying or finishing.
pub fn transform_class_with(
    source: &Container,
    transform: &ClassTransform,
    options: BuildOptions,
) -> Result<Container> {
    let mut builder = ClassBuilder::from_source(source, options);
    builder.transform(source, transform)?;
    Ok(builder.finish())
}

/// Replay `source` through `transform` and encode the result.
///
/// # Errors
/// Returns the first error raised while replaying, finishing or encoding.
pub fn build(source: &Container, transform: &ClassTransform) -> Result<Vec<u8>> {
    transform_class(source, transform)?.to_bytes()
}

/// [`build`] every container in parallel. Results are in input order.
#[must_use]
pub fn build_all(sources: &[Container], transform: &ClassTransform) -> Vec<Result<Vec<u8>>> {
    sources
        .par_iter()
        .map(|source| build(source, transform))
        .collect()
}

/// Replay one method through `transform`.
///
/// # Errors
/// Returns the first error raised while replaying or finishing.
pub fn transform_method(method: &MethodDecl, transform: &MethodTransform) -> Result<MethodDecl> {
    let mut builder = MethodBuilder::new(
        &method.name,
        &method.descriptor,
        method.flags,
        BuildOptions::default(),
    )?;
    builder.transform(method, transform)?;
    builder.finish()
}

/// Replay one method body through `transform`.
///
/// `flags` and `descriptor` describe the method the body belongs to.
///
/// # Errors
/// Returns the first error raised while replaying or finishing.
pub fn transform_code(
    body: &CodeBody,
    flags: AccessFlags,
    descriptor: &MethodDescriptor,
    transform: &CodeTransform,
) -> Result<CodeBody> {
    let mut builder = CodeBuilder::new(flags, descriptor.clone(), BuildOptions::default());
    builder.ensure_locals(body.max_locals());
    builder.transform(body, transform)?;
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::counter_class;

    fn static_int() -> MethodDescriptor {
        MethodDescriptor::parse("(I)I").unwrap()
    }

    #[test]
    fn finish_recomputes_frame_sizes() -> Result<()> {
        let mut code = CodeBuilder::new(AccessFlags::STATIC, static_int(), BuildOptions::default());
        let wide = code.allocate_local(TypeKind::Long)?;
        assert_eq!(wide, 1);
        code.load(TypeKind::Int, 0)
            .operation(opcodes::I2L)
            .store(TypeKind::Long, wide)
            .load(TypeKind::Int, 0)
            .constant(Constant::Int(7))
            .operation(opcodes::IADD)
            .return_(TypeKind::Int);
        let body = code.finish()?;
        assert_eq!(body.max_stack(), 2);
        assert_eq!(body.max_locals(), 3);
        Ok(())
    }

    #[test]
    fn block_places_exit_label() -> Result<()> {
        let mut code = CodeBuilder::new(AccessFlags::STATIC, static_int(), BuildOptions::default());
        code.block(|b, exit| {
            b.load(TypeKind::Int, 0).branch(opcodes::IFEQ, exit);
            b.iinc(0, 1);
            Ok(())
        })?;
        code.load(TypeKind::Int, 0).return_(TypeKind::Int);
        let body = code.finish()?;
        assert_eq!(body.labels().count(), 1);
        assert_eq!(body.label_count(), 1);
        Ok(())
    }

    #[test]
    fn finish_rejects_unresolved_and_duplicate_labels() {
        let mut code = CodeBuilder::new(AccessFlags::STATIC, static_int(), BuildOptions::default());
        let nowhere = code.new_label();
        code.goto(nowhere);
        assert!(matches!(code.finish(), Err(Error::UnresolvedLabel(l)) if l == nowhere));

        let mut code = CodeBuilder::new(AccessFlags::STATIC, static_int(), BuildOptions::default());
        let twice = code.new_label();
        code.label(twice).load(TypeKind::Int, 0);
        code.label(twice).return_(TypeKind::Int);
        assert!(matches!(code.finish(), Err(Error::DuplicateLabel(l)) if l == twice));
    }

    #[test]
    fn finish_rejects_inverted_range() {
        let mut code = CodeBuilder::new(AccessFlags::STATIC, static_int(), BuildOptions::default());
        let (start, end, handler) = (code.new_label(), code.new_label(), code.new_label());
        code.exception_catch(start, end, handler, None)
            .label(end)
            .load(TypeKind::Int, 0)
            .label(start)
            .return_(TypeKind::Int)
            .label(handler)
            .operation(opcodes::ATHROW);
        assert!(matches!(code.finish(), Err(Error::MalformedExceptionRange(_))));
    }

    #[test]
    fn slot_width_check_can_be_disabled() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(J)I")?;
        let emit = |code: &mut CodeBuilder| {
            code.load(TypeKind::Int, 1).return_(TypeKind::Int);
        };

        let mut code = CodeBuilder::new(AccessFlags::STATIC, descriptor.clone(), BuildOptions::default());
        emit(&mut code);
        assert!(matches!(
            code.finish(),
            Err(Error::SlotWidthViolation { slot: 1, .. })
        ));

        let lenient = BuildOptions {
            verify_slot_widths: false,
        };
        let mut code = CodeBuilder::new(AccessFlags::STATIC, descriptor, lenient);
        emit(&mut code);
        code.finish()?;
        Ok(())
    }

    #[test]
    fn identity_replay_preserves_class() -> Result<()> {
        let source = counter_class()?;
        let copy = transform_class(&source, &ClassTransform::identity())?;
        assert_eq!(copy.header(), source.header());
        assert_eq!(copy.fields(), source.fields());
        assert_eq!(copy.methods().len(), source.methods().len());
        for (a, b) in copy.methods().iter().zip(source.methods()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.code, b.code);
        }
        Ok(())
    }

    #[test]
    fn second_body_is_rejected() -> Result<()> {
        let source = counter_class()?;
        let method = &source.methods()[0];
        let doubled = MethodTransform::of(|b: &mut MethodBuilder, e| {
            b.with(e.clone()).with(e);
            Ok(())
        });
        assert!(matches!(
            transform_method(method, &doubled),
            Err(Error::Malformed { .. })
        ));
        Ok(())
    }

    #[test]
    fn build_all_keeps_order() -> Result<()> {
        let classes = vec![counter_class()?, counter_class()?];
        let results = build_all(&classes, &ClassTransform::identity());
        assert_eq!(results.len(), 2);
        for bytes in results {
            let parsed = Container::parse(&bytes?)?;
            assert_eq!(parsed.this_symbol(), classes[0].this_symbol());
        }
        Ok(())
    }
}
