//! Factory methods for test classes.
//!
//! `demo/Target` is a tiny counter, `demo/Probe` mirrors its method signatures and
//! calls into itself where the real method should run.

use crate::{
    classfile::{container::Container, descriptor::TypeKind, flags::AccessFlags, symbol::Symbol},
    code::{instruction::Constant, opcodes},
    transform::builder::ClassBuilder,
    Result,
};

fn object() -> Symbol {
    Symbol::new("java/lang/Object")
}

fn with_constructor(class: &mut ClassBuilder) -> Result<()> {
    class.with_method("<init>", "()V", AccessFlags::PUBLIC, |method| {
        method.with_code(|code| {
            code.load(TypeKind::Reference, 0)
                .invoke_special(&object(), "<init>", "()V")
                .return_(TypeKind::Void);
            Ok(())
        })?;
        Ok(())
    })?;
    Ok(())
}

/// Emit `this.<name> += 1` for an `int` field of `owner`.
fn increment_field(code: &mut crate::transform::CodeBuilder, owner: &Symbol, name: &str) {
    code.load(TypeKind::Reference, 0)
        .operation(opcodes::DUP)
        .get_field(owner, name, "I")
        .constant(Constant::Int(1))
        .operation(opcodes::IADD)
        .put_field(owner, name, "I");
}

/// `demo/Target`: field `count:I` and the methods `<init>`, `bump()V`, `next(I)I`,
/// static `add(JI)J` and `reset()V`.
///
/// `next(x)` returns `0` for negative `x` and `x + 1` otherwise.
pub fn counter_class() -> Result<Container> {
    let this = Symbol::new("demo/Target");
    let mut class = ClassBuilder::new(this.clone(), Some(object()));
    class.with_field("count", "I", AccessFlags::PRIVATE);
    with_constructor(&mut class)?;

    class.with_method("bump", "()V", AccessFlags::PUBLIC, |method| {
        method.with_code(|code| {
            increment_field(code, &this, "count");
            code.return_(TypeKind::Void);
            Ok(())
        })?;
        Ok(())
    })?;

    class.with_method("next", "(I)I", AccessFlags::PUBLIC, |method| {
        method.with_code(|code| {
            let positive = code.new_label();
            code.load(TypeKind::Int, 1)
                .branch(opcodes::IFGE, positive)
                .constant(Constant::Int(0))
                .return_(TypeKind::Int)
                .label(positive)
                .load(TypeKind::Int, 1)
                .constant(Constant::Int(1))
                .operation(opcodes::IADD)
                .return_(TypeKind::Int);
            Ok(())
        })?;
        Ok(())
    })?;

    class.with_method("add", "(JI)J", AccessFlags::PUBLIC | AccessFlags::STATIC, |method| {
        method.with_code(|code| {
            code.load(TypeKind::Long, 0)
                .load(TypeKind::Int, 2)
                .operation(opcodes::I2L)
                .operation(opcodes::LADD)
                .return_(TypeKind::Long);
            Ok(())
        })?;
        Ok(())
    })?;

    class.with_method("reset", "()V", AccessFlags::PUBLIC, |method| {
        method.with_code(|code| {
            code.load(TypeKind::Reference, 0)
                .constant(Constant::Int(0))
                .put_field(&this, "count", "I")
                .return_(TypeKind::Void);
            Ok(())
        })?;
        Ok(())
    })?;

    Ok(class.finish())
}

/// `demo/Probe`: field `seen:I`, the Target signatures except `reset`, and a `helper()V`.
///
/// - `bump` increments `seen` around a call to itself
/// - `next(x)` returns `100 + next(x) + 4`
/// - `add(a, b)` returns `add(a, b) + 1`
pub fn probe_class() -> Result<Container> {
    let this = Symbol::new("demo/Probe");
    let mut class = ClassBuilder::new(this.clone(), Some(object()));
    class.with_field("seen", "I", AccessFlags::PRIVATE);
    with_constructor(&mut class)?;

    class.with_method("bump", "()V", AccessFlags::PUBLIC, |method| {
        method.with_code(|code| {
            increment_field(code, &this, "seen");
            code.load(TypeKind::Reference, 0)
                .invoke_virtual(&this, "bump", "()V");
            increment_field(code, &this, "seen");
            code.return_(TypeKind::Void);
            Ok(())
        })?;
        Ok(())
    })?;

    class.with_method("next", "(I)I", AccessFlags::PUBLIC, |method| {
        method.with_code(|code| {
            code.constant(Constant::Int(100))
                .load(TypeKind::Reference, 0)
                .load(TypeKind::Int, 1)
                .invoke_virtual(&this, "next", "(I)I")
                .operation(opcodes::IADD)
                .constant(Constant::Int(4))
                .operation(opcodes::IADD)
                .return_(TypeKind::Int);
            Ok(())
        })?;
        Ok(())
    })?;

    class.with_method("add", "(JI)J", AccessFlags::PUBLIC | AccessFlags::STATIC, |method| {
        method.with_code(|code| {
            code.load(TypeKind::Long, 0)
                .load(TypeKind::Int, 2)
                .invoke_static(&this, "add", "(JI)J")
                .constant(Constant::Long(1))
                .operation(opcodes::LADD)
                .return_(TypeKind::Long);
            Ok(())
        })?;
        Ok(())
    })?;

    class.with_method("helper", "()V", AccessFlags::PRIVATE | AccessFlags::STATIC, |method| {
        method.with_code(|code| {
            code.return_(TypeKind::Void);
            Ok(())
        })?;
        Ok(())
    })?;

    Ok(class.finish())
}
