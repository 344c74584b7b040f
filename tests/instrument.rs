//! Integration tests for method instrumentation through the public API.

use classweave::{prelude::*, Result};

fn target() -> Symbol {
    Symbol::new("demo/Service")
}

fn timer() -> Symbol {
    Symbol::new("demo/Timer")
}

fn object() -> Symbol {
    Symbol::new("java/lang/Object")
}

/// `demo/Service.handle(I)I` returns `x * 2`, with a branch so the inlined copy has labels.
fn service_class() -> Result<Container> {
    let this = target();
    let mut class = ClassBuilder::new(this.clone(), Some(object()));
    class.with_field("calls", "I", AccessFlags::PRIVATE);
    class.with_method("handle", "(I)I", AccessFlags::PUBLIC, |method| {
        method.with_code(|code| {
            let zero = code.new_label();
            code.load(TypeKind::Int, 1)
                .branch(opcodes::IFEQ, zero)
                .load(TypeKind::Int, 1)
                .constant(Constant::Int(2))
                .operation(opcodes::IMUL)
                .return_(TypeKind::Int)
                .label(zero)
                .constant(Constant::Int(0))
                .return_(TypeKind::Int);
            Ok(())
        })?;
        Ok(())
    })?;
    Ok(class.finish())
}

/// `demo/Timer.handle(I)I` calls itself twice, then reports through `record(I)V`.
fn timer_class() -> Result<Container> {
    let this = timer();
    let mut class = ClassBuilder::new(this.clone(), Some(object()));
    class.with_field("started", "J", AccessFlags::PRIVATE | AccessFlags::STATIC);
    class.with_method("handle", "(I)I", AccessFlags::PUBLIC, |method| {
        method.with_code(|code| {
            let result = code.allocate_local(TypeKind::Int)?;
            code.load(TypeKind::Reference, 0)
                .load(TypeKind::Int, 1)
                .invoke_virtual(&this, "handle", "(I)I")
                .load(TypeKind::Reference, 0)
                .load(TypeKind::Int, 1)
                .invoke_virtual(&this, "handle", "(I)I")
                .operation(opcodes::IADD)
                .store(TypeKind::Int, result)
                .load(TypeKind::Int, result)
                .invoke_static(&this, "record", "(I)V")
                .load(TypeKind::Int, result)
                .return_(TypeKind::Int);
            Ok(())
        })?;
        Ok(())
    })?;
    class.with_method("record", "(I)V", AccessFlags::PRIVATE | AccessFlags::STATIC, |method| {
        method.with_code(|code| {
            code.return_(TypeKind::Void);
            Ok(())
        })?;
        Ok(())
    })?;
    Ok(class.finish())
}

fn handle(class: &Container) -> &CodeBody {
    class
        .find_method("handle", "(I)I")
        .and_then(|method| method.code.as_ref())
        .expect("handle has code")
}

#[test]
fn self_calls_are_replaced_by_the_original_body() -> Result<()> {
    let service = Container::parse(&service_class()?.to_bytes()?)?;
    let instrumentor = Container::parse(&timer_class()?.to_bytes()?)?;
    let bytes = instrument(&service, &instrumentor, |m| m.name == "handle")?;
    let result = Container::parse(&bytes)?;

    assert_eq!(result.this_symbol(), &target());
    let body = handle(&result);
    let self_calls = body
        .instructions()
        .filter(|i| {
            matches!(i, Instruction::Invoke { method, .. }
                if method.name == "handle")
        })
        .count();
    assert_eq!(self_calls, 0);

    // The helper call now points at the target, and nothing mentions the instrumentor.
    let mentions_timer = body.instructions().any(|i| match i {
        Instruction::Invoke { method, .. } => method.owner == timer(),
        Instruction::Field { field, .. } => field.owner == timer(),
        _ => false,
    });
    assert!(!mentions_timer);

    // Two inlined copies, each with its own branch and return rewritten to a jump.
    let multiplies = body
        .instructions()
        .filter(|i| matches!(i, Instruction::Operation(opcodes::IMUL)))
        .count();
    let returns = body
        .instructions()
        .filter(|i| matches!(i, Instruction::Return(_)))
        .count();
    assert_eq!(multiplies, 2);
    assert_eq!(returns, 1);

    // Locals: this, x, the timer's result, then two shifted copies of (this, x) reusing
    // the same region, plus one result slot per inlined call.
    assert!(body.max_locals() >= 6);
    Ok(())
}

#[test]
fn missing_members_are_appended_once() -> Result<()> {
    let service = service_class()?;
    let instrumentor = timer_class()?;
    let options = InstrumentOptions::default();
    let once = instrument_container(&service, &instrumentor, |m| m.name == "handle", &options)?;

    let fields: Vec<_> = once.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, ["calls", "started"]);
    assert!(once.find_method("record", "(I)V").is_some());

    let twice = instrument_container(&once, &instrumentor, |_| false, &options)?;
    assert_eq!(twice.fields().len(), 2);
    assert_eq!(twice.methods().len(), 2);
    Ok(())
}

#[test]
fn composition_errors_leave_nothing_half_built() -> Result<()> {
    let service = service_class()?;
    let empty = ClassBuilder::new(timer(), Some(object())).finish();
    assert!(matches!(
        instrument(&service, &empty, |m| m.name == "handle"),
        Err(Error::MissingInstrumentorCode { name, descriptor })
            if name == "handle" && descriptor == "(I)I"
    ));

    let mut clash = ClassBuilder::new(timer(), Some(object()));
    clash.with_field("calls", "J", AccessFlags::PRIVATE);
    let clash = clash.finish();
    let strict = InstrumentOptions {
        collision_policy: CollisionPolicy::NameOnly,
        ..InstrumentOptions::default()
    };
    assert!(matches!(
        instrument_container(&service, &clash, |_| false, &strict),
        Err(Error::MemberCollision { .. })
    ));
    Ok(())
}
