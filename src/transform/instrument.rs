//! Splicing one class's methods into another.
//!
//! [`instrument`] rewrites the methods of a *target* class selected by a predicate. Each
//! selected method gets the body of the same-signature method of an *instrumentor* class,
//! with the instrumentor's self references redirected to the target. Inside that body,
//! every call to the method being rewritten is replaced by the target's original body:
//!
//! 1. the receiver and arguments are popped into locals above the instrumentor's own,
//! 2. the original body is replayed shifted onto those locals and with fresh labels,
//! 3. each of its returns becomes a jump to the end of the inlined block, storing the
//!    returned value in a dedicated local first,
//! 4. after the block the value is loaded again, exactly what the call would have left.
//!
//! Finally the instrumentor's fields and non-constructor methods that the target lacks
//! are appended, remapped the same way.
//!
//! Every composition error (missing instrumentor code, a selected method without code,
//! a member collision under the strict policy) is detected before anything is built.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//!
//! let target = Container::parse(&std::fs::read("Target.class")?)?;
//! let probe = Container::parse(&std::fs::read("Probe.class")?)?;
//! let bytes = instrument(&target, &probe, |method| method.name == "bump")?;
//! std::fs::write("Target.class", bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    classfile::{
        container::{ClassElement, Container, MethodDecl, MethodElement},
        descriptor::TypeKind,
        flags::AccessFlags,
        symbol::Symbol,
    },
    code::{
        body::CodeBody,
        instruction::{CodeElement, Instruction, Label},
    },
    transform::{
        builder::{transform_class_with, BuildOptions, ClassBuilder, CodeBuilder},
        relabel::LabelRelabeler,
        remap::Remapper,
        shift::LocalSlotShifter,
        ClassTransform, CodeTransform, ElementBuilder,
    },
    Error, Result,
};

/// How appended instrumentor members are checked against the target's members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// A member is present if name and descriptor match; anything else is appended.
    #[default]
    NameAndDescriptor,
    /// Additionally reject appending a member whose name exists with another descriptor.
    NameOnly,
}

/// Options for [`instrument_container`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstrumentOptions {
    /// Collision check for appended members
    pub collision_policy: CollisionPolicy,
    /// Options for the rebuilt class
    pub build: BuildOptions,
}

type Signature = (String, String);

fn signature(name: &str, descriptor: &str) -> Signature {
    (name.to_string(), descriptor.to_string())
}

/// Everything needed to inline calls to one target method.
#[derive(Clone)]
struct Splice {
    owner: Symbol,
    name: String,
    descriptor: String,
    entry: Vec<(TypeKind, u16)>,
    returns: TypeKind,
    original: CodeBody,
    base: u16,
}

impl Splice {
    fn matches(&self, element: &CodeElement) -> bool {
        matches!(
            element,
            CodeElement::Instruction(Instruction::Invoke { method, .. })
                if method.owner == self.owner
                    && method.name == self.name
                    && method.descriptor == self.descriptor
        )
    }

    fn exit_rewriter(&self, exit: Label, result: Option<u16>) -> CodeTransform {
        let expected = self.returns;
        CodeTransform::of(move |builder: &mut CodeBuilder, element| {
            let CodeElement::Instruction(Instruction::Return(kind)) = element else {
                builder.with(element);
                return Ok(());
            };
            if kind.computational() != expected {
                return Err(Error::ReturnKindMismatch {
                    expected: expected.name(),
                    found: kind.name(),
                });
            }
            if let Some(slot) = result {
                builder.store(expected, slot);
            }
            builder.goto(exit);
            Ok(())
        })
    }

    fn slot(&self, slot: u16) -> Result<u16> {
        self.base
            .checked_add(slot)
            .ok_or_else(|| Error::LimitExceeded(format!("inlined local {slot} above {}", self.base)))
    }

    fn inline(&self, builder: &mut CodeBuilder) -> Result<()> {
        debug!(
            "inlining {}.{}{} above local {}",
            self.owner, self.name, self.descriptor, self.base
        );
        for (kind, slot) in self.entry.iter().rev() {
            let slot = self.slot(*slot)?;
            builder.store(kind.computational(), slot);
        }
        builder.ensure_locals(self.slot(self.original.max_locals())?);
        let result = match self.returns {
            TypeKind::Void => None,
            kind => Some(builder.allocate_local(kind)?),
        };

        builder.block(|builder, exit| {
            let splice = LocalSlotShifter::with_base(self.base)
                .as_code_transform()
                .and_then(LabelRelabeler::of().as_code_transform())
                .and_then(self.exit_rewriter(exit, result));
            builder.transform(&self.original, &splice)?;
            Ok(())
        })?;

        if let Some(slot) = result {
            builder.load(self.returns, slot);
        }
        Ok(())
    }

    fn as_code_transform(&self) -> CodeTransform {
        let splice = self.clone();
        CodeTransform::of(move |builder: &mut CodeBuilder, element| {
            if splice.matches(&element) {
                splice.inline(builder)
            } else {
                builder.with(element);
                Ok(())
            }
        })
    }
}

struct Plan {
    /// Instrumentor bodies by target method signature
    bodies: FxHashMap<Signature, CodeBody>,
    /// Instrumentor members to append, by their own signature
    fields: FxHashSet<Signature>,
    methods: FxHashSet<Signature>,
}

fn collides(
    policy: CollisionPolicy,
    existing: impl Iterator<Item = Signature>,
    name: &str,
    descriptor: &str,
) -> Result<bool> {
    let mut same_name = false;
    for (other_name, other_descriptor) in existing {
        if other_name == name {
            if other_descriptor == descriptor {
                return Ok(true);
            }
            same_name = true;
        }
    }
    if same_name && policy == CollisionPolicy::NameOnly {
        return Err(Error::MemberCollision {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
    }
    Ok(false)
}

fn plan<P>(
    target: &Container,
    instrumentor: &Container,
    remapper: &Remapper,
    predicate: P,
    options: &InstrumentOptions,
) -> Result<Plan>
where
    P: Fn(&MethodDecl) -> bool,
{
    let mut bodies = FxHashMap::default();
    for method in target.methods().iter().filter(|method| predicate(method)) {
        if method.code.is_none() {
            return Err(Error::NotSupported(format!(
                "{}.{}{} has no code to instrument",
                target.this_symbol(),
                method.name,
                method.descriptor
            )));
        }
        let source = instrumentor.methods().iter().find(|candidate| {
            candidate.name == method.name
                && remapper.map_method_descriptor(&candidate.descriptor) == method.descriptor
        });
        let Some(body) = source.and_then(|source| source.code.clone()) else {
            return Err(Error::MissingInstrumentorCode {
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
            });
        };
        if source.is_some_and(|source| {
            source.flags.contains(AccessFlags::STATIC) != method.flags.contains(AccessFlags::STATIC)
        }) {
            return Err(Error::NotSupported(format!(
                "{}{} is static in only one of the classes",
                method.name, method.descriptor
            )));
        }
        bodies.insert(signature(&method.name, &method.descriptor), body);
    }

    let mut fields = FxHashSet::default();
    for field in instrumentor.fields() {
        let descriptor = remapper.map_descriptor(&field.descriptor);
        let existing = target
            .fields()
            .iter()
            .map(|f| signature(&f.name, &f.descriptor));
        if !collides(options.collision_policy, existing, &field.name, &descriptor)? {
            debug!("appending field {}:{}", field.name, descriptor);
            fields.insert(signature(&field.name, &field.descriptor));
        }
    }

    let mut methods = FxHashSet::default();
    for method in instrumentor.methods().iter().filter(|m| m.name != "<init>") {
        let descriptor = remapper.map_method_descriptor(&method.descriptor);
        let existing = target
            .methods()
            .iter()
            .map(|m| signature(&m.name, &m.descriptor));
        if !collides(options.collision_policy, existing, &method.name, &descriptor)? {
            debug!("appending method {}{}", method.name, descriptor);
            methods.insert(signature(&method.name, &method.descriptor));
        }
    }

    Ok(Plan {
        bodies,
        fields,
        methods,
    })
}

/// Instrument `target` with `instrumentor` using default options and encode the result.
///
/// # Errors
/// See [`instrument_container`].
pub fn instrument<P>(target: &Container, instrumentor: &Container, predicate: P) -> Result<Vec<u8>>
where
    P: Fn(&MethodDecl) -> bool,
{
    instrument_container(target, instrumentor, predicate, &InstrumentOptions::default())?.to_bytes()
}

/// Instrument the methods of `target` selected by `predicate` with `instrumentor`.
///
/// # Errors
/// - [`Error::MissingInstrumentorCode`] if a selected method has no same-signature
///   counterpart with code in the instrumentor
/// - [`Error::NotSupported`] if a selected method has no code, or differs in staticness
/// - [`Error::MemberCollision`] under [`CollisionPolicy::NameOnly`]
/// - [`Error::ReturnKindMismatch`] if an inlined return disagrees with the descriptor
/// - any structural error raised while rebuilding the bodies
pub fn instrument_container<P>(
    target: &Container,
    instrumentor: &Container,
    predicate: P,
    options: &InstrumentOptions,
) -> Result<Container>
where
    P: Fn(&MethodDecl) -> bool,
{
    let this = target.this_symbol().clone();
    let remapper = Remapper::from_map([(instrumentor.this_symbol().clone(), this.clone())]);
    let Plan {
        bodies,
        fields,
        methods,
    } = plan(target, instrumentor, &remapper, predicate, options)?;
    debug!(
        "instrumenting {} methods of {} from {}",
        bodies.len(),
        this,
        instrumentor.this_symbol()
    );

    let remap_code = remapper.as_code_transform();
    let rewrite = ClassTransform::of(move |builder: &mut ClassBuilder, element| {
        let ClassElement::Method(method) = element else {
            builder.with(element);
            return Ok(());
        };
        let Some(body) = bodies.get(&signature(&method.name, &method.descriptor)) else {
            builder.with(ClassElement::Method(method));
            return Ok(());
        };
        let Some(original) = method.code.clone() else {
            return Err(Error::NotSupported(format!(
                "{}{} has no code",
                method.name, method.descriptor
            )));
        };

        let descriptor = method.method_descriptor()?;
        let splice = Splice {
            owner: this.clone(),
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            entry: descriptor.entry_locals(method.flags),
            returns: descriptor.return_kind().computational(),
            original,
            base: body.max_locals(),
        };
        let code = remap_code.clone().and_then(splice.as_code_transform());
        debug!("rewriting {}.{}{}", this, method.name, method.descriptor);
        builder.with_method(&method.name, &method.descriptor, method.flags, |rebuilt| {
            rebuilt.transform_code(body, &code)?;
            for attribute in &method.attributes {
                rebuilt.with(MethodElement::Attribute(attribute.clone()));
            }
            Ok(())
        })?;
        Ok(())
    });

    let append = ClassTransform::dropping(move |element| match element {
        ClassElement::Field(field) => !fields.contains(&signature(&field.name, &field.descriptor)),
        ClassElement::Method(method) => {
            !methods.contains(&signature(&method.name, &method.descriptor))
        }
        ClassElement::Header(_) | ClassElement::Attribute(_) => true,
    })
    .and_then(remapper.as_class_transform());

    let source = instrumentor.clone();
    let transform = rewrite.end_handler(move |builder: &mut ClassBuilder| {
        let mut stage = append.start();
        for element in source.elements() {
            stage.accept(builder, element)?;
        }
        stage.at_end(builder)
    });

    transform_class_with(target, &transform, options.build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{
        factories::{counter_class, probe_class},
        machine::{Machine, Value},
    };

    fn bump_only(method: &MethodDecl) -> bool {
        method.name == "bump"
    }

    #[test]
    fn instrumented_bump_runs_before_inlined_after() -> Result<()> {
        let target = counter_class()?;
        let probe = probe_class()?;
        let bytes = instrument(&target, &probe, bump_only)?;
        let instrumented = Container::parse(&bytes)?;

        let mut machine = Machine::new(vec![instrumented]);
        let object = machine.instantiate("demo/Target")?;
        machine.invoke("demo/Target", "bump", "()V", vec![object])?;
        assert_eq!(
            machine.writes(),
            &[
                ("demo/Target.seen".to_string(), 1),
                ("demo/Target.count".to_string(), 1),
                ("demo/Target.seen".to_string(), 2),
            ]
        );
        Ok(())
    }

    #[test]
    fn value_returning_calls_are_inlined() -> Result<()> {
        let target = counter_class()?;
        let probe = probe_class()?;
        let instrumented = Container::parse(&instrument(&target, &probe, |m| m.name == "next")?)?;

        let mut machine = Machine::new(vec![instrumented]);
        let object = machine.instantiate("demo/Target")?;
        // original next(x) = x + 1, the probe returns 100 + next(x) + 4
        let result = machine.invoke("demo/Target", "next", "(I)I", vec![object, Value::Int(0)])?;
        assert_eq!(result, Some(Value::Int(105)));
        Ok(())
    }

    #[test]
    fn wide_parameters_are_shifted_as_a_unit() -> Result<()> {
        let target = counter_class()?;
        let probe = probe_class()?;
        let instrumented = Container::parse(&instrument(&target, &probe, |m| m.name == "add")?)?;

        let mut machine = Machine::new(vec![instrumented]);
        // original add(a, b) = a + b, the probe returns add(a, b) + 1
        let result = machine.invoke(
            "demo/Target",
            "add",
            "(JI)J",
            vec![Value::Long(10), Value::Int(5)],
        )?;
        assert_eq!(result, Some(Value::Long(16)));
        Ok(())
    }

    #[test]
    fn empty_selection_only_appends() -> Result<()> {
        let target = counter_class()?;
        let probe = probe_class()?;
        let result = instrument_container(&target, &probe, |_| false, &InstrumentOptions::default())?;

        for (original, kept) in target.methods().iter().zip(result.methods()) {
            assert_eq!(original, kept);
        }
        let names: Vec<_> = result.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["count", "seen"]);
        assert!(result.find_method("helper", "()V").is_some());
        assert_eq!(
            result.methods().iter().filter(|m| m.name == "<init>").count(),
            1
        );
        assert_eq!(
            result.methods().iter().filter(|m| m.name == "bump").count(),
            1
        );
        Ok(())
    }

    #[test]
    fn missing_instrumentor_code_is_reported_before_building() -> Result<()> {
        let target = counter_class()?;
        let probe = probe_class()?;
        let result = instrument(&target, &probe, |m| m.name == "reset");
        assert!(matches!(
            result,
            Err(Error::MissingInstrumentorCode { name, .. }) if name == "reset"
        ));
        Ok(())
    }

    #[test]
    fn strict_policy_rejects_name_collisions() -> Result<()> {
        let target = counter_class()?;
        let mut probe = ClassBuilder::new(
            Symbol::new("demo/Probe"),
            Some(Symbol::new("java/lang/Object")),
        );
        probe.with_field("count", "J", AccessFlags::PUBLIC);
        let probe = probe.finish();

        let lenient = instrument_container(&target, &probe, |_| false, &InstrumentOptions::default())?;
        assert_eq!(lenient.fields().iter().filter(|f| f.name == "count").count(), 2);

        let strict = InstrumentOptions {
            collision_policy: CollisionPolicy::NameOnly,
            ..InstrumentOptions::default()
        };
        assert!(matches!(
            instrument_container(&target, &probe, |_| false, &strict),
            Err(Error::MemberCollision { name, .. }) if name == "count"
        ));
        Ok(())
    }
}
