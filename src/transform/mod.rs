//! Composable element-stream transforms and the builders they write into.
//!
//! Every level of a class (the class itself, a method, a method body) is edited the same
//! way: the elements of an immutable source are replayed one at a time through a
//! [`Transform`], which decides for each element whether to pass it on, drop it, rewrite
//! it or emit additional elements into the builder of the new version.
//!
//! A [`Transform`] is a factory of [`Stage`]s. Each replay pass asks the factory for a
//! fresh stage, so per-pass state (label maps, counters) never leaks between passes or
//! threads, and the same transform value can be shared and reused freely.
//!
//! # Key Components
//!
//! - [`Transform`] with the aliases [`ClassTransform`], [`MethodTransform`], [`CodeTransform`]
//! - [`crate::transform::builder`] - [`ClassBuilder`], [`MethodBuilder`], [`CodeBuilder`] and the replay functions
//! - [`crate::transform::remap::Remapper`] - Consistent rewriting of type symbols
//! - [`crate::transform::shift::LocalSlotShifter`] - Renumbering of local slots
//! - [`crate::transform::relabel::LabelRelabeler`] - Fresh labels for copied bodies
//! - [`crate::transform::instrument`] - Splicing instrumentor methods around target methods
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//!
//! let bytes = std::fs::read("Target.class")?;
//! let target = Container::parse(&bytes)?;
//!
//! // Drop all fields, keep everything else.
//! let strip = ClassTransform::dropping(|element| matches!(element, ClassElement::Field(_)));
//! let rebuilt = build(&target, &strip)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;

use crate::{
    classfile::container::{ClassElement, FieldDecl, MethodDecl, MethodElement},
    Result,
};

pub mod builder;
pub mod instrument;
pub mod relabel;
pub mod remap;
pub mod shift;

pub use builder::{BuildOptions, ClassBuilder, CodeBuilder, MethodBuilder};

/// A builder that collects replayed elements.
pub trait ElementBuilder {
    /// The element type this builder accepts.
    type Element: Clone;

    /// Append an element to the output.
    fn with(&mut self, element: Self::Element) -> &mut Self;

    /// Replace the pending output with `output`, returning what was pending.
    ///
    /// Chained stages use this to capture what an upstream stage emits.
    fn swap_output(&mut self, output: Vec<Self::Element>) -> Vec<Self::Element>;
}

/// One replay pass of a [`Transform`].
pub trait Stage<B: ElementBuilder> {
    /// Handle one element of the source.
    ///
    /// # Errors
    /// Any error aborts the replay and is returned to the caller of the build.
    fn accept(&mut self, builder: &mut B, element: B::Element) -> Result<()>;

    /// Called once after the last element.
    ///
    /// # Errors
    /// Any error aborts the replay.
    fn at_end(&mut self, _builder: &mut B) -> Result<()> {
        Ok(())
    }
}

type StageFactory<B> = dyn Fn() -> Box<dyn Stage<B>> + Send + Sync;

/// A reusable, shareable element transform.
///
/// See the [module documentation](crate::transform) for the execution model.
pub struct Transform<B: ElementBuilder> {
    factory: Arc<StageFactory<B>>,
}

impl<B: ElementBuilder> Clone for Transform<B> {
    fn clone(&self) -> Self {
        Transform {
            factory: Arc::clone(&self.factory),
        }
    }
}

/// Transform over the elements of a class.
pub type ClassTransform = Transform<ClassBuilder>;
/// Transform over the elements of a method.
pub type MethodTransform = Transform<MethodBuilder>;
/// Transform over the elements of a method body.
pub type CodeTransform = Transform<CodeBuilder>;

struct FnStage<F> {
    f: Arc<F>,
}

impl<B, F> Stage<B> for FnStage<F>
where
    B: ElementBuilder,
    F: Fn(&mut B, B::Element) -> Result<()>,
{
    fn accept(&mut self, builder: &mut B, element: B::Element) -> Result<()> {
        (self.f)(builder, element)
    }
}

struct EndStage<B: ElementBuilder, F> {
    inner: Box<dyn Stage<B>>,
    end: Arc<F>,
}

impl<B, F> Stage<B> for EndStage<B, F>
where
    B: ElementBuilder,
    F: Fn(&mut B) -> Result<()>,
{
    fn accept(&mut self, builder: &mut B, element: B::Element) -> Result<()> {
        self.inner.accept(builder, element)
    }

    fn at_end(&mut self, builder: &mut B) -> Result<()> {
        self.inner.at_end(builder)?;
        (self.end)(builder)
    }
}

struct Chained<B: ElementBuilder> {
    first: Box<dyn Stage<B>>,
    second: Box<dyn Stage<B>>,
}

impl<B: ElementBuilder> Chained<B> {
    fn forward(&mut self, builder: &mut B, emitted: Vec<B::Element>) -> Result<()> {
        for element in emitted {
            self.second.accept(builder, element)?;
        }
        Ok(())
    }
}

impl<B: ElementBuilder> Stage<B> for Chained<B> {
    fn accept(&mut self, builder: &mut B, element: B::Element) -> Result<()> {
        let pending = builder.swap_output(Vec::new());
        let result = self.first.accept(builder, element);
        let emitted = builder.swap_output(pending);
        result?;
        self.forward(builder, emitted)
    }

    fn at_end(&mut self, builder: &mut B) -> Result<()> {
        let pending = builder.swap_output(Vec::new());
        let result = self.first.at_end(builder);
        let emitted = builder.swap_output(pending);
        result?;
        self.forward(builder, emitted)?;
        self.second.at_end(builder)
    }
}

impl<B: ElementBuilder + 'static> Transform<B> {
    /// A stateless transform calling `f` for every element.
    pub fn of<F>(f: F) -> Self
    where
        F: Fn(&mut B, B::Element) -> Result<()> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::stateful(move || FnStage { f: Arc::clone(&f) })
    }

    /// A transform whose stages are created by `factory`, once per replay pass.
    pub fn stateful<S, F>(factory: F) -> Self
    where
        S: Stage<B> + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Transform {
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Stage<B>>),
        }
    }

    /// Pass every element through unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self::of(|builder: &mut B, element| {
            builder.with(element);
            Ok(())
        })
    }

    /// Drop the elements matching `predicate`, pass the rest through.
    pub fn dropping<P>(predicate: P) -> Self
    where
        P: Fn(&B::Element) -> bool + Send + Sync + 'static,
    {
        Self::of(move |builder: &mut B, element| {
            if !predicate(&element) {
                builder.with(element);
            }
            Ok(())
        })
    }

    /// Keep only the elements matching `predicate`.
    pub fn filtering<P>(predicate: P) -> Self
    where
        P: Fn(&B::Element) -> bool + Send + Sync + 'static,
    {
        Self::dropping(move |element| !predicate(element))
    }

    /// Run `end` after this transform has seen the last element.
    #[must_use]
    pub fn end_handler<F>(self, end: F) -> Self
    where
        F: Fn(&mut B) -> Result<()> + Send + Sync + 'static,
    {
        let end = Arc::new(end);
        let factory = self.factory;
        Self::stateful(move || EndStage {
            inner: factory(),
            end: Arc::clone(&end),
        })
    }

    /// Feed everything this transform emits into `next`.
    #[must_use]
    pub fn and_then(self, next: Transform<B>) -> Self {
        let (first, second) = (self.factory, next.factory);
        Self::stateful(move || Chained {
            first: first(),
            second: second(),
        })
    }

    /// Start a replay pass.
    #[must_use]
    pub fn start(&self) -> Box<dyn Stage<B>> {
        (self.factory)()
    }
}

impl ClassTransform {
    /// Rewrite the methods matching `predicate` with `transform`.
    pub fn transforming_methods<P>(predicate: P, transform: MethodTransform) -> Self
    where
        P: Fn(&MethodDecl) -> bool + Send + Sync + 'static,
    {
        Self::of(move |builder: &mut ClassBuilder, element| {
            match element {
                ClassElement::Method(method) if predicate(&method) => {
                    builder.transform_method(&method, &transform)?;
                }
                other => {
                    builder.with(other);
                }
            }
            Ok(())
        })
    }

    /// Rewrite every field declaration with `f`.
    pub fn transforming_fields<F>(f: F) -> Self
    where
        F: Fn(FieldDecl) -> FieldDecl + Send + Sync + 'static,
    {
        Self::of(move |builder: &mut ClassBuilder, element| {
            builder.with(match element {
                ClassElement::Field(field) => ClassElement::Field(f(field)),
                other => other,
            });
            Ok(())
        })
    }
}

impl MethodTransform {
    /// Rewrite the method body with `transform`, pass everything else through.
    #[must_use]
    pub fn transforming_code(transform: CodeTransform) -> Self {
        Self::of(move |builder: &mut MethodBuilder, element| {
            match element {
                MethodElement::Code(body) => {
                    builder.transform_code(&body, &transform)?;
                }
                other => {
                    builder.with(other);
                }
            }
            Ok(())
        })
    }
}
