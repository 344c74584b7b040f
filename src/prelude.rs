//! # classweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the classweave library. Import it to get the model, the builders and the stock
//! transforms in one line.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classweave operations
pub use crate::Error;

/// The result type used throughout classweave
pub use crate::Result;

/// Low-level parsing cursor
pub use crate::Parser;

// ================================================================================================
// Class File Model
// ================================================================================================

/// Parsed classes and their elements
pub use crate::classfile::{
    ClassElement, ClassHeader, Container, FieldDecl, MethodDecl, MethodElement, ReadOptions,
};

/// Names, member references and constant pool entities
pub use crate::classfile::{
    AccessFlags, BootstrapMethod, DynamicConstant, HandleKind, MemberRef, MethodHandle, Symbol,
};

/// Descriptors and value kinds
pub use crate::classfile::{FieldType, MethodDescriptor, TypeKind};

/// Attributes
pub use crate::classfile::{Attribute, InnerClass, UnknownAttribute};

// ================================================================================================
// Code Bodies
// ================================================================================================

/// Instructions and the elements of a body
pub use crate::code::{
    CodeBody, CodeElement, Constant, ExceptionRange, Instruction, Label, LocalVariable,
};

/// Opcode constants
pub use crate::code::opcodes;

// ================================================================================================
// Builders and Transforms
// ================================================================================================

/// Element sinks for class, method and code transforms
pub use crate::transform::{
    BuildOptions, ClassBuilder, CodeBuilder, ElementBuilder, MethodBuilder, Stage, Transform,
};

/// Transform aliases per element kind
pub use crate::transform::{ClassTransform, CodeTransform, MethodTransform};

/// Entry points replaying a class through a transform
pub use crate::transform::builder::{build, build_all, transform_class};

/// Stock transforms
pub use crate::transform::{
    instrument::{instrument, instrument_container, CollisionPolicy, InstrumentOptions},
    relabel::LabelRelabeler,
    remap::Remapper,
    shift::LocalSlotShifter,
};
