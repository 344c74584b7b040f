// Copyright 2025 The classweave Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

//! # classweave
//!
//! A library for reading, transforming and writing JVM class files, built around a
//! symbolic, label-based view of method bodies.
//!
//! `classweave` parses a class file into a [`Container`] whose code bodies name branch
//! targets by [`code::Label`] rather than by offset and whose instructions name classes,
//! members and constants directly rather than through constant pool indices. Transforms
//! are replayed element by element into builders that recompute everything derived:
//! offsets, branch widths, the constant pool, `max_stack` and `max_locals`.
//!
//! ## Features
//!
//! - **Faithful decoding** - Every standard opcode, both switch forms, `wide`, exception
//!   tables and debug tables
//! - **Composable transforms** - Class, method and code transforms chained with
//!   [`transform::Transform::and_then`] and extended with end handlers
//! - **Reusable building blocks** - [`Remapper`] renames classes everywhere they can occur,
//!   [`LocalSlotShifter`] moves a body's locals, [`LabelRelabeler`] makes a splice safe to
//!   repeat
//! - **Method instrumentation** - [`instrument`] wraps target methods with instrumentor code
//!   and inlines the original body at each self call
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//!
//! let bytes = std::fs::read("Target.class")?;
//! let class = Container::parse(&bytes)?;
//!
//! let renamed = Remapper::from_map([(
//!     Symbol::new("demo/Target"),
//!     Symbol::new("demo/Renamed"),
//! )]);
//! let output = build(&class, &renamed.as_class_transform())?;
//! std::fs::write("Renamed.class", output)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - Big-endian cursor and read/write helpers
//! - [`classfile`] - Constant pool, descriptors, attributes, the [`Container`] model, reader and writer
//! - [`code`] - Instruction model, decoder, encoder and frame-size analysis
//! - [`transform`] - Builders, transform composition, and the remap/shift/relabel/instrument transforms
//!
//! Everything except the parsing of raw bytes is immutable once built. Parsed containers
//! are `Send + Sync` and can be transformed in parallel with [`build_all`].

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use classweave::prelude::*;
///
/// let class = Container::parse(&std::fs::read("Target.class")?)?;
/// for method in class.methods() {
///     println!("{}{}", method.name, method.descriptor);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub mod prelude;

/// Big-endian parsing and serialization primitives.
///
/// # Examples
///
/// ```rust
/// use classweave::Parser;
///
/// let mut parser = Parser::new(&[0xCA, 0xFE, 0xBA, 0xBE]);
/// assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
/// # Ok::<(), classweave::Error>(())
/// ```
pub mod file;

/// The class file model.
///
/// Holds the constant pool representation, descriptor and signature grammar, access flags,
/// attributes, and the [`Container`] with its reader and writer.
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::{Container, ReadOptions};
///
/// let data = std::fs::read("Target.class")?;
/// let options = ReadOptions { keep_debug_info: false, ..ReadOptions::default() };
/// let class = Container::parse_with(&data, &options)?;
/// println!("{} extends {:?}", class.this_symbol(), class.super_symbol());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub mod classfile;

/// Method bodies: instructions, labels, decoding, encoding and analysis.
pub mod code;

/// Builders and transforms.
pub mod transform;

/// `classweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::{Container, Result};
///
/// fn load(path: &str) -> Result<Container> {
///     let data = std::fs::read(path).map_err(|e| classweave::Error::NotSupported(e.to_string()))?;
///     Container::parse(&data)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `classweave` Error type
///
/// The error type for all operations in this crate, grouped into format errors (malformed
/// input), structural errors (inconsistent bodies) and composition errors (instrumentation).
pub use error::Error;

/// Big-endian cursor over a byte slice.
pub use file::parser::Parser;

pub use classfile::{
    AccessFlags, ClassElement, Container, MethodDescriptor, ReadOptions, Symbol, TypeKind,
};
pub use transform::{
    builder::{build, build_all, transform_class},
    instrument::{instrument, instrument_container, CollisionPolicy, InstrumentOptions},
    relabel::LabelRelabeler,
    remap::Remapper,
    shift::LocalSlotShifter,
    BuildOptions, ClassBuilder, ClassTransform, CodeBuilder, CodeTransform, MethodBuilder,
    MethodTransform,
};
