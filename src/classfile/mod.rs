//! The class file structural model and its byte-level codec.
//!
//! This module turns raw class file bytes into an immutable, index-free model and back.
//! All constant pool indices are resolved while reading, so transforms only ever see
//! symbols, member references and constants by value.
//!
//! # Key Components
//!
//! - [`crate::classfile::container::Container`] - One parsed or built class
//! - [`crate::classfile::symbol::Symbol`] - Canonical type identifier
//! - [`crate::classfile::descriptor`] - Descriptor parsing, slot footprints, symbol rewriting
//! - [`crate::classfile::constpool`] - Constant pool reading and deduplicating writing
//! - [`crate::classfile::attribute::Attribute`] - Decoded attributes
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::{Container, ReadOptions};
//!
//! let bytes = std::fs::read("Target.class")?;
//! let options = ReadOptions {
//!     keep_debug_info: false,
//!     ..ReadOptions::default()
//! };
//! let container = Container::parse_with(&bytes, &options)?;
//! let rebuilt = container.to_bytes()?;
//! assert_eq!(Container::parse(&rebuilt)?.this_symbol(), container.this_symbol());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod attribute;
pub mod constpool;
pub mod container;
pub mod descriptor;
pub mod flags;
pub mod reader;
pub mod symbol;
pub(crate) mod writer;

pub use attribute::{Attribute, InnerClass, UnknownAttribute};
pub use container::{ClassElement, ClassHeader, Container, FieldDecl, MethodDecl, MethodElement};
pub use descriptor::{FieldType, MethodDescriptor, TypeKind};
pub use flags::AccessFlags;
pub use reader::ReadOptions;
pub use symbol::{BootstrapMethod, DynamicConstant, HandleKind, MemberRef, MethodHandle, Symbol};
