//! Method bodies as label-addressed element streams.
//!
//! A [`CodeBody`] is the decoded form of a `Code` attribute: an ordered sequence of
//! [`CodeElement`]s in which branch targets, exception ranges and debug scopes refer to
//! [`Label`]s instead of byte offsets. Offsets only exist inside the decoder and encoder.
//!
//! # Key Components
//!
//! - [`crate::code::instruction`] - Instructions, labels and pseudo elements
//! - [`crate::code::body::CodeBody`] - Immutable, cheaply cloned body
//! - [`crate::code::opcodes`] - Opcode constants and stack effects
//! - [`crate::code::analysis`] - Stack depth, locals footprint and slot width checks
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::Container;
//!
//! let bytes = std::fs::read("Target.class")?;
//! let container = Container::parse(&bytes)?;
//! for method in container.methods() {
//!     if let Some(code) = &method.code {
//!         println!("{}{}", method.name, method.descriptor);
//!         for instruction in code.instructions() {
//!             println!("    {instruction}");
//!         }
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod analysis;
pub mod body;
pub(crate) mod decoder;
pub(crate) mod encoder;
pub mod instruction;
pub mod opcodes;

pub use body::CodeBody;
pub use instruction::{CodeElement, Constant, ExceptionRange, Instruction, Label, LocalVariable};
