//! Binary input and output primitives for the class file format.
//!
//! Everything in a class file is stored big-endian. This module provides the two
//! building blocks the reader, writer, decoder and encoder share:
//!
//! - [`crate::file::parser::Parser`] - A bounds-checked cursor that reads big-endian values
//! - [`crate::file::io`] - The [`crate::file::io::ClassIO`] trait with read and write helpers
//!
//! Neither component interprets class file structures; they only move bytes. Interpretation
//! lives in [`crate::classfile`] and [`crate::code`].

pub mod io;
pub mod parser;
