//! Low-level byte stream parser for class file and bytecode decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser for the big-endian structures of the class file format. All reads are bounds-checked
//! and report [`crate::Error::OutOfBounds`] instead of panicking on truncated input.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser::read_be`] - Read primitive types (big-endian)
//! - [`crate::file::parser::Parser::read_bytes`] - Borrow a run of raw bytes
//! - [`crate::file::parser::Parser::align`] - Skip padding up to an alignment boundary
//! - [`crate::file::parser::Parser::sub_parser`] - Split off a bounded child parser
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x31];
//! let mut parser = Parser::new(&data);
//!
//! let magic = parser.read_be::<u32>()?;
//! assert_eq!(magic, 0xCAFE_BABE);
//!
//! let _minor = parser.read_be::<u16>()?;
//! let major = parser.read_be::<u16>()?;
//! assert_eq!(major, 49);
//! assert!(!parser.has_more_data());
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, ClassIO},
    Error, Result,
};

/// A cursor over a byte slice that reads big-endian class file structures.
///
/// `Parser` maintains an internal position and validates data availability before each
/// read, so malformed or truncated input surfaces as an error value.
///
/// # Examples
///
/// ```rust
/// use classweave::Parser;
///
/// let data = [0x00, 0x03, b'a', b'b', b'c'];
/// let mut parser = Parser::new(&data);
///
/// let len = parser.read_be::<u16>()?;
/// assert_eq!(parser.read_bytes(usize::from(len))?, b"abc");
/// # Ok::<(), classweave::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of bytes left between the cursor and the end of the data.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Move the current position to the specified index.
    ///
    /// Seeking to exactly the end of the data is allowed; subsequent reads fail.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let target = self.position.checked_add(step).ok_or(Error::OutOfBounds)?;
        self.seek(target)
    }

    /// Skip bytes until the position is a multiple of `alignment`.
    ///
    /// Positions are relative to the start of the slice this parser was created from,
    /// which is what `tableswitch` and `lookupswitch` padding is defined against.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the end of the data.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - self.position % alignment) % alignment;
        self.advance_by(padding)
    }

    /// Peek at the next byte without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is at or beyond the data length.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(Error::OutOfBounds)
    }

    /// Read a value of type `T` in big-endian format and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading `T` would exceed the data length.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.position.checked_add(len).ok_or(Error::OutOfBounds)?;
        if end > self.data.len() {
            return Err(Error::OutOfBounds);
        }

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Split off the next `len` bytes as an independent parser and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn sub_parser(&mut self, len: usize) -> Result<Parser<'a>> {
        Ok(Parser::new(self.read_bytes(len)?))
    }

    /// Get access to the underlying data buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_reads() -> Result<()> {
        let data = [0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFE, 0x7F];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_be::<u16>()?, 1);
        assert_eq!(parser.read_be::<i32>()?, -2);
        assert_eq!(parser.remaining(), 1);
        assert_eq!(parser.peek_byte()?, 0x7F);
        assert_eq!(parser.read_be::<u8>()?, 0x7F);
        assert!(parser.read_be::<u8>().is_err());
        Ok(())
    }

    #[test]
    fn seek_to_end_is_allowed() -> Result<()> {
        let data = [1, 2, 3];
        let mut parser = Parser::new(&data);
        parser.seek(3)?;
        assert!(!parser.has_more_data());
        assert!(parser.seek(4).is_err());
        Ok(())
    }

    #[test]
    fn align_skips_padding() -> Result<()> {
        let data = [0u8; 12];
        let mut parser = Parser::new(&data);
        parser.advance_by(1)?;
        parser.align(4)?;
        assert_eq!(parser.pos(), 4);
        parser.align(4)?;
        assert_eq!(parser.pos(), 4);
        Ok(())
    }

    #[test]
    fn sub_parser_is_bounded() -> Result<()> {
        let data = [0x00, 0x02, 0xAA, 0xBB, 0xCC];
        let mut parser = Parser::new(&data);
        let len = parser.read_be::<u16>()?;
        let mut child = parser.sub_parser(usize::from(len))?;

        assert_eq!(child.read_be::<u16>()?, 0xAABB);
        assert!(child.read_be::<u8>().is_err());
        assert_eq!(parser.read_be::<u8>()?, 0xCC);
        Ok(())
    }
}
