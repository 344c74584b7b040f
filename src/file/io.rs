//! Big-endian reading and writing utilities for class file parsing and generation.
//!
//! The class file format stores every multi-byte quantity in big-endian order. This module
//! provides the [`crate::file::io::ClassIO`] trait, implemented for all primitive numeric
//! types, together with bounds-checked helpers that read from and write to byte buffers.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Trait defining big-endian conversion for primitive types
//! - [`crate::file::io::read_be_at`] - Read a value at an offset and advance the offset
//! - [`crate::file::io::write_be`] - Append a value to a growing buffer
//! - [`crate::file::io::write_be_at`] - Patch a value into an already written buffer
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use classweave::file::io::{read_be_at, write_be};
//!
//! let mut out = Vec::new();
//! write_be(&mut out, 0xCAFE_BABEu32);
//!
//! let mut offset = 0;
//! let magic: u32 = read_be_at(&out, &mut offset)?;
//! assert_eq!(magic, 0xCAFE_BABE);
//! assert_eq!(offset, 4);
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{Error, Result};

/// Trait for types that can be read from and written to big-endian byte sequences.
///
/// Implemented for `u8`, `i8`, `u16`, `i16`, `u32`, `i32`, `u64`, `i64`, `f32` and `f64`.
pub trait ClassIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty => $size:literal),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $size];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io!(
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
);

/// Read a big-endian value of type `T` at `offset`, advancing `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let size = std::mem::size_of::<T>();
    let end = offset.checked_add(size).ok_or(Error::OutOfBounds)?;
    if end > data.len() {
        return Err(Error::OutOfBounds);
    }

    let Ok(bytes) = T::Bytes::try_from(&data[*offset..end]) else {
        return Err(Error::OutOfBounds);
    };

    *offset = end;
    Ok(T::from_be_bytes(bytes))
}

/// Append a big-endian value to `out`.
pub fn write_be<T: ClassIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}

/// Overwrite the bytes at `offset` with the big-endian representation of `value`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit inside `out`.
pub fn write_be_at<T: ClassIO>(out: &mut [u8], offset: usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let bytes = bytes.as_ref();
    let end = offset.checked_add(bytes.len()).ok_or(Error::OutOfBounds)?;
    if end > out.len() {
        return Err(Error::OutOfBounds);
    }

    out[offset..end].copy_from_slice(bytes);
    Ok(())
}

/// Append a `u16` length prefix for `len`, failing if it does not fit.
///
/// # Errors
/// Returns [`crate::Error::LimitExceeded`] if `len` exceeds `u16::MAX`.
pub fn write_u16_len(out: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let len = u16::try_from(len)
        .map_err(|_| Error::LimitExceeded(format!("{what} count {len} exceeds 65535")))?;
    write_be(out, len);
    Ok(())
}

/// Append a `u32` length-prefixed attribute body.
///
/// # Errors
/// Returns [`crate::Error::LimitExceeded`] if the body exceeds `u32::MAX` bytes.
pub fn write_attribute(out: &mut Vec<u8>, name_index: u16, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| Error::LimitExceeded("attribute body exceeds 4GiB".to_string()))?;
    write_be(out, name_index);
    write_be(out, len);
    out.extend_from_slice(body);
    Ok(())
}
