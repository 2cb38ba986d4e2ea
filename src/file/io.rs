//! Little-endian, bounds-checked reading and writing of primitive values.
//!
//! Module images and method bodies are little-endian throughout. This module provides the
//! [`CilIO`] trait over the primitive integer and float types, slice readers that return
//! [`crate::Error::OutOfBounds`] instead of panicking, and the writers used by the image writer
//! and the instruction encoder, including the ECMA-335 II.23.2 compressed integer encodings.
//!
//! # Usage Examples
//!
//! ```rust
//! use cilmixin::file::io::{read_le_at, write_compressed_uint, write_le};
//!
//! let mut buffer = Vec::new();
//! write_le(&mut buffer, 0x1234_u16);
//! write_compressed_uint(0x80, &mut buffer)?;
//! assert_eq!(buffer, [0x34, 0x12, 0x80, 0x80]);
//!
//! let mut offset = 0;
//! let value: u16 = read_le_at(&buffer, &mut offset)?;
//! assert_eq!(value, 0x1234);
//! assert_eq!(offset, 2);
//! # Ok::<(), cilmixin::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be read from and written to little-endian byte buffers.
pub trait CilIO: Sized {
    /// Fixed-size byte array representation of the type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Builds the value from its little-endian representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Returns the little-endian representation of the value
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),*) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Reads a value from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value at `offset` and advances `offset` past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Appends the little-endian representation of `value` to `buffer`.
pub fn write_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Overwrites `size_of::<T>()` bytes at `offset` with `value`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `offset`.
pub fn write_le_at<T: CilIO>(buffer: &mut [u8], offset: usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > buffer.len() {
        return Err(OutOfBounds);
    }

    buffer[offset..end].copy_from_slice(bytes);
    Ok(())
}

/// Appends `value` as an ECMA-335 compressed unsigned integer (1, 2 or 4 bytes).
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if `value` exceeds `0x1FFF_FFFF`.
pub fn write_compressed_uint(value: u32, buffer: &mut Vec<u8>) -> Result<()> {
    if value <= 0x7F {
        buffer.push(value as u8);
    } else if value <= 0x3FFF {
        buffer.push(0x80 | (value >> 8) as u8);
        buffer.push(value as u8);
    } else if value <= 0x1FFF_FFFF {
        buffer.push(0xC0 | (value >> 24) as u8);
        buffer.push((value >> 16) as u8);
        buffer.push((value >> 8) as u8);
        buffer.push(value as u8);
    } else {
        return Err(malformed_error!(
            "Value {} is too large for a compressed integer",
            value
        ));
    }

    Ok(())
}

/// Appends `value` as a compressed signed integer, using the zig-zag style mapping that
/// [`crate::Parser::read_compressed_int`] reverses.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the encoded value does not fit.
#[allow(clippy::cast_sign_loss)]
pub fn write_compressed_int(value: i32, buffer: &mut Vec<u8>) -> Result<()> {
    let encoded = if value >= 0 {
        (value as u32) << 1
    } else {
        (((-(i64::from(value) + 1)) as u32) << 1) | 1
    };
    write_compressed_uint(encoded, buffer)
}
