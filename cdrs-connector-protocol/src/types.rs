//! Primitive notations of the native protocol (`[short]`, `[int]`, `[string]`, `[bytes]`...).
use std::io::{Cursor, Read, Write};

use crate::error::{Error, Result};

pub const SHORT_LEN: usize = 2;
pub const INT_LEN: usize = 4;

const NULL_INT_LEN: CInt = -1;

pub type CInt = i32;
pub type CIntShort = i16;

/// The `[bytes]` notation: an `[int]` length followed by that many bytes, or a negative length
/// for null.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CBytes {
    bytes: Option<Vec<u8>>,
}

impl CBytes {
    pub fn new(bytes: Vec<u8>) -> CBytes {
        CBytes { bytes: Some(bytes) }
    }

    /// Creates Cassandra bytes that represent null value
    pub fn new_null() -> CBytes {
        CBytes { bytes: None }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.bytes.is_none()
    }

    #[inline]
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    #[inline]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.bytes
    }
}

#[inline]
fn read_array<const S: usize>(cursor: &mut Cursor<&[u8]>) -> Result<[u8; S]> {
    let mut buffer = [0; S];
    cursor.read_exact(&mut buffer)?;
    Ok(buffer)
}

#[inline]
fn read_vec(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let remaining = cursor
        .get_ref()
        .len()
        .saturating_sub(cursor.position() as usize);
    if len > remaining {
        return Err(Error::General(format!(
            "Declared length {len} exceeds remaining {remaining} bytes"
        )));
    }

    let mut buffer = vec![0; len];
    cursor.read_exact(&mut buffer)?;
    Ok(buffer)
}

pub fn from_cursor_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    read_array::<1>(cursor).map(|bytes| bytes[0])
}

pub fn from_cursor_short(cursor: &mut Cursor<&[u8]>) -> Result<CIntShort> {
    read_array(cursor).map(CIntShort::from_be_bytes)
}

pub fn from_cursor_int(cursor: &mut Cursor<&[u8]>) -> Result<CInt> {
    read_array(cursor).map(CInt::from_be_bytes)
}

/// Reads a `[string]`: `[short]` length followed by UTF-8 bytes.
pub fn from_cursor_str(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = from_cursor_short(cursor)? as u16 as usize;
    read_vec(cursor, len).and_then(|bytes| String::from_utf8(bytes).map_err(Into::into))
}

/// Reads a `[long string]`: `[int]` length followed by UTF-8 bytes.
pub fn from_cursor_long_str(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = from_cursor_int(cursor)?;
    if len < 0 {
        return Err(Error::General(format!("Negative long string length: {len}")));
    }

    read_vec(cursor, len as usize).and_then(|bytes| String::from_utf8(bytes).map_err(Into::into))
}

/// Reads a `[string list]`.
pub fn from_cursor_string_list(cursor: &mut Cursor<&[u8]>) -> Result<Vec<String>> {
    let len = from_cursor_short(cursor)? as u16 as usize;
    (0..len).map(|_| from_cursor_str(cursor)).collect()
}

pub fn from_cursor_bytes(cursor: &mut Cursor<&[u8]>) -> Result<CBytes> {
    let len = from_cursor_int(cursor)?;
    if len < 0 {
        return Ok(CBytes::new_null());
    }

    read_vec(cursor, len as usize).map(CBytes::new)
}

pub fn serialize_short(cursor: &mut Cursor<&mut Vec<u8>>, value: CIntShort) {
    let _ = cursor.write(&value.to_be_bytes());
}

pub fn serialize_int(cursor: &mut Cursor<&mut Vec<u8>>, value: CInt) {
    let _ = cursor.write(&value.to_be_bytes());
}

pub fn serialize_str(cursor: &mut Cursor<&mut Vec<u8>>, value: &str) {
    serialize_short(cursor, value.len() as CIntShort);
    let _ = cursor.write(value.as_bytes());
}

pub fn serialize_long_str(cursor: &mut Cursor<&mut Vec<u8>>, value: &str) {
    serialize_int(cursor, value.len() as CInt);
    let _ = cursor.write(value.as_bytes());
}

pub fn serialize_str_list<'a>(
    cursor: &mut Cursor<&mut Vec<u8>>,
    values: impl ExactSizeIterator<Item = &'a str>,
) {
    serialize_short(cursor, values.len() as CIntShort);
    for value in values {
        serialize_str(cursor, value);
    }
}

pub fn serialize_bytes(cursor: &mut Cursor<&mut Vec<u8>>, value: &CBytes) {
    match value.as_slice() {
        Some(bytes) => {
            serialize_int(cursor, bytes.len() as CInt);
            let _ = cursor.write(bytes);
        }
        None => serialize_int(cursor, NULL_INT_LEN),
    }
}
