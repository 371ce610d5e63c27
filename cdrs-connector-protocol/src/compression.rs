/// Traffic compression as described in the [Apache Cassandra protocol](
/// https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec#L790).
///
/// Client and server agree on an algorithm in the STARTUP message, so a STARTUP message is never
/// compressed. Every envelope exchanged after it may be.
use derive_more::Display;
use std::convert::TryInto;
use std::io;
use std::result;
use std::str::FromStr;
use thiserror::Error as ThisError;

use crate::frame::MAX_BODY_LEN;

type Result<T> = result::Result<T, CompressionError>;

pub const LZ4: &str = "lz4";
pub const SNAPPY: &str = "snappy";
pub const NONE: &str = "none";

/// An error which may occur during encoding or decoding an envelope body.
#[derive(Debug, ThisError)]
pub enum CompressionError {
    /// Snappy error.
    #[error("Snappy Error: {0:?}")]
    Snappy(snap::Error),
    /// Lz4 error.
    #[error("Lz4 Error: {0:?}")]
    Lz4(io::Error),
    /// Name which does not denote a supported algorithm.
    #[error("Unsupported compression: {0}")]
    Unsupported(String),
}

/// Compression negotiated for a connection. Only non-startup envelope bodies are compressed.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Ord, PartialOrd, Hash, Display, Default)]
pub enum Compression {
    /// [lz4](https://code.google.com/p/lz4/) compression
    Lz4,
    /// [snappy](https://code.google.com/p/snappy/) compression
    Snappy,
    /// Non compression
    #[default]
    None,
}

impl Compression {
    /// Compresses `bytes` with the current algorithm.
    ///
    /// ```
    /// use cdrs_connector_protocol::compression::Compression;
    ///
    /// let bytes = b"Hello World".to_vec();
    /// let encoded = Compression::Snappy.encode(&bytes).unwrap();
    /// assert_eq!(Compression::Snappy.decode(encoded).unwrap(), bytes);
    /// ```
    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        match *self {
            Compression::Lz4 => Compression::encode_lz4(bytes),
            Compression::Snappy => Compression::encode_snappy(bytes),
            Compression::None => Ok(bytes.into()),
        }
    }

    /// Checks if current compression actually compresses data.
    #[inline]
    pub fn is_compressed(self) -> bool {
        self != Compression::None
    }

    /// Decompresses `bytes` with the current algorithm.
    pub fn decode(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        match *self {
            Compression::Lz4 => Compression::decode_lz4(bytes),
            Compression::Snappy => Compression::decode_snappy(bytes),
            Compression::None => Ok(bytes),
        }
    }

    /// Name sent in the `COMPRESSION` startup option, if any.
    pub fn as_str(&self) -> Option<&'static str> {
        match *self {
            Compression::Lz4 => Some(LZ4),
            Compression::Snappy => Some(SNAPPY),
            Compression::None => None,
        }
    }

    fn encode_snappy(bytes: &[u8]) -> Result<Vec<u8>> {
        snap::raw::Encoder::new()
            .compress_vec(bytes)
            .map_err(CompressionError::Snappy)
    }

    fn decode_snappy(bytes: Vec<u8>) -> Result<Vec<u8>> {
        snap::raw::Decoder::new()
            .decompress_vec(bytes.as_slice())
            .map_err(CompressionError::Snappy)
    }

    // lz4 bodies are prefixed with the big-endian uncompressed length
    fn encode_lz4(bytes: &[u8]) -> Result<Vec<u8>> {
        let mut result = vec![0; 4 + lz4_flex::block::get_maximum_output_size(bytes.len())];
        result[..4].copy_from_slice(&(bytes.len() as i32).to_be_bytes());

        let compressed_len = lz4_flex::compress_into(bytes, &mut result[4..])
            .map_err(|error| CompressionError::Lz4(io::Error::new(io::ErrorKind::Other, error)))?;

        result.truncate(4 + compressed_len);
        Ok(result)
    }

    fn decode_lz4(bytes: Vec<u8>) -> Result<Vec<u8>> {
        if bytes.len() < 4 {
            return Err(CompressionError::Lz4(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "missing uncompressed length",
            )));
        }

        let uncompressed_size = i32::from_be_bytes(bytes[..4].try_into().map_err(|error| {
            CompressionError::Lz4(io::Error::new(io::ErrorKind::Other, error))
        })?);
        if uncompressed_size < 0 || uncompressed_size as usize > MAX_BODY_LEN {
            return Err(CompressionError::Lz4(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid uncompressed length: {uncompressed_size}"),
            )));
        }

        let uncompressed_size = uncompressed_size as usize;
        let result = lz4_flex::decompress(&bytes[4..], uncompressed_size).map_err(|error| {
            CompressionError::Lz4(io::Error::new(io::ErrorKind::Other, error))
        })?;

        if result.len() != uncompressed_size {
            return Err(CompressionError::Lz4(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "decompressed {} bytes, expected {uncompressed_size}",
                    result.len()
                ),
            )));
        }

        Ok(result)
    }
}

impl FromStr for Compression {
    type Err = CompressionError;

    /// Unlike the lenient conversion used when reading server options, configuration values must
    /// name an algorithm explicitly.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            LZ4 => Ok(Compression::Lz4),
            SNAPPY => Ok(Compression::Snappy),
            NONE | "" => Ok(Compression::None),
            _ => Err(CompressionError::Unsupported(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_compression_names() {
        assert_eq!("lz4".parse::<Compression>().unwrap(), Compression::Lz4);
        assert_eq!("SNAPPY".parse::<Compression>().unwrap(), Compression::Snappy);
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert!("deflate".parse::<Compression>().is_err());
    }

    #[test]
    fn should_decode_lz4() {
        let bytes = String::from("Hello World").into_bytes();
        let encoded = Compression::Lz4.encode(&bytes).unwrap();
        assert_eq!(&encoded[..4], &[0, 0, 0, 11]);
        assert_eq!(Compression::Lz4.decode(encoded).unwrap(), bytes);
    }

    #[test]
    fn should_reject_invalid_lz4_input() {
        // declares 127 bytes, but the block holds none
        assert!(Compression::Lz4.decode(vec![0, 0, 0, 0x7f, 0]).is_err());
        assert!(Compression::Lz4.decode(vec![0, 0]).is_err());
        assert!(Compression::Lz4.decode(vec![0xff, 0xff, 0xff, 0xff, 0]).is_err());
    }

    #[test]
    fn should_reject_oversized_lz4_length() {
        let mut encoded = Compression::Lz4.encode(b"Hello World").unwrap();
        encoded[..4].copy_from_slice(&i32::MAX.to_be_bytes());

        assert!(matches!(
            Compression::Lz4.decode(encoded),
            Err(CompressionError::Lz4(error)) if error.kind() == io::ErrorKind::InvalidData
        ));
    }

    #[test]
    fn should_reject_lz4_length_mismatch() {
        let mut encoded = Compression::Lz4.encode(b"Hello World").unwrap();
        encoded[..4].copy_from_slice(&12i32.to_be_bytes());

        assert!(Compression::Lz4.decode(encoded).is_err());
    }

    #[test]
    fn should_decode_snappy_with_non_utf8() {
        let v = vec![0xff, 0xff];
        let encoded = Compression::Snappy.encode(&v).unwrap();
        assert_eq!(Compression::Snappy.decode(encoded).unwrap(), v);
    }

    #[test]
    fn should_not_name_uncompressed() {
        assert_eq!(Compression::None.as_str(), None);
        assert!(!Compression::None.is_compressed());
    }
}
