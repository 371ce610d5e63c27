//! Envelope framing: the 9-byte header shared by every request and response, followed by an
//! optionally compressed body.
use bitflags::bitflags;
use derive_more::Display;
use std::convert::TryFrom;

use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::frame::message_response::ResponseBody;
pub use crate::frame::traits::*;

pub mod message_auth;
pub mod message_error;
pub mod message_options;
pub mod message_query;
pub mod message_response;
pub mod message_result;
pub mod message_startup;
pub mod traits;

/// Length of the envelope header for protocol v3 and later.
pub const HEADER_LEN: usize = 9;
/// Largest body a node accepts by default (256MB).
pub const MAX_BODY_LEN: usize = 256 * 1024 * 1024;
/// Stream used by the server to push events.
pub const EVENT_STREAM_ID: StreamId = -1;

pub type StreamId = i16;

#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display, Default)]
pub enum Version {
    V3,
    #[default]
    V4,
}

impl From<Version> for u8 {
    fn from(value: Version) -> Self {
        match value {
            Version::V3 => 3,
            Version::V4 => 4,
        }
    }
}

impl TryFrom<u8> for Version {
    type Error = Error;

    fn try_from(version: u8) -> Result<Self> {
        match version & 0x7F {
            3 => Ok(Version::V3),
            4 => Ok(Version::V4),
            v => Err(Error::UnknownVersion(v)),
        }
    }
}

#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display)]
pub enum Direction {
    Request,
    Response,
}

impl From<Direction> for u8 {
    fn from(value: Direction) -> u8 {
        match value {
            Direction::Request => 0x00,
            Direction::Response => 0x80,
        }
    }
}

impl From<u8> for Direction {
    fn from(value: u8) -> Self {
        match value & 0x80 {
            0 => Direction::Request,
            _ => Direction::Response,
        }
    }
}

bitflags! {
    /// Envelope flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        const COMPRESSION = 0x01;
        const TRACING = 0x02;
        const CUSTOM_PAYLOAD = 0x04;
        const WARNING = 0x08;
    }
}

#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash, Display)]
pub enum Opcode {
    Error,
    Startup,
    Ready,
    Authenticate,
    Options,
    Supported,
    Query,
    Result,
    Prepare,
    Execute,
    Register,
    Event,
    Batch,
    AuthChallenge,
    AuthResponse,
    AuthSuccess,
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Error => 0x00,
            Opcode::Startup => 0x01,
            Opcode::Ready => 0x02,
            Opcode::Authenticate => 0x03,
            Opcode::Options => 0x05,
            Opcode::Supported => 0x06,
            Opcode::Query => 0x07,
            Opcode::Result => 0x08,
            Opcode::Prepare => 0x09,
            Opcode::Execute => 0x0A,
            Opcode::Register => 0x0B,
            Opcode::Event => 0x0C,
            Opcode::Batch => 0x0D,
            Opcode::AuthChallenge => 0x0E,
            Opcode::AuthResponse => 0x0F,
            Opcode::AuthSuccess => 0x10,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Opcode::Error),
            0x01 => Ok(Opcode::Startup),
            0x02 => Ok(Opcode::Ready),
            0x03 => Ok(Opcode::Authenticate),
            0x05 => Ok(Opcode::Options),
            0x06 => Ok(Opcode::Supported),
            0x07 => Ok(Opcode::Query),
            0x08 => Ok(Opcode::Result),
            0x09 => Ok(Opcode::Prepare),
            0x0A => Ok(Opcode::Execute),
            0x0B => Ok(Opcode::Register),
            0x0C => Ok(Opcode::Event),
            0x0D => Ok(Opcode::Batch),
            0x0E => Ok(Opcode::AuthChallenge),
            0x0F => Ok(Opcode::AuthResponse),
            0x10 => Ok(Opcode::AuthSuccess),
            _ => Err(Error::UnknownOpcode(value)),
        }
    }
}

/// Decoded envelope header. The body length tells the reader how many bytes follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub version: Version,
    pub direction: Direction,
    pub flags: Flags,
    pub stream_id: StreamId,
    pub opcode: Opcode,
    pub body_len: usize,
}

impl EnvelopeHeader {
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        let body_len = i32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        if body_len < 0 || body_len as usize > MAX_BODY_LEN {
            return Err(Error::General(format!("Invalid body length: {body_len}")));
        }

        Ok(EnvelopeHeader {
            version: Version::try_from(bytes[0])?,
            direction: Direction::from(bytes[0]),
            flags: Flags::from_bits_truncate(bytes[1]),
            stream_id: StreamId::from_be_bytes([bytes[2], bytes[3]]),
            opcode: Opcode::try_from(bytes[4])?,
            body_len: body_len as usize,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: Version,
    pub direction: Direction,
    pub flags: Flags,
    pub opcode: Opcode,
    pub stream_id: StreamId,
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn new(
        version: Version,
        direction: Direction,
        flags: Flags,
        opcode: Opcode,
        stream_id: StreamId,
        body: Vec<u8>,
    ) -> Self {
        Envelope {
            version,
            direction,
            flags,
            opcode,
            stream_id,
            body,
        }
    }

    #[inline]
    pub fn with_stream_id(mut self, stream_id: StreamId) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Rebuilds an envelope from a parsed header and its raw body, decompressing the body when
    /// the header says so.
    pub fn from_parts(
        header: EnvelopeHeader,
        body: Vec<u8>,
        compression: Compression,
    ) -> Result<Envelope> {
        let body = if header.flags.contains(Flags::COMPRESSION) && !body.is_empty() {
            if !compression.is_compressed() {
                return Err(Error::General(
                    "Received compressed envelope without negotiated compression".into(),
                ));
            }

            compression.decode(body)?
        } else {
            body
        };

        Ok(Envelope {
            version: header.version,
            direction: header.direction,
            flags: header.flags - Flags::COMPRESSION,
            opcode: header.opcode,
            stream_id: header.stream_id,
            body,
        })
    }

    /// Decodes the body of a response envelope.
    pub fn response_body(&self) -> Result<ResponseBody> {
        ResponseBody::try_from(self.body.as_slice(), self.opcode)
    }

    /// Encodes the envelope. STARTUP is always sent uncompressed, since compression is negotiated
    /// by it.
    pub fn encode_with(&self, compression: Compression) -> Result<Vec<u8>> {
        let compress = compression.is_compressed() && self.opcode != Opcode::Startup;
        let body = if compress {
            compression.encode(&self.body)?
        } else {
            self.body.clone()
        };

        let flags = if compress {
            self.flags | Flags::COMPRESSION
        } else {
            self.flags
        };

        let mut v = Vec::with_capacity(HEADER_LEN + body.len());
        v.push(u8::from(self.version) | u8::from(self.direction));
        v.push(flags.bits());
        v.extend_from_slice(&self.stream_id.to_be_bytes());
        v.push(u8::from(self.opcode));
        v.extend_from_slice(&(body.len() as i32).to_be_bytes());
        v.extend_from_slice(&body);

        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_encode_version_and_direction() {
        assert_eq!(u8::from(Version::V4), 0x04);
        assert_eq!(u8::from(Direction::Response), 0x80);
        assert_eq!(Version::try_from(0x84).unwrap(), Version::V4);
        assert_eq!(Direction::from(0x84), Direction::Response);
        assert!(Version::try_from(0x02).is_err());
    }

    #[test]
    fn should_map_opcodes_both_ways() {
        for byte in (0x00..=0x10u8).filter(|byte| *byte != 0x04) {
            assert_eq!(u8::from(Opcode::try_from(byte).unwrap()), byte);
        }

        assert!(Opcode::try_from(0x04).is_err());
    }

    #[test]
    fn should_encode_ready() {
        let envelope = Envelope::new(
            Version::V4,
            Direction::Request,
            Flags::empty(),
            Opcode::Ready,
            0,
            vec![],
        );

        assert_eq!(
            envelope.encode_with(Compression::None).unwrap(),
            vec![4, 0, 0, 0, 2, 0, 0, 0, 0]
        );
    }

    #[test]
    fn should_parse_header() {
        let header = EnvelopeHeader::parse(&[0x84, 0x08, 0, 7, 0x06, 0, 0, 0, 12]).unwrap();
        assert_eq!(header.version, Version::V4);
        assert_eq!(header.direction, Direction::Response);
        assert_eq!(header.flags, Flags::WARNING);
        assert_eq!(header.stream_id, 7);
        assert_eq!(header.opcode, Opcode::Supported);
        assert_eq!(header.body_len, 12);
    }

    #[test]
    fn should_reject_negative_body_length() {
        assert!(EnvelopeHeader::parse(&[0x84, 0, 0, 1, 0x02, 0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn should_not_compress_startup() {
        let envelope = Envelope::new_req_startup(Some("lz4"), Version::V4);
        let encoded = envelope.encode_with(Compression::Lz4).unwrap();
        assert_eq!(encoded[1], 0);
        assert_eq!(&encoded[HEADER_LEN..], envelope.body.as_slice());
    }

    #[test]
    fn should_decompress_body_from_parts() {
        let envelope = Envelope::new_req_options(Version::V4).with_stream_id(3);
        let compressed = Compression::Snappy.encode(b"payload").unwrap();
        let header = EnvelopeHeader {
            version: Version::V4,
            direction: Direction::Response,
            flags: Flags::COMPRESSION,
            stream_id: envelope.stream_id,
            opcode: Opcode::Supported,
            body_len: compressed.len(),
        };

        let decoded = Envelope::from_parts(header, compressed, Compression::Snappy).unwrap();
        assert_eq!(decoded.body, b"payload".to_vec());
        assert!(!decoded.flags.contains(Flags::COMPRESSION));
    }
}
