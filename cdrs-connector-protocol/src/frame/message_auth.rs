//! SASL exchange: AUTHENTICATE (server names its authenticator), AUTH_RESPONSE (client token),
//! AUTH_CHALLENGE and AUTH_SUCCESS.
use std::io::Cursor;

use crate::error;
use crate::frame::{Direction, Envelope, Flags, FromCursor, Opcode, Serialize, Version};
use crate::types::{from_cursor_bytes, from_cursor_str, serialize_bytes, serialize_str, CBytes};

/// Body of an AUTHENTICATE response: fully qualified class name of the server authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BodyResAuthenticate {
    pub data: String,
}

impl FromCursor for BodyResAuthenticate {
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> error::Result<Self> {
        from_cursor_str(cursor).map(|data| BodyResAuthenticate { data })
    }
}

impl Serialize for BodyResAuthenticate {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>) {
        serialize_str(cursor, &self.data);
    }
}

/// A SASL token, used by AUTH_RESPONSE, AUTH_CHALLENGE and AUTH_SUCCESS alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BodyAuthToken {
    pub data: CBytes,
}

impl FromCursor for BodyAuthToken {
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> error::Result<Self> {
        from_cursor_bytes(cursor).map(|data| BodyAuthToken { data })
    }
}

impl Serialize for BodyAuthToken {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>) {
        serialize_bytes(cursor, &self.data);
    }
}

impl Envelope {
    /// Creates new envelope of type `AuthResponse`.
    pub fn new_req_auth_response(token: CBytes, version: Version) -> Envelope {
        Envelope::new(
            version,
            Direction::Request,
            Flags::empty(),
            Opcode::AuthResponse,
            0,
            BodyAuthToken { data: token }.serialize_to_vec(),
        )
    }
}
