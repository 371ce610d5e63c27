use std::io::Cursor;

use crate::error::Result;
use crate::frame::message_auth::{BodyAuthToken, BodyResAuthenticate};
use crate::frame::message_error::ErrorBody;
use crate::frame::message_options::BodyResSupported;
use crate::frame::message_result::ResResultBody;
use crate::frame::{FromCursor, Opcode};

/// Decoded body of a response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Error(ErrorBody),
    Ready,
    Authenticate(BodyResAuthenticate),
    Supported(BodyResSupported),
    Result(ResResultBody),
    AuthChallenge(BodyAuthToken),
    AuthSuccess(BodyAuthToken),
    /// Request opcodes and pushed events carry nothing the connection layer inspects.
    Other(Opcode),
}

impl ResponseBody {
    pub fn try_from(bytes: &[u8], response_type: Opcode) -> Result<ResponseBody> {
        let mut cursor: Cursor<&[u8]> = Cursor::new(bytes);
        Ok(match response_type {
            Opcode::Error => ResponseBody::Error(ErrorBody::from_cursor(&mut cursor)?),
            Opcode::Ready => ResponseBody::Ready,
            Opcode::Authenticate => {
                ResponseBody::Authenticate(BodyResAuthenticate::from_cursor(&mut cursor)?)
            }
            Opcode::Supported => {
                ResponseBody::Supported(BodyResSupported::from_cursor(&mut cursor)?)
            }
            Opcode::Result => ResponseBody::Result(ResResultBody::from_cursor(&mut cursor)?),
            Opcode::AuthChallenge => {
                ResponseBody::AuthChallenge(BodyAuthToken::from_cursor(&mut cursor)?)
            }
            Opcode::AuthSuccess => {
                ResponseBody::AuthSuccess(BodyAuthToken::from_cursor(&mut cursor)?)
            }
            other => ResponseBody::Other(other),
        })
    }

    /// Authenticator class the server requires, for AUTHENTICATE responses.
    pub fn authenticator(&self) -> Option<&str> {
        match self {
            ResponseBody::Authenticate(auth) => Some(auth.data.as_str()),
            _ => None,
        }
    }

    pub fn into_error(self) -> Option<ErrorBody> {
        match self {
            ResponseBody::Error(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::message_error::ErrorCode;

    #[test]
    fn should_expose_authenticator_name() {
        let body = ResponseBody::try_from(&[0, 1, b'x'], Opcode::Authenticate).unwrap();
        assert_eq!(body.authenticator(), Some("x"));
    }

    #[test]
    fn should_decode_error() {
        let body = ResponseBody::try_from(&[0, 0, 0x10, 0x01, 0, 0], Opcode::Error).unwrap();
        assert_eq!(body.into_error().unwrap().error_code, ErrorCode::Overloaded);
    }

    #[test]
    fn should_decode_ready_without_body() {
        assert_eq!(
            ResponseBody::try_from(&[], Opcode::Ready).unwrap(),
            ResponseBody::Ready
        );
    }
}
