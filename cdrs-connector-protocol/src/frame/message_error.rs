//! ERROR response body. Only the code and message are decoded; code-specific additional
//! information is skipped, since nothing during connection setup depends on it.
use derive_more::Display;
use std::fmt;
use std::io::Cursor;

use crate::error;
use crate::frame::{FromCursor, Serialize};
use crate::types::{from_cursor_int, from_cursor_str, serialize_int, serialize_str, CInt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorCode {
    #[display("Server error")]
    Server,
    #[display("Protocol error")]
    Protocol,
    #[display("Authentication error")]
    Authentication,
    #[display("Unavailable")]
    Unavailable,
    #[display("Overloaded")]
    Overloaded,
    #[display("Is bootstrapping")]
    IsBootstrapping,
    #[display("Truncate error")]
    Truncate,
    #[display("Write timeout")]
    WriteTimeout,
    #[display("Read timeout")]
    ReadTimeout,
    #[display("Read failure")]
    ReadFailure,
    #[display("Function failure")]
    FunctionFailure,
    #[display("Write failure")]
    WriteFailure,
    #[display("Syntax error")]
    Syntax,
    #[display("Unauthorized")]
    Unauthorized,
    #[display("Invalid")]
    Invalid,
    #[display("Config error")]
    Config,
    #[display("Already exists")]
    AlreadyExists,
    #[display("Unprepared")]
    Unprepared,
    #[display("Unknown error code {_0:#06x}")]
    Other(CInt),
}

impl From<CInt> for ErrorCode {
    fn from(code: CInt) -> Self {
        match code {
            0x0000 => ErrorCode::Server,
            0x000A => ErrorCode::Protocol,
            0x0100 => ErrorCode::Authentication,
            0x1000 => ErrorCode::Unavailable,
            0x1001 => ErrorCode::Overloaded,
            0x1002 => ErrorCode::IsBootstrapping,
            0x1003 => ErrorCode::Truncate,
            0x1100 => ErrorCode::WriteTimeout,
            0x1200 => ErrorCode::ReadTimeout,
            0x1300 => ErrorCode::ReadFailure,
            0x1400 => ErrorCode::FunctionFailure,
            0x1500 => ErrorCode::WriteFailure,
            0x2000 => ErrorCode::Syntax,
            0x2100 => ErrorCode::Unauthorized,
            0x2200 => ErrorCode::Invalid,
            0x2300 => ErrorCode::Config,
            0x2400 => ErrorCode::AlreadyExists,
            0x2500 => ErrorCode::Unprepared,
            other => ErrorCode::Other(other),
        }
    }
}

impl From<ErrorCode> for CInt {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Server => 0x0000,
            ErrorCode::Protocol => 0x000A,
            ErrorCode::Authentication => 0x0100,
            ErrorCode::Unavailable => 0x1000,
            ErrorCode::Overloaded => 0x1001,
            ErrorCode::IsBootstrapping => 0x1002,
            ErrorCode::Truncate => 0x1003,
            ErrorCode::WriteTimeout => 0x1100,
            ErrorCode::ReadTimeout => 0x1200,
            ErrorCode::ReadFailure => 0x1300,
            ErrorCode::FunctionFailure => 0x1400,
            ErrorCode::WriteFailure => 0x1500,
            ErrorCode::Syntax => 0x2000,
            ErrorCode::Unauthorized => 0x2100,
            ErrorCode::Invalid => 0x2200,
            ErrorCode::Config => 0x2300,
            ErrorCode::AlreadyExists => 0x2400,
            ErrorCode::Unprepared => 0x2500,
            ErrorCode::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorBody {
    pub error_code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        ErrorBody {
            error_code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code, self.message)
    }
}

impl FromCursor for ErrorBody {
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> error::Result<Self> {
        let error_code = ErrorCode::from(from_cursor_int(cursor)?);
        let message = from_cursor_str(cursor)?;

        Ok(ErrorBody {
            error_code,
            message,
        })
    }
}

impl Serialize for ErrorBody {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>) {
        serialize_int(cursor, self.error_code.into());
        serialize_str(cursor, &self.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_decode_bad_credentials() {
        let bytes = [0, 0, 1, 0, 0, 3, b'b', b'a', b'd'];
        let body = ErrorBody::from_cursor(&mut Cursor::new(&bytes[..])).unwrap();
        assert_eq!(body.error_code, ErrorCode::Authentication);
        assert_eq!(body.message, "bad");
        assert_eq!(body.to_string(), "Authentication error: bad");
    }

    #[test]
    fn should_keep_unknown_codes() {
        assert_eq!(ErrorCode::from(0x7777), ErrorCode::Other(0x7777));
        assert_eq!(CInt::from(ErrorCode::Other(0x7777)), 0x7777);
    }
}
