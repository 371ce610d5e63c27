use std::io::Cursor;

use crate::error;

/// Trait that should be implemented by all types that wish to be serialized to a buffer.
pub trait Serialize {
    /// Serializes given value using the cursor.
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>);

    /// Wrapper for easily starting hierarchical serialization.
    fn serialize_to_vec(&self) -> Vec<u8> {
        let mut buf = vec![];
        self.serialize(&mut Cursor::new(&mut buf));
        buf
    }
}

/// `FromCursor` should be used to get parsed structure from an `io:Cursor`
/// which bound to an array of bytes.
pub trait FromCursor {
    /// Tries to parse Self from a cursor of bytes.
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> error::Result<Self>
    where
        Self: Sized;
}
