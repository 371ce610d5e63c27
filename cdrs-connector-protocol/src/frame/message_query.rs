//! Bare QUERY request: statement text, consistency and no values. Only used for metadata probes
//! issued while a connection is being set up.
use std::io::{Cursor, Write};

use crate::error;
use crate::frame::{Direction, Envelope, Flags, FromCursor, Opcode, Serialize, Version};
use crate::types::{
    from_cursor_long_str, from_cursor_short, from_cursor_u8, serialize_long_str, serialize_short,
    CIntShort,
};

/// `ONE` consistency level.
pub const CONSISTENCY_ONE: CIntShort = 0x0001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyReqQuery {
    pub query: String,
    pub consistency: CIntShort,
}

impl Serialize for BodyReqQuery {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>) {
        serialize_long_str(cursor, &self.query);
        serialize_short(cursor, self.consistency);
        // no flags: no values, no paging, no serial consistency
        let _ = cursor.write(&[0]);
    }
}

impl FromCursor for BodyReqQuery {
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> error::Result<Self> {
        let query = from_cursor_long_str(cursor)?;
        let consistency = from_cursor_short(cursor)?;
        let _flags = from_cursor_u8(cursor)?;

        Ok(BodyReqQuery { query, consistency })
    }
}

impl Envelope {
    /// Creates new envelope of type `query` without values.
    pub fn new_req_query(query: impl Into<String>, version: Version) -> Envelope {
        Envelope::new(
            version,
            Direction::Request,
            Flags::empty(),
            Opcode::Query,
            0,
            BodyReqQuery {
                query: query.into(),
                consistency: CONSISTENCY_ONE,
            }
            .serialize_to_vec(),
        )
    }
}
