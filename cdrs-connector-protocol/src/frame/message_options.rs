use std::collections::BTreeMap;
use std::io::Cursor;

use crate::error;
use crate::frame::{Direction, Envelope, Flags, FromCursor, Opcode, Serialize, Version};
use crate::types::{
    from_cursor_short, from_cursor_str, from_cursor_string_list, serialize_short, serialize_str,
    serialize_str_list, CIntShort,
};

/// SUPPORTED body: a `[string multimap]` of options the node accepts in STARTUP.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyResSupported {
    pub data: BTreeMap<String, Vec<String>>,
}

impl FromCursor for BodyResSupported {
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> error::Result<Self> {
        let len = from_cursor_short(cursor)? as u16;
        let data = (0..len)
            .map(|_| Ok((from_cursor_str(cursor)?, from_cursor_string_list(cursor)?)))
            .collect::<error::Result<_>>()?;

        Ok(BodyResSupported { data })
    }
}

impl Serialize for BodyResSupported {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>) {
        serialize_short(cursor, self.data.len() as CIntShort);
        for (key, values) in &self.data {
            serialize_str(cursor, key);
            serialize_str_list(cursor, values.iter().map(String::as_str));
        }
    }
}

impl Envelope {
    /// Creates new envelope of type `options`. Used as a lightweight heartbeat.
    pub fn new_req_options(version: Version) -> Envelope {
        Envelope::new(
            version,
            Direction::Request,
            Flags::empty(),
            Opcode::Options,
            0,
            vec![],
        )
    }
}
