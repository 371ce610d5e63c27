use std::collections::BTreeMap;
use std::io::Cursor;

use crate::error;
use crate::frame::{Direction, Envelope, Flags, FromCursor, Opcode, Serialize, Version};
use crate::types::{from_cursor_short, from_cursor_str, serialize_short, serialize_str, CIntShort};

pub const CQL_VERSION: &str = "CQL_VERSION";
pub const CQL_VERSION_VAL: &str = "3.0.0";
pub const COMPRESSION: &str = "COMPRESSION";
pub const DRIVER_NAME: &str = "DRIVER_NAME";
pub const DRIVER_NAME_VAL: &str = "cdrs-connector";

/// STARTUP options, as a `[string map]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyReqStartup {
    pub map: BTreeMap<String, String>,
}

impl BodyReqStartup {
    pub fn new(compression: Option<&str>) -> BodyReqStartup {
        let mut map = BTreeMap::new();
        map.insert(CQL_VERSION.to_string(), CQL_VERSION_VAL.to_string());
        map.insert(DRIVER_NAME.to_string(), DRIVER_NAME_VAL.to_string());
        if let Some(c) = compression {
            map.insert(COMPRESSION.to_string(), c.to_string());
        }

        BodyReqStartup { map }
    }

    #[inline]
    pub fn compression(&self) -> Option<&str> {
        self.map.get(COMPRESSION).map(String::as_str)
    }
}

impl Serialize for BodyReqStartup {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>) {
        serialize_short(cursor, self.map.len() as CIntShort);

        for (key, val) in &self.map {
            serialize_str(cursor, key);
            serialize_str(cursor, val);
        }
    }
}

impl FromCursor for BodyReqStartup {
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> error::Result<Self> {
        let len = from_cursor_short(cursor)? as u16;
        let map = (0..len)
            .map(|_| Ok((from_cursor_str(cursor)?, from_cursor_str(cursor)?)))
            .collect::<error::Result<_>>()?;

        Ok(BodyReqStartup { map })
    }
}

impl Envelope {
    /// Creates new envelope of type `startup`.
    pub fn new_req_startup(compression: Option<&str>, version: Version) -> Envelope {
        Envelope::new(
            version,
            Direction::Request,
            Flags::empty(),
            Opcode::Startup,
            0,
            BodyReqStartup::new(compression).serialize_to_vec(),
        )
    }
}
