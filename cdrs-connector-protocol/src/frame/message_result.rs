//! RESULT response body. `ROWS` results are decoded into raw cells; typed conversion is left to
//! callers, which only ever read a handful of text columns from system tables.
use derive_more::Display;
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::frame::{FromCursor, Serialize};
use crate::types::{
    from_cursor_bytes, from_cursor_int, from_cursor_short, from_cursor_str, serialize_bytes,
    serialize_int, serialize_short, serialize_str, CBytes, CInt, CIntShort,
};

const GLOBAL_TABLE_SPEC: CInt = 0x0001;
const HAS_MORE_PAGES: CInt = 0x0002;
const NO_METADATA: CInt = 0x0004;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ResultKind {
    Void,
    Rows,
    SetKeyspace,
    Prepared,
    SchemaChange,
}

impl TryFrom<CInt> for ResultKind {
    type Error = Error;

    fn try_from(value: CInt) -> Result<Self> {
        match value {
            0x0001 => Ok(ResultKind::Void),
            0x0002 => Ok(ResultKind::Rows),
            0x0003 => Ok(ResultKind::SetKeyspace),
            0x0004 => Ok(ResultKind::Prepared),
            0x0005 => Ok(ResultKind::SchemaChange),
            _ => Err(Error::UnexpectedResultKind(value)),
        }
    }
}

/// Column type ids which carry no nested type information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColType {
    Ascii,
    Bigint,
    Blob,
    Boolean,
    Int,
    Uuid,
    Varchar,
    Inet,
    Timestamp,
    Other(CIntShort),
}

impl From<CIntShort> for ColType {
    fn from(id: CIntShort) -> Self {
        match id {
            0x0001 => ColType::Ascii,
            0x0002 => ColType::Bigint,
            0x0003 => ColType::Blob,
            0x0004 => ColType::Boolean,
            0x0009 => ColType::Int,
            0x000B => ColType::Timestamp,
            0x000C => ColType::Uuid,
            0x000D => ColType::Varchar,
            0x0010 => ColType::Inet,
            other => ColType::Other(other),
        }
    }
}

impl From<ColType> for CIntShort {
    fn from(col_type: ColType) -> Self {
        match col_type {
            ColType::Ascii => 0x0001,
            ColType::Bigint => 0x0002,
            ColType::Blob => 0x0003,
            ColType::Boolean => 0x0004,
            ColType::Int => 0x0009,
            ColType::Timestamp => 0x000B,
            ColType::Uuid => 0x000C,
            ColType::Varchar => 0x000D,
            ColType::Inet => 0x0010,
            ColType::Other(id) => id,
        }
    }
}

// custom, list, map and set carry nested options which need to be consumed
fn skip_type_option(cursor: &mut Cursor<&[u8]>, id: CIntShort) -> Result<()> {
    match id {
        0x0000 => from_cursor_str(cursor).map(|_| ()),
        0x0020 | 0x0022 => {
            let nested = from_cursor_short(cursor)?;
            skip_type_option(cursor, nested)
        }
        0x0021 => {
            let key = from_cursor_short(cursor)?;
            skip_type_option(cursor, key)?;
            let value = from_cursor_short(cursor)?;
            skip_type_option(cursor, value)
        }
        0x0030 | 0x0031 => Err(Error::UnexpectedColumnType(id)),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub col_type: ColType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyResResultRows {
    pub keyspace: String,
    pub table: String,
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<CBytes>>,
}

impl BodyResResultRows {
    /// Index of the named column, if present in the metadata.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Text value of the named column in the given row. Null cells and missing columns are
    /// returned as `None`.
    pub fn text(&self, row: usize, name: &str) -> Result<Option<String>> {
        let cell = self
            .column_index(name)
            .and_then(|index| self.rows.get(row).and_then(|row| row.get(index)));

        match cell.and_then(CBytes::as_slice) {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(Into::into),
            None => Ok(None),
        }
    }
}

impl FromCursor for BodyResResultRows {
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let flags = from_cursor_int(cursor)?;
        let columns_count = from_cursor_int(cursor)?.max(0) as usize;

        if flags & HAS_MORE_PAGES != 0 {
            from_cursor_bytes(cursor)?;
        }

        let mut result = BodyResResultRows::default();

        if flags & NO_METADATA == 0 {
            let global = flags & GLOBAL_TABLE_SPEC != 0;
            if global {
                result.keyspace = from_cursor_str(cursor)?;
                result.table = from_cursor_str(cursor)?;
            }

            for _ in 0..columns_count {
                if !global {
                    result.keyspace = from_cursor_str(cursor)?;
                    result.table = from_cursor_str(cursor)?;
                }

                let name = from_cursor_str(cursor)?;
                let id = from_cursor_short(cursor)?;
                skip_type_option(cursor, id)?;

                result.columns.push(ColumnSpec {
                    name,
                    col_type: ColType::from(id),
                });
            }
        }

        let rows_count = from_cursor_int(cursor)?.max(0) as usize;
        result.rows = (0..rows_count)
            .map(|_| {
                (0..columns_count)
                    .map(|_| from_cursor_bytes(cursor))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<_>>()?;

        Ok(result)
    }
}

impl Serialize for BodyResResultRows {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>) {
        serialize_int(cursor, GLOBAL_TABLE_SPEC);
        serialize_int(cursor, self.columns.len() as CInt);
        serialize_str(cursor, &self.keyspace);
        serialize_str(cursor, &self.table);

        for column in &self.columns {
            serialize_str(cursor, &column.name);
            serialize_short(cursor, column.col_type.into());
        }

        serialize_int(cursor, self.rows.len() as CInt);
        for cell in self.rows.iter().flatten() {
            serialize_bytes(cursor, cell);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResResultBody {
    Void,
    Rows(BodyResResultRows),
    SetKeyspace(String),
    /// Result kinds which are recognized, but not decoded.
    Other(ResultKind),
}

impl ResResultBody {
    #[inline]
    pub fn into_rows(self) -> Option<BodyResResultRows> {
        match self {
            ResResultBody::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

impl FromCursor for ResResultBody {
    fn from_cursor(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        match ResultKind::try_from(from_cursor_int(cursor)?)? {
            ResultKind::Void => Ok(ResResultBody::Void),
            ResultKind::Rows => BodyResResultRows::from_cursor(cursor).map(ResResultBody::Rows),
            ResultKind::SetKeyspace => from_cursor_str(cursor).map(ResResultBody::SetKeyspace),
            kind => Ok(ResResultBody::Other(kind)),
        }
    }
}

impl Serialize for ResResultBody {
    fn serialize(&self, cursor: &mut Cursor<&mut Vec<u8>>) {
        match self {
            ResResultBody::Void => serialize_int(cursor, 0x0001),
            ResResultBody::Rows(rows) => {
                serialize_int(cursor, 0x0002);
                rows.serialize(cursor);
            }
            ResResultBody::SetKeyspace(keyspace) => {
                serialize_int(cursor, 0x0003);
                serialize_str(cursor, keyspace);
            }
            ResResultBody::Other(kind) => serialize_int(
                cursor,
                match kind {
                    ResultKind::Void => 0x0001,
                    ResultKind::Rows => 0x0002,
                    ResultKind::SetKeyspace => 0x0003,
                    ResultKind::Prepared => 0x0004,
                    ResultKind::SchemaChange => 0x0005,
                },
            ),
        }
    }
}
