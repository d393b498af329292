//! Tagged extension buffer and the enum-field encoding built on it.
//!
//! Wire layout:
//!
//! ```text
//! varint(count) { varint(tag << 3 | type) value }*
//! type 0: value = varint
//! type 1: value = varint(len) bytes
//! ```
//!
//! Enumerated header fields are written as `varint(code << 1 | has_ext)`,
//! followed by an extension buffer when `has_ext` is set.

use std::collections::BTreeMap;

use crate::cursor::ByteReader;
use crate::error::{FormatError, FormatResult};
use crate::varint::{read_varint, write_varint};

const TYPE_VARINT: u64 = 0;
const TYPE_BYTES: u64 = 1;

/// A single extension value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtensionValue {
    Int(u64),
    Bytes(Vec<u8>),
}

/// Minimal ordered tag → value map.
///
/// Tags are written in ascending order so equal buffers always encode to
/// equal bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionBuffer {
    entries: BTreeMap<u64, ExtensionValue>,
}

impl ExtensionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_int(&mut self, tag: u64, value: u64) {
        self.entries.insert(tag, ExtensionValue::Int(value));
    }

    pub fn put_bytes(&mut self, tag: u64, value: impl Into<Vec<u8>>) {
        self.entries.insert(tag, ExtensionValue::Bytes(value.into()));
    }

    pub fn get(&self, tag: u64) -> Option<&ExtensionValue> {
        self.entries.get(&tag)
    }

    /// The integer stored under `tag`, if the tag holds an integer.
    pub fn get_int(&self, tag: u64) -> Option<u64> {
        match self.entries.get(&tag) {
            Some(ExtensionValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bytes(&self, tag: u64) -> Option<&[u8]> {
        match self.entries.get(&tag) {
            Some(ExtensionValue::Bytes(v)) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        write_varint(buf, self.entries.len() as u64);
        for (tag, value) in &self.entries {
            match value {
                ExtensionValue::Int(v) => {
                    write_varint(buf, (tag << 3) | TYPE_VARINT);
                    write_varint(buf, *v);
                }
                ExtensionValue::Bytes(bytes) => {
                    write_varint(buf, (tag << 3) | TYPE_BYTES);
                    write_varint(buf, bytes.len() as u64);
                    buf.extend_from_slice(bytes);
                }
            }
        }
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> FormatResult<Self> {
        let count = read_varint(reader)?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key = read_varint(reader)?;
            let tag = key >> 3;
            let value = match key & 0b111 {
                TYPE_VARINT => ExtensionValue::Int(read_varint(reader)?),
                TYPE_BYTES => {
                    let len = read_varint(reader)?;
                    let len = usize::try_from(len).map_err(|_| FormatError::LengthMismatch {
                        declared: len,
                        actual: reader.remaining() as u64,
                    })?;
                    ExtensionValue::Bytes(reader.read_bytes(len)?.to_vec())
                }
                other => {
                    return Err(FormatError::UnknownEnum {
                        field: "extension value type",
                        code: other,
                    })
                }
            };
            entries.insert(tag, value);
        }
        Ok(Self { entries })
    }
}

/// Write an enumerated field: `varint(code << 1 | has_ext)` plus the optional buffer.
pub fn write_enum_field(buf: &mut Vec<u8>, code: u64, ext: Option<&ExtensionBuffer>) {
    match ext.filter(|e| !e.is_empty()) {
        Some(ext) => {
            write_varint(buf, (code << 1) | 1);
            ext.encode(buf);
        }
        None => write_varint(buf, code << 1),
    }
}

/// Read an enumerated field written by [`write_enum_field`].
pub fn read_enum_field(
    reader: &mut ByteReader<'_>,
) -> FormatResult<(u64, Option<ExtensionBuffer>)> {
    let raw = read_varint(reader)?;
    let ext = if raw & 1 == 1 {
        Some(ExtensionBuffer::decode(reader)?)
    } else {
        None
    };
    Ok((raw >> 1, ext))
}
