//! MSB-continuation variable-length integers.
//!
//! Layout of the first byte, from the most significant bit down:
//!
//! ```text
//! [prefix_bits caller flag bits][continuation bit][7 - prefix_bits data bits]
//! ```
//!
//! Every following byte is `[continuation bit][7 data bits]`. Data groups are
//! written least significant first. With `prefix_bits == 0` this is plain
//! LEB128.

use crate::cursor::ByteReader;
use crate::error::{FormatError, FormatResult};

/// Widest flag prefix the first byte can carry while keeping one data bit.
pub const MAX_PREFIX_BITS: u8 = 6;

/// Encode `value` with no flag prefix.
pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    write_varint_prefixed(buf, value, 0, 0);
}

/// Encode `value`, packing `prefix` into the top `prefix_bits` of the first byte.
///
/// Bits of `prefix` above `prefix_bits` are ignored. A `prefix_bits` wider
/// than [`MAX_PREFIX_BITS`] is clamped to it.
pub fn write_varint_prefixed(buf: &mut Vec<u8>, value: u64, prefix_bits: u8, prefix: u8) {
    let prefix_bits = prefix_bits.min(MAX_PREFIX_BITS);
    let data_bits = 7 - prefix_bits;
    let mut first = if prefix_bits == 0 {
        0
    } else {
        let mask = (1u8 << prefix_bits) - 1;
        (prefix & mask) << (8 - prefix_bits)
    };
    first |= (value & ((1u64 << data_bits) - 1)) as u8;
    let mut rest = value >> data_bits;
    if rest != 0 {
        first |= 1 << data_bits;
    }
    buf.push(first);

    while rest != 0 {
        let mut byte = (rest & 0x7F) as u8;
        rest >>= 7;
        if rest != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
    }
}

/// Decode a VarInt written without a flag prefix.
pub fn read_varint(reader: &mut ByteReader<'_>) -> FormatResult<u64> {
    read_varint_prefixed(reader, 0).map(|(value, _)| value)
}

/// Decode a VarInt whose first byte carries `prefix_bits` flag bits.
///
/// Returns `(value, prefix)`.
pub fn read_varint_prefixed(
    reader: &mut ByteReader<'_>,
    prefix_bits: u8,
) -> FormatResult<(u64, u8)> {
    if prefix_bits > MAX_PREFIX_BITS {
        return Err(FormatError::InvalidPrefixWidth(prefix_bits));
    }
    let data_bits = 7 - prefix_bits;
    let first = reader.read_u8()?;
    let prefix = if prefix_bits == 0 {
        0
    } else {
        first >> (8 - prefix_bits)
    };

    let mut value = u64::from(first) & ((1u64 << data_bits) - 1);
    let mut more = first & (1 << data_bits) != 0;
    let mut shift = u32::from(data_bits);

    while more {
        let byte = reader.read_u8()?;
        let group = u64::from(byte & 0x7F);
        if shift >= 64 {
            if group != 0 {
                return Err(FormatError::VarIntOverflow);
            }
        } else {
            if shift > 57 && group >> (64 - shift) != 0 {
                return Err(FormatError::VarIntOverflow);
            }
            value |= group << shift;
        }
        shift += 7;
        if shift > 70 {
            return Err(FormatError::VarIntOverflow);
        }
        more = byte & 0x80 != 0;
    }

    Ok((value, prefix))
}

/// Number of bytes `value` occupies when written with `prefix_bits` flag bits.
pub fn encoded_len(value: u64, prefix_bits: u8) -> usize {
    let mut buf = Vec::with_capacity(10);
    write_varint_prefixed(&mut buf, value, prefix_bits, 0);
    buf.len()
}
