use sheaf_types::{Hash, HASH_SIZE};

use crate::error::{FormatError, FormatResult};

/// Forward-only reader over a byte slice used by every decoder.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> FormatResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bytes(&mut self, len: usize) -> FormatResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(FormatError::Truncated {
                needed: len,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> FormatResult<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    pub fn read_u64_be(&mut self) -> FormatResult<u64> {
        Ok(u64::from_be_bytes(self.read_array::<8>()?))
    }

    pub fn read_hash(&mut self) -> FormatResult<Hash> {
        Ok(Hash::from_hash(self.read_array::<HASH_SIZE>()?))
    }

    /// Fail unless every byte has been consumed.
    pub fn expect_end(&self) -> FormatResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(FormatError::TrailingBytes(n)),
        }
    }
}
