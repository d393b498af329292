use sheaf_crypto::IV_SIZE;
use sheaf_types::{Hash, HASH_SIZE};

use crate::cursor::ByteReader;
use crate::error::{FormatError, FormatResult};

/// Size of a serialized [`ChunkPointer`]: 8 + 32 + 32 + 16 bytes.
pub const POINTER_SIZE: usize = 8 + HASH_SIZE + HASH_SIZE + IV_SIZE;

/// Fixed-size reference to a stored chunk.
///
/// `data_length` is the logical length of everything under the pointer: the
/// byte length of a data chunk, or the total data length of a node's subtree.
/// `data_hash` identifies the content; `box_hash` identifies the stored box
/// and is what the byte store is keyed by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChunkPointer {
    pub data_length: u64,
    pub data_hash: Hash,
    pub box_hash: Hash,
    pub iv: [u8; IV_SIZE],
}

impl ChunkPointer {
    pub fn new(data_length: u64, data_hash: Hash, box_hash: Hash, iv: [u8; IV_SIZE]) -> Self {
        Self {
            data_length,
            data_hash,
            box_hash,
            iv,
        }
    }

    /// Append the 88-byte record to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.data_length.to_be_bytes());
        buf.extend_from_slice(self.data_hash.as_bytes());
        buf.extend_from_slice(self.box_hash.as_bytes());
        buf.extend_from_slice(&self.iv);
    }

    pub fn to_bytes(&self) -> [u8; POINTER_SIZE] {
        let mut buf = Vec::with_capacity(POINTER_SIZE);
        self.encode(&mut buf);
        let mut out = [0u8; POINTER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> FormatResult<Self> {
        Ok(Self {
            data_length: reader.read_u64_be()?,
            data_hash: reader.read_hash()?,
            box_hash: reader.read_hash()?,
            iv: reader.read_array::<IV_SIZE>()?,
        })
    }

    /// Decode a packed sequence of records, as stored in a node box.
    ///
    /// The input length must be an exact multiple of [`POINTER_SIZE`].
    pub fn decode_all(bytes: &[u8]) -> FormatResult<Vec<Self>> {
        if bytes.len() % POINTER_SIZE != 0 {
            return Err(FormatError::LengthMismatch {
                declared: (bytes.len() / POINTER_SIZE * POINTER_SIZE) as u64,
                actual: bytes.len() as u64,
            });
        }
        let mut reader = ByteReader::new(bytes);
        let mut out = Vec::with_capacity(bytes.len() / POINTER_SIZE);
        while !reader.is_empty() {
            out.push(Self::decode(&mut reader)?);
        }
        Ok(out)
    }
}
