use sheaf_crypto::IV_SIZE;
use sheaf_types::Hash;

use crate::cursor::ByteReader;
use crate::error::{FormatError, FormatResult};
use crate::header::{BoxHeader, Header};
use crate::pointer::ChunkPointer;

/// Content identity of a container: its data hash and logical header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DataPart {
    pub data_hash: Hash,
    pub header: Header,
}

impl DataPart {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.data_hash.as_bytes());
        self.header.encode(buf);
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> FormatResult<Self> {
        Ok(Self {
            data_hash: reader.read_hash()?,
            header: Header::decode(reader)?,
        })
    }
}

/// Physical identity of a container's root box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BoxPart {
    pub box_hash: Hash,
    pub iv: [u8; IV_SIZE],
    pub box_header: BoxHeader,
}

impl BoxPart {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.box_hash.as_bytes());
        buf.extend_from_slice(&self.iv);
        self.box_header.encode(buf);
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> FormatResult<Self> {
        Ok(Self {
            box_hash: reader.read_hash()?,
            iv: reader.read_array::<IV_SIZE>()?,
            box_header: BoxHeader::decode(reader)?,
        })
    }
}

/// Persistent reference to a container.
///
/// This is the only thing referencing structures store; everything else is
/// reconstructed by reading the bytes behind `boxed.box_hash`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ref {
    pub data: DataPart,
    pub boxed: BoxPart,
}

impl Ref {
    pub fn new(data: DataPart, boxed: BoxPart) -> Self {
        Self { data, boxed }
    }

    pub fn data_hash(&self) -> Hash {
        self.data.data_hash
    }

    pub fn box_hash(&self) -> Hash {
        self.boxed.box_hash
    }

    pub fn header(&self) -> &Header {
        &self.data.header
    }

    pub fn data_length(&self) -> u64 {
        self.data.header.data_length
    }

    /// Pointer to the root box, as a parent node would record it.
    pub fn root_pointer(&self) -> ChunkPointer {
        ChunkPointer::new(
            self.data.header.data_length,
            self.data.data_hash,
            self.boxed.box_hash,
            self.boxed.iv,
        )
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.data.encode(buf);
        self.boxed.encode(buf);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(96);
        self.encode(&mut buf);
        buf
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> FormatResult<Self> {
        Ok(Self {
            data: DataPart::decode(reader)?,
            boxed: BoxPart::decode(reader)?,
        })
    }

    /// Decode a ref that must span all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> FormatResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let r = Self::decode(&mut reader)?;
        reader.expect_end()?;
        Ok(r)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> FormatResult<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| FormatError::MalformedText(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}",
            self.data.data_hash.short_hex(),
            self.boxed.box_hash.short_hex()
        )
    }
}
