//! Container and box headers.
//!
//! A [`Header`] says how to interpret a container's logical bytes; a
//! [`BoxHeader`] says how the root box was physically encoded.

use serde::{Deserialize, Serialize};
use sheaf_crypto::HashAlgorithm;

use crate::chunking::ChunkingConfig;
use crate::cursor::ByteReader;
use crate::error::{FormatError, FormatResult};
use crate::extension::{read_enum_field, write_enum_field};
use crate::varint::{read_varint, write_varint};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in code order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub const fn code(self) -> u64 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            pub fn from_code(code: u64) -> FormatResult<Self> {
                match code {
                    $($code => Ok(Self::$variant),)+
                    other => Err(FormatError::UnknownEnum { field: $field, code: other }),
                }
            }

            fn encode(self, buf: &mut Vec<u8>) {
                write_enum_field(buf, self.code(), None);
            }

            fn decode(reader: &mut ByteReader<'_>) -> FormatResult<Self> {
                // No variant defines extension fields yet; a present buffer is skipped.
                let (code, _ext) = read_enum_field(reader)?;
                Self::from_code(code)
            }
        }
    };
}

wire_enum! {
    /// What a container's logical bytes represent.
    ContainerType, "container type" {
        #[default]
        Data = 0,
        Directory = 1,
        Commit = 2,
    }
}

wire_enum! {
    /// Physical layout of a stored box.
    BoxType, "box type" {
        #[default]
        Data = 0,
    }
}

wire_enum! {
    /// Whether box bytes pass through the external cipher.
    EncryptionType, "encryption type" {
        #[default]
        None = 0,
        Cipher = 1,
    }
}

wire_enum! {
    /// Compression applied to box bytes before encryption.
    CompressionType, "compression type" {
        #[default]
        None = 0,
        Zstd = 1,
    }
}

fn encode_hash_algorithm(algorithm: HashAlgorithm, buf: &mut Vec<u8>) {
    write_enum_field(buf, algorithm.code(), None);
}

fn decode_hash_algorithm(reader: &mut ByteReader<'_>) -> FormatResult<HashAlgorithm> {
    let (code, _ext) = read_enum_field(reader)?;
    HashAlgorithm::from_code(code).ok_or(FormatError::UnknownEnum {
        field: "hash algorithm",
        code,
    })
}

/// Logical description of a container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Header {
    pub container_type: ContainerType,
    /// Level of the root node: 0 for a single data chunk, 1 for a leaf node.
    pub level: u32,
    /// Total logical byte length.
    pub data_length: u64,
    pub chunking: ChunkingConfig,
    pub hash_algorithm: HashAlgorithm,
}

impl Header {
    pub fn new(container_type: ContainerType, chunking: ChunkingConfig, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            container_type,
            level: 0,
            data_length: 0,
            chunking,
            hash_algorithm,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.container_type.encode(buf);
        write_varint(buf, u64::from(self.level));
        write_varint(buf, self.data_length);
        self.chunking.encode(buf);
        encode_hash_algorithm(self.hash_algorithm, buf);
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> FormatResult<Self> {
        let container_type = ContainerType::decode(reader)?;
        let level = read_varint(reader)?;
        let level = u32::try_from(level).map_err(|_| FormatError::VarIntOverflow)?;
        let data_length = read_varint(reader)?;
        let chunking = ChunkingConfig::decode(reader)?;
        let hash_algorithm = decode_hash_algorithm(reader)?;
        Ok(Self {
            container_type,
            level,
            data_length,
            chunking,
            hash_algorithm,
        })
    }
}

/// Physical description of a container's root box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BoxHeader {
    pub box_type: BoxType,
    pub encryption: EncryptionType,
    pub compression: CompressionType,
}

impl BoxHeader {
    pub fn new(encryption: EncryptionType, compression: CompressionType) -> Self {
        Self {
            box_type: BoxType::Data,
            encryption,
            compression,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.box_type.encode(buf);
        self.encryption.encode(buf);
        self.compression.encode(buf);
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> FormatResult<Self> {
        Ok(Self {
            box_type: BoxType::decode(reader)?,
            encryption: EncryptionType::decode(reader)?,
            compression: CompressionType::decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn container_type() -> impl Strategy<Value = ContainerType> {
        proptest::sample::select(ContainerType::ALL)
    }

    fn encryption() -> impl Strategy<Value = EncryptionType> {
        proptest::sample::select(EncryptionType::ALL)
    }

    fn compression() -> impl Strategy<Value = CompressionType> {
        proptest::sample::select(CompressionType::ALL)
    }

    fn hash_algorithm() -> impl Strategy<Value = HashAlgorithm> {
        prop_oneof![Just(HashAlgorithm::Blake3), Just(HashAlgorithm::Sha256)]
    }

    fn boundary_u64() -> impl Strategy<Value = u64> {
        prop_oneof![Just(0u64), Just(127), Just(128), Just((1u64 << 63) - 1), any::<u64>()]
    }

    fn chunking() -> impl Strategy<Value = ChunkingConfig> {
        prop_oneof![
            (boundary_u64(), boundary_u64(), boundary_u64())
                .prop_map(|(target, min, max)| ChunkingConfig::Rabin { target, min, max }),
            boundary_u64().prop_map(|size| ChunkingConfig::FixedSize { size }),
            Just(ChunkingConfig::rabin_default()),
            Just(ChunkingConfig::fixed_default()),
        ]
    }

    #[test]
    fn default_header_bytes() {
        let header = Header::default();
        let mut buf = Vec::new();
        header.encode(&mut buf);
        // type, level, length, chunking, hash algorithm
        assert_eq!(buf, vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn unknown_container_type() {
        let bytes = [9u8 << 1, 0, 0, 0, 0];
        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            Header::decode(&mut r),
            Err(FormatError::UnknownEnum {
                field: "container type",
                code: 9
            })
        );
    }

    #[test]
    fn unknown_hash_algorithm() {
        let bytes = [0u8, 0, 0, 0, 5 << 1];
        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            Header::decode(&mut r),
            Err(FormatError::UnknownEnum {
                field: "hash algorithm",
                code: 5
            })
        );
    }

    #[test]
    fn unknown_compression() {
        let bytes = [0u8, 0, 3 << 1];
        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            BoxHeader::decode(&mut r),
            Err(FormatError::UnknownEnum {
                field: "compression type",
                code: 3
            })
        );
    }

    #[test]
    fn truncated_header() {
        let mut buf = Vec::new();
        Header::default().encode(&mut buf);
        buf.pop();
        let mut r = ByteReader::new(&buf);
        assert!(matches!(
            Header::decode(&mut r),
            Err(FormatError::Truncated { .. })
        ));
    }

    proptest! {
        #[test]
        fn header_roundtrip(
            container_type in container_type(),
            level in any::<u32>(),
            data_length in boundary_u64(),
            chunking in chunking(),
            hash_algorithm in hash_algorithm(),
        ) {
            let header = Header { container_type, level, data_length, chunking, hash_algorithm };
            let mut buf = Vec::new();
            header.encode(&mut buf);
            let mut r = ByteReader::new(&buf);
            prop_assert_eq!(Header::decode(&mut r).unwrap(), header);
            prop_assert!(r.is_empty());
        }

        #[test]
        fn box_header_roundtrip(encryption in encryption(), compression in compression()) {
            let header = BoxHeader::new(encryption, compression);
            let mut buf = Vec::new();
            header.encode(&mut buf);
            let mut r = ByteReader::new(&buf);
            prop_assert_eq!(BoxHeader::decode(&mut r).unwrap(), header);
            prop_assert!(r.is_empty());
        }
    }
}
