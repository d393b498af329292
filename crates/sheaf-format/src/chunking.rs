use serde::{Deserialize, Serialize};

use crate::cursor::ByteReader;
use crate::error::{FormatError, FormatResult};
use crate::extension::{read_enum_field, write_enum_field, ExtensionBuffer};

const RABIN_CODE: u64 = 0;
const FIXED_SIZE_CODE: u64 = 1;

const TAG_TARGET: u64 = 1;
const TAG_MIN: u64 = 2;
const TAG_MAX: u64 = 3;
const TAG_SIZE: u64 = 1;

/// How a container splits its byte stream into leaf chunks.
///
/// Each variant knows its own defaults; only fields that differ from them
/// are written to the header extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkingConfig {
    /// Content-defined chunking with a rolling Rabin fingerprint.
    Rabin { target: u64, min: u64, max: u64 },
    /// Boundaries every `size` bytes.
    FixedSize { size: u64 },
}

impl ChunkingConfig {
    pub const DEFAULT_RABIN_TARGET: u64 = 8 * 1024;
    pub const DEFAULT_RABIN_MIN: u64 = 2 * 1024;
    pub const DEFAULT_RABIN_MAX: u64 = 64 * 1024;
    pub const DEFAULT_FIXED_SIZE: u64 = 8 * 1024;

    pub const fn rabin_default() -> Self {
        Self::Rabin {
            target: Self::DEFAULT_RABIN_TARGET,
            min: Self::DEFAULT_RABIN_MIN,
            max: Self::DEFAULT_RABIN_MAX,
        }
    }

    pub const fn fixed_default() -> Self {
        Self::FixedSize {
            size: Self::DEFAULT_FIXED_SIZE,
        }
    }

    /// Wire code of the variant.
    pub const fn code(&self) -> u64 {
        match self {
            Self::Rabin { .. } => RABIN_CODE,
            Self::FixedSize { .. } => FIXED_SIZE_CODE,
        }
    }

    pub fn is_rabin(&self) -> bool {
        matches!(self, Self::Rabin { .. })
    }

    pub fn is_fixed_size(&self) -> bool {
        matches!(self, Self::FixedSize { .. })
    }

    /// True when every field equals the variant's default.
    pub fn is_type_default(&self) -> bool {
        match *self {
            Self::Rabin { .. } => *self == Self::rabin_default(),
            Self::FixedSize { .. } => *self == Self::fixed_default(),
        }
    }

    /// Minimum and maximum chunk length this config produces.
    pub fn bounds(&self) -> (u64, u64) {
        match *self {
            Self::Rabin { min, max, .. } => (min, max),
            Self::FixedSize { size } => (size, size),
        }
    }

    /// Check the parameters describe a splitter that can make progress.
    pub fn validate(&self) -> FormatResult<()> {
        match *self {
            Self::Rabin { target, min, max } => {
                if min == 0 {
                    return Err(FormatError::InvalidChunking("rabin min must be > 0".into()));
                }
                if !(min < target && target <= max) {
                    return Err(FormatError::InvalidChunking(format!(
                        "rabin requires min < target <= max, got {min}/{target}/{max}"
                    )));
                }
                Ok(())
            }
            Self::FixedSize { size } => {
                if size == 0 {
                    return Err(FormatError::InvalidChunking("fixed size must be > 0".into()));
                }
                Ok(())
            }
        }
    }

    /// Write the variant code plus an extension holding non-default fields.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut ext = ExtensionBuffer::new();
        match *self {
            Self::Rabin { target, min, max } => {
                if target != Self::DEFAULT_RABIN_TARGET {
                    ext.put_int(TAG_TARGET, target);
                }
                if min != Self::DEFAULT_RABIN_MIN {
                    ext.put_int(TAG_MIN, min);
                }
                if max != Self::DEFAULT_RABIN_MAX {
                    ext.put_int(TAG_MAX, max);
                }
            }
            Self::FixedSize { size } => {
                if size != Self::DEFAULT_FIXED_SIZE {
                    ext.put_int(TAG_SIZE, size);
                }
            }
        }
        write_enum_field(buf, self.code(), Some(&ext));
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> FormatResult<Self> {
        let (code, ext) = read_enum_field(reader)?;
        let ext = ext.unwrap_or_default();
        match code {
            RABIN_CODE => Ok(Self::Rabin {
                target: ext.get_int(TAG_TARGET).unwrap_or(Self::DEFAULT_RABIN_TARGET),
                min: ext.get_int(TAG_MIN).unwrap_or(Self::DEFAULT_RABIN_MIN),
                max: ext.get_int(TAG_MAX).unwrap_or(Self::DEFAULT_RABIN_MAX),
            }),
            FIXED_SIZE_CODE => Ok(Self::FixedSize {
                size: ext.get_int(TAG_SIZE).unwrap_or(Self::DEFAULT_FIXED_SIZE),
            }),
            other => Err(FormatError::UnknownEnum {
                field: "chunking",
                code: other,
            }),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::rabin_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(config: ChunkingConfig) -> (ChunkingConfig, usize) {
        let mut buf = Vec::new();
        config.encode(&mut buf);
        let mut r = ByteReader::new(&buf);
        let decoded = ChunkingConfig::decode(&mut r).unwrap();
        r.expect_end().unwrap();
        (decoded, buf.len())
    }

    #[test]
    fn defaults_encode_in_one_byte() {
        assert_eq!(roundtrip(ChunkingConfig::rabin_default()), (ChunkingConfig::rabin_default(), 1));
        assert_eq!(roundtrip(ChunkingConfig::fixed_default()), (ChunkingConfig::fixed_default(), 1));
    }

    #[test]
    fn non_default_fields_survive() {
        let config = ChunkingConfig::Rabin {
            target: 4096,
            min: ChunkingConfig::DEFAULT_RABIN_MIN,
            max: 1 << 20,
        };
        assert!(!config.is_type_default());
        assert_eq!(roundtrip(config).0, config);

        let fixed = ChunkingConfig::FixedSize { size: 128 };
        assert_eq!(roundtrip(fixed).0, fixed);
    }

    #[test]
    fn classification_is_total() {
        assert!(ChunkingConfig::rabin_default().is_rabin());
        assert!(!ChunkingConfig::rabin_default().is_fixed_size());
        assert!(ChunkingConfig::fixed_default().is_fixed_size());
        assert!(!ChunkingConfig::fixed_default().is_rabin());
    }

    #[test]
    fn unknown_kind_is_error() {
        let bytes = [7u8 << 1];
        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            ChunkingConfig::decode(&mut r),
            Err(FormatError::UnknownEnum {
                field: "chunking",
                code: 7
            })
        );
    }

    #[test]
    fn validation() {
        assert!(ChunkingConfig::default().validate().is_ok());
        assert!(ChunkingConfig::FixedSize { size: 0 }.validate().is_err());
        assert!(ChunkingConfig::Rabin {
            target: 10,
            min: 20,
            max: 30
        }
        .validate()
        .is_err());
    }
}
