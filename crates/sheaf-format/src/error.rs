/// Errors raised while decoding Sheaf wire formats.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    /// Input ended before a complete value could be read.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// A VarInt carried more than 64 bits of payload.
    #[error("varint overflows 64 bits")]
    VarIntOverflow,

    /// An enumerated field carried a code this version does not know.
    #[error("unknown {field} code: {code}")]
    UnknownEnum { field: &'static str, code: u64 },

    /// Declared length and actual content disagree.
    #[error("length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: u64, actual: u64 },

    /// A node box above the data level that holds no pointers.
    #[error("node box holds no pointers")]
    EmptyNode,

    /// Bytes left over after a complete structure was decoded.
    #[error("{0} trailing bytes after structure")]
    TrailingBytes(usize),

    /// The flag prefix of a VarInt is wider than the format allows.
    #[error("invalid varint prefix width: {0} bits")]
    InvalidPrefixWidth(u8),

    /// Chunking parameters that no splitter can honor.
    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(String),

    /// A UTF-8 or hex payload could not be decoded.
    #[error("malformed text field: {0}")]
    MalformedText(String),
}

/// Result alias for format operations.
pub type FormatResult<T> = Result<T, FormatError>;
