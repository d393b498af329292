//! Binary formats for Sheaf.
//!
//! Every persistent structure in Sheaf is built from a handful of exact wire
//! encodings, all defined here:
//!
//! - [`varint`] -- MSB-continuation integers with an optional flag prefix in the first byte
//! - [`ExtensionBuffer`] -- tag/value map for optional and forward-compatible fields
//! - [`ChunkPointer`] -- the fixed 88-byte chunk reference record
//! - [`Header`] / [`BoxHeader`] -- container and box descriptions
//! - [`Ref`] -- the only thing referencing structures persist
//!
//! Decoding is strict: unknown enum codes, truncated input, and length
//! mismatches are all [`FormatError`]s, never silent defaults.

pub mod chunking;
pub mod cursor;
pub mod error;
pub mod extension;
pub mod header;
pub mod pointer;
pub mod reference;
pub mod varint;

pub use chunking::ChunkingConfig;
pub use cursor::ByteReader;
pub use error::{FormatError, FormatResult};
pub use extension::{ExtensionBuffer, ExtensionValue};
pub use header::{BoxHeader, BoxType, CompressionType, ContainerType, EncryptionType, Header};
pub use pointer::{ChunkPointer, POINTER_SIZE};
pub use reference::{BoxPart, DataPart, Ref};
pub use varint::{read_varint, read_varint_prefixed, write_varint, write_varint_prefixed};
