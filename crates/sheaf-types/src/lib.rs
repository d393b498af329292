//! Foundation types for Sheaf.
//!
//! Sheaf is a content-addressed, chunk-based versioned storage engine. Every
//! other Sheaf crate depends on `sheaf-types` for the fixed-size [`Hash`]
//! digest used both as a *data hash* (logical content identity) and as a
//! *box hash* (identity of the stored, possibly compressed or encrypted
//! representation).

pub mod error;
pub mod hash;

pub use error::TypeError;
pub use hash::{Hash, HASH_SIZE};
