//! Chunk boundary detection and streaming Merkle hashing for Sheaf.
//!
//! A container uses two splitters built from its [`ChunkingConfig`]: a data
//! splitter that cuts raw bytes into leaf chunks, and a node splitter that
//! groups the child hash sequence at every tree level into nodes.
//! [`ChunkHash`] runs both over a byte stream and produces the data hash the
//! chunk tree would have, without building the tree.

pub mod fixed;
pub mod hash;
pub mod rabin;
pub mod splitter;

pub use fixed::FixedSizeSplitter;
pub use hash::ChunkHash;
pub use rabin::RabinSplitter;
pub use splitter::{data_splitter, node_config, node_splitter, ChunkSplitter, MIN_NODE_THRESHOLD};

pub use sheaf_format::ChunkingConfig;
