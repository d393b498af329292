//! Chunk accessor: turns chunks into stored boxes and back.
//!
//! Box encoding, in write order: optional zstd compression, then optional
//! encryption through the external [`Cipher`] with a fresh random IV. The box
//! hash is the digest of the final stored bytes. Plain boxes carry an
//! all-zero IV so identical chunks deduplicate.

use std::sync::Arc;

use sheaf_crypto::{random_iv, Cipher, HashAlgorithm, IV_SIZE};
use sheaf_format::{BoxHeader, ChunkPointer, CompressionType, EncryptionType};
use sheaf_types::Hash;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::ChunkStore;

/// zstd level used for box compression.
pub const ZSTD_LEVEL: i32 = 3;

/// Reads and writes chunks by pointer.
pub trait ChunkAccessor: Send + Sync {
    /// Load and decode the chunk behind `pointer`.
    fn get_chunk(&self, pointer: &ChunkPointer) -> StoreResult<Vec<u8>>;

    /// Encode and store `bytes`.
    ///
    /// `data_length` and `data_hash` describe the logical content, which for
    /// a node differs from its serialized pointer records.
    fn put_chunk(&self, bytes: &[u8], data_length: u64, data_hash: Hash) -> StoreResult<ChunkPointer>;

    /// Drop one reference to a box this accessor stored.
    fn release_chunk(&self, box_hash: &Hash) -> StoreResult<()>;

    /// Digest used for data and box hashes.
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// How boxes written by this accessor are encoded.
    fn box_header(&self) -> BoxHeader;
}

/// [`ChunkAccessor`] over a [`ChunkStore`].
pub struct BoxChunkAccessor {
    store: Arc<dyn ChunkStore>,
    hash_algorithm: HashAlgorithm,
    compression: CompressionType,
    cipher: Option<Arc<dyn Cipher>>,
}

impl BoxChunkAccessor {
    pub fn new(store: Arc<dyn ChunkStore>, hash_algorithm: HashAlgorithm, compression: CompressionType) -> Self {
        Self {
            store,
            hash_algorithm,
            compression,
            cipher: None,
        }
    }

    /// Encrypt every box written from now on with `cipher`.
    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    fn encode_box(&self, bytes: &[u8]) -> StoreResult<(Vec<u8>, [u8; IV_SIZE])> {
        let compressed = match self.compression {
            CompressionType::None => bytes.to_vec(),
            CompressionType::Zstd => zstd::encode_all(bytes, ZSTD_LEVEL)
                .map_err(|e| StoreError::Compression(e.to_string()))?,
        };
        match &self.cipher {
            Some(cipher) => {
                let iv = random_iv();
                Ok((cipher.encrypt(&compressed, &iv)?, iv))
            }
            None => Ok((compressed, [0u8; IV_SIZE])),
        }
    }

    fn decode_box(&self, stored: Vec<u8>, iv: &[u8; IV_SIZE]) -> StoreResult<Vec<u8>> {
        let plain = match (&self.cipher, self.box_header().encryption) {
            (Some(cipher), EncryptionType::Cipher) => cipher.decrypt(&stored, iv)?,
            (None, EncryptionType::Cipher) => return Err(StoreError::MissingCipher),
            (_, EncryptionType::None) => stored,
        };
        match self.compression {
            CompressionType::None => Ok(plain),
            CompressionType::Zstd => {
                zstd::decode_all(plain.as_slice()).map_err(|e| StoreError::Compression(e.to_string()))
            }
        }
    }
}

impl ChunkAccessor for BoxChunkAccessor {
    fn get_chunk(&self, pointer: &ChunkPointer) -> StoreResult<Vec<u8>> {
        let stored = self
            .store
            .get(&pointer.box_hash)?
            .ok_or(StoreError::NotFound(pointer.box_hash))?;
        let computed = self.hash_algorithm.digest(&stored);
        if computed != pointer.box_hash {
            return Err(StoreError::HashMismatch {
                expected: pointer.box_hash,
                computed,
            });
        }
        self.decode_box(stored, &pointer.iv)
    }

    fn put_chunk(&self, bytes: &[u8], data_length: u64, data_hash: Hash) -> StoreResult<ChunkPointer> {
        let (stored, iv) = self.encode_box(bytes)?;
        let box_hash = self.hash_algorithm.digest(&stored);
        let fresh = self.store.put(&box_hash, &stored)?;
        debug!(
            box_hash = %box_hash.short_hex(),
            data_length,
            stored = stored.len(),
            fresh,
            "put chunk"
        );
        Ok(ChunkPointer::new(data_length, data_hash, box_hash, iv))
    }

    fn release_chunk(&self, box_hash: &Hash) -> StoreResult<()> {
        self.store.release(box_hash)
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    fn box_header(&self) -> BoxHeader {
        let encryption = if self.cipher.is_some() {
            EncryptionType::Cipher
        } else {
            EncryptionType::None
        };
        BoxHeader::new(encryption, self.compression)
    }
}

impl std::fmt::Debug for BoxChunkAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxChunkAccessor")
            .field("hash_algorithm", &self.hash_algorithm)
            .field("compression", &self.compression)
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}
