//! Chunk accessor bound to the repository's open transaction.

use std::sync::{Arc, RwLock};

use sheaf_crypto::{Cipher, HashAlgorithm};
use sheaf_format::{BoxHeader, ChunkPointer, CompressionType};
use sheaf_store::{BoxChunkAccessor, ChunkAccessor, ChunkStore, StoreResult, Transaction};
use sheaf_types::Hash;
use tracing::debug;

struct Bound {
    tx: Arc<Transaction>,
    boxes: BoxChunkAccessor,
}

/// Writes into whichever transaction is current.
///
/// Containers, trees and the commit cache all hold this one accessor, so
/// rotating to a fresh transaction after a commit leaves every resident
/// object valid.
pub(crate) struct TransactionAccessor {
    hash_algorithm: HashAlgorithm,
    compression: CompressionType,
    cipher: Option<Arc<dyn Cipher>>,
    bound: RwLock<Bound>,
}

impl TransactionAccessor {
    pub fn new(
        base: Arc<dyn ChunkStore>,
        hash_algorithm: HashAlgorithm,
        compression: CompressionType,
        cipher: Option<Arc<dyn Cipher>>,
    ) -> Self {
        let bound = Self::bind(base, hash_algorithm, compression, cipher.clone());
        Self {
            hash_algorithm,
            compression,
            cipher,
            bound: RwLock::new(bound),
        }
    }

    fn bind(
        base: Arc<dyn ChunkStore>,
        hash_algorithm: HashAlgorithm,
        compression: CompressionType,
        cipher: Option<Arc<dyn Cipher>>,
    ) -> Bound {
        let tx = Transaction::begin(base);
        let mut boxes = BoxChunkAccessor::new(tx.clone(), hash_algorithm, compression);
        if let Some(cipher) = cipher {
            boxes = boxes.with_cipher(cipher);
        }
        Bound { tx, boxes }
    }

    pub fn transaction(&self) -> Arc<Transaction> {
        Arc::clone(&self.bound.read().expect("lock poisoned").tx)
    }

    /// Start a new transaction over `base`. The old one must already be
    /// committed or cancelled.
    pub fn rotate(&self, base: Arc<dyn ChunkStore>) {
        let bound = Self::bind(base, self.hash_algorithm, self.compression, self.cipher.clone());
        *self.bound.write().expect("lock poisoned") = bound;
        debug!("rotated transaction");
    }
}

impl ChunkAccessor for TransactionAccessor {
    fn get_chunk(&self, pointer: &ChunkPointer) -> StoreResult<Vec<u8>> {
        self.bound.read().expect("lock poisoned").boxes.get_chunk(pointer)
    }

    fn put_chunk(&self, bytes: &[u8], data_length: u64, data_hash: Hash) -> StoreResult<ChunkPointer> {
        self.bound
            .read()
            .expect("lock poisoned")
            .boxes
            .put_chunk(bytes, data_length, data_hash)
    }

    fn release_chunk(&self, box_hash: &Hash) -> StoreResult<()> {
        self.bound.read().expect("lock poisoned").boxes.release_chunk(box_hash)
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    fn box_header(&self) -> BoxHeader {
        self.bound.read().expect("lock poisoned").boxes.box_header()
    }
}
