use sheaf_types::Hash;

use crate::error::StoreResult;

/// Read side of a box store.
pub trait ChunkReader: Send + Sync {
    /// Read the bytes stored under `key`. `Ok(None)` if absent.
    fn get(&self, key: &Hash) -> StoreResult<Option<Vec<u8>>>;

    /// Check whether `key` is present.
    fn contains(&self, key: &Hash) -> StoreResult<bool>;

    /// Every key in the store, sorted.
    fn keys(&self) -> StoreResult<Vec<Hash>>;
}

/// Key-value byte store keyed by box hash.
///
/// Implementations must satisfy:
/// - Values are immutable once written; a second put of the same key is a no-op.
/// - Concurrent reads are always safe.
/// - The store never interprets values.
pub trait ChunkStore: ChunkReader {
    /// Store `value` under `key`. Returns `true` if the key was new.
    fn put(&self, key: &Hash, value: &[u8]) -> StoreResult<bool>;

    /// Drop one reference to a box written earlier through this store.
    ///
    /// Only stores that track their own writes (transactions) act on this;
    /// boxes already persisted are never deleted.
    fn release(&self, _key: &Hash) -> StoreResult<()> {
        Ok(())
    }

    /// Make every accepted put durable.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}
