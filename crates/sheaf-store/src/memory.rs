use std::collections::HashMap;
use std::sync::RwLock;

use sheaf_types::Hash;

use crate::error::StoreResult;
use crate::traits::{ChunkReader, ChunkStore};

/// In-memory, HashMap-based box store.
///
/// Intended for tests and embedding. Values are held behind a `RwLock` and
/// cloned on read.
pub struct InMemoryChunkStore {
    boxes: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self {
            boxes: RwLock::new(HashMap::new()),
        }
    }

    /// Number of boxes currently stored.
    pub fn len(&self) -> usize {
        self.boxes.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored boxes.
    pub fn total_bytes(&self) -> u64 {
        self.boxes
            .read()
            .expect("lock poisoned")
            .values()
            .map(|v| v.len() as u64)
            .sum()
    }

    pub fn clear(&self) {
        self.boxes.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkReader for InMemoryChunkStore {
    fn get(&self, key: &Hash) -> StoreResult<Option<Vec<u8>>> {
        let map = self.boxes.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn contains(&self, key: &Hash) -> StoreResult<bool> {
        let map = self.boxes.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    fn keys(&self) -> StoreResult<Vec<Hash>> {
        let map = self.boxes.read().expect("lock poisoned");
        let mut keys: Vec<Hash> = map.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn put(&self, key: &Hash, value: &[u8]) -> StoreResult<bool> {
        let mut map = self.boxes.write().expect("lock poisoned");
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(*key, value.to_vec());
        Ok(true)
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChunkStore")
            .field("box_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> Hash {
        Hash::from_hash([b; 32])
    }

    #[test]
    fn put_and_get() {
        let store = InMemoryChunkStore::new();
        assert!(store.put(&key(1), b"hello").unwrap());
        assert_eq!(store.get(&key(1)).unwrap().as_deref(), Some(&b"hello"[..]));
        assert!(store.contains(&key(1)).unwrap());
    }

    #[test]
    fn missing_is_none() {
        let store = InMemoryChunkStore::new();
        assert!(store.get(&key(9)).unwrap().is_none());
        assert!(!store.contains(&key(9)).unwrap());
    }

    #[test]
    fn put_is_idempotent() {
        let store = InMemoryChunkStore::new();
        assert!(store.put(&key(1), b"a").unwrap());
        assert!(!store.put(&key(1), b"a").unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_bytes(), 1);
    }

    #[test]
    fn keys_are_sorted() {
        let store = InMemoryChunkStore::new();
        for b in [5u8, 1, 3] {
            store.put(&key(b), &[b]).unwrap();
        }
        assert_eq!(store.keys().unwrap(), vec![key(1), key(3), key(5)]);
    }

    #[test]
    fn clear_empties() {
        let store = InMemoryChunkStore::new();
        store.put(&key(1), b"x").unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
