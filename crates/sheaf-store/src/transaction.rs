use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sheaf_types::Hash;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ChunkReader, ChunkStore};

struct Pending {
    bytes: Vec<u8>,
    refs: usize,
}

struct TxState {
    pending: HashMap<Hash, Pending>,
    order: Vec<Hash>,
    open: bool,
}

/// A buffered write overlay over a base store.
///
/// Puts are held in memory until [`commit`](Self::commit), which writes them
/// to the base in insertion order and flushes it. Reads see pending puts
/// first. Boxes written in this transaction are reference counted, and a
/// box whose count drops to zero through [`release`](ChunkStore::release)
/// is never written at all.
pub struct Transaction {
    base: Arc<dyn ChunkStore>,
    state: Mutex<TxState>,
}

impl Transaction {
    pub fn begin(base: Arc<dyn ChunkStore>) -> Arc<Self> {
        Arc::new(Self {
            base,
            state: Mutex::new(TxState {
                pending: HashMap::new(),
                order: Vec::new(),
                open: true,
            }),
        })
    }

    /// The store this transaction commits into.
    pub fn base(&self) -> Arc<dyn ChunkStore> {
        Arc::clone(&self.base)
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().expect("lock poisoned").open
    }

    /// Keys of boxes written so far and still referenced, in write order.
    pub fn written_keys(&self) -> Vec<Hash> {
        let state = self.state.lock().expect("lock poisoned");
        state
            .order
            .iter()
            .filter(|k| state.pending.contains_key(*k))
            .copied()
            .collect()
    }

    /// Number of pending boxes.
    pub fn pending_len(&self) -> usize {
        self.state.lock().expect("lock poisoned").pending.len()
    }

    /// Write every pending box to the base store and close the transaction.
    ///
    /// Returns the keys that were written.
    pub fn commit(&self) -> StoreResult<Vec<Hash>> {
        let mut state = self.state.lock().expect("lock poisoned");
        if !state.open {
            return Err(StoreError::TransactionClosed);
        }
        let order = std::mem::take(&mut state.order);
        let mut pending = std::mem::take(&mut state.pending);
        let mut written = Vec::with_capacity(pending.len());
        for key in order {
            if let Some(p) = pending.remove(&key) {
                self.base.put(&key, &p.bytes)?;
                written.push(key);
            }
        }
        self.base.flush()?;
        state.open = false;
        debug!(boxes = written.len(), "committed transaction");
        Ok(written)
    }

    /// Discard every pending box and close the transaction.
    pub fn cancel(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        let dropped = state.pending.len();
        state.pending.clear();
        state.order.clear();
        state.open = false;
        debug!(boxes = dropped, "cancelled transaction");
    }
}

impl ChunkReader for Transaction {
    fn get(&self, key: &Hash) -> StoreResult<Option<Vec<u8>>> {
        {
            let state = self.state.lock().expect("lock poisoned");
            if let Some(p) = state.pending.get(key) {
                return Ok(Some(p.bytes.clone()));
            }
        }
        self.base.get(key)
    }

    fn contains(&self, key: &Hash) -> StoreResult<bool> {
        {
            let state = self.state.lock().expect("lock poisoned");
            if state.pending.contains_key(key) {
                return Ok(true);
            }
        }
        self.base.contains(key)
    }

    fn keys(&self) -> StoreResult<Vec<Hash>> {
        let mut keys = self.base.keys()?;
        {
            let state = self.state.lock().expect("lock poisoned");
            keys.extend(state.pending.keys().copied());
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

impl ChunkStore for Transaction {
    fn put(&self, key: &Hash, value: &[u8]) -> StoreResult<bool> {
        let mut state = self.state.lock().expect("lock poisoned");
        if !state.open {
            return Err(StoreError::TransactionClosed);
        }
        if let Some(p) = state.pending.get_mut(key) {
            p.refs += 1;
            return Ok(false);
        }
        if self.base.contains(key)? {
            return Ok(false);
        }
        state.pending.insert(
            *key,
            Pending {
                bytes: value.to_vec(),
                refs: 1,
            },
        );
        state.order.push(*key);
        Ok(true)
    }

    fn release(&self, key: &Hash) -> StoreResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        let drop_it = match state.pending.get_mut(key) {
            Some(p) => {
                p.refs -= 1;
                p.refs == 0
            }
            None => false,
        };
        if drop_it {
            state.pending.remove(key);
            state.order.retain(|k| k != key);
            debug!(key = %key.short_hex(), "released superseded box");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("lock poisoned");
        f.debug_struct("Transaction")
            .field("open", &state.open)
            .field("pending", &state.pending.len())
            .finish()
    }
}
