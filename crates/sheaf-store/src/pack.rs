//! File-backed box store: an append-only pack plus an index.
//!
//! ```text
//! boxes.pack:  "SHFP" u32(version) { key[32] u32(len) u32(crc32) bytes[len] }*
//! boxes.idx:   bincode(IndexFile)
//! ```
//!
//! All integers are big-endian. The index records the pack length it covers;
//! records appended after the last flush are recovered by scanning the tail
//! of the pack on open.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sheaf_types::{Hash, HASH_SIZE};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ChunkReader, ChunkStore};

const MAGIC: &[u8; 4] = b"SHFP";
const VERSION: u32 = 1;
const HEADER_LEN: u64 = 8;
const RECORD_HEADER_LEN: u64 = HASH_SIZE as u64 + 8;

pub const PACK_FILE: &str = "boxes.pack";
pub const INDEX_FILE: &str = "boxes.idx";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Slot {
    offset: u64,
    len: u32,
    crc: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    pack_len: u64,
    entries: Vec<(Hash, Slot)>,
}

struct PackInner {
    file: File,
    index: HashMap<Hash, Slot>,
    len: u64,
    dirty: bool,
}

/// Box store persisted in a directory as one pack file and one index file.
pub struct PackChunkStore {
    dir: PathBuf,
    inner: Mutex<PackInner>,
}

impl PackChunkStore {
    /// Open the store in `dir`, creating the directory and files if needed.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let pack_path = dir.join(PACK_FILE);

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&pack_path)?;
        let mut len = file.metadata()?.len();
        if len == 0 {
            file.write_all(MAGIC)?;
            file.write_all(&VERSION.to_be_bytes())?;
            file.sync_data()?;
            len = HEADER_LEN;
        } else {
            check_header(&mut file)?;
        }

        let (mut index, covered) = load_index(&dir.join(INDEX_FILE), len)?;
        let scanned = scan_records(&mut file, covered, len, &mut index)?;
        if scanned > 0 {
            debug!(dir = %dir.display(), scanned, "recovered pack records past index");
        }

        debug!(dir = %dir.display(), boxes = index.len(), "opened pack store");
        Ok(Self {
            dir,
            inner: Mutex::new(PackInner {
                file,
                index,
                len,
                dirty: scanned > 0,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of boxes in the store.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current size of the pack file in bytes.
    pub fn pack_len(&self) -> u64 {
        self.inner.lock().expect("lock poisoned").len
    }

    fn write_index(&self, inner: &PackInner) -> StoreResult<()> {
        let mut entries: Vec<(Hash, Slot)> = inner.index.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let file = IndexFile {
            version: VERSION,
            pack_len: inner.len,
            entries,
        };
        let bytes = bincode::serialize(&file).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_data()?;
        tmp.persist(self.dir.join(INDEX_FILE))
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

fn check_header(file: &mut File) -> StoreResult<()> {
    let mut header = [0u8; HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;
    if &header[..4] != MAGIC {
        return Err(StoreError::CorruptPack {
            offset: 0,
            reason: format!("bad magic {:?}", String::from_utf8_lossy(&header[..4])),
        });
    }
    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if version != VERSION {
        return Err(StoreError::CorruptPack {
            offset: 4,
            reason: format!("unsupported pack version {version}"),
        });
    }
    Ok(())
}

/// Load the index file. Returns the map and the pack length it covers.
fn load_index(path: &Path, pack_len: u64) -> StoreResult<(HashMap<Hash, Slot>, u64)> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((HashMap::new(), HEADER_LEN)),
        Err(e) => return Err(e.into()),
    };
    match bincode::deserialize::<IndexFile>(&bytes) {
        Ok(file) if file.version == VERSION && file.pack_len <= pack_len => {
            Ok((file.entries.into_iter().collect(), file.pack_len.max(HEADER_LEN)))
        }
        Ok(_) | Err(_) => {
            warn!(path = %path.display(), "ignoring stale or corrupt pack index, rescanning");
            Ok((HashMap::new(), HEADER_LEN))
        }
    }
}

/// Index every record between `from` and `to`. Returns the number found.
fn scan_records(file: &mut File, from: u64, to: u64, index: &mut HashMap<Hash, Slot>) -> StoreResult<usize> {
    let mut offset = from;
    let mut found = 0;
    while offset < to {
        if to - offset < RECORD_HEADER_LEN {
            return Err(StoreError::CorruptPack {
                offset,
                reason: "truncated record header".into(),
            });
        }
        let mut header = [0u8; RECORD_HEADER_LEN as usize];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut header)?;
        let key = Hash::from_slice(&header[..HASH_SIZE]).map_err(|e| StoreError::CorruptPack {
            offset,
            reason: e.to_string(),
        })?;
        let len = u32::from_be_bytes([
            header[HASH_SIZE],
            header[HASH_SIZE + 1],
            header[HASH_SIZE + 2],
            header[HASH_SIZE + 3],
        ]);
        let crc = u32::from_be_bytes([
            header[HASH_SIZE + 4],
            header[HASH_SIZE + 5],
            header[HASH_SIZE + 6],
            header[HASH_SIZE + 7],
        ]);
        let end = offset + RECORD_HEADER_LEN + u64::from(len);
        if end > to {
            return Err(StoreError::CorruptPack {
                offset,
                reason: "record extends beyond pack".into(),
            });
        }
        index.entry(key).or_insert(Slot {
            offset: offset + RECORD_HEADER_LEN,
            len,
            crc,
        });
        offset = end;
        found += 1;
    }
    Ok(found)
}

impl ChunkReader for PackChunkStore {
    fn get(&self, key: &Hash) -> StoreResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let Some(slot) = inner.index.get(key).copied() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; slot.len as usize];
        inner.file.seek(SeekFrom::Start(slot.offset))?;
        inner.file.read_exact(&mut buf)?;
        if crc32fast::hash(&buf) != slot.crc {
            return Err(StoreError::CrcMismatch(*key));
        }
        Ok(Some(buf))
    }

    fn contains(&self, key: &Hash) -> StoreResult<bool> {
        Ok(self.inner.lock().expect("lock poisoned").index.contains_key(key))
    }

    fn keys(&self) -> StoreResult<Vec<Hash>> {
        let inner = self.inner.lock().expect("lock poisoned");
        let mut keys: Vec<Hash> = inner.index.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }
}

impl ChunkStore for PackChunkStore {
    fn put(&self, key: &Hash, value: &[u8]) -> StoreResult<bool> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.index.contains_key(key) {
            return Ok(false);
        }
        let len = u32::try_from(value.len()).map_err(|_| StoreError::CorruptPack {
            offset: inner.len,
            reason: format!("box of {} bytes exceeds record limit", value.len()),
        })?;
        let crc = crc32fast::hash(value);

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN as usize + value.len());
        record.extend_from_slice(key.as_bytes());
        record.extend_from_slice(&len.to_be_bytes());
        record.extend_from_slice(&crc.to_be_bytes());
        record.extend_from_slice(value);
        inner.file.write_all(&record)?;

        let offset = inner.len + RECORD_HEADER_LEN;
        inner.index.insert(*key, Slot { offset, len, crc });
        inner.len += record.len() as u64;
        inner.dirty = true;
        Ok(true)
    }

    fn flush(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if !inner.dirty {
            return Ok(());
        }
        inner.file.sync_data()?;
        self.write_index(&inner)?;
        inner.dirty = false;
        debug!(dir = %self.dir.display(), boxes = inner.index.len(), pack_len = inner.len, "flushed pack store");
        Ok(())
    }
}

impl Drop for PackChunkStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(dir = %self.dir.display(), error = %e, "failed to flush pack store on drop");
        }
    }
}

impl std::fmt::Debug for PackChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackChunkStore")
            .field("dir", &self.dir)
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
    fn put_get_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PackChunkStore::open(dir.path()).unwrap();
            assert!(store.put(&key(1), b"one").unwrap());
            assert!(store.put(&key(2), b"two").unwrap());
            assert!(!store.put(&key(1), b"one").unwrap());
            store.flush().unwrap();
        }
        let store = PackChunkStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&key(2)).unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(store.keys().unwrap(), vec![key(1), key(2)]);
    }

    #[test]
    fn recovers_records_without_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PackChunkStore::open(dir.path()).unwrap();
            store.put(&key(7), b"seven").unwrap();
            store.flush().unwrap();
        }
        std::fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();
        let store = PackChunkStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&key(7)).unwrap().as_deref(), Some(&b"seven"[..]));
    }

    #[test]
    fn recovers_tail_past_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PackChunkStore::open(dir.path()).unwrap();
            store.put(&key(1), b"a").unwrap();
            store.flush().unwrap();
        }
        let saved_index = std::fs::read(dir.path().join(INDEX_FILE)).unwrap();
        {
            let store = PackChunkStore::open(dir.path()).unwrap();
            store.put(&key(2), b"b").unwrap();
        }
        std::fs::write(dir.path().join(INDEX_FILE), saved_index).unwrap();
        let store = PackChunkStore::open(dir.path()).unwrap();
        assert!(store.contains(&key(1)).unwrap());
        assert!(store.contains(&key(2)).unwrap());
    }

    #[test]
    fn detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PackChunkStore::open(dir.path()).unwrap();
            store.put(&key(3), b"payload").unwrap();
        }
        let pack = dir.path().join(PACK_FILE);
        let mut bytes = std::fs::read(&pack).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&pack, bytes).unwrap();

        let store = PackChunkStore::open(dir.path()).unwrap();
        assert!(matches!(store.get(&key(3)), Err(StoreError::CrcMismatch(_))));
    }

    #[test]
    fn rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PACK_FILE), b"NOTAPACKFILE").unwrap();
        assert!(matches!(
            PackChunkStore::open(dir.path()),
            Err(StoreError::CorruptPack { offset: 0, .. })
        ));
    }
}
