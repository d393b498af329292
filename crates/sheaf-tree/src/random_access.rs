use std::io::SeekFrom;

use sheaf_format::Ref;

use crate::container::Container;
use crate::error::{TreeError, TreeResult};

/// A cursor over a container's logical byte stream.
///
/// Every write goes through [`Container::splice`], so chunking stays
/// canonical whatever the sequence of edits.
#[derive(Debug)]
pub struct RandomDataAccess {
    container: Container,
    position: u64,
}

impl RandomDataAccess {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            position: 0,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    pub fn into_container(self) -> Container {
        self.container
    }

    pub fn len(&self) -> u64 {
        self.container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_dirty(&self) -> bool {
        self.container.is_dirty()
    }

    /// Move the cursor. Seeking past the end is an error.
    pub fn seek(&mut self, to: SeekFrom) -> TreeResult<u64> {
        let length = self.len();
        let target = match to {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => length.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(position) if position <= length => {
                self.position = position;
                Ok(position)
            }
            _ => Err(TreeError::InvalidPosition {
                position: target.unwrap_or(u64::MAX),
                length,
            }),
        }
    }

    /// Read up to `buf.len()` bytes at the cursor; 0 at the end.
    pub fn read(&mut self, buf: &mut [u8]) -> TreeResult<usize> {
        let mut filled = 0;
        while filled < buf.len() && self.position < self.len() {
            let (data, start) = self.container.read_chunk(self.position)?;
            let offset = (self.position - start) as usize;
            let n = (data.len() - offset).min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&data[offset..offset + n]);
            filled += n;
            self.position += n as u64;
        }
        Ok(filled)
    }

    /// Everything from the cursor to the end.
    pub fn read_to_end(&mut self) -> TreeResult<Vec<u8>> {
        let mut out = vec![0; (self.len() - self.position) as usize];
        let n = self.read(&mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Overwrite at the cursor, extending the stream if needed.
    pub fn write(&mut self, data: &[u8]) -> TreeResult<()> {
        let overlap = (self.len() - self.position).min(data.len() as u64);
        self.container.splice(self.position, overlap, data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    /// Insert at the cursor, shifting later bytes.
    pub fn insert(&mut self, data: &[u8]) -> TreeResult<()> {
        self.container.splice(self.position, 0, data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    /// Remove `count` bytes at the cursor.
    pub fn delete(&mut self, count: u64) -> TreeResult<()> {
        self.container.splice(self.position, count, &[])
    }

    /// Cut or zero-extend the stream to `length`.
    pub fn truncate(&mut self, length: u64) -> TreeResult<()> {
        let current = self.len();
        if length < current {
            self.container.splice(length, current - length, &[])?;
        } else if length > current {
            let zeros = vec![0; (length - current) as usize];
            self.container.splice(current, 0, &zeros)?;
        }
        self.position = self.position.min(length);
        Ok(())
    }

    pub fn flush(&mut self) -> TreeResult<Ref> {
        self.container.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use proptest::prelude::*;
    use sheaf_chunk::ChunkHash;
    use sheaf_crypto::HashAlgorithm;
    use sheaf_format::{ChunkingConfig, CompressionType, ContainerType};
    use sheaf_store::{BoxChunkAccessor, InMemoryChunkStore};
    use sheaf_types::Hash;

    use super::*;

    fn small_rabin() -> ChunkingConfig {
        ChunkingConfig::Rabin {
            target: 64,
            min: 16,
            max: 256,
        }
    }

    fn open(chunking: ChunkingConfig) -> RandomDataAccess {
        let store = Arc::new(InMemoryChunkStore::new());
        let acc = Arc::new(BoxChunkAccessor::new(store, HashAlgorithm::Blake3, CompressionType::Zstd));
        RandomDataAccess::new(Container::new(acc, ContainerType::Data, chunking).unwrap())
    }

    fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect()
    }

    fn chunk_hash(config: ChunkingConfig, data: &[u8]) -> Hash {
        let mut h = ChunkHash::new(config, HashAlgorithm::Blake3).unwrap();
        h.update(data);
        h.digest()
    }

    fn leaf_hashes(c: &mut Container) -> Vec<Hash> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < c.len() {
            let (pointer, start) = c.get(pos).unwrap();
            out.push(pointer.data_hash);
            pos = start + pointer.data_length;
        }
        out
    }

    #[test]
    fn appended_run_splits_and_reads_back() {
        let mut file = open(ChunkingConfig::default());
        let data = vec![b'A'; 200_000];
        file.container_mut().append(&data).unwrap();
        let r = file.flush().unwrap();
        assert_eq!(r.data_length(), data.len() as u64);

        let c = file.container_mut();
        assert!(leaf_hashes(c).len() >= 2);
        let mut back = Vec::new();
        for chunk in c.chunk_iter(0) {
            back.extend(chunk.unwrap().1);
        }
        assert_eq!(back, data);
        assert_eq!(r.data_hash(), chunk_hash(ChunkingConfig::default(), &data));
    }

    #[test]
    fn write_order_does_not_change_data_hash() {
        let config = small_rabin();
        let data = pseudo_random(5000, 7);

        let mut whole = open(config);
        whole.write(&data).unwrap();

        let mut pieces = open(config);
        for part in data.chunks(37) {
            pieces.write(part).unwrap();
        }

        let mut backwards = open(config);
        for part in data.rchunks(101) {
            backwards.seek(SeekFrom::Start(0)).unwrap();
            backwards.insert(part).unwrap();
        }

        let expected = chunk_hash(config, &data);
        assert_eq!(whole.flush().unwrap().data_hash(), expected);
        assert_eq!(pieces.flush().unwrap().data_hash(), expected);
        assert_eq!(backwards.flush().unwrap().data_hash(), expected);
    }

    #[test]
    fn cursor_read_write() {
        let mut file = open(ChunkingConfig::FixedSize { size: 4 });
        file.write(b"hello world").unwrap();
        assert_eq!(file.position(), 11);
        file.seek(SeekFrom::Start(6)).unwrap();
        file.write(b"there!").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(file.read_to_end().unwrap(), b"hello there!");

        file.seek(SeekFrom::End(-7)).unwrap();
        file.delete(1).unwrap();
        file.seek(SeekFrom::Current(-5)).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(file.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert!(file.seek(SeekFrom::End(1)).is_err());
        assert!(file.seek(SeekFrom::Current(-10)).is_err());
    }

    #[test]
    fn truncate_cuts_and_extends() {
        let mut file = open(ChunkingConfig::FixedSize { size: 4 });
        file.write(b"0123456789").unwrap();
        file.truncate(3).unwrap();
        assert_eq!(file.position(), 3);
        file.truncate(5).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(file.read_to_end().unwrap(), b"012\0\0");
        file.truncate(0).unwrap();
        assert_eq!(file.flush().unwrap().data_hash(), HashAlgorithm::Blake3.empty_hash());
    }

    #[test]
    fn splice_out_of_range() {
        let mut file = open(ChunkingConfig::default());
        file.write(b"abc").unwrap();
        assert!(matches!(
            file.container_mut().splice(2, 2, b""),
            Err(TreeError::InvalidPosition { position: 4, length: 3 })
        ));
    }

    #[test]
    fn small_edits_stay_local() {
        let config = small_rabin();
        let (min, max) = config.bounds();
        // Past `min`, a cut depends only on the rolling window, so new cuts
        // fall back onto old ones within a stretch of about `max` bytes.
        let per_edit_bound = (max / min) as usize;
        let data = pseudo_random(20_000, 11);
        let trials = 20u64;
        let mut total_new = 0;
        let mut leaves = 0;
        for trial in 0..trials {
            let mut file = open(config);
            file.write(&data).unwrap();
            file.flush().unwrap();
            let before_list = leaf_hashes(file.container_mut());
            leaves = before_list.len();
            let before: HashSet<Hash> = before_list.into_iter().collect();

            let at = (trial * 997) % data.len() as u64;
            file.seek(SeekFrom::Start(at)).unwrap();
            if trial % 2 == 0 {
                file.insert(&[trial as u8, 0xEE]).unwrap();
            } else {
                file.delete(3).unwrap();
            }
            let after = leaf_hashes(file.container_mut());
            let new = after.iter().filter(|h| !before.contains(h)).count();
            assert!(new >= 1, "edit {trial} changed no leaf");
            assert!(new <= per_edit_bound, "edit {trial} touched {new} of {leaves} leaves");
            total_new += new;
        }
        let mean = total_new as f64 / trials as f64;
        assert!(mean * 20.0 < leaves as f64, "mean {mean} new leaves out of {leaves}");
    }

    #[derive(Clone, Debug)]
    enum Edit {
        Insert(usize, Vec<u8>),
        Delete(usize, usize),
        Overwrite(usize, Vec<u8>),
    }

    fn edit() -> impl Strategy<Value = Edit> {
        prop_oneof![
            (any::<usize>(), proptest::collection::vec(any::<u8>(), 1..300)).prop_map(|(a, d)| Edit::Insert(a, d)),
            (any::<usize>(), 1usize..400).prop_map(|(a, n)| Edit::Delete(a, n)),
            (any::<usize>(), proptest::collection::vec(any::<u8>(), 1..200)).prop_map(|(a, d)| Edit::Overwrite(a, d)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn edits_match_model_and_stream_hash(
            seed in any::<u64>(),
            initial in 0usize..3000,
            edits in proptest::collection::vec(edit(), 1..12),
            flush_between in any::<bool>(),
        ) {
            let config = small_rabin();
            let mut model = pseudo_random(initial, seed);
            let mut file = open(config);
            file.write(&model).unwrap();

            for e in edits {
                let len = model.len();
                match e {
                    Edit::Insert(at, data) => {
                        let at = at % (len + 1);
                        file.seek(SeekFrom::Start(at as u64)).unwrap();
                        file.insert(&data).unwrap();
                        model.splice(at..at, data);
                    }
                    Edit::Delete(at, n) => {
                        let at = at % (len + 1);
                        let n = n.min(len - at);
                        file.seek(SeekFrom::Start(at as u64)).unwrap();
                        file.delete(n as u64).unwrap();
                        model.drain(at..at + n);
                    }
                    Edit::Overwrite(at, data) => {
                        let at = at % (len + 1);
                        file.seek(SeekFrom::Start(at as u64)).unwrap();
                        file.write(&data).unwrap();
                        let end = (at + data.len()).min(len);
                        model.splice(at..end, data);
                    }
                }
                if flush_between {
                    file.flush().unwrap();
                }
            }

            prop_assert_eq!(file.len(), model.len() as u64);
            let r = file.flush().unwrap();
            prop_assert_eq!(r.data_hash(), chunk_hash(config, &model));
            file.seek(SeekFrom::Start(0)).unwrap();
            prop_assert_eq!(file.read_to_end().unwrap(), model);
        }
    }
}
