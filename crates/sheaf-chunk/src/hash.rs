//! Streaming Merkle hash over a byte stream.
//!
//! Layer 0 cuts bytes into leaf chunks with the data splitter. Every other
//! layer receives the chunk hashes of the layer below and groups them with
//! the node splitter, exactly as the chunk tree groups pointers after a
//! flush. A layer holds its first chunk hash back until a second one
//! arrives, so an upper layer only exists when the level below produced at
//! least two chunks.

use sheaf_crypto::{ContentHasher, HashAlgorithm};
use sheaf_format::{ChunkingConfig, FormatResult};
use sheaf_types::Hash;
use tracing::trace;

use crate::splitter::{data_splitter, node_splitter, ChunkSplitter};

struct Layer {
    hasher: ContentHasher,
    splitter: Box<dyn ChunkSplitter>,
    /// First chunk hash, held until a second one proves an upper layer is needed.
    first: Option<Hash>,
    /// Whether any chunk hash has left this layer.
    emitted: bool,
    /// Whether the current chunk has received input.
    has_data: bool,
}

impl Layer {
    fn new(algorithm: HashAlgorithm, splitter: Box<dyn ChunkSplitter>) -> Self {
        Self {
            hasher: algorithm.hasher(),
            splitter,
            first: None,
            emitted: false,
            has_data: false,
        }
    }

    fn reset(&mut self) {
        self.hasher.reset();
        self.splitter.reset();
        self.first = None;
        self.emitted = false;
        self.has_data = false;
    }
}

/// Computes the data hash a container would have for a byte stream.
///
/// ```
/// use sheaf_chunk::ChunkHash;
/// use sheaf_crypto::HashAlgorithm;
/// use sheaf_format::ChunkingConfig;
///
/// let mut h = ChunkHash::new(ChunkingConfig::default(), HashAlgorithm::Blake3).unwrap();
/// h.update(b"hello");
/// assert_eq!(h.digest(), HashAlgorithm::Blake3.digest(b"hello"));
/// ```
pub struct ChunkHash {
    algorithm: HashAlgorithm,
    node_splitter: Box<dyn ChunkSplitter>,
    /// Allocated layers; only the first `active` are in use.
    layers: Vec<Layer>,
    active: usize,
    length: u64,
}

impl ChunkHash {
    pub fn new(config: ChunkingConfig, algorithm: HashAlgorithm) -> FormatResult<Self> {
        let data = data_splitter(&config)?;
        let node_splitter = node_splitter(&config)?;
        Ok(Self {
            algorithm,
            node_splitter,
            layers: vec![Layer::new(algorithm, data)],
            active: 1,
            length: 0,
        })
    }

    /// Bytes fed since creation or the last reset.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of layers in use; the height of the equivalent tree plus one.
    pub fn layer_count(&self) -> usize {
        self.active
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.length += data.len() as u64;
        while !data.is_empty() {
            let layer = &mut self.layers[0];
            match layer.splitter.find_boundary(data) {
                Some(n) => {
                    layer.hasher.update(&data[..n]);
                    let hash = layer.hasher.finalize_reset();
                    layer.splitter.reset();
                    layer.has_data = false;
                    data = &data[n..];
                    self.emit(0, hash);
                }
                None => {
                    layer.hasher.update(data);
                    layer.has_data = true;
                    data = &[];
                }
            }
        }
    }

    /// Finish the stream and return its data hash, then reset for reuse.
    pub fn digest(&mut self) -> Hash {
        let mut level = 0;
        let result = loop {
            let layer = &mut self.layers[level];
            if layer.has_data {
                let hash = layer.hasher.finalize_reset();
                layer.splitter.reset();
                layer.has_data = false;
                self.emit(level, hash);
            }
            if level + 1 < self.active {
                level += 1;
                continue;
            }
            break match self.layers[level].first {
                Some(hash) => hash,
                None => self.algorithm.empty_hash(),
            };
        };
        trace!(length = self.length, layers = self.active, "chunk hash digest");
        self.reset();
        result
    }

    /// Discard all input. Upper layers stay allocated for the next stream.
    pub fn reset(&mut self) {
        for layer in &mut self.layers[..self.active] {
            layer.reset();
        }
        self.active = 1;
        self.length = 0;
    }

    /// Pass a finished chunk hash from `level` to the layer above it.
    fn emit(&mut self, mut level: usize, mut hash: Hash) {
        loop {
            let upper = level + 1;
            if upper >= self.active {
                let layer = &mut self.layers[level];
                if !layer.emitted {
                    layer.emitted = true;
                    layer.first = Some(hash);
                    return;
                }
                let first = layer.first.take();
                self.activate(upper);
                if let Some(first) = first {
                    if let Some(closed) = self.push_node_input(upper, first) {
                        self.emit(upper, closed);
                    }
                }
            }
            match self.push_node_input(upper, hash) {
                Some(next) => {
                    level = upper;
                    hash = next;
                }
                None => return,
            }
        }
    }

    fn activate(&mut self, level: usize) {
        if level == self.layers.len() {
            self.layers
                .push(Layer::new(self.algorithm, self.node_splitter.clone_fresh()));
        } else {
            self.layers[level].reset();
        }
        self.active = level + 1;
    }

    /// Feed a child hash into a node layer; returns the node hash if it closed.
    fn push_node_input(&mut self, level: usize, child: Hash) -> Option<Hash> {
        let layer = &mut self.layers[level];
        layer.hasher.update(child.as_bytes());
        layer.has_data = true;
        if layer.splitter.update_hash(&child) {
            layer.splitter.reset();
            layer.has_data = false;
            Some(layer.hasher.finalize_reset())
        } else {
            None
        }
    }
}

impl std::fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkHash")
            .field("algorithm", &self.algorithm)
            .field("layers", &self.active)
            .field("length", &self.length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn fixed(size: u64) -> ChunkHash {
        ChunkHash::new(ChunkingConfig::FixedSize { size }, HashAlgorithm::Blake3).unwrap()
    }

    fn h(data: &[u8]) -> Hash {
        HashAlgorithm::Blake3.digest(data)
    }

    fn node(children: &[Hash]) -> Hash {
        let mut buf = Vec::new();
        for c in children {
            buf.extend_from_slice(c.as_bytes());
        }
        h(&buf)
    }

    #[test]
    fn empty_stream() {
        assert_eq!(fixed(4).digest(), h(b""));
    }

    #[test]
    fn single_chunk_is_leaf_hash() {
        let mut c = fixed(4);
        c.update(b"abcd");
        assert_eq!(c.digest(), h(b"abcd"));

        c.update(b"ab");
        assert_eq!(c.digest(), h(b"ab"));
    }

    #[test]
    fn two_chunks_form_one_node() {
        let mut c = fixed(4);
        c.update(b"abcdef");
        // "ef" is still open, so the first leaf hash is held back.
        assert_eq!(c.layer_count(), 1);
        assert_eq!(c.digest(), node(&[h(b"abcd"), h(b"ef")]));

        c.update(b"abcdefgh");
        assert_eq!(c.layer_count(), 2);
        assert_eq!(c.digest(), node(&[h(b"abcd"), h(b"efgh")]));
    }

    #[test]
    fn node_level_splits_with_fixed_threshold() {
        // FixedSize(4) scales to a 64-byte node threshold: two hashes per node.
        let mut c = fixed(4);
        c.update(b"aaaabbbbccccdddde");
        let leaves = [h(b"aaaa"), h(b"bbbb"), h(b"cccc"), h(b"dddd"), h(b"e")];
        let n1 = node(&leaves[0..2]);
        let n2 = node(&leaves[2..4]);
        let n3 = node(&leaves[4..5]);
        let m1 = node(&[n1, n2]);
        let m2 = node(&[n3]);
        assert_eq!(c.digest(), node(&[m1, m2]));
    }

    #[test]
    fn update_granularity_does_not_matter() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let config = ChunkingConfig::Rabin {
            target: 256,
            min: 64,
            max: 1024,
        };
        let mut whole = ChunkHash::new(config, HashAlgorithm::Blake3).unwrap();
        whole.update(&data);
        let expected = whole.digest();

        let mut pieces = ChunkHash::new(config, HashAlgorithm::Blake3).unwrap();
        for piece in data.chunks(7) {
            pieces.update(piece);
        }
        assert_eq!(pieces.digest(), expected);
    }

    #[test]
    fn reuse_after_digest() {
        let mut c = fixed(2);
        c.update(&[1; 100]);
        let first = c.digest();
        c.update(&[1; 100]);
        assert_eq!(c.digest(), first);
        c.update(b"x");
        assert_eq!(c.digest(), h(b"x"));
    }

    #[test]
    fn sha256_variant() {
        let mut c = ChunkHash::new(ChunkingConfig::default(), HashAlgorithm::Sha256).unwrap();
        c.update(b"abc");
        assert_eq!(c.digest(), HashAlgorithm::Sha256.digest(b"abc"));
    }

    proptest! {
        #[test]
        fn split_points_do_not_change_digest(
            seed in any::<u64>(),
            len in 0usize..20_000,
            cuts in proptest::collection::vec(any::<usize>(), 0..6),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut data = vec![0u8; len];
            rng.fill(&mut data[..]);
            let config = ChunkingConfig::Rabin { target: 128, min: 32, max: 512 };

            let mut whole = ChunkHash::new(config, HashAlgorithm::Blake3).unwrap();
            whole.update(&data);
            let expected = whole.digest();

            let mut points: Vec<usize> = cuts.iter().map(|c| if len == 0 { 0 } else { c % len }).collect();
            points.sort();
            let mut split = ChunkHash::new(config, HashAlgorithm::Blake3).unwrap();
            let mut start = 0;
            for p in points {
                split.update(&data[start..p]);
                start = p;
            }
            split.update(&data[start..]);
            prop_assert_eq!(split.len(), len as u64);
            prop_assert_eq!(split.digest(), expected);
        }
    }
}
