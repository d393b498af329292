use sheaf_format::{ChunkingConfig, FormatResult, POINTER_SIZE};
use sheaf_types::{Hash, HASH_SIZE};

use crate::fixed::FixedSizeSplitter;
use crate::rabin::RabinSplitter;

/// Smallest node splitter threshold, in bytes of child hashes.
///
/// Two hashes: a node that is not the last on its level always holds at
/// least two pointers, so every level is at most half the size of the one
/// below and tree height converges.
pub const MIN_NODE_THRESHOLD: u64 = 2 * HASH_SIZE as u64;

/// A chunk boundary detector fed one byte at a time.
///
/// Once triggered, a splitter stays triggered until [`reset`](Self::reset).
pub trait ChunkSplitter: Send + Sync {
    /// Forget all state; the next byte starts a new chunk.
    fn reset(&mut self);

    /// Feed one byte.
    fn update(&mut self, byte: u8);

    /// Whether a boundary falls after the last byte fed.
    fn is_triggered(&self) -> bool;

    /// A new splitter with the same parameters and fresh state.
    fn clone_fresh(&self) -> Box<dyn ChunkSplitter>;

    /// Feed bytes until a boundary triggers.
    ///
    /// Returns the number of bytes consumed when the splitter triggered,
    /// counting the triggering byte, or `None` if all of `data` was consumed
    /// without a boundary.
    fn find_boundary(&mut self, data: &[u8]) -> Option<usize> {
        for (i, &b) in data.iter().enumerate() {
            self.update(b);
            if self.is_triggered() {
                return Some(i + 1);
            }
        }
        None
    }

    /// Feed a child hash at node level; true if the node closes after it.
    fn update_hash(&mut self, hash: &Hash) -> bool {
        self.find_boundary(hash.as_bytes()).is_some()
    }
}

/// Splitter that cuts raw data into leaf chunks.
pub fn data_splitter(config: &ChunkingConfig) -> FormatResult<Box<dyn ChunkSplitter>> {
    config.validate()?;
    Ok(match *config {
        ChunkingConfig::Rabin { target, min, max } => Box::new(RabinSplitter::new(target, min, max)?),
        ChunkingConfig::FixedSize { size } => Box::new(FixedSizeSplitter::new(size)),
    })
}

/// Splitter that groups child hashes into nodes.
///
/// Thresholds are the data thresholds scaled by `HASH_SIZE / POINTER_SIZE`,
/// so pointers per node tracks bytes per leaf, and clamped to
/// [`MIN_NODE_THRESHOLD`].
pub fn node_splitter(config: &ChunkingConfig) -> FormatResult<Box<dyn ChunkSplitter>> {
    config.validate()?;
    Ok(match node_config(config) {
        ChunkingConfig::Rabin { target, min, max } => Box::new(RabinSplitter::new(target, min, max)?),
        ChunkingConfig::FixedSize { size } => Box::new(FixedSizeSplitter::new(size)),
    })
}

fn scale(value: u64) -> u64 {
    let scaled = value.saturating_mul(HASH_SIZE as u64) / POINTER_SIZE as u64;
    scaled.max(MIN_NODE_THRESHOLD)
}

/// The node-level thresholds derived from a data-level config.
pub fn node_config(config: &ChunkingConfig) -> ChunkingConfig {
    match *config {
        ChunkingConfig::Rabin { target, min, max } => {
            let min = scale(min);
            let target = scale(target).max(min + 1);
            let max = scale(max).max(target);
            ChunkingConfig::Rabin { target, min, max }
        }
        ChunkingConfig::FixedSize { size } => ChunkingConfig::FixedSize { size: scale(size) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_thresholds_scale_down() {
        let node = node_config(&ChunkingConfig::rabin_default());
        assert_eq!(
            node,
            ChunkingConfig::Rabin {
                target: 8192 * 32 / 88,
                min: 2048 * 32 / 88,
                max: 65536 * 32 / 88,
            }
        );
    }

    #[test]
    fn node_thresholds_are_clamped() {
        let node = node_config(&ChunkingConfig::FixedSize { size: 16 });
        assert_eq!(node, ChunkingConfig::FixedSize { size: 64 });

        let node = node_config(&ChunkingConfig::Rabin {
            target: 32,
            min: 8,
            max: 64,
        });
        let (min, max) = node.bounds();
        assert!(min >= MIN_NODE_THRESHOLD);
        assert!(max > min);
        assert!(node.validate().is_ok());
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(data_splitter(&ChunkingConfig::FixedSize { size: 0 }).is_err());
    }

    #[test]
    fn find_boundary_counts_trigger_byte() {
        let mut s = data_splitter(&ChunkingConfig::FixedSize { size: 4 }).unwrap();
        assert_eq!(s.find_boundary(&[0; 3]), None);
        assert_eq!(s.find_boundary(&[0; 3]), Some(1));
        assert!(s.is_triggered());
        s.reset();
        assert!(!s.is_triggered());
    }
}
