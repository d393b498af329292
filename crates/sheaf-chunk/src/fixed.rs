use crate::splitter::ChunkSplitter;

/// Triggers exactly every `size` bytes.
#[derive(Clone, Debug)]
pub struct FixedSizeSplitter {
    size: u64,
    count: u64,
}

impl FixedSizeSplitter {
    /// `size` must be non-zero; [`ChunkingConfig::validate`](sheaf_format::ChunkingConfig::validate)
    /// enforces this for splitters built from a config.
    pub fn new(size: u64) -> Self {
        Self {
            size: size.max(1),
            count: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl ChunkSplitter for FixedSizeSplitter {
    fn reset(&mut self) {
        self.count = 0;
    }

    fn update(&mut self, _byte: u8) {
        self.count = self.count.saturating_add(1);
    }

    fn is_triggered(&self) -> bool {
        self.count >= self.size
    }

    fn clone_fresh(&self) -> Box<dyn ChunkSplitter> {
        Box::new(Self::new(self.size))
    }

    fn find_boundary(&mut self, data: &[u8]) -> Option<usize> {
        if self.is_triggered() {
            self.update(0);
            return (!data.is_empty()).then_some(1);
        }
        let needed = (self.size - self.count) as usize;
        if data.len() >= needed {
            self.count = self.size;
            Some(needed)
        } else {
            self.count += data.len() as u64;
            None
        }
    }
}
