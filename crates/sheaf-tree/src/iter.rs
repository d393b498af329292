use crate::container::Container;
use crate::error::TreeResult;

/// Data chunks of a container in order, as `(start offset, bytes)`.
///
/// Created by [`Container::chunk_iter`]. The first chunk is the one holding
/// the requested position, so it may start before it. Iteration stops after
/// the first error.
pub struct ChunkIter<'a> {
    container: &'a mut Container,
    position: u64,
    failed: bool,
}

impl<'a> ChunkIter<'a> {
    pub(crate) fn new(container: &'a mut Container, position: u64) -> Self {
        Self {
            container,
            position,
            failed: false,
        }
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = TreeResult<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.container.len() {
            return None;
        }
        match self.container.read_chunk(self.position) {
            Ok((data, start)) => {
                self.position = start + data.len() as u64;
                Some(Ok((start, data)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
