//! Data-level edits.
//!
//! Leaves written through this path are canonical: the edited neighborhood
//! is rechunked with the data splitter from the start of the first affected
//! chunk, and rechunking stops at the first new cut that lands on an old
//! chunk boundary past the edit. From there on the old chunks are exactly
//! what the splitter would produce again.

use sheaf_chunk::ChunkSplitter;

use crate::container::Container;
use crate::error::{TreeError, TreeResult};

struct Rechunker {
    splitter: Box<dyn ChunkSplitter>,
    current: Vec<u8>,
    chunks: Vec<Vec<u8>>,
}

impl Rechunker {
    fn new(splitter: Box<dyn ChunkSplitter>) -> Self {
        Self {
            splitter,
            current: Vec::new(),
            chunks: Vec::new(),
        }
    }

    fn feed(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            match self.splitter.find_boundary(data) {
                Some(n) => {
                    self.current.extend_from_slice(&data[..n]);
                    self.chunks.push(std::mem::take(&mut self.current));
                    self.splitter.reset();
                    data = &data[n..];
                }
                None => {
                    self.current.extend_from_slice(data);
                    break;
                }
            }
        }
    }

    /// No bytes pending since the last cut.
    fn at_boundary(&self) -> bool {
        self.current.is_empty()
    }

    fn finish(mut self) -> Vec<Vec<u8>> {
        if !self.current.is_empty() {
            self.chunks.push(self.current);
        }
        self.chunks
    }
}

impl Container {
    /// Replace `delete` bytes at `position` with `insert`.
    pub fn splice(&mut self, position: u64, delete: u64, insert: &[u8]) -> TreeResult<()> {
        let length = self.len();
        let end = position
            .checked_add(delete)
            .filter(|&end| end <= length)
            .ok_or(TreeError::InvalidPosition {
                position: position.saturating_add(delete),
                length,
            })?;
        if delete == 0 && insert.is_empty() {
            return Ok(());
        }

        let mut rechunker = Rechunker::new(self.data_splitter.clone_fresh());
        let mut first_start = 0;
        let mut replaced = Vec::new();

        if length == 0 {
            rechunker.feed(insert);
        } else {
            // appending rechunks the last chunk, which may not end on a cut
            let anchor = if position == length { length - 1 } else { position };
            let (data, start) = self.read_chunk(anchor)?;
            let chunk_end = start + data.len() as u64;
            first_start = start;
            rechunker.feed(&data[..(position - start) as usize]);
            rechunker.feed(insert);
            if end < chunk_end {
                rechunker.feed(&data[(end - start) as usize..]);
            }
            replaced.push(data.len() as u64);

            let mut cursor = chunk_end;
            while cursor < length && !(cursor >= end && rechunker.at_boundary()) {
                let (pointer, start) = self.get(cursor)?;
                let chunk_end = start + pointer.data_length;
                if end < chunk_end {
                    let (data, _) = self.read_chunk(cursor)?;
                    let from = end.max(start);
                    rechunker.feed(&data[(from - start) as usize..]);
                }
                replaced.push(pointer.data_length);
                cursor = chunk_end;
            }
        }

        let chunks = rechunker.finish();
        for chunk_length in &replaced {
            self.remove_chunk(first_start, *chunk_length)?;
        }
        let mut at = first_start;
        for chunk in chunks {
            let n = chunk.len() as u64;
            self.insert_chunk(at, chunk)?;
            at += n;
        }
        Ok(())
    }

    /// Append bytes to the end, rechunking the last chunk.
    pub fn append(&mut self, data: &[u8]) -> TreeResult<()> {
        let end = self.len();
        self.splice(end, 0, data)
    }
}
