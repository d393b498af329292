//! Copying commit history between stores.
//!
//! Boxes are copied verbatim, so refs stay valid on the destination without
//! re-encoding. Within a container, boxes are written children first; within
//! a tree, subdirectories and files before their directory; within a commit,
//! the tree before the commit. A root box already present at the destination
//! therefore means everything below it is present too, and the copy prunes
//! there.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use sheaf_dag::read_commit;
use sheaf_format::{ChunkPointer, Ref};
use sheaf_store::{ChunkAccessor, ChunkReader, ChunkStore, StoreError};
use sheaf_types::Hash;
use tracing::debug;

use crate::directory::read_directory;
use crate::error::IndexResult;

/// What a copy wrote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub commits: usize,
    pub boxes: usize,
}

struct Copier<'a> {
    source: &'a Arc<dyn ChunkAccessor>,
    source_store: &'a dyn ChunkReader,
    dest: &'a dyn ChunkStore,
    stats: CopyStats,
}

impl Copier<'_> {
    fn container_boxes(&self, r: &Ref) -> IndexResult<Vec<Hash>> {
        let mut out = vec![r.box_hash()];
        let level = r.header().level;
        if level > 0 {
            let mut stack = vec![(r.root_pointer(), level)];
            while let Some((pointer, level)) = stack.pop() {
                let bytes = self.source.get_chunk(&pointer)?;
                for child in ChunkPointer::decode_all(&bytes)? {
                    out.push(child.box_hash);
                    if level > 1 {
                        stack.push((child, level - 1));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Copy one container. Returns false if it was already present.
    fn container(&mut self, r: &Ref) -> IndexResult<bool> {
        if self.dest.contains(&r.box_hash())? {
            return Ok(false);
        }
        for hash in self.container_boxes(r)?.iter().rev() {
            if self.dest.contains(hash)? {
                continue;
            }
            let bytes = self
                .source_store
                .get(hash)?
                .ok_or(StoreError::NotFound(*hash))?;
            self.dest.put(hash, &bytes)?;
            self.stats.boxes += 1;
        }
        Ok(true)
    }

    fn tree(&mut self, r: &Ref) -> IndexResult<()> {
        if self.dest.contains(&r.box_hash())? {
            return Ok(());
        }
        let dir = read_directory(Arc::clone(self.source), r)?;
        for (_, entry) in dir.entries() {
            if entry.is_file {
                self.container(&entry.data)?;
            } else {
                self.tree(&entry.data)?;
            }
            for attribute in &entry.attributes {
                self.container(attribute)?;
            }
        }
        self.container(r)?;
        Ok(())
    }
}

/// Copy the commit at `head` and every ancestor missing from `dest`,
/// together with their trees and file contents.
///
/// `source` decodes boxes read from `source_store`.
pub fn copy_commit_history(
    source: &Arc<dyn ChunkAccessor>,
    source_store: &dyn ChunkReader,
    dest: &dyn ChunkStore,
    head: &Ref,
) -> IndexResult<CopyStats> {
    let mut copier = Copier {
        source,
        source_store,
        dest,
        stats: CopyStats::default(),
    };
    let mut queue = VecDeque::from([*head]);
    let mut seen = HashSet::new();
    while let Some(r) = queue.pop_front() {
        if !seen.insert(r) || dest.contains(&r.box_hash())? {
            continue;
        }
        let commit = read_commit(Arc::clone(source), &r)?;
        copier.tree(&commit.tree)?;
        copier.container(&r)?;
        copier.stats.commits += 1;
        queue.extend(commit.parents);
    }
    debug!(
        head = %head.data_hash().short_hex(),
        commits = copier.stats.commits,
        boxes = copier.stats.boxes,
        "copied commit history"
    );
    Ok(copier.stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeAccessor;
    use sheaf_crypto::HashAlgorithm;
    use sheaf_dag::{write_commit, Commit};
    use sheaf_format::{ChunkingConfig, CompressionType, ContainerType};
    use sheaf_store::{BoxChunkAccessor, InMemoryChunkStore};
    use sheaf_tree::{Container, RandomDataAccess};

    fn small() -> ChunkingConfig {
        ChunkingConfig::Rabin {
            target: 64,
            min: 16,
            max: 256,
        }
    }

    fn accessor(store: &Arc<InMemoryChunkStore>) -> Arc<dyn ChunkAccessor> {
        Arc::new(BoxChunkAccessor::new(store.clone(), HashAlgorithm::Blake3, CompressionType::None))
    }

    fn write_file(acc: &Arc<dyn ChunkAccessor>, bytes: &[u8]) -> Ref {
        let mut c = Container::new(Arc::clone(acc), ContainerType::Data, small()).unwrap();
        c.append(bytes).unwrap();
        c.to_ref().unwrap()
    }

    fn read_file(acc: &Arc<dyn ChunkAccessor>, r: &Ref) -> Vec<u8> {
        RandomDataAccess::new(Container::read(Arc::clone(acc), r).unwrap())
            .read_to_end()
            .unwrap()
    }

    #[test]
    fn copies_history_and_prunes_on_second_run() {
        let src = Arc::new(InMemoryChunkStore::new());
        let src_acc = accessor(&src);
        let content: Vec<u8> = (0..5000u32).map(|i| (i * 31 % 251) as u8).collect();

        let mut tree = TreeAccessor::new(Arc::clone(&src_acc), small());
        tree.put_file("docs/big.bin", write_file(&src_acc, &content)).unwrap();
        let first = write_commit(Arc::clone(&src_acc), small(), &Commit::new(tree.build().unwrap(), Vec::new(), "one")).unwrap();
        tree.put_file("small.txt", write_file(&src_acc, b"hi")).unwrap();
        let second = write_commit(Arc::clone(&src_acc), small(), &Commit::new(tree.build().unwrap(), vec![first], "two")).unwrap();

        let dst = Arc::new(InMemoryChunkStore::new());
        let stats = copy_commit_history(&src_acc, src.as_ref(), dst.as_ref(), &second).unwrap();
        assert_eq!(stats.commits, 2);
        assert!(stats.boxes > 2);

        let dst_acc = accessor(&dst);
        let commit = read_commit(Arc::clone(&dst_acc), &second).unwrap();
        let mut copied = TreeAccessor::open(Arc::clone(&dst_acc), small(), &commit.tree).unwrap();
        let big = copied.file("docs/big.bin").unwrap().unwrap();
        assert_eq!(read_file(&dst_acc, &big), content);

        let again = copy_commit_history(&src_acc, src.as_ref(), dst.as_ref(), &second).unwrap();
        assert_eq!(again, CopyStats::default());
    }

    #[test]
    fn stops_at_local_commit() {
        let src = Arc::new(InMemoryChunkStore::new());
        let src_acc = accessor(&src);
        let mut tree = TreeAccessor::new(Arc::clone(&src_acc), small());
        let base = write_commit(Arc::clone(&src_acc), small(), &Commit::new(tree.build().unwrap(), Vec::new(), "base")).unwrap();

        let dst = Arc::new(InMemoryChunkStore::new());
        copy_commit_history(&src_acc, src.as_ref(), dst.as_ref(), &base).unwrap();

        tree.put_file("f", write_file(&src_acc, b"data")).unwrap();
        let next = write_commit(Arc::clone(&src_acc), small(), &Commit::new(tree.build().unwrap(), vec![base], "next")).unwrap();
        let stats = copy_commit_history(&src_acc, src.as_ref(), dst.as_ref(), &next).unwrap();
        assert_eq!(stats.commits, 1);
    }
}
