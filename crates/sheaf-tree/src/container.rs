//! The chunk tree.
//!
//! A [`Container`] is a root node plus everything needed to decode and
//! re-encode it. Leaf nodes (level 1) point at data chunks; every higher
//! node points at nodes one level down. Fan-out is content defined: after a
//! [`flush`](Container::flush), every level is grouped by running the node
//! splitter over the child data hashes, so the root data hash depends only
//! on the leaf sequence and the chunking config.
//!
//! Structural edits only touch the nodes on the edited paths. They keep the
//! parent-recorded lengths exact, mark the path dirty, and leave grouping to
//! the next flush, which balances and stores dirty nodes one level at a time
//! from the leaves up.

use std::collections::HashMap;
use std::sync::Arc;

use sheaf_chunk::{data_splitter, node_splitter, ChunkSplitter};
use sheaf_crypto::HashAlgorithm;
use sheaf_format::{
    BoxPart, ChunkPointer, ChunkingConfig, ContainerType, DataPart, FormatError, Header, Ref,
};
use sheaf_store::ChunkAccessor;
use sheaf_types::Hash;
use tracing::debug;

use crate::arena::{Arena, Cached, Node, NodeId, Pointer};
use crate::cache::{CacheConfig, CacheManager};
use crate::error::{TreeError, TreeResult};
use crate::iter::ChunkIter;

pub struct Container {
    accessor: Arc<dyn ChunkAccessor>,
    container_type: ContainerType,
    chunking: ChunkingConfig,
    hash_algorithm: HashAlgorithm,
    pub(crate) data_splitter: Box<dyn ChunkSplitter>,
    node_splitter: Box<dyn ChunkSplitter>,
    arena: Arena,
    root: NodeId,
    /// Stored box of the root node. `None` while the root is a single leaf.
    root_chunk: Option<ChunkPointer>,
    cache: CacheManager<NodeId>,
    /// Boxes stored by this container since it was loaded or last published,
    /// with the number of puts each.
    written: HashMap<Hash, u32>,
    /// Ref of the last flush, cleared by any edit.
    current: Option<Ref>,
    next_slot: u64,
    pass: u64,
}

impl Container {
    /// An empty container that stores through `accessor`.
    pub fn new(
        accessor: Arc<dyn ChunkAccessor>,
        container_type: ContainerType,
        chunking: ChunkingConfig,
    ) -> TreeResult<Self> {
        let hash_algorithm = accessor.hash_algorithm();
        let mut container = Self::empty(accessor, container_type, chunking, hash_algorithm)?;
        container.arena[container.root].dirty = true;
        Ok(container)
    }

    /// Load a container from its ref. Only the root box is read.
    pub fn read(accessor: Arc<dyn ChunkAccessor>, r: &Ref) -> TreeResult<Self> {
        let header = *r.header();
        let mut container = Self::empty(
            accessor,
            header.container_type,
            header.chunking,
            header.hash_algorithm,
        )?;
        let root = container.root;
        match header.level {
            0 if header.data_length == 0 => {
                container.root_chunk = Some(r.root_pointer());
            }
            0 => {
                let slot = container.next_slot();
                container.arena[root]
                    .pointers
                    .push(Pointer::stored(r.root_pointer(), slot));
            }
            level => {
                let bytes = container.accessor.get_chunk(&r.root_pointer())?;
                let pointers = container.decode_node(&bytes, header.data_length)?;
                let node = &mut container.arena[root];
                node.level = level;
                node.pointers = pointers;
                container.root_chunk = Some(r.root_pointer());
            }
        }
        container.current = Some(*r);
        debug!(
            data_hash = %r.data_hash().short_hex(),
            level = header.level,
            length = header.data_length,
            "read container"
        );
        Ok(container)
    }

    fn empty(
        accessor: Arc<dyn ChunkAccessor>,
        container_type: ContainerType,
        chunking: ChunkingConfig,
        hash_algorithm: HashAlgorithm,
    ) -> TreeResult<Self> {
        let data_splitter = data_splitter(&chunking)?;
        let node_splitter = node_splitter(&chunking)?;
        let mut arena = Arena::default();
        let root = arena.alloc(Node::new(1, None, Vec::new()));
        Ok(Self {
            accessor,
            container_type,
            chunking,
            hash_algorithm,
            data_splitter,
            node_splitter,
            arena,
            root,
            root_chunk: None,
            cache: CacheManager::new(CacheConfig::default()),
            written: HashMap::new(),
            current: None,
            next_slot: 0,
            pass: 0,
        })
    }

    /// Replace the cache sizing. Resident chunks are kept.
    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = CacheManager::new(config);
        self
    }

    pub fn container_type(&self) -> ContainerType {
        self.container_type
    }

    pub fn chunking(&self) -> ChunkingConfig {
        self.chunking
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn accessor(&self) -> &Arc<dyn ChunkAccessor> {
        &self.accessor
    }

    /// Logical byte length.
    pub fn len(&self) -> u64 {
        self.arena[self.root].data_length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Height of the root node; 1 while the root is a leaf node.
    pub fn height(&self) -> u32 {
        self.arena[self.root].level
    }

    /// Whether there are edits not yet captured by a flush.
    pub fn is_dirty(&self) -> bool {
        self.current.is_none()
    }

    /// Ref of the content as last read or flushed; `None` while dirty.
    pub fn current_ref(&self) -> Option<Ref> {
        self.current
    }

    /// Data chunks currently tracked by the cache.
    pub fn cached_chunks(&self) -> usize {
        self.cache.len()
    }

    /// Nodes currently resident in memory.
    pub fn resident_nodes(&self) -> usize {
        self.arena.len()
    }

    /// The data chunk holding `position` and the offset it starts at.
    pub fn get(&mut self, position: u64) -> TreeResult<(ChunkPointer, u64)> {
        let (node, index, start) = self.locate(position)?;
        Ok((self.arena[node].pointers[index].chunk, start))
    }

    /// Bytes of the data chunk holding `position`, and the offset it starts at.
    pub fn read_chunk(&mut self, position: u64) -> TreeResult<(Vec<u8>, u64)> {
        let (node, index, start) = self.locate(position)?;
        let data = self.load_data(node, index)?;
        Ok((data, start))
    }

    /// Iterate data chunks starting with the one that holds `position`.
    pub fn chunk_iter(&mut self, position: u64) -> ChunkIter<'_> {
        ChunkIter::new(self, position)
    }

    /// Insert `data` as one data chunk at `position`, which must be a chunk
    /// boundary or the end of the container.
    ///
    /// The chunk keeps the caller's boundaries; the data-level edit path in
    /// [`splice`](Container::splice) is the one that keeps leaves canonical.
    pub fn insert_chunk(&mut self, position: u64, data: Vec<u8>) -> TreeResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let (node, index) = self.locate_boundary(position)?;
        let pointer = self.new_leaf(data);
        self.insert_pointer(node, index, pointer);
        Ok(())
    }

    /// Append `data` as one data chunk.
    pub fn append_chunk(&mut self, data: Vec<u8>) -> TreeResult<()> {
        let end = self.len();
        self.insert_chunk(end, data)
    }

    /// Remove the data chunk starting at `position`, whose length must be
    /// `length`.
    pub fn remove_chunk(&mut self, position: u64, length: u64) -> TreeResult<()> {
        let (node, index, start) = self.locate(position)?;
        if start != position {
            return Err(TreeError::NotOnBoundary { position });
        }
        let actual = self.arena[node].pointers[index].chunk.data_length;
        if actual != length {
            return Err(TreeError::LengthMismatch {
                expected: length,
                actual,
            });
        }
        let pointer = self.remove_pointer(node, index)?;
        self.cache.forget(pointer.slot);
        if !pointer.unsaved {
            self.release_box(&pointer.chunk.box_hash)?;
        }
        Ok(())
    }

    /// Balance and store every dirty node, returning the container's ref.
    pub fn flush(&mut self) -> TreeResult<Ref> {
        if let Some(r) = self.current {
            return Ok(r);
        }
        self.pass += 1;
        let mut level = 1;
        loop {
            if level == self.height() {
                self.collapse_root()?;
                if self.height() < level {
                    break;
                }
            }
            for id in self.dirty_nodes(level) {
                self.balance_run(id)?;
            }
            for id in self.dirty_nodes(level) {
                self.store_node(id)?;
            }
            if level >= self.height() {
                break;
            }
            level += 1;
        }
        let r = self.make_ref();
        self.current = Some(r);
        debug!(
            data_hash = %r.data_hash().short_hex(),
            level = r.header().level,
            length = r.data_length(),
            "flushed container"
        );
        Ok(r)
    }

    /// Flush and publish: boxes stored so far are now referenced from
    /// outside and are never released by later edits of this container.
    pub fn to_ref(&mut self) -> TreeResult<Ref> {
        let r = self.flush()?;
        self.written.clear();
        Ok(r)
    }

    /// Data hash of the current content.
    pub fn data_hash(&mut self) -> TreeResult<Hash> {
        Ok(self.flush()?.data_hash())
    }

    // ----- descent -----

    /// The leaf node, pointer index and start offset of the chunk holding
    /// `position`.
    fn locate(&mut self, position: u64) -> TreeResult<(NodeId, usize, u64)> {
        let length = self.len();
        if position >= length {
            return Err(TreeError::InvalidPosition { position, length });
        }
        let mut node = self.root;
        let mut start = 0;
        loop {
            let mut offset = start;
            let mut found = None;
            for (i, p) in self.arena[node].pointers.iter().enumerate() {
                if position < offset + p.chunk.data_length {
                    found = Some(i);
                    break;
                }
                offset += p.chunk.data_length;
            }
            let index = found.ok_or(TreeError::InvalidPosition { position, length })?;
            if self.arena[node].level == 1 {
                return Ok((node, index, offset));
            }
            node = self.load_child(node, index)?;
            start = offset;
        }
    }

    /// The leaf node and pointer index where a chunk starting at `position`
    /// goes.
    fn locate_boundary(&mut self, position: u64) -> TreeResult<(NodeId, usize)> {
        let length = self.len();
        if position > length {
            return Err(TreeError::InvalidPosition { position, length });
        }
        if position < length {
            let (node, index, start) = self.locate(position)?;
            if start != position {
                return Err(TreeError::NotOnBoundary { position });
            }
            return Ok((node, index));
        }
        let mut node = self.root;
        while self.arena[node].level > 1 {
            let Some(last) = self.arena[node].pointers.len().checked_sub(1) else {
                return Err(FormatError::EmptyNode.into());
            };
            node = self.load_child(node, last)?;
        }
        Ok((node, self.arena[node].pointers.len()))
    }

    fn load_child(&mut self, node: NodeId, index: usize) -> TreeResult<NodeId> {
        let pointer = &self.arena[node].pointers[index];
        if let Cached::Node(child) = pointer.cached {
            return Ok(child);
        }
        let chunk = pointer.chunk;
        let level = self.arena[node].level - 1;
        let bytes = self.accessor.get_chunk(&chunk)?;
        let pointers = self.decode_node(&bytes, chunk.data_length)?;
        let child = self.arena.alloc(Node::new(level, Some(node), pointers));
        self.arena[node].pointers[index].cached = Cached::Node(child);
        Ok(child)
    }

    fn load_data(&mut self, node: NodeId, index: usize) -> TreeResult<Vec<u8>> {
        let pointer = &self.arena[node].pointers[index];
        if let Cached::Data(data) = &pointer.cached {
            let data = data.clone();
            if !pointer.unsaved {
                let slot = pointer.slot;
                self.touch(slot, node);
            }
            return Ok(data);
        }
        let chunk = pointer.chunk;
        let slot = pointer.slot;
        let data = self.accessor.get_chunk(&chunk)?;
        if data.len() as u64 != chunk.data_length {
            return Err(TreeError::LengthMismatch {
                expected: chunk.data_length,
                actual: data.len() as u64,
            });
        }
        self.arena[node].pointers[index].cached = Cached::Data(data.clone());
        self.touch(slot, node);
        Ok(data)
    }

    fn decode_node(&mut self, bytes: &[u8], declared: u64) -> TreeResult<Vec<Pointer>> {
        let chunks = ChunkPointer::decode_all(bytes)?;
        if chunks.is_empty() {
            return Err(FormatError::EmptyNode.into());
        }
        let actual: u64 = chunks.iter().map(|c| c.data_length).sum();
        if actual != declared {
            return Err(FormatError::LengthMismatch { declared, actual }.into());
        }
        Ok(chunks
            .into_iter()
            .map(|c| {
                let slot = self.next_slot();
                Pointer::stored(c, slot)
            })
            .collect())
    }

    // ----- cache -----

    fn touch(&mut self, slot: u64, owner: NodeId) {
        let evicted = self.cache.touch(slot, owner);
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicting cached chunks");
        }
        for (slot, owner) in evicted {
            self.evict(slot, owner);
        }
    }

    /// Drop a cached data chunk, then unload ancestors that no longer hold
    /// anything resident.
    fn evict(&mut self, slot: u64, hint: NodeId) {
        let Some((owner, index)) = self.find_slot(slot, hint) else {
            return;
        };
        let pointer = &mut self.arena[owner].pointers[index];
        if pointer.unsaved {
            return;
        }
        pointer.cached = Cached::Unloaded;

        let height = self.height();
        let kept = self.cache.config().kept_metadata_levels;
        let mut node = owner;
        loop {
            let n = &self.arena[node];
            let Some(parent) = n.parent else {
                break;
            };
            if n.dirty || height - n.level < kept || n.pointers.iter().any(Pointer::is_resident) {
                break;
            }
            let Some(index) = self.arena[parent].position_of(node) else {
                break;
            };
            self.arena[parent].pointers[index].cached = Cached::Unloaded;
            self.arena.free(node);
            node = parent;
        }
    }

    fn find_slot(&self, slot: u64, hint: NodeId) -> Option<(NodeId, usize)> {
        if let Some(node) = self.arena.get(hint) {
            if let Some(i) = node.pointers.iter().position(|p| p.slot == slot) {
                return Some((hint, i));
            }
        }
        self.arena
            .iter()
            .filter(|(_, n)| n.level == 1)
            .find_map(|(id, n)| n.pointers.iter().position(|p| p.slot == slot).map(|i| (id, i)))
    }

    // ----- structural edits -----

    fn next_slot(&mut self) -> u64 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn new_leaf(&mut self, data: Vec<u8>) -> Pointer {
        let hash = self.hash_algorithm.digest(&data);
        let chunk = ChunkPointer::new(data.len() as u64, hash, Hash::zero(), [0; sheaf_crypto::IV_SIZE]);
        let slot = self.next_slot();
        Pointer {
            chunk,
            cached: Cached::Data(data),
            unsaved: true,
            slot,
        }
    }

    /// Mark `node` and its ancestors changed and drop the flushed ref.
    fn invalidate(&mut self, node: NodeId) {
        self.current = None;
        let mut next = Some(node);
        while let Some(id) = next {
            let n = &mut self.arena[id];
            n.dirty = true;
            next = n.parent;
        }
    }

    /// Apply a length change of `node`'s content to every ancestor pointer,
    /// invalidating the path.
    fn resize(&mut self, node: NodeId, added: u64, removed: u64) {
        self.invalidate(node);
        let mut child = node;
        while let Some(parent) = self.arena[child].parent {
            let Some(index) = self.arena[parent].position_of(child) else {
                break;
            };
            let chunk = &mut self.arena[parent].pointers[index].chunk;
            chunk.data_length = chunk.data_length + added - removed;
            child = parent;
        }
    }

    fn insert_pointer(&mut self, node: NodeId, index: usize, pointer: Pointer) {
        let length = pointer.chunk.data_length;
        if let Cached::Node(child) = pointer.cached {
            self.arena[child].parent = Some(node);
        }
        self.arena[node].pointers.insert(index, pointer);
        self.resize(node, length, 0);
    }

    fn remove_pointer(&mut self, node: NodeId, index: usize) -> TreeResult<Pointer> {
        let pointer = self.arena[node].pointers.remove(index);
        self.resize(node, 0, pointer.chunk.data_length);
        if self.arena[node].pointers.is_empty() {
            self.remove_empty(node)?;
        }
        Ok(pointer)
    }

    /// Detach an emptied node from its parent, cascading upward.
    fn remove_empty(&mut self, node: NodeId) -> TreeResult<()> {
        let mut node = node;
        loop {
            let Some(parent) = self.arena[node].parent else {
                let root = &mut self.arena[node];
                root.level = 1;
                root.dirty = true;
                return Ok(());
            };
            if let Some(index) = self.arena[parent].position_of(node) {
                let removed = self.arena[parent].pointers.remove(index);
                self.release_box(&removed.chunk.box_hash)?;
            }
            self.arena.free(node);
            self.invalidate(parent);
            if !self.arena[parent].pointers.is_empty() {
                return Ok(());
            }
            node = parent;
        }
    }

    // ----- flush -----

    /// Dirty nodes at `level`, left to right.
    fn dirty_nodes(&self, level: u32) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let n = &self.arena[id];
            if !n.dirty || n.level < level {
                continue;
            }
            if n.level == level {
                out.push(id);
                continue;
            }
            for p in n.pointers.iter().rev() {
                if let Cached::Node(child) = p.cached {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Balance `start`, then keep going right while the next node was
    /// changed and not yet balanced in this pass.
    fn balance_run(&mut self, start: NodeId) -> TreeResult<()> {
        let mut next = Some(start);
        while let Some(id) = next {
            match self.arena.get(id) {
                Some(n) if n.dirty && n.balanced_in != self.pass => {}
                _ => break,
            }
            self.arena[id].balanced_in = self.pass;
            self.balance(id)?;
            next = self.resident_right_neighbor(id);
        }
        Ok(())
    }

    /// Regroup one node so it ends exactly where the node splitter triggers.
    ///
    /// A trigger before the last pointer splits the remainder into a new
    /// right sibling. No trigger at all pulls pointers from the right
    /// neighbor, one at a time, until one triggers or there is none left.
    fn balance(&mut self, node: NodeId) -> TreeResult<()> {
        self.node_splitter.reset();
        let mut i = 0;
        loop {
            while i < self.arena[node].pointers.len() {
                let hash = self.arena[node].pointers[i].chunk.data_hash;
                if self.node_splitter.update_hash(&hash) {
                    if i + 1 < self.arena[node].pointers.len() {
                        self.split(node, i + 1);
                    }
                    return Ok(());
                }
                i += 1;
            }
            match self.right_neighbor(node)? {
                Some(right) => self.pull_first(node, right)?,
                None => return Ok(()),
            }
        }
    }

    fn split(&mut self, node: NodeId, at: usize) {
        let level = self.arena[node].level;
        let moved = self.arena[node].pointers.split_off(at);
        let moved_length: u64 = moved.iter().map(|p| p.chunk.data_length).sum();
        let parent = self.arena[node].parent;

        let mut sibling = Node::new(level, parent, moved);
        sibling.dirty = true;
        let sibling = self.arena.alloc(sibling);
        self.adopt_children(sibling);
        let sibling_chunk = ChunkPointer {
            data_length: moved_length,
            ..ChunkPointer::default()
        };

        match parent {
            Some(parent) => {
                self.resize(node, 0, moved_length);
                let index = self.arena[parent].position_of(node).map_or(0, |i| i + 1);
                let slot = self.next_slot();
                self.insert_pointer(parent, index, Pointer::child(sibling, sibling_chunk, slot));
            }
            None => {
                let mut node_chunk = self.root_chunk.take().unwrap_or_default();
                node_chunk.data_length = self.arena[node].data_length();
                let left_slot = self.next_slot();
                let right_slot = self.next_slot();
                let mut root = Node::new(
                    level + 1,
                    None,
                    vec![
                        Pointer::child(node, node_chunk, left_slot),
                        Pointer::child(sibling, sibling_chunk, right_slot),
                    ],
                );
                root.dirty = true;
                let root = self.arena.alloc(root);
                self.arena[node].parent = Some(root);
                self.arena[sibling].parent = Some(root);
                self.root = root;
                self.current = None;
                debug!(height = level + 1, "grew root");
            }
        }
    }

    fn adopt_children(&mut self, node: NodeId) {
        let children: Vec<NodeId> = self.arena[node]
            .pointers
            .iter()
            .filter_map(|p| match p.cached {
                Cached::Node(child) => Some(child),
                _ => None,
            })
            .collect();
        for child in children {
            self.arena[child].parent = Some(node);
        }
    }

    /// Move the first pointer of `right` to the end of `node`.
    fn pull_first(&mut self, node: NodeId, right: NodeId) -> TreeResult<()> {
        let pointer = self.arena[right].pointers.remove(0);
        let length = pointer.chunk.data_length;
        self.resize(right, 0, length);
        let index = self.arena[node].pointers.len();
        self.insert_pointer(node, index, pointer);
        if self.arena[right].pointers.is_empty() {
            self.remove_empty(right)?;
        }
        Ok(())
    }

    /// The next node on the same level, loading it if needed.
    fn right_neighbor(&mut self, node: NodeId) -> TreeResult<Option<NodeId>> {
        let level = self.arena[node].level;
        let mut child = node;
        while let Some(parent) = self.arena[child].parent {
            let Some(index) = self.arena[parent].position_of(child) else {
                return Ok(None);
            };
            if index + 1 < self.arena[parent].pointers.len() {
                let mut next = self.load_child(parent, index + 1)?;
                while self.arena[next].level > level {
                    next = self.load_child(next, 0)?;
                }
                return Ok(Some(next));
            }
            child = parent;
        }
        Ok(None)
    }

    /// The next node on the same level if it is resident. Changed nodes
    /// always are.
    fn resident_right_neighbor(&self, node: NodeId) -> Option<NodeId> {
        let level = self.arena.get(node)?.level;
        let mut child = node;
        while let Some(parent) = self.arena[child].parent {
            let index = self.arena[parent].position_of(child)?;
            if let Some(p) = self.arena[parent].pointers.get(index + 1) {
                let Cached::Node(mut next) = p.cached else {
                    return None;
                };
                while self.arena[next].level > level {
                    match self.arena[next].pointers.first().map(|p| &p.cached) {
                        Some(Cached::Node(id)) => next = *id,
                        _ => return None,
                    }
                }
                return Some(next);
            }
            child = parent;
        }
        None
    }

    /// Replace a root holding a single child by that child.
    fn collapse_root(&mut self) -> TreeResult<()> {
        while self.height() > 1 && self.arena[self.root].pointers.len() == 1 {
            let old = self.root;
            let child = self.load_child(old, 0)?;
            let chunk = self.arena[old].pointers[0].chunk;
            self.arena.free(old);
            self.arena[child].parent = None;
            self.root = child;
            if let Some(previous) = self.root_chunk.replace(chunk) {
                self.release_box(&previous.box_hash)?;
            }
            debug!(height = self.height(), "collapsed root");
        }
        if self.height() == 1 && self.arena[self.root].pointers.len() == 1 {
            if let Some(previous) = self.root_chunk.take() {
                self.release_box(&previous.box_hash)?;
            }
        }
        Ok(())
    }

    /// Store unsaved leaves and the node itself, then record the new box in
    /// the parent.
    fn store_node(&mut self, node: NodeId) -> TreeResult<()> {
        if self.arena[node].level == 1 {
            for i in 0..self.arena[node].pointers.len() {
                self.store_leaf(node, i)?;
            }
        }
        let parent = self.arena[node].parent;
        if parent.is_none() && self.arena[node].level == 1 && self.arena[node].pointers.len() == 1 {
            if let Some(previous) = self.root_chunk.take() {
                self.release_box(&previous.box_hash)?;
            }
            self.arena[node].dirty = false;
            return Ok(());
        }

        let n = &self.arena[node];
        let mut bytes = Vec::with_capacity(n.pointers.len() * sheaf_format::POINTER_SIZE);
        let mut hasher = self.hash_algorithm.hasher();
        for p in &n.pointers {
            p.chunk.encode(&mut bytes);
            hasher.update(p.chunk.data_hash.as_bytes());
        }
        let length = n.data_length();
        let stored = self.accessor.put_chunk(&bytes, length, hasher.finalize())?;
        *self.written.entry(stored.box_hash).or_default() += 1;

        let previous = match parent {
            Some(parent) => {
                let index = self.arena[parent].position_of(node);
                index.map(|i| std::mem::replace(&mut self.arena[parent].pointers[i].chunk, stored))
            }
            None => self.root_chunk.replace(stored),
        };
        if let Some(previous) = previous {
            self.release_box(&previous.box_hash)?;
        }
        self.arena[node].dirty = false;
        Ok(())
    }

    fn store_leaf(&mut self, node: NodeId, index: usize) -> TreeResult<()> {
        let pointer = &mut self.arena[node].pointers[index];
        if !pointer.unsaved {
            return Ok(());
        }
        let Cached::Data(data) = std::mem::take(&mut pointer.cached) else {
            return Ok(());
        };
        let chunk = self
            .accessor
            .put_chunk(&data, pointer.chunk.data_length, pointer.chunk.data_hash)?;
        pointer.chunk = chunk;
        pointer.unsaved = false;
        *self.written.entry(chunk.box_hash).or_default() += 1;
        Ok(())
    }

    /// Release a box if this container stored it and has not published it.
    fn release_box(&mut self, box_hash: &Hash) -> TreeResult<()> {
        let Some(count) = self.written.get_mut(box_hash) else {
            return Ok(());
        };
        *count -= 1;
        if *count == 0 {
            self.written.remove(box_hash);
        }
        self.accessor.release_chunk(box_hash)?;
        Ok(())
    }

    fn make_ref(&self) -> Ref {
        let root = &self.arena[self.root];
        let (level, chunk) = match (root.level, root.pointers.as_slice()) {
            (1, [leaf]) => (0, leaf.chunk),
            (1, []) => (0, self.root_chunk.unwrap_or_default()),
            (level, _) => (level, self.root_chunk.unwrap_or_default()),
        };
        let header = Header {
            container_type: self.container_type,
            level,
            data_length: root.data_length(),
            chunking: self.chunking,
            hash_algorithm: self.hash_algorithm,
        };
        Ref::new(
            DataPart {
                data_hash: chunk.data_hash,
                header,
            },
            BoxPart {
                box_hash: chunk.box_hash,
                iv: chunk.iv,
                box_header: self.accessor.box_header(),
            },
        )
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("container_type", &self.container_type)
            .field("length", &self.len())
            .field("height", &self.height())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
