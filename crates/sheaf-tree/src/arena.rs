//! Node storage for the chunk tree.
//!
//! Nodes live in a generational arena owned by their container. A node's
//! parent link is a plain [`NodeId`], never an owning reference, and a stale
//! id (one whose slot was freed and reused) is detected by its generation.

use sheaf_format::ChunkPointer;

/// Handle to a node in a container's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Decoded form of the chunk behind a pointer, if resident.
#[derive(Debug, Default)]
pub(crate) enum Cached {
    #[default]
    Unloaded,
    Data(Vec<u8>),
    Node(NodeId),
}

/// A chunk pointer as held in a node, with its optional resident chunk.
#[derive(Debug)]
pub(crate) struct Pointer {
    pub chunk: ChunkPointer,
    pub cached: Cached,
    /// Leaf bytes that have not been stored yet; `chunk.box_hash` is unset.
    pub unsaved: bool,
    /// Stable identity for the cache manager; survives moves between nodes.
    pub slot: u64,
}

impl Pointer {
    pub fn stored(chunk: ChunkPointer, slot: u64) -> Self {
        Self {
            chunk,
            cached: Cached::Unloaded,
            unsaved: false,
            slot,
        }
    }

    pub fn child(node: NodeId, chunk: ChunkPointer, slot: u64) -> Self {
        Self {
            chunk,
            cached: Cached::Node(node),
            unsaved: false,
            slot,
        }
    }

    pub fn is_resident(&self) -> bool {
        !matches!(self.cached, Cached::Unloaded)
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    /// 1 for a leaf node, whose pointers reference data chunks.
    pub level: u32,
    pub parent: Option<NodeId>,
    pub pointers: Vec<Pointer>,
    /// Changed since it was last stored.
    pub dirty: bool,
    /// Flush pass in which the node was last balanced.
    pub balanced_in: u64,
}

impl Node {
    pub fn new(level: u32, parent: Option<NodeId>, pointers: Vec<Pointer>) -> Self {
        Self {
            level,
            parent,
            pointers,
            dirty: false,
            balanced_in: 0,
        }
    }

    pub fn data_length(&self) -> u64 {
        self.pointers.iter().map(|p| p.chunk.data_length).sum()
    }

    pub fn position_of(&self, child: NodeId) -> Option<usize> {
        self.pointers
            .iter()
            .position(|p| matches!(p.cached, Cached::Node(id) if id == child))
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Arena {
    pub fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId { index, generation: 0 }
            }
        }
    }

    pub fn free(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        self.free.push(id.index);
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.node.as_ref().map(|n| {
                (
                    NodeId {
                        index: i as u32,
                        generation: s.generation,
                    },
                    n,
                )
            })
        })
    }
}

impl std::ops::Index<NodeId> for Arena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node id {id:?}"),
        }
    }
}

impl std::ops::IndexMut<NodeId> for Arena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale node id {id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_ids_go_stale() {
        let mut arena = Arena::default();
        let a = arena.alloc(Node::new(1, None, Vec::new()));
        assert!(arena.free(a).is_some());
        let b = arena.alloc(Node::new(2, None, Vec::new()));
        assert_ne!(a, b);
        assert!(!arena.contains(a));
        assert_eq!(arena[b].level, 2);
        assert!(arena.free(a).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn position_of_child() {
        let mut arena = Arena::default();
        let child = arena.alloc(Node::new(1, None, Vec::new()));
        let parent = Node::new(
            2,
            None,
            vec![
                Pointer::stored(ChunkPointer::default(), 0),
                Pointer::child(child, ChunkPointer::default(), 1),
            ],
        );
        assert_eq!(parent.position_of(child), Some(1));
    }
}
