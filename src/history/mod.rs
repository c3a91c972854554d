//! Persistent history tries
//!
//! Tokens do not carry their paths. Each token holds a [`HistoryRef`] into a
//! trie whose root is the utterance start, so tokens that agree on a prefix
//! share it. Nodes live in an arena and are reclaimed by
//! [`HistoryTrie::collect_garbage`] once no live token and no surviving
//! child refers to them.
//!
//! Handles carry a generation counter. Dereferencing a handle whose slot has
//! been reclaimed panics instead of returning some other node.

pub mod state;
pub mod word;

pub use state::{StateHistory, StatePayload, StateSegment};
pub use word::{RecombinationLink, WordHistory, WordPayload};

use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::Hash;

/// Handle to a node in a [`HistoryTrie`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HistoryRef {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
pub struct HistoryNode<K, P> {
    pub key: K,
    pub parent: Option<HistoryRef>,
    pub children: FxHashMap<K, HistoryRef>,
    pub payload: P,
}

#[derive(Debug, Clone)]
struct Slot<K, P> {
    generation: u32,
    node: Option<HistoryNode<K, P>>,
}

/// Arena-backed trie with an incrementally maintained leaf set
#[derive(Debug, Clone)]
pub struct HistoryTrie<K, P> {
    slots: Vec<Slot<K, P>>,
    free: Vec<u32>,
    leaves: FxHashSet<HistoryRef>,
    root: HistoryRef,
    len: usize,
}

impl<K, P> HistoryTrie<K, P>
where
    K: Copy + Eq + Hash,
{
    pub fn new(root_key: K, root_payload: P) -> Self {
        let mut trie = Self {
            slots: Vec::new(),
            free: Vec::new(),
            leaves: FxHashSet::default(),
            root: HistoryRef {
                index: 0,
                generation: 0,
            },
            len: 0,
        };
        trie.root = trie.allocate(root_key, None, root_payload);
        trie.leaves.insert(trie.root);
        trie
    }

    pub fn root(&self) -> HistoryRef {
        self.root
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_leaf(&self, node: HistoryRef) -> bool {
        self.leaves.contains(&node)
    }

    /// Whether the handle still points at a live node
    pub fn contains(&self, node: HistoryRef) -> bool {
        self.slots
            .get(node.index as usize)
            .is_some_and(|s| s.generation == node.generation && s.node.is_some())
    }

    pub fn get(&self, node: HistoryRef) -> &HistoryNode<K, P> {
        let slot = &self.slots[node.index as usize];
        assert_eq!(
            slot.generation, node.generation,
            "stale history handle {:?}",
            node
        );
        slot.node
            .as_ref()
            .unwrap_or_else(|| panic!("history handle {:?} points at a freed node", node))
    }

    pub fn get_mut(&mut self, node: HistoryRef) -> &mut HistoryNode<K, P> {
        let slot = &mut self.slots[node.index as usize];
        assert_eq!(
            slot.generation, node.generation,
            "stale history handle {:?}",
            node
        );
        slot.node
            .as_mut()
            .unwrap_or_else(|| panic!("history handle {:?} points at a freed node", node))
    }

    pub fn key(&self, node: HistoryRef) -> K {
        self.get(node).key
    }

    pub fn parent(&self, node: HistoryRef) -> Option<HistoryRef> {
        self.get(node).parent
    }

    pub fn payload(&self, node: HistoryRef) -> &P {
        &self.get(node).payload
    }

    pub fn payload_mut(&mut self, node: HistoryRef) -> &mut P {
        &mut self.get_mut(node).payload
    }

    pub fn child(&self, node: HistoryRef, key: K) -> Option<HistoryRef> {
        self.get(node).children.get(&key).copied()
    }

    /// Follow the child for `key`, creating it with `payload()` if needed.
    /// Returns the child and whether it was created.
    pub fn advance<F>(&mut self, from: HistoryRef, key: K, payload: F) -> (HistoryRef, bool)
    where
        F: FnOnce() -> P,
    {
        if let Some(child) = self.child(from, key) {
            return (child, false);
        }
        let child = self.allocate(key, Some(from), payload());
        self.get_mut(from).children.insert(key, child);
        self.leaves.remove(&from);
        self.leaves.insert(child);
        (child, true)
    }

    /// Nodes from `node` up to the root, leaf first
    pub fn path_to_root(&self, node: HistoryRef) -> Vec<HistoryRef> {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            path.push(n);
            current = self.parent(n);
        }
        path
    }

    /// Keys from the root down to `node`, root key first
    pub fn keys_from_root(&self, node: HistoryRef) -> Vec<K> {
        let mut keys: Vec<K> = self
            .path_to_root(node)
            .into_iter()
            .map(|n| self.key(n))
            .collect();
        keys.reverse();
        keys
    }

    /// Whether `ancestor` lies on the path from `node` to the root
    pub fn is_ancestor(&self, ancestor: HistoryRef, node: HistoryRef) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Reclaim every node that is neither in `live` nor an ancestor of a
    /// node that is. Returns the number of nodes freed.
    ///
    /// Starting from each unreferenced leaf, nodes are removed upward until
    /// reaching one that still has children or is referenced; a referenced
    /// node left childless becomes a leaf. The root is never removed.
    pub fn collect_garbage(&mut self, live: &FxHashSet<HistoryRef>) -> usize {
        let dead_leaves: Vec<HistoryRef> = self
            .leaves
            .iter()
            .copied()
            .filter(|leaf| *leaf != self.root && !live.contains(leaf))
            .collect();

        let mut freed = 0;
        for leaf in dead_leaves {
            self.leaves.remove(&leaf);
            let mut current = leaf;
            loop {
                let node = self.release(current);
                freed += 1;
                let Some(parent) = node.parent else { break };
                let siblings = {
                    let parent_node = self.get_mut(parent);
                    parent_node.children.remove(&node.key);
                    parent_node.children.len()
                };
                if siblings > 0 {
                    break;
                }
                if parent == self.root || live.contains(&parent) {
                    self.leaves.insert(parent);
                    break;
                }
                current = parent;
            }
        }
        freed
    }

    /// Drop every node and start over from a fresh root
    pub fn clear(&mut self, root_key: K, root_payload: P) {
        // Bump generations so handles from before the reset are stale
        for slot in &mut self.slots {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.leaves.clear();
        self.len = 0;
        self.root = self.allocate(root_key, None, root_payload);
        self.leaves.insert(self.root);
    }

    fn allocate(&mut self, key: K, parent: Option<HistoryRef>, payload: P) -> HistoryRef {
        let node = HistoryNode {
            key,
            parent,
            children: FxHashMap::default(),
            payload,
        };
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                HistoryRef {
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
                HistoryRef {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn release(&mut self, node: HistoryRef) -> HistoryNode<K, P> {
        let slot = &mut self.slots[node.index as usize];
        assert_eq!(slot.generation, node.generation, "double free of {:?}", node);
        let released = slot
            .node
            .take()
            .unwrap_or_else(|| panic!("double free of {:?}", node));
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(node.index);
        self.len -= 1;
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Trie = HistoryTrie<u32, ()>;

    fn live(refs: &[HistoryRef]) -> FxHashSet<HistoryRef> {
        refs.iter().copied().collect()
    }

    #[test]
    fn test_advance_shares_prefixes() {
        let mut trie = Trie::new(0, ());
        let root = trie.root();
        let (a, created) = trie.advance(root, 1, || ());
        assert!(created);
        let (a2, created) = trie.advance(root, 1, || ());
        assert!(!created);
        assert_eq!(a, a2);
        let (b, _) = trie.advance(a, 2, || ());

        assert_eq!(trie.len(), 3);
        assert_eq!(trie.keys_from_root(b), vec![0, 1, 2]);
        assert!(trie.is_leaf(b));
        assert!(!trie.is_leaf(a));
        assert!(!trie.is_leaf(root));
        assert!(trie.is_ancestor(root, b));
        assert!(!trie.is_ancestor(b, a));
    }

    #[test]
    fn test_collect_garbage_collapses_dead_chain() {
        let mut trie = Trie::new(0, ());
        let root = trie.root();
        let (a, _) = trie.advance(root, 1, || ());
        let (b, _) = trie.advance(a, 2, || ());
        let (c, _) = trie.advance(b, 3, || ());
        let (d, _) = trie.advance(a, 4, || ());

        // Only d is live: c and b go, a stays as d's parent
        let freed = trie.collect_garbage(&live(&[d]));
        assert_eq!(freed, 2);
        assert!(!trie.contains(c));
        assert!(!trie.contains(b));
        assert!(trie.contains(a));
        assert!(trie.contains(d));
        assert_eq!(trie.len(), 3);
        assert!(trie.is_leaf(d));
    }

    #[test]
    fn test_live_interior_node_becomes_leaf() {
        let mut trie = Trie::new(0, ());
        let root = trie.root();
        let (a, _) = trie.advance(root, 1, || ());
        let (b, _) = trie.advance(a, 2, || ());

        trie.collect_garbage(&live(&[a]));
        assert!(!trie.contains(b));
        assert!(trie.is_leaf(a));

        // Nothing live: the chain collapses to the root
        trie.collect_garbage(&live(&[]));
        assert!(!trie.contains(a));
        assert_eq!(trie.len(), 1);
        assert!(trie.is_leaf(root));
    }

    #[test]
    fn test_reused_slot_invalidates_old_handle() {
        let mut trie = Trie::new(0, ());
        let root = trie.root();
        let (a, _) = trie.advance(root, 1, || ());
        trie.collect_garbage(&live(&[]));
        let (b, _) = trie.advance(root, 2, || ());
        assert_eq!(a.index, b.index);
        assert!(!trie.contains(a));
        assert!(trie.contains(b));
    }

    #[test]
    #[should_panic(expected = "stale history handle")]
    fn test_stale_handle_panics() {
        let mut trie = Trie::new(0, ());
        let root = trie.root();
        let (a, _) = trie.advance(root, 1, || ());
        trie.collect_garbage(&live(&[]));
        trie.key(a);
    }

    #[test]
    fn test_clear() {
        let mut trie = Trie::new(0, ());
        let root = trie.root();
        let (a, _) = trie.advance(root, 1, || ());
        trie.clear(7, ());
        assert_eq!(trie.len(), 1);
        assert!(!trie.contains(a));
        assert!(!trie.contains(root));
        assert_eq!(trie.key(trie.root()), 7);
    }
}
