//! Deferred node insertion
//!
//! Rules that walk a block cannot splice nodes into it without invalidating
//! the walk's position. They queue insertions keyed by the index of the node
//! they must precede, in the block as it was before any insertion, and the
//! phase flushes the queue once the block is done.

use super::graph::{BlockIndex, Graph};
use super::node::{Node, NodeId};
use crate::error::invariant_violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Insertion {
    index: usize,
    node: NodeId,
}

/// Ordered buffer of pending insertions into one block
#[derive(Debug, Default)]
pub struct InsertionSet {
    insertions: Vec<Insertion>,
    block: Option<BlockIndex>,
}

impl InsertionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting insertions for `block`
    pub fn begin(&mut self, block: BlockIndex) {
        debug_assert!(
            self.block.is_none(),
            "insertion set for block #{:?} was never executed",
            self.block
        );
        debug_assert!(self.insertions.is_empty());
        self.block = Some(block);
    }

    pub fn block(&self) -> Option<BlockIndex> {
        self.block
    }

    pub fn len(&self) -> usize {
        self.insertions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty()
    }

    /// Create `node` and queue it to run before the node at `index`
    ///
    /// The node gets an id immediately, so callers can wire edges to it
    /// before the block is rewritten.
    pub fn insert_node(&mut self, graph: &mut Graph, index: usize, node: Node) -> NodeId {
        debug_assert!(self.block.is_some(), "insertion outside begin/execute");
        let id = graph.add_node(node);
        self.insert(index, id);
        id
    }

    /// Queue an existing arena node
    pub fn insert(&mut self, index: usize, node: NodeId) {
        self.insertions.push(Insertion { index, node });
    }

    /// Materialize every queued insertion into the block and clear the
    /// queue. Returns the number of nodes inserted.
    pub fn execute(&mut self, graph: &mut Graph, block: BlockIndex) -> usize {
        debug_assert_eq!(
            self.block,
            Some(block),
            "insertion set executed for the wrong block"
        );
        self.block = None;

        if self.insertions.is_empty() {
            return 0;
        }

        // Stable: insertions at the same index keep their queue order
        self.insertions.sort_by_key(|insertion| insertion.index);

        let Some(target) = graph.block_mut(block) else {
            invariant_violation(format_args!("executing insertions into missing block #{}", block))
        };
        let original = std::mem::take(&mut target.nodes);
        let count = self.insertions.len();
        let mut merged = Vec::with_capacity(original.len() + count);
        let mut pending = self.insertions.drain(..).peekable();

        for (index, node) in original.iter().copied().enumerate() {
            while let Some(insertion) = pending.next_if(|insertion| insertion.index == index) {
                merged.push(insertion.node);
            }
            merged.push(node);
        }
        for insertion in pending {
            if insertion.index > original.len() {
                invariant_violation(format_args!(
                    "insertion at {} past the end of block #{} ({} nodes)",
                    insertion.index,
                    block,
                    original.len()
                ));
            }
            merged.push(insertion.node);
        }

        target.nodes = merged;
        count
    }
}

impl Drop for InsertionSet {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.insertions.is_empty(),
                "insertion set dropped with {} pending insertions",
                self.insertions.len()
            );
        }
    }
}
