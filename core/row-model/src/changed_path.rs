//! FILENAME: core/row-model/src/changed_path.rs
//! PURPOSE: Tracks which nodes a transaction touched and which subtrees the
//! downstream stages may skip.
//! CONTEXT: `ChangedRowNodes` is produced by the transaction applier and merged
//! across batched transactions. `ChangedPath` is filled by the group/tree stage
//! and read by filter, aggregation and sort.

use rustc_hash::FxHashSet;

use crate::node::{NodeId, RowNodeArena};

// ============================================================================
// CHANGED ROW NODES
// ============================================================================

/// Nodes added, updated or removed by one or more transactions.
/// Each list keeps first-touch order.
#[derive(Debug, Clone, Default)]
pub struct ChangedRowNodes {
    adds: Vec<NodeId>,
    updates: Vec<NodeId>,
    removals: Vec<NodeId>,
    added: FxHashSet<NodeId>,
    updated: FxHashSet<NodeId>,
    removed: FxHashSet<NodeId>,
    /// Leaf order changed without structural add/remove (move, diff reorder).
    pub reordered: bool,
}

impl ChangedRowNodes {
    pub fn new() -> Self {
        ChangedRowNodes::default()
    }

    pub fn add(&mut self, node: NodeId) {
        if self.added.insert(node) {
            self.adds.push(node);
        }
    }

    /// An update of a node added earlier in the same batch stays an add.
    pub fn update(&mut self, node: NodeId) {
        if self.added.contains(&node) || self.removed.contains(&node) {
            return;
        }
        if self.updated.insert(node) {
            self.updates.push(node);
        }
    }

    /// Removing a node added earlier in the batch cancels both. Removing an
    /// updated node turns the update into a removal.
    pub fn remove(&mut self, node: NodeId) {
        if self.added.remove(&node) {
            self.adds.retain(|n| *n != node);
            return;
        }
        if self.updated.remove(&node) {
            self.updates.retain(|n| *n != node);
        }
        if self.removed.insert(node) {
            self.removals.push(node);
        }
    }

    /// Folds a later batch into this one, netting out as if each change had
    /// been recorded here in order.
    pub fn merge(&mut self, later: &ChangedRowNodes) {
        for node in &later.removals {
            self.remove(*node);
        }
        for node in &later.updates {
            self.update(*node);
        }
        for node in &later.adds {
            self.add(*node);
        }
        self.reordered |= later.reordered;
    }

    pub fn adds(&self) -> &[NodeId] {
        &self.adds
    }

    pub fn updates(&self) -> &[NodeId] {
        &self.updates
    }

    pub fn removals(&self) -> &[NodeId] {
        &self.removals
    }

    pub fn is_added(&self, node: NodeId) -> bool {
        self.added.contains(&node)
    }

    pub fn is_updated(&self, node: NodeId) -> bool {
        self.updated.contains(&node)
    }

    pub fn is_removed(&self, node: NodeId) -> bool {
        self.removed.contains(&node)
    }

    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.removals.is_empty() && !self.reordered
    }
}

// ============================================================================
// CHANGED PATH
// ============================================================================

/// The set of ancestor chains touched by a mutation.
#[derive(Debug, Clone, Default)]
pub struct ChangedPath {
    active: bool,
    nodes: FxHashSet<NodeId>,
}

impl ChangedPath {
    /// Path for a transaction-driven refresh.
    pub fn active() -> Self {
        ChangedPath { active: true, nodes: FxHashSet::default() }
    }

    /// Path for a full refresh: nothing is skippable.
    pub fn inactive() -> Self {
        ChangedPath::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Marks `node` and every ancestor up to the root.
    pub fn add_parent_node(&mut self, arena: &RowNodeArena, node: NodeId) {
        let mut current = Some(node);
        while let Some(handle) = current {
            if !self.nodes.insert(handle) {
                // Already marked, so the rest of the chain is too.
                break;
            }
            current = arena.get(handle).and_then(|n| n.parent);
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn can_skip(&self, node: NodeId) -> bool {
        self.active && !self.nodes.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
