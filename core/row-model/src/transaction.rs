//! FILENAME: core/row-model/src/transaction.rs
//! PURPOSE: Applies add/remove/update transactions to the root leaf list.
//! CONTEXT: Every sub-operation is resolved against the pre-transaction
//! snapshot and the new `all_leaf_children` is assembled once. Problems with
//! single rows are collected as warnings; the rest of the transaction proceeds.

use std::rc::Rc;

use engine::{log_debug, log_warn, GridError, Record, RowData};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::changed_path::ChangedRowNodes;
use crate::node::{NodeId, RowNodeArena};
use crate::options::GridCallbacks;

/// Caller-facing transaction payload.
#[derive(Debug, Clone, Default)]
pub struct RowDataTransaction {
    pub add: Vec<RowData>,
    /// Insert position for `add`; `None` appends.
    pub add_index: Option<usize>,
    pub remove: Vec<RowData>,
    pub update: Vec<RowData>,
}

impl RowDataTransaction {
    pub fn new() -> Self {
        RowDataTransaction::default()
    }

    pub fn with_add(mut self, rows: Vec<RowData>) -> Self {
        self.add = rows;
        self
    }

    pub fn with_add_index(mut self, index: usize) -> Self {
        self.add_index = Some(index);
        self
    }

    pub fn with_remove(mut self, rows: Vec<RowData>) -> Self {
        self.remove = rows;
        self
    }

    pub fn with_update(mut self, rows: Vec<RowData>) -> Self {
        self.update = rows;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }
}

/// Nodes affected by a transaction, plus per-row warnings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowNodeTransaction {
    pub add: Vec<NodeId>,
    pub remove: Vec<NodeId>,
    pub update: Vec<NodeId>,
    pub warnings: Vec<GridError>,
}

impl RowNodeTransaction {
    /// Row ids that could not be removed.
    pub fn not_found(&self) -> Vec<&str> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                GridError::RemoveRowNotFound(id) => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }
}

enum Lookup {
    Found(NodeId),
    NotFound(String),
    MissingId,
}

/// Applies one transaction against a model's arena.
pub(crate) struct TransactionApplier<'a> {
    pub arena: &'a mut RowNodeArena,
    pub root: NodeId,
    pub callbacks: &'a GridCallbacks,
    pub id_sequence: &'a mut u64,
    /// Nested tree data: added records bring their `children`, removed records
    /// take their data subtree with them.
    pub nested: bool,
}

impl<'a> TransactionApplier<'a> {
    pub fn apply(&mut self, txn: &RowDataTransaction, changed: &mut ChangedRowNodes) -> RowNodeTransaction {
        let mut result = RowNodeTransaction::default();
        let leaves = self.arena[self.root].all_leaf_children.clone().unwrap_or_default();
        let identity_index = self.build_identity_index(&leaves);

        // 1. Removals
        let mut removed_set: FxHashSet<NodeId> = FxHashSet::default();
        for data in &txn.remove {
            match self.lookup(data, &identity_index) {
                Lookup::Found(handle) => {
                    if removed_set.insert(handle) {
                        result.remove.push(handle);
                    }
                }
                Lookup::NotFound(id) => result.warnings.push(GridError::RemoveRowNotFound(id)),
                Lookup::MissingId => result.warnings.push(GridError::MissingRowId),
            }
        }
        if self.nested && !result.remove.is_empty() {
            // Leaf order says nothing about depth once rows have been moved,
            // so descendants are found through the structural parent index.
            let mut children_of: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
            for handle in &leaves {
                if let Some(parent) = self.arena[*handle].tree_parent {
                    children_of.entry(parent).or_default().push(*handle);
                }
            }
            let mut stack: Vec<NodeId> = result.remove.clone();
            while let Some(handle) = stack.pop() {
                for child in children_of.get(&handle).into_iter().flatten() {
                    if removed_set.insert(*child) {
                        result.remove.push(*child);
                        stack.push(*child);
                    }
                }
            }
        }

        // 2. Updates, matched against the snapshot
        let mut updated_set: FxHashSet<NodeId> = FxHashSet::default();
        for data in &txn.update {
            match self.lookup(data, &identity_index) {
                Lookup::Found(handle) if removed_set.contains(&handle) => {
                    result.warnings.push(GridError::UpdateRowNotFound(self.arena[handle].id.clone()));
                }
                Lookup::Found(handle) => {
                    self.arena.set_data(handle, data.clone());
                    if updated_set.insert(handle) {
                        result.update.push(handle);
                    }
                }
                Lookup::NotFound(id) => result.warnings.push(GridError::UpdateRowNotFound(id)),
                Lookup::MissingId => result.warnings.push(GridError::MissingRowId),
            }
        }

        // 3. Release removed ids so adds may reuse them
        for handle in &result.remove {
            self.arena.destroy(*handle);
        }

        // 4. Adds
        let mut new_nodes: Vec<NodeId> = Vec::with_capacity(txn.add.len());
        for data in &txn.add {
            self.create_subtree(data, None, &mut new_nodes, &mut result.warnings);
        }
        result.add = new_nodes.clone();

        // 5. Assemble the new leaf order once
        let mut next: Vec<NodeId> = leaves.into_iter().filter(|h| !removed_set.contains(h)).collect();
        let index = txn.add_index.map_or(next.len(), |i| i.min(next.len()));
        next.splice(index..index, new_nodes);
        self.set_leaves(next);

        for handle in &result.remove {
            changed.remove(*handle);
        }
        for handle in &result.update {
            changed.update(*handle);
        }
        for handle in &result.add {
            changed.add(*handle);
        }

        for warning in &result.warnings {
            log_warn!("TXN", "{}", warning);
        }
        log_debug!(
            "TXN",
            "applied add={} remove={} update={} warnings={}",
            result.add.len(),
            result.remove.len(),
            result.update.len(),
            result.warnings.len()
        );
        result
    }

    /// Moves `nodes` so that the first of them lands at `to_index` among the
    /// remaining leaves.
    pub fn move_rows(&mut self, nodes: &[NodeId], to_index: usize, changed: &mut ChangedRowNodes) -> Vec<NodeId> {
        let leaves = self.arena[self.root].all_leaf_children.clone().unwrap_or_default();
        let leaf_set: FxHashSet<NodeId> = leaves.iter().copied().collect();
        let mut moving: Vec<NodeId> = Vec::new();
        for handle in nodes {
            if leaf_set.contains(handle) && !moving.contains(handle) {
                moving.push(*handle);
            }
        }
        if moving.is_empty() {
            return moving;
        }
        let moving_set: FxHashSet<NodeId> = moving.iter().copied().collect();
        let mut next: Vec<NodeId> = leaves.iter().copied().filter(|h| !moving_set.contains(h)).collect();
        let index = to_index.min(next.len());
        next.splice(index..index, moving.iter().copied());

        if next != leaves {
            self.set_leaves(next);
            changed.reordered = true;
            for handle in &moving {
                changed.update(*handle);
            }
        }
        moving
    }

    /// Replaces the leaf order (same node set, new order).
    pub fn reorder(&mut self, order: Vec<NodeId>, changed: &mut ChangedRowNodes) {
        let current = self.arena[self.root].all_leaf_children.clone().unwrap_or_default();
        if current != order {
            self.set_leaves(order);
            changed.reordered = true;
        }
    }

    fn set_leaves(&mut self, leaves: Vec<NodeId>) {
        for (index, handle) in leaves.iter().enumerate() {
            self.arena[*handle].source_row_index = index;
        }
        self.arena[self.root].all_leaf_children = Some(leaves);
    }

    fn build_identity_index(&self, leaves: &[NodeId]) -> FxHashMap<*const Record, NodeId> {
        if self.callbacks.get_row_id.is_some() {
            return FxHashMap::default();
        }
        leaves
            .iter()
            .filter_map(|h| self.arena[*h].data.as_ref().map(|d| (Rc::as_ptr(d), *h)))
            .collect()
    }

    fn lookup(&self, data: &RowData, identity_index: &FxHashMap<*const Record, NodeId>) -> Lookup {
        match self.callbacks.row_id_of(data) {
            Some(Some(id)) => match self.arena.lookup(&id) {
                Some(handle) if self.arena[handle].data.is_some() => Lookup::Found(handle),
                _ => Lookup::NotFound(id),
            },
            Some(None) => Lookup::MissingId,
            None => match identity_index.get(&Rc::as_ptr(data)) {
                Some(handle) => Lookup::Found(*handle),
                None => Lookup::NotFound(String::from("<unknown>")),
            },
        }
    }

    fn next_generated_id(&mut self) -> String {
        let id = self.id_sequence.to_string();
        *self.id_sequence += 1;
        id
    }

    fn create_subtree(
        &mut self,
        data: &RowData,
        tree_parent: Option<NodeId>,
        out: &mut Vec<NodeId>,
        warnings: &mut Vec<GridError>,
    ) {
        let id = match self.callbacks.row_id_of(data) {
            Some(Some(id)) => id,
            Some(None) => {
                warnings.push(GridError::MissingRowId);
                return;
            }
            None => self.next_generated_id(),
        };
        if self.arena.lookup(&id).is_some() {
            warnings.push(GridError::DuplicateRowId(id));
            return;
        }
        let handle = self.arena.create_node(id, Some(data.clone()));
        self.arena[handle].tree_parent = tree_parent;
        out.push(handle);

        if self.nested {
            for child in &data.children {
                self.create_subtree(child, Some(handle), out, warnings);
            }
        }
    }
}

// ============================================================================
// IMMUTABLE DIFF
// ============================================================================

/// Result of diffing a new row data list against the live leaves.
#[derive(Debug, Default)]
pub(crate) struct RowDataDiff {
    pub transaction: RowDataTransaction,
    /// Row ids in the new data order (depth-first for nested data).
    pub order: Vec<String>,
    /// Structural parent id per row id for nested data.
    pub parents: Vec<(String, Option<String>)>,
    pub warnings: Vec<GridError>,
}

/// Converts a full row data list into a transaction against the current
/// leaves. Requires a row id callback.
pub(crate) fn diff_row_data(
    arena: &RowNodeArena,
    root: NodeId,
    callbacks: &GridCallbacks,
    rows: &[RowData],
    nested: bool,
) -> RowDataDiff {
    let mut diff = RowDataDiff::default();
    let mut seen: FxHashSet<String> = FxHashSet::default();

    let mut flat: Vec<(RowData, Option<String>)> = Vec::with_capacity(rows.len());
    if nested {
        for row in rows {
            flatten_nested(callbacks, row, None, &mut flat);
        }
    } else {
        flat.extend(rows.iter().map(|r| (r.clone(), None)));
    }

    for (data, parent_id) in flat {
        let id = match callbacks.row_id_of(&data) {
            Some(Some(id)) => id,
            _ => {
                diff.warnings.push(GridError::MissingRowId);
                continue;
            }
        };
        if !seen.insert(id.clone()) {
            diff.warnings.push(GridError::DuplicateRowId(id));
            continue;
        }
        match arena.lookup(&id).filter(|h| arena[*h].data.is_some()) {
            Some(handle) => {
                let same = arena[handle].data.as_ref().map_or(false, |d| Rc::ptr_eq(d, &data));
                if !same {
                    diff.transaction.update.push(data);
                }
            }
            None => diff.transaction.add.push(data),
        }
        diff.parents.push((id.clone(), parent_id));
        diff.order.push(id);
    }

    for handle in arena[root].all_leaf_children.iter().flatten() {
        let node = &arena[*handle];
        if !seen.contains(&node.id) {
            if let Some(data) = &node.data {
                diff.transaction.remove.push(data.clone());
            }
        }
    }
    diff
}

fn flatten_nested(
    callbacks: &GridCallbacks,
    row: &RowData,
    parent_id: Option<String>,
    out: &mut Vec<(RowData, Option<String>)>,
) {
    let own_id = callbacks.row_id_of(row).flatten();
    out.push((row.clone(), parent_id));
    for child in &row.children {
        flatten_nested(callbacks, child, own_id.clone(), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ROOT_NODE_ID;

    fn row(id: &str) -> RowData {
        Record::new().with("id", id).into_data()
    }

    struct Fixture {
        arena: RowNodeArena,
        root: NodeId,
        callbacks: GridCallbacks,
        seq: u64,
    }

    impl Fixture {
        fn new(callbacks: GridCallbacks) -> Self {
            let mut arena = RowNodeArena::new();
            let root = arena.create_node(ROOT_NODE_ID.into(), None);
            arena[root].all_leaf_children = Some(Vec::new());
            Fixture { arena, root, callbacks, seq: 0 }
        }

        fn apply(&mut self, txn: RowDataTransaction) -> (RowNodeTransaction, ChangedRowNodes) {
            let mut changed = ChangedRowNodes::new();
            let result = TransactionApplier {
                arena: &mut self.arena,
                root: self.root,
                callbacks: &self.callbacks,
                id_sequence: &mut self.seq,
                nested: false,
            }
            .apply(&txn, &mut changed);
            (result, changed)
        }

        fn leaf_ids(&self) -> Vec<String> {
            self.arena[self.root]
                .all_leaf_children
                .iter()
                .flatten()
                .map(|h| self.arena[*h].id.clone())
                .collect()
        }
    }

    #[test]
    fn test_add_with_index_and_sequential_ids() {
        let mut fx = Fixture::new(GridCallbacks::new());
        fx.apply(RowDataTransaction::new().with_add(vec![row("a"), row("b")]));
        fx.apply(RowDataTransaction::new().with_add(vec![row("c")]).with_add_index(1));
        assert_eq!(fx.leaf_ids(), vec!["0", "2", "1"]);

        let handles = fx.arena[fx.root].all_leaf_children.clone().unwrap();
        let indexes: Vec<usize> = handles.iter().map(|h| fx.arena[*h].source_row_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_identity_lookup_without_row_id() {
        let mut fx = Fixture::new(GridCallbacks::new());
        let a = row("a");
        fx.apply(RowDataTransaction::new().with_add(vec![a.clone(), row("b")]));

        let (result, _) = fx.apply(RowDataTransaction::new().with_remove(vec![a, row("a")]));
        assert_eq!(result.remove.len(), 1);
        assert_eq!(result.warnings, vec![GridError::RemoveRowNotFound("<unknown>".into())]);
        assert_eq!(fx.leaf_ids(), vec!["1"]);
    }

    #[test]
    fn test_update_of_removed_row_is_not_found() {
        let mut fx = Fixture::new(GridCallbacks::new().with_row_id_field("id"));
        fx.apply(RowDataTransaction::new().with_add(vec![row("a"), row("b")]));

        let (result, changed) = fx.apply(
            RowDataTransaction::new()
                .with_remove(vec![row("a")])
                .with_update(vec![row("a"), row("b")])
                .with_add(vec![row("a")]),
        );

        assert_eq!(result.warnings, vec![GridError::UpdateRowNotFound("a".into())]);
        assert_eq!(result.update.len(), 1);
        assert_eq!(result.add.len(), 1);
        assert_eq!(fx.leaf_ids(), vec!["b", "a"]);
        assert_eq!(changed.removals().len(), 1);
    }

    #[test]
    fn test_duplicate_and_missing_ids_are_skipped() {
        let mut fx = Fixture::new(GridCallbacks::new().with_row_id_field("id"));
        let (result, _) = fx.apply(RowDataTransaction::new().with_add(vec![
            row("a"),
            row("a"),
            Record::new().with("name", "no id").into_data(),
            row("b"),
        ]));

        assert_eq!(result.add.len(), 2);
        assert_eq!(
            result.warnings,
            vec![GridError::DuplicateRowId("a".into()), GridError::MissingRowId]
        );
        assert_eq!(fx.leaf_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_update_keeps_identity() {
        let mut fx = Fixture::new(GridCallbacks::new().with_row_id_field("id"));
        let (added, _) = fx.apply(RowDataTransaction::new().with_add(vec![row("a")]));
        let new_data = Record::new().with("id", "a").with("value", 2).into_data();
        let (updated, changed) = fx.apply(RowDataTransaction::new().with_update(vec![new_data.clone()]));

        assert_eq!(added.add, updated.update);
        assert!(Rc::ptr_eq(fx.arena[updated.update[0]].data.as_ref().unwrap(), &new_data));
        assert!(changed.is_updated(updated.update[0]));
    }

    #[test]
    fn test_move_rows() {
        let mut fx = Fixture::new(GridCallbacks::new().with_row_id_field("id"));
        let (added, _) = fx.apply(RowDataTransaction::new().with_add(vec![row("a"), row("b"), row("c")]));
        let mut changed = ChangedRowNodes::new();
        let moved = TransactionApplier {
            arena: &mut fx.arena,
            root: fx.root,
            callbacks: &fx.callbacks,
            id_sequence: &mut fx.seq,
            nested: false,
        }
        .move_rows(&[added.add[0]], 2, &mut changed);

        assert_eq!(moved, vec![added.add[0]]);
        assert!(changed.reordered);
        assert_eq!(fx.leaf_ids(), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_diff_row_data() {
        let mut fx = Fixture::new(GridCallbacks::new().with_row_id_field("id"));
        let a = row("a");
        fx.apply(RowDataTransaction::new().with_add(vec![a.clone(), row("b"), row("c")]));

        let diff = diff_row_data(&fx.arena, fx.root, &fx.callbacks, &[row("d"), row("c"), a], false);
        assert_eq!(diff.order, vec!["d", "c", "a"]);
        assert_eq!(diff.transaction.add.len(), 1);
        assert_eq!(diff.transaction.update.len(), 1);
        assert_eq!(diff.transaction.remove.len(), 1);
        assert_eq!(diff.transaction.remove[0].get_text("id"), Some("b"));
    }
}
