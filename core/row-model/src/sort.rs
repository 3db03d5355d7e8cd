//! FILENAME: core/row-model/src/sort.rs
//! PURPOSE: Sort stage. Writes `children_after_sort` and the child position
//! bookkeeping (`first_child`, `last_child`, `child_index`).
//! CONTEXT: Full sort is a stable comparator chain over the sort model with the
//! position in `children_after_agg_filter` as the final tie-break. For
//! transaction refreshes the delta path sorts only the touched children and
//! merges them into the previous order with the same comparator, so both paths
//! give identical results.

use std::cmp::Ordering;

use engine::{log_debug, CellValue, SortOption, AUTO_GROUP_COLUMN_ID};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::changed_path::{ChangedPath, ChangedRowNodes};
use crate::node::{NodeId, RowNode, RowNodeArena};
use crate::options::PostSortRowsFn;

pub(crate) struct SortParams<'a> {
    pub sort_model: &'a [SortOption],
    pub sort_contains_group_columns: bool,
    pub row_grouping: bool,
    pub group_maintain_order: bool,
    pub pivot_mode: bool,
    pub delta_sort: bool,
    pub post_sort_rows: Option<&'a PostSortRowsFn>,
    /// Present only for transaction-driven refreshes.
    pub changed_rows: Option<&'a ChangedRowNodes>,
}

/// How the nodes of the last run were sorted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortStats {
    pub full: usize,
    pub delta: usize,
    pub maintained: usize,
    pub unsorted: usize,
}

#[derive(Debug, Default)]
pub struct SortStage {
    last_sort_model: Option<Vec<SortOption>>,
    last_sorted_on_group: bool,
    last_stats: SortStats,
}

impl SortStage {
    pub fn new() -> Self {
        SortStage::default()
    }

    pub fn last_stats(&self) -> SortStats {
        self.last_stats
    }

    pub(crate) fn execute(&mut self, arena: &mut RowNodeArena, root: NodeId, params: &SortParams, path: &ChangedPath) {
        let sort_changed = self.last_sort_model.as_deref() != Some(params.sort_model);
        let group_sort_removed = self.last_sorted_on_group && !params.sort_contains_group_columns;
        let use_delta = params.delta_sort
            && !sort_changed
            && params.changed_rows.map_or(false, |c| !c.reordered);
        let maintain_order = params.group_maintain_order
            && params.row_grouping
            && !params.sort_contains_group_columns
            && !group_sort_removed;

        let mut run = SortRun {
            arena,
            params,
            path,
            use_delta,
            maintain_order,
            stats: SortStats::default(),
        };
        run.sort_node(root);
        let stats = run.stats;

        log_debug!(
            "SORT",
            "sorted full={} delta={} maintained={} unsorted={}",
            stats.full,
            stats.delta,
            stats.maintained,
            stats.unsorted
        );
        self.last_stats = stats;
        self.last_sort_model = Some(params.sort_model.to_vec());
        self.last_sorted_on_group = params.sort_contains_group_columns;
    }
}

struct SortRun<'a, 'p> {
    arena: &'a mut RowNodeArena,
    params: &'a SortParams<'p>,
    path: &'a ChangedPath,
    use_delta: bool,
    maintain_order: bool,
    stats: SortStats,
}

impl SortRun<'_, '_> {
    fn sort_node(&mut self, handle: NodeId) {
        if self.path.can_skip(handle) {
            return;
        }
        let (unsorted, previous, leaf_group) = {
            let node = &self.arena[handle];
            let Some(unsorted) = node.children_after_agg_filter.clone() else { return };
            (unsorted, node.children_after_sort.clone(), node.leaf_group)
        };

        let pivot_leaf_group = self.params.pivot_mode && leaf_group;
        let sorted = if pivot_leaf_group {
            self.stats.unsorted += 1;
            unsorted
        } else if self.maintain_order && !leaf_group {
            self.stats.maintained += 1;
            match &previous {
                Some(previous) => self.maintain_previous_order(previous, &unsorted),
                None => unsorted,
            }
        } else if self.params.sort_model.is_empty() {
            self.stats.unsorted += 1;
            unsorted
        } else {
            match (&previous, self.use_delta) {
                (Some(previous), true) => {
                    self.stats.delta += 1;
                    self.delta_sort(previous, &unsorted)
                }
                _ => {
                    self.stats.full += 1;
                    self.full_sort(&unsorted)
                }
            }
        };

        if !pivot_leaf_group {
            self.update_child_positions(&sorted);
        }

        let sorted = match self.params.post_sort_rows {
            Some(hook) if !pivot_leaf_group => {
                let mut rows = sorted;
                hook(&mut rows, &*self.arena);
                rows
            }
            _ => sorted,
        };

        if let Some(sibling) = self.arena[handle].sibling {
            self.arena[sibling].children_after_sort = Some(sorted.clone());
        }
        self.arena[handle].children_after_sort = Some(sorted.clone());

        for child in sorted {
            if self.arena[child].has_children() {
                self.sort_node(child);
            }
        }
    }

    fn full_sort(&self, unsorted: &[NodeId]) -> Vec<NodeId> {
        let positions = positions_of(unsorted);
        let mut sorted = unsorted.to_vec();
        sorted.sort_by(|a, b| self.compare(*a, *b, &positions));
        sorted
    }

    fn delta_sort(&self, previous: &[NodeId], unsorted: &[NodeId]) -> Vec<NodeId> {
        let positions = positions_of(unsorted);
        let previous_set: FxHashSet<NodeId> = previous.iter().copied().collect();
        let changed = self.params.changed_rows;
        let is_touched = |node: NodeId| {
            !previous_set.contains(&node)
                || self.path.contains(node)
                || changed.map_or(false, |c| c.is_added(node) || c.is_updated(node))
        };

        let mut touched: Vec<NodeId> = unsorted.iter().copied().filter(|n| is_touched(*n)).collect();
        let untouched: Vec<NodeId> = previous
            .iter()
            .copied()
            .filter(|n| positions.contains_key(n) && !is_touched(*n))
            .collect();
        touched.sort_by(|a, b| self.compare(*a, *b, &positions));

        let mut merged = Vec::with_capacity(unsorted.len());
        let (mut i, mut j) = (0, 0);
        while i < touched.len() && j < untouched.len() {
            if self.compare(touched[i], untouched[j], &positions) == Ordering::Greater {
                merged.push(untouched[j]);
                j += 1;
            } else {
                merged.push(touched[i]);
                i += 1;
            }
        }
        merged.extend_from_slice(&touched[i..]);
        merged.extend_from_slice(&untouched[j..]);
        merged
    }

    /// Keeps nodes in their previous order; nodes new to the list go last.
    fn maintain_previous_order(&self, previous: &[NodeId], unsorted: &[NodeId]) -> Vec<NodeId> {
        let previous_positions: FxHashMap<&str, usize> = previous
            .iter()
            .enumerate()
            .filter_map(|(i, h)| self.arena.get(*h).map(|n| (n.id.as_str(), i)))
            .collect();
        let mut known: Vec<(usize, NodeId)> = Vec::new();
        let mut new: Vec<NodeId> = Vec::new();
        for handle in unsorted {
            match previous_positions.get(self.arena[*handle].id.as_str()) {
                Some(pos) => known.push((*pos, *handle)),
                None => new.push(*handle),
            }
        }
        known.sort_by_key(|(pos, _)| *pos);
        known.into_iter().map(|(_, h)| h).chain(new).collect()
    }

    fn compare(&self, a: NodeId, b: NodeId, positions: &FxHashMap<NodeId, usize>) -> Ordering {
        let (node_a, node_b) = (&self.arena[a], &self.arena[b]);
        for option in self.params.sort_model {
            let ordering = sort_value(node_a, &option.col_id).compare(sort_value(node_b, &option.col_id));
            let ordering = if option.is_ascending() { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        positions.get(&a).cmp(&positions.get(&b))
    }

    fn update_child_positions(&mut self, sorted: &[NodeId]) {
        let last = sorted.len().saturating_sub(1);
        for (index, handle) in sorted.iter().enumerate() {
            self.arena.set_child_index(*handle, index);
            self.arena.set_first_child(*handle, index == 0);
            self.arena.set_last_child(*handle, index == last);
        }
    }
}

fn positions_of(list: &[NodeId]) -> FxHashMap<NodeId, usize> {
    list.iter().enumerate().map(|(i, h)| (*h, i)).collect()
}

/// Value a node sorts by for a column.
fn sort_value<'a>(node: &'a RowNode, col_id: &str) -> &'a CellValue {
    if col_id == AUTO_GROUP_COLUMN_ID && node.key.is_some() {
        return &node.group_value;
    }
    node.get_value(col_id)
}
