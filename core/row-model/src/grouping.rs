//! FILENAME: core/row-model/src/grouping.rs
//! PURPOSE: Group stage. Builds `children_after_group` for flat data, row
//! grouping and (through `TreeBuilder`) tree data.
//! CONTEXT: Row groups are filler nodes keyed by their ancestor group values
//! (`row-group-country-Ireland-year-2000`). Transactions update the existing
//! groups in place: fillers are created on demand and destroyed once empty.
//! A change of group columns or mode rebuilds, reusing groups with equal ids.

use engine::{log_debug, CellValue};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::changed_path::{ChangedPath, ChangedRowNodes};
use crate::node::{NodeId, RowNode, RowNodeArena, GROUP_ID_PREFIX};
use crate::options::{GridCallbacks, GridOptions};
use crate::tree::TreeBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    Flat,
    RowGroup,
    Tree,
}

pub(crate) struct GroupParams<'a> {
    pub group_columns: &'a [String],
    pub options: &'a GridOptions,
    pub callbacks: &'a GridCallbacks,
}

impl GroupParams<'_> {
    pub(crate) fn mode(&self) -> GroupMode {
        if self.options.tree_data {
            GroupMode::Tree
        } else if !self.group_columns.is_empty() {
            GroupMode::RowGroup
        } else {
            GroupMode::Flat
        }
    }
}

/// Persistent state of the group stage across pipeline runs.
#[derive(Debug, Default)]
pub struct GroupStage {
    last_mode: Option<GroupMode>,
    last_columns: Vec<String>,
    tree: TreeBuilder,
}

impl GroupStage {
    pub fn new() -> Self {
        GroupStage::default()
    }

    pub fn mode(&self) -> Option<GroupMode> {
        self.last_mode
    }

    pub fn tree(&self) -> &TreeBuilder {
        &self.tree
    }

    pub(crate) fn execute(
        &mut self,
        arena: &mut RowNodeArena,
        root: NodeId,
        params: &GroupParams,
        changed: Option<&ChangedRowNodes>,
        path: &mut ChangedPath,
    ) {
        let mode = params.mode();
        let structure_changed = self.last_mode != Some(mode)
            || (mode == GroupMode::RowGroup && self.last_columns.as_slice() != params.group_columns);
        let incremental = if structure_changed { None } else { changed };

        if self.last_mode == Some(GroupMode::Tree) && mode != GroupMode::Tree {
            self.tree.detach(arena);
        }

        // Groups of the previous row grouping, reusable by id on a rebuild.
        let mut reusable: FxHashMap<String, NodeId> = FxHashMap::default();
        if self.last_mode == Some(GroupMode::RowGroup) && incremental.is_none() {
            collect_row_groups(arena, root, &mut reusable);
            if mode != GroupMode::RowGroup {
                for handle in reusable.drain().map(|(_, h)| h) {
                    arena.destroy(handle);
                }
            }
        }

        {
            let r = &mut arena[root];
            r.group = true;
            r.expanded = true;
            r.level = -1;
        }

        match mode {
            GroupMode::Flat => build_flat(arena, root, incremental, path),
            GroupMode::RowGroup => {
                let mut builder = RowGroupBuilder {
                    arena,
                    root,
                    columns: params.group_columns,
                    options: params.options,
                    reuse: reusable,
                    dirty: FxHashSet::default(),
                };
                match incremental {
                    Some(changed) => builder.apply_changes(changed, path),
                    None => builder.rebuild(path),
                }
            }
            GroupMode::Tree => self.tree.build(arena, root, params.options, params.callbacks, changed, path),
        }

        self.last_mode = Some(mode);
        self.last_columns = params.group_columns.to_vec();
    }
}

fn reset_as_leaf(node: &mut RowNode, parent: NodeId, level: i32) {
    node.parent = Some(parent);
    node.level = level;
    node.group = false;
    node.leaf_group = false;
    node.key = None;
    node.group_value = CellValue::Empty;
    node.row_group_column = None;
    node.all_leaf_children = None;
    node.children_after_group = None;
    node.children_map = None;
}

// ============================================================================
// FLAT
// ============================================================================

fn build_flat(arena: &mut RowNodeArena, root: NodeId, changed: Option<&ChangedRowNodes>, path: &mut ChangedPath) {
    let leaves = arena[root].all_leaf_children.clone().unwrap_or_default();
    match changed {
        Some(changed) => {
            for handle in changed.adds() {
                reset_as_leaf(&mut arena[*handle], root, 0);
            }
        }
        None => {
            for handle in &leaves {
                reset_as_leaf(&mut arena[*handle], root, 0);
            }
        }
    }
    let r = &mut arena[root];
    r.children_map = None;
    r.children_after_group = Some(leaves);
    path.add_parent_node(arena, root);
}

// ============================================================================
// ROW GROUPING
// ============================================================================

fn collect_row_groups(arena: &RowNodeArena, root: NodeId, out: &mut FxHashMap<String, NodeId>) {
    let mut stack: Vec<NodeId> = arena[root].children_after_group.clone().unwrap_or_default();
    while let Some(handle) = stack.pop() {
        let node = &arena[handle];
        if node.group && node.data.is_none() && node.row_group_column.is_some() {
            out.insert(node.id.clone(), handle);
            if let Some(children) = &node.children_after_group {
                stack.extend(children.iter().copied());
            }
        }
    }
}

struct RowGroupBuilder<'a> {
    arena: &'a mut RowNodeArena,
    root: NodeId,
    columns: &'a [String],
    options: &'a GridOptions,
    reuse: FxHashMap<String, NodeId>,
    /// Groups that received leaves and need their leaf order restored.
    dirty: FxHashSet<NodeId>,
}

impl RowGroupBuilder<'_> {
    fn rebuild(&mut self, path: &mut ChangedPath) {
        {
            let r = &mut self.arena[self.root];
            r.children_after_group = Some(Vec::new());
            r.children_map = Some(FxHashMap::default());
        }
        let leaves = self.arena[self.root].all_leaf_children.clone().unwrap_or_default();
        for leaf in &leaves {
            self.insert_leaf(*leaf, path);
        }
        for handle in std::mem::take(&mut self.reuse).into_values() {
            self.arena.destroy(handle);
        }
        log_debug!("GROUP", "rebuilt groups for {} leaves by {:?}", leaves.len(), self.columns);
    }

    fn apply_changes(&mut self, changed: &ChangedRowNodes, path: &mut ChangedPath) {
        let mut detached: Vec<NodeId> = changed.removals().to_vec();
        let mut moved: Vec<NodeId> = Vec::new();
        for handle in changed.updates() {
            if self.keys_changed(*handle) {
                moved.push(*handle);
                detached.push(*handle);
            } else if let Some(parent) = self.arena[*handle].parent {
                path.add_parent_node(self.arena, parent);
            }
        }

        let candidates = self.detach_leaves(&detached, path);
        for handle in moved.iter().chain(changed.adds()) {
            self.insert_leaf(*handle, path);
        }

        if changed.reordered {
            let mut all = FxHashMap::default();
            collect_row_groups(self.arena, self.root, &mut all);
            self.dirty.extend(all.into_values());
        }
        self.restore_leaf_order();
        self.remove_empty_groups(&candidates, path);

        log_debug!(
            "GROUP",
            "incremental: {} removed, {} moved, {} added",
            changed.removals().len(),
            moved.len(),
            changed.adds().len()
        );
    }

    fn insert_leaf(&mut self, leaf: NodeId, path: &mut ChangedPath) {
        let data = self.arena[leaf].data.clone();
        let mut parent = self.root;
        for (level, col) in self.columns.iter().enumerate() {
            let value = data.as_ref().map(|d| d.get(col).clone()).unwrap_or_default();
            parent = self.get_or_create_group(parent, level as i32, col, value);
            if let Some(leaves) = self.arena[parent].all_leaf_children.as_mut() {
                leaves.push(leaf);
            }
            self.dirty.insert(parent);
        }
        reset_as_leaf(&mut self.arena[leaf], parent, self.columns.len() as i32);
        self.arena[parent].children_after_group.get_or_insert_with(Vec::new).push(leaf);
        path.add_parent_node(self.arena, parent);
    }

    fn get_or_create_group(&mut self, parent: NodeId, level: i32, col: &str, value: CellValue) -> NodeId {
        let key = value.key();
        let existing = self.arena[parent]
            .children_map
            .as_ref()
            .and_then(|m| m.get(&key))
            .copied();
        if let Some(handle) = existing {
            return handle;
        }

        let id = if parent == self.root {
            format!("{}{}-{}", GROUP_ID_PREFIX, col, key)
        } else {
            format!("{}-{}-{}", self.arena[parent].id, col, key)
        };
        let handle = match self.reuse.remove(&id) {
            Some(handle) => {
                self.arena.register(handle);
                handle
            }
            None => {
                let handle = self.arena.create_node(id, None);
                self.arena[handle].expanded = self.options.is_expanded_by_default(level);
                handle
            }
        };

        let leaf_group = level as usize + 1 == self.columns.len();
        {
            let group = &mut self.arena[handle];
            group.group = true;
            group.parent = Some(parent);
            group.level = level;
            group.leaf_group = leaf_group;
            group.key = Some(key.clone());
            group.group_value = value;
            group.row_group_column = Some(col.to_string());
            group.all_leaf_children = Some(Vec::new());
            group.children_after_group = Some(Vec::new());
            group.children_map = if leaf_group { None } else { Some(FxHashMap::default()) };
        }
        let p = &mut self.arena[parent];
        p.children_after_group.get_or_insert_with(Vec::new).push(handle);
        p.children_map.get_or_insert_with(FxHashMap::default).insert(key, handle);
        handle
    }

    /// True when the group keys of the leaf's data no longer match its groups.
    fn keys_changed(&self, leaf: NodeId) -> bool {
        let node = &self.arena[leaf];
        let data = match &node.data {
            Some(data) => data,
            None => return false,
        };
        let mut current = node.parent;
        for col in self.columns.iter().rev() {
            match current {
                Some(group) if group != self.root => {
                    let g = &self.arena[group];
                    if g.key.as_deref() != Some(data.get(col).key().as_str()) {
                        return true;
                    }
                    current = g.parent;
                }
                _ => return true,
            }
        }
        false
    }

    /// Removes leaves from their groups. Returns the former parent groups.
    fn detach_leaves(&mut self, leaves: &[NodeId], path: &mut ChangedPath) -> Vec<NodeId> {
        if leaves.is_empty() {
            return Vec::new();
        }
        let removed: FxHashSet<NodeId> = leaves.iter().copied().collect();
        let mut touched: FxHashSet<NodeId> = FxHashSet::default();
        let mut candidates: Vec<NodeId> = Vec::new();

        for leaf in leaves {
            let parent = match self.arena.get(*leaf).and_then(|n| n.parent) {
                Some(parent) if parent != self.root && self.arena.contains(parent) => parent,
                _ => continue,
            };
            path.add_parent_node(self.arena, parent);
            if !candidates.contains(&parent) {
                candidates.push(parent);
            }
            let mut current = Some(parent);
            while let Some(group) = current {
                if group == self.root || !touched.insert(group) {
                    break;
                }
                current = self.arena[group].parent;
            }
        }

        for group in touched {
            let g = &mut self.arena[group];
            if let Some(list) = g.all_leaf_children.as_mut() {
                list.retain(|h| !removed.contains(h));
            }
            if let Some(list) = g.children_after_group.as_mut() {
                list.retain(|h| !removed.contains(h));
            }
        }
        candidates
    }

    fn restore_leaf_order(&mut self) {
        let dirty: Vec<NodeId> = self.dirty.drain().collect();
        for group in dirty {
            if self.arena[group].destroyed {
                continue;
            }
            let mut leaves = self.arena[group].all_leaf_children.take().unwrap_or_default();
            leaves.sort_by_key(|h| self.arena[*h].source_row_index);
            self.arena[group].all_leaf_children = Some(leaves);

            if self.arena[group].leaf_group {
                let mut children = self.arena[group].children_after_group.take().unwrap_or_default();
                children.sort_by_key(|h| self.arena[*h].source_row_index);
                self.arena[group].children_after_group = Some(children);
            }
        }
    }

    /// Destroys groups left without children, walking up from each candidate.
    fn remove_empty_groups(&mut self, candidates: &[NodeId], path: &mut ChangedPath) {
        for candidate in candidates {
            let mut current = *candidate;
            loop {
                if current == self.root {
                    break;
                }
                let (empty, parent, key) = {
                    let g = &self.arena[current];
                    let empty = !g.destroyed && g.children_after_group.as_ref().map_or(true, |c| c.is_empty());
                    (empty, g.parent, g.key.clone())
                };
                if !empty {
                    break;
                }
                let Some(parent) = parent else { break };
                {
                    let p = &mut self.arena[parent];
                    if let Some(children) = p.children_after_group.as_mut() {
                        children.retain(|h| *h != current);
                    }
                    if let (Some(map), Some(key)) = (p.children_map.as_mut(), key) {
                        if map.get(&key) == Some(&current) {
                            map.remove(&key);
                        }
                    }
                }
                log_debug!("GROUP", "removed empty group {}", self.arena[current].id);
                self.arena.destroy(current);
                path.add_parent_node(self.arena, parent);
                current = parent;
            }
        }
    }
}
