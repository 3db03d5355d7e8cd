//! FILENAME: core/row-model/src/tree.rs
//! PURPOSE: Tree data builder. Reconciles the hierarchy of data nodes against
//! the previous run, reusing every node whose id is unchanged.
//! CONTEXT: Two sources of structure:
//! - path mode: `get_data_path(data)` gives the key path of each row; missing
//!   ancestors become filler nodes (`row-group-<path joined by '-'>`)
//! - nested mode: `Record::children`, resolved into `tree_parent` at ingestion
//!
//! Fillers are cached by path. When tree data is switched off they are detached
//! from the id index but kept, so switching it back on restores the same nodes.

use engine::{log_debug, log_warn, CellValue};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::changed_path::{ChangedPath, ChangedRowNodes};
use crate::node::{NodeId, RowNodeArena, GROUP_ID_PREFIX};
use crate::options::{GridCallbacks, GridOptions};

/// Key path of a filler. Trees are rarely more than a few levels deep.
pub type FillerPath = SmallVec<[String; 4]>;

#[derive(Debug, Default)]
pub struct TreeBuilder {
    fillers: FxHashMap<FillerPath, NodeId>,
}

/// Working state of one build.
struct TreeLayout {
    parent_of: FxHashMap<NodeId, NodeId>,
    key_of: FxHashMap<NodeId, String>,
    used_fillers: FxHashSet<NodeId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder::default()
    }

    pub fn filler_count(&self) -> usize {
        self.fillers.len()
    }

    /// Unregisters every cached filler. The nodes stay in the arena.
    pub(crate) fn detach(&mut self, arena: &mut RowNodeArena) {
        for handle in self.fillers.values() {
            arena.unregister(*handle);
        }
        log_debug!("TREE", "detached {} fillers", self.fillers.len());
    }

    pub(crate) fn build(
        &mut self,
        arena: &mut RowNodeArena,
        root: NodeId,
        options: &GridOptions,
        callbacks: &GridCallbacks,
        changed: Option<&ChangedRowNodes>,
        path: &mut ChangedPath,
    ) {
        let leaves = arena[root].all_leaf_children.clone().unwrap_or_default();

        // Previous child lists, to detect which parents changed.
        let mut old_children: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for handle in std::iter::once(root).chain(leaves.iter().copied()).chain(self.fillers.values().copied()) {
            if let Some(children) = &arena[handle].children_after_group {
                old_children.insert(handle, children.clone());
            }
        }

        let mut layout = TreeLayout {
            parent_of: FxHashMap::default(),
            key_of: FxHashMap::default(),
            used_fillers: FxHashSet::default(),
        };
        match &callbacks.get_data_path {
            Some(get_data_path) => {
                let paths: Vec<Vec<String>> = leaves
                    .iter()
                    .map(|h| arena[*h].data.as_ref().map(|d| get_data_path(d)).unwrap_or_default())
                    .collect();
                self.resolve_paths(arena, root, options, &leaves, &paths, &mut layout);
            }
            None => resolve_nested(arena, root, &leaves, &mut layout),
        }

        // Child lists in leaf order; an ancestor is placed before its first child.
        let mut new_children: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        let mut placed: FxHashSet<NodeId> = FxHashSet::default();
        for leaf in &leaves {
            place(*leaf, root, &layout.parent_of, &mut placed, &mut new_children);
        }

        // Apply top-down so levels are known before children are visited.
        let mut structural: Vec<NodeId> = Vec::new();
        let mut stack: Vec<(NodeId, i32)> = vec![(root, -1)];
        while let Some((handle, level)) = stack.pop() {
            let kids = new_children.remove(&handle).unwrap_or_default();
            for child in kids.iter().rev() {
                stack.push((*child, level + 1));
            }
            let node = &mut arena[handle];
            if handle == root {
                node.children_after_group = Some(kids);
            } else {
                node.parent = layout.parent_of.get(&handle).copied();
                node.level = level;
                node.leaf_group = false;
                node.row_group_column = None;
                node.children_map = None;
                if let Some(key) = layout.key_of.get(&handle) {
                    node.key = Some(key.clone());
                    node.group_value = CellValue::Text(key.clone());
                }
                if kids.is_empty() && node.data.is_some() {
                    node.group = false;
                    node.children_after_group = None;
                    node.all_leaf_children = None;
                } else {
                    if !node.group && options.is_expanded_by_default(level) {
                        node.expanded = true;
                    }
                    node.group = true;
                    node.children_after_group = Some(kids);
                }
            }
            structural.push(handle);
        }

        for handle in &structural {
            let now = arena[*handle].children_after_group.as_ref();
            let differs = match (old_children.get(handle), now) {
                (Some(old), Some(now)) => old != now,
                (None, Some(now)) => !now.is_empty(),
                (Some(old), None) => !old.is_empty(),
                (None, None) => false,
            };
            if differs {
                path.add_parent_node(arena, *handle);
            }
        }
        if let Some(changed) = changed {
            for handle in changed.adds().iter().chain(changed.updates()) {
                if let Some(parent) = arena.get(*handle).and_then(|n| n.parent) {
                    path.add_parent_node(arena, parent);
                }
                // A data row that is also a group decides the filtering of its
                // whole subtree.
                if arena.get(*handle).map_or(false, |n| n.group) {
                    mark_subtree(arena, *handle, path);
                }
            }
        }

        // Descendant data nodes per group, children before their own subtrees.
        for handle in structural.iter().rev() {
            if *handle == root || !arena[*handle].group {
                continue;
            }
            let mut descendants = Vec::new();
            for child in arena[*handle].children_after_group.clone().unwrap_or_default() {
                if arena[child].data.is_some() {
                    descendants.push(child);
                }
                if let Some(sub) = &arena[child].all_leaf_children {
                    descendants.extend(sub.iter().copied());
                }
            }
            arena[*handle].all_leaf_children = Some(descendants);
        }

        // Fillers with no place in the new tree are obsolete.
        let mut obsolete: Vec<FillerPath> = Vec::new();
        for (key, handle) in &self.fillers {
            if !layout.used_fillers.contains(handle) {
                obsolete.push(key.clone());
            }
        }
        for key in obsolete {
            if let Some(handle) = self.fillers.remove(&key) {
                arena.destroy(handle);
            }
        }

        log_debug!(
            "TREE",
            "built tree: {} leaves, {} fillers, {} on changed path",
            leaves.len(),
            self.fillers.len(),
            path.len()
        );
    }

    fn resolve_paths(
        &mut self,
        arena: &mut RowNodeArena,
        root: NodeId,
        options: &GridOptions,
        leaves: &[NodeId],
        paths: &[Vec<String>],
        layout: &mut TreeLayout,
    ) {
        let mut data_at: FxHashMap<&[String], NodeId> = FxHashMap::default();
        for (leaf, path) in leaves.iter().zip(paths) {
            if path.is_empty() {
                continue;
            }
            if data_at.contains_key(path.as_slice()) {
                log_warn!("TREE", "duplicate data path {:?} for row {}", path, arena[*leaf].id);
                continue;
            }
            data_at.insert(path.as_slice(), *leaf);
        }

        for (leaf, path) in leaves.iter().zip(paths) {
            let key = path.last().cloned().unwrap_or_else(|| arena[*leaf].id.clone());
            layout.key_of.insert(*leaf, key);

            let mut parent = root;
            for depth in 1..path.len() {
                let prefix = &path[..depth];
                let node = match data_at.get(prefix) {
                    Some(handle) => *handle,
                    None => {
                        let filler = self.filler_for(arena, options, prefix);
                        if layout.used_fillers.insert(filler) {
                            layout.parent_of.insert(filler, parent);
                            layout.key_of.insert(filler, prefix[depth - 1].clone());
                        }
                        filler
                    }
                };
                parent = node;
            }
            layout.parent_of.insert(*leaf, parent);
        }
    }

    fn filler_for(&mut self, arena: &mut RowNodeArena, options: &GridOptions, prefix: &[String]) -> NodeId {
        if let Some(handle) = self.fillers.get(prefix) {
            if !arena.is_registered(*handle) {
                arena.register(*handle);
            }
            return *handle;
        }
        let id = format!("{}{}", GROUP_ID_PREFIX, prefix.join("-"));
        let handle = arena.create_node(id, None);
        {
            let filler = &mut arena[handle];
            filler.group = true;
            filler.expanded = options.is_expanded_by_default(prefix.len() as i32 - 1);
        }
        self.fillers.insert(FillerPath::from(prefix), handle);
        handle
    }
}

fn resolve_nested(arena: &RowNodeArena, root: NodeId, leaves: &[NodeId], layout: &mut TreeLayout) {
    let live: FxHashSet<NodeId> = leaves.iter().copied().collect();
    for leaf in leaves {
        let node = &arena[*leaf];
        let parent = node.tree_parent.filter(|p| live.contains(p)).unwrap_or(root);
        layout.parent_of.insert(*leaf, parent);
        layout.key_of.insert(*leaf, node.id.clone());
    }
}

fn mark_subtree(arena: &RowNodeArena, handle: NodeId, path: &mut ChangedPath) {
    let mut stack = vec![handle];
    while let Some(current) = stack.pop() {
        path.add_parent_node(arena, current);
        for child in arena[current].children_after_group.iter().flatten() {
            if arena[*child].group {
                stack.push(*child);
            }
        }
    }
}

fn place(
    node: NodeId,
    root: NodeId,
    parent_of: &FxHashMap<NodeId, NodeId>,
    placed: &mut FxHashSet<NodeId>,
    new_children: &mut FxHashMap<NodeId, Vec<NodeId>>,
) {
    if placed.contains(&node) {
        return;
    }
    let parent = parent_of.get(&node).copied().unwrap_or(root);
    if parent != root {
        place(parent, root, parent_of, placed, new_children);
    }
    placed.insert(node);
    new_children.entry(parent).or_default().push(node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ROOT_NODE_ID;
    use engine::Record;
    use std::rc::Rc;

    fn path_callbacks() -> GridCallbacks {
        GridCallbacks::new().with_get_data_path(|d| {
            d.get_text("path")
                .map(|p| p.split('/').map(String::from).collect::<Vec<_>>())
                .unwrap_or_default()
        })
    }

    fn setup(paths: &[&str]) -> (RowNodeArena, NodeId) {
        let mut arena = RowNodeArena::new();
        let root = arena.create_node(ROOT_NODE_ID.into(), None);
        let mut leaves = Vec::new();
        for (i, p) in paths.iter().enumerate() {
            let data = Record::new().with("path", *p).into_data();
            leaves.push(arena.create_node(i.to_string(), Some(data)));
        }
        arena[root].all_leaf_children = Some(leaves);
        (arena, root)
    }

    fn child_keys(arena: &RowNodeArena, node: NodeId) -> Vec<String> {
        arena[node]
            .children_after_group
            .iter()
            .flatten()
            .map(|h| arena[*h].key.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_fillers_for_missing_ancestors() {
        let (mut arena, root) = setup(&["A/B/C", "D"]);
        let mut tree = TreeBuilder::new();
        tree.build(&mut arena, root, &GridOptions::default(), &path_callbacks(), None, &mut ChangedPath::inactive());

        assert_eq!(child_keys(&arena, root), vec!["A", "D"]);
        let a = arena.lookup("row-group-A").unwrap();
        let b = arena.lookup("row-group-A-B").unwrap();
        assert!(arena[a].is_filler());
        assert_eq!(arena[b].level, 1);
        assert_eq!(child_keys(&arena, b), vec!["C"]);
        assert_eq!(arena[a].all_leaf_children.as_ref().unwrap().len(), 1);
        assert_eq!(tree.filler_count(), 2);
    }

    #[test]
    fn test_data_node_replaces_filler() {
        let (mut arena, root) = setup(&["A/B"]);
        let options = GridOptions::default();
        let callbacks = path_callbacks();
        let mut tree = TreeBuilder::new();
        tree.build(&mut arena, root, &options, &callbacks, None, &mut ChangedPath::inactive());
        let filler = arena.lookup("row-group-A").unwrap();

        let a = arena.create_node("a".into(), Some(Record::new().with("path", "A").into_data()));
        arena[root].all_leaf_children.as_mut().unwrap().push(a);
        let mut path = ChangedPath::active();
        tree.build(&mut arena, root, &options, &callbacks, None, &mut path);

        assert!(arena[filler].destroyed);
        assert_eq!(arena[root].children_after_group, Some(vec![a]));
        assert_eq!(child_keys(&arena, a), vec!["B"]);
        assert!(arena[a].group);
        assert!(path.contains(a));
        assert!(path.contains(root));
    }

    #[test]
    fn test_detach_and_reattach_reuses_fillers() {
        let (mut arena, root) = setup(&["A/B"]);
        let options = GridOptions::default();
        let callbacks = path_callbacks();
        let mut tree = TreeBuilder::new();
        tree.build(&mut arena, root, &options, &callbacks, None, &mut ChangedPath::inactive());
        let filler = arena.lookup("row-group-A").unwrap();

        tree.detach(&mut arena);
        assert_eq!(arena.lookup("row-group-A"), None);

        tree.build(&mut arena, root, &options, &callbacks, None, &mut ChangedPath::inactive());
        assert_eq!(arena.lookup("row-group-A"), Some(filler));
    }

    #[test]
    fn test_nested_mode_uses_tree_parent() {
        let mut arena = RowNodeArena::new();
        let root = arena.create_node(ROOT_NODE_ID.into(), None);
        let parent = arena.create_node("p".into(), Some(Rc::new(Record::new())));
        let child = arena.create_node("c".into(), Some(Rc::new(Record::new())));
        arena[child].tree_parent = Some(parent);
        arena[root].all_leaf_children = Some(vec![parent, child]);

        let mut tree = TreeBuilder::new();
        let options = GridOptions { group_default_expanded: -1, ..GridOptions::default() };
        tree.build(&mut arena, root, &options, &GridCallbacks::default(), None, &mut ChangedPath::inactive());

        assert_eq!(arena[root].children_after_group, Some(vec![parent]));
        assert_eq!(arena[parent].children_after_group, Some(vec![child]));
        assert_eq!(arena[child].parent, Some(parent));
        assert_eq!(arena[child].level, 1);
        assert!(arena[parent].expanded);
        assert!(!arena[child].group);
    }
}
