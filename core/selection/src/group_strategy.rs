//! FILENAME: core/selection/src/group_strategy.rs
//! PURPOSE: Group-selects-children selection backed by a toggle tree.
//! CONTEXT: Each tree level holds a default (`select_all_children`) and the
//! children that deviate from it. A node resolves by walking its ancestor
//! route from the root, taking the deepest matching level's default. A group
//! whose level still holds deviating children is partially selected.
//!
//! Entries that repeat their parent's default are pruned after every change.
//! When every known child of a group is toggled to the same value, the
//! toggles are folded into the group's default.

use std::collections::BTreeMap;

use engine::{log_debug, log_warn};
use row_model::{NodeId, RowSelectionMode};
use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::error::SelectionError;
use crate::state::{RecursiveSelectionState, ServerSideSelectionState};
use crate::strategy::{SelectionContext, SelectionStrategy, SetSelectedParams};

// ============================================================================
// TOGGLE TREE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ToggleTree {
    select_all_children: bool,
    toggled: BTreeMap<String, ToggleTree>,
}

impl ToggleTree {
    fn uniform(select_all_children: bool) -> Self {
        ToggleTree { select_all_children, toggled: BTreeMap::new() }
    }

    /// True when some descendant resolves differently from this level.
    fn has_differing(&self) -> bool {
        self.toggled
            .values()
            .any(|child| child.select_all_children != self.select_all_children || child.has_differing())
    }

    fn any_selected(&self) -> bool {
        self.select_all_children || self.toggled.values().any(ToggleTree::any_selected)
    }

    fn remove_ids(&mut self, ids: &FxHashSet<&str>) {
        self.toggled.retain(|id, _| !ids.contains(id.as_str()));
        for child in self.toggled.values_mut() {
            child.remove_ids(ids);
        }
    }

    fn prune(&mut self, ctx: &dyn SelectionContext, handle: Option<NodeId>) {
        for (id, child) in self.toggled.iter_mut() {
            child.prune(ctx, ctx.lookup(id));
        }
        let default = self.select_all_children;
        self.toggled
            .retain(|_, child| child.select_all_children != default || !child.toggled.is_empty());

        let Some(handle) = handle else { return };
        let Some(count) = ctx.known_child_count(handle) else { return };
        if count == 0 || self.toggled.len() != count {
            return;
        }
        let all_flipped = self.toggled.values().all(|c| c.toggled.is_empty());
        let all_known = self.toggled.keys().all(|id| {
            ctx.lookup(id)
                .and_then(|h| ctx.node(h))
                .map_or(false, |n| n.parent == Some(handle))
        });
        if all_flipped && all_known {
            self.select_all_children = !default;
            self.toggled.clear();
        }
    }

    fn to_state(&self, node_id: Option<String>) -> RecursiveSelectionState {
        let toggled_nodes = if self.toggled.is_empty() {
            None
        } else {
            Some(
                self.toggled
                    .iter()
                    .map(|(id, child)| child.to_state(Some(id.clone())))
                    .collect(),
            )
        };
        RecursiveSelectionState {
            node_id,
            select_all_children: Some(self.select_all_children),
            toggled_nodes,
        }
    }

    fn from_state(state: &RecursiveSelectionState) -> Self {
        let mut tree = ToggleTree::uniform(state.select_all_children.unwrap_or(false));
        for child in state.toggled_nodes.iter().flatten() {
            if let Some(id) = &child.node_id {
                tree.toggled.insert(id.clone(), ToggleTree::from_state(child));
            }
        }
        tree
    }
}

// ============================================================================
// STRATEGY
// ============================================================================

#[derive(Debug, Clone)]
pub struct GroupSelectsChildrenStrategy {
    mode: RowSelectionMode,
    root: ToggleTree,
}

impl GroupSelectsChildrenStrategy {
    pub fn new(mode: RowSelectionMode) -> Self {
        GroupSelectsChildrenStrategy { mode, root: ToggleTree::default() }
    }

    /// Sets the last id of `route` to `value`, materialising the ancestors
    /// with the defaults they currently inherit.
    fn set_route(&mut self, route: &[String], value: bool) {
        let Some((last, ancestors)) = route.split_last() else { return };
        let mut level = &mut self.root;
        for id in ancestors {
            let inherited = level.select_all_children;
            level = level
                .toggled
                .entry(id.clone())
                .or_insert_with(|| ToggleTree::uniform(inherited));
        }
        level.toggled.insert(last.clone(), ToggleTree::uniform(value));
    }

    /// Resolved value of the route, plus the tree level of its last id when
    /// one is stored.
    fn resolve(&self, route: &[String]) -> (bool, Option<&ToggleTree>) {
        let mut level = &self.root;
        for id in route {
            match level.toggled.get(id) {
                Some(next) => level = next,
                None => return (level.select_all_children, None),
            }
        }
        (level.select_all_children, Some(level))
    }
}

impl SelectionStrategy for GroupSelectsChildrenStrategy {
    fn set_nodes_selected(
        &mut self,
        ctx: &dyn SelectionContext,
        params: &SetSelectedParams,
    ) -> Result<(), SelectionError> {
        let single = self.mode == RowSelectionMode::Single;
        if single && params.nodes.len() > 1 {
            log_warn!("SELECT", "rejected selection of {} rows in single mode", params.nodes.len());
            return Err(SelectionError::MultipleNodesInSingleMode);
        }
        if params.clear_selection || (single && params.new_value) {
            self.root = ToggleTree::default();
        }

        for handle in &params.nodes {
            if !ctx.node(*handle).map_or(false, |n| n.selectable) {
                continue;
            }
            let route = ctx.route_ids(*handle);
            self.set_route(&route, params.new_value);
        }
        self.prune(ctx);
        log_debug!(
            "SELECT",
            "set {} rows to {}, {} top-level toggles",
            params.nodes.len(),
            params.new_value,
            self.root.toggled.len()
        );
        Ok(())
    }

    fn is_node_selected(&self, ctx: &dyn SelectionContext, handle: NodeId) -> Option<bool> {
        let Some(node) = ctx.node(handle) else { return Some(false) };
        let route = ctx.route_ids(handle);
        let (value, level) = self.resolve(&route);
        if node.has_children() && level.map_or(false, ToggleTree::has_differing) {
            None
        } else {
            Some(value)
        }
    }

    fn select_all_row_nodes(&mut self, _ctx: &dyn SelectionContext) {
        self.root = ToggleTree::uniform(true);
    }

    fn deselect_all_row_nodes(&mut self, _ctx: &dyn SelectionContext) {
        self.root = ToggleTree::default();
    }

    fn get_select_all_state(&self, _ctx: &dyn SelectionContext) -> Option<bool> {
        if self.root.has_differing() {
            None
        } else {
            Some(self.root.select_all_children)
        }
    }

    fn get_selection_count(&self, ctx: &dyn SelectionContext) -> i64 {
        if self.root.select_all_children {
            return -1;
        }
        let mut count = 0;
        ctx.visit_nodes(&mut |node| {
            if !node.has_children() && node.data.is_some() && self.is_node_selected(ctx, node.handle) == Some(true) {
                count += 1;
            }
        });
        count
    }

    fn is_empty(&self) -> bool {
        !self.root.any_selected()
    }

    fn get_selected_state(&self) -> ServerSideSelectionState {
        ServerSideSelectionState::Recursive(self.root.to_state(None))
    }

    fn set_selected_state(&mut self, ctx: &dyn SelectionContext, state: &Value) -> Result<(), SelectionError> {
        let state = RecursiveSelectionState::from_json(state)?;
        if self.mode == RowSelectionMode::Single && state.selected_entry_count() > 1 {
            log_warn!("SELECT", "rejected restored state selecting several rows in single mode");
            return Err(SelectionError::MultipleNodesInSingleMode);
        }
        self.root = ToggleTree::from_state(&state);
        self.prune(ctx);
        log_debug!("SELECT", "restored toggle tree, {} top-level toggles", self.root.toggled.len());
        Ok(())
    }

    fn delete_selection_state_from_parent(&mut self, removed_ids: &[String]) {
        let ids: FxHashSet<&str> = removed_ids.iter().map(String::as_str).collect();
        self.root.remove_ids(&ids);
    }

    fn prune(&mut self, ctx: &dyn SelectionContext) {
        self.root.prune(ctx, Some(ctx.root()));
    }
}
