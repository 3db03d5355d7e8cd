//! FILENAME: core/selection/src/strategy.rs
//! PURPOSE: The contract shared by the selection strategies and the view of
//! the row model they work against.
//! CONTEXT: Strategies never touch node flags themselves. They answer
//! `is_node_selected`, and `SelectionService` writes the answers back into the
//! model.

use row_model::{NodeId, RowNode};
use serde_json::Value;

use crate::error::SelectionError;
use crate::state::ServerSideSelectionState;

// ============================================================================
// ROW MODEL VIEW
// ============================================================================

/// Read access to the rows a strategy resolves selection against.
pub trait SelectionContext {
    fn root(&self) -> NodeId;

    /// Any node still held by the model, including detached ones.
    fn node(&self, handle: NodeId) -> Option<&RowNode>;

    /// Live node by row id.
    fn lookup(&self, id: &str) -> Option<NodeId>;

    /// Every live node, parents before children.
    fn visit_nodes(&self, visitor: &mut dyn FnMut(&RowNode));

    fn is_any_filter_present(&self) -> bool;

    /// Handles from the top-level ancestor down to `handle`, root excluded.
    fn route_to(&self, handle: NodeId) -> Vec<NodeId> {
        let root = self.root();
        let mut route = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            if h == root {
                break;
            }
            route.push(h);
            current = self.node(h).and_then(|n| n.parent);
        }
        route.reverse();
        route
    }

    /// Row ids along `route_to`.
    fn route_ids(&self, handle: NodeId) -> Vec<String> {
        self.route_to(handle)
            .into_iter()
            .filter_map(|h| self.node(h).map(|n| n.id.clone()))
            .collect()
    }

    /// Number of children the model knows for a group, `None` for leaves.
    fn known_child_count(&self, handle: NodeId) -> Option<usize> {
        self.node(handle)
            .and_then(|n| n.children_after_group.as_ref())
            .map(Vec::len)
    }
}

// ============================================================================
// STRATEGY CONTRACT
// ============================================================================

/// Arguments of `set_nodes_selected`.
#[derive(Debug, Clone, Default)]
pub struct SetSelectedParams {
    pub nodes: Vec<NodeId>,
    pub new_value: bool,
    /// Deselect everything else first.
    pub clear_selection: bool,
}

impl SetSelectedParams {
    pub fn select(nodes: Vec<NodeId>) -> Self {
        SetSelectedParams { nodes, new_value: true, clear_selection: false }
    }

    pub fn deselect(nodes: Vec<NodeId>) -> Self {
        SetSelectedParams { nodes, new_value: false, clear_selection: false }
    }

    pub fn clearing_others(mut self) -> Self {
        self.clear_selection = true;
        self
    }
}

pub trait SelectionStrategy {
    fn set_nodes_selected(
        &mut self,
        ctx: &dyn SelectionContext,
        params: &SetSelectedParams,
    ) -> Result<(), SelectionError>;

    /// `Some(bool)` for a resolved node, `None` for a partially selected group.
    fn is_node_selected(&self, ctx: &dyn SelectionContext, handle: NodeId) -> Option<bool>;

    fn get_selected_nodes(&self, ctx: &dyn SelectionContext) -> Vec<NodeId> {
        let mut selected = Vec::new();
        ctx.visit_nodes(&mut |node| {
            if self.is_node_selected(ctx, node.handle) == Some(true) {
                selected.push(node.handle);
            }
        });
        selected
    }

    fn select_all_row_nodes(&mut self, ctx: &dyn SelectionContext);

    fn deselect_all_row_nodes(&mut self, ctx: &dyn SelectionContext);

    /// `Some(true)`/`Some(false)` when everything is (de)selected, `None` otherwise.
    fn get_select_all_state(&self, ctx: &dyn SelectionContext) -> Option<bool>;

    /// Number of selected rows, or -1 when everything is selected and the
    /// count is unbounded.
    fn get_selection_count(&self, ctx: &dyn SelectionContext) -> i64;

    /// True when no row resolves as selected.
    fn is_empty(&self) -> bool;

    fn get_selected_state(&self) -> ServerSideSelectionState;

    /// Replaces the stored selection. On error the previous state is kept.
    fn set_selected_state(&mut self, ctx: &dyn SelectionContext, state: &Value) -> Result<(), SelectionError>;

    /// Drops stored state for rows that left the model.
    fn delete_selection_state_from_parent(&mut self, removed_ids: &[String]);

    /// Collapses stored state that the current rows make redundant.
    fn prune(&mut self, _ctx: &dyn SelectionContext) {}
}
