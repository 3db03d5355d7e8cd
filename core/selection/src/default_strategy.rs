//! FILENAME: core/selection/src/default_strategy.rs
//! PURPOSE: Flat selection: one select-all flag plus a set of toggled row ids.
//! CONTEXT: A row is selected when `select_all` and "id is toggled" differ.
//! Groups are plain rows here, selecting one does not touch its children.

use engine::{log_debug, log_warn};
use row_model::{NodeId, RowSelectionMode};
use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::error::SelectionError;
use crate::state::{SelectionState, ServerSideSelectionState};
use crate::strategy::{SelectionContext, SelectionStrategy, SetSelectedParams};

#[derive(Debug, Clone)]
pub struct DefaultStrategy {
    mode: RowSelectionMode,
    select_all: bool,
    toggled: FxHashSet<String>,
}

impl DefaultStrategy {
    pub fn new(mode: RowSelectionMode) -> Self {
        DefaultStrategy { mode, select_all: false, toggled: FxHashSet::default() }
    }

    fn reset(&mut self, select_all: bool) {
        self.select_all = select_all;
        self.toggled.clear();
    }
}

impl SelectionStrategy for DefaultStrategy {
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
            self.reset(false);
        }

        for handle in &params.nodes {
            let Some(node) = ctx.node(*handle) else { continue };
            if !node.selectable {
                continue;
            }
            if params.new_value != self.select_all {
                self.toggled.insert(node.id.clone());
            } else {
                self.toggled.remove(&node.id);
            }
        }
        log_debug!(
            "SELECT",
            "set {} rows to {}, select_all={} toggled={}",
            params.nodes.len(),
            params.new_value,
            self.select_all,
            self.toggled.len()
        );
        Ok(())
    }

    fn is_node_selected(&self, ctx: &dyn SelectionContext, handle: NodeId) -> Option<bool> {
        let selected = ctx
            .node(handle)
            .map_or(false, |n| self.select_all != self.toggled.contains(&n.id));
        Some(selected)
    }

    fn select_all_row_nodes(&mut self, _ctx: &dyn SelectionContext) {
        self.reset(true);
    }

    fn deselect_all_row_nodes(&mut self, _ctx: &dyn SelectionContext) {
        self.reset(false);
    }

    fn get_select_all_state(&self, _ctx: &dyn SelectionContext) -> Option<bool> {
        if self.toggled.is_empty() {
            Some(self.select_all)
        } else {
            None
        }
    }

    fn get_selection_count(&self, _ctx: &dyn SelectionContext) -> i64 {
        if self.select_all {
            -1
        } else {
            self.toggled.len() as i64
        }
    }

    fn is_empty(&self) -> bool {
        !self.select_all && self.toggled.is_empty()
    }

    fn get_selected_state(&self) -> ServerSideSelectionState {
        let mut toggled_nodes: Vec<String> = self.toggled.iter().cloned().collect();
        toggled_nodes.sort();
        ServerSideSelectionState::Flat(SelectionState { select_all: self.select_all, toggled_nodes })
    }

    fn set_selected_state(&mut self, _ctx: &dyn SelectionContext, state: &Value) -> Result<(), SelectionError> {
        let state = SelectionState::from_json(state)?;
        if self.mode == RowSelectionMode::Single && !state.select_all && state.toggled_nodes.len() > 1 {
            return Err(SelectionError::MultipleNodesInSingleMode);
        }
        self.select_all = state.select_all;
        self.toggled = state.toggled_nodes.into_iter().collect();
        log_debug!("SELECT", "restored flat state, toggled={}", self.toggled.len());
        Ok(())
    }

    fn delete_selection_state_from_parent(&mut self, removed_ids: &[String]) {
        for id in removed_ids {
            self.toggled.remove(id);
        }
    }
}
