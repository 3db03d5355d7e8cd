//! FILENAME: core/selection/src/service.rs
//! PURPOSE: Binds a selection strategy to a `ClientSideRowModel`.
//! CONTEXT: The strategy is chosen once, from `group_selects_children`. After
//! every change the resolved state of each node is written back into its
//! `selected` flag; the model emits `SelectionChanged` only for real changes.

use engine::{log_debug, RowData};
use row_model::{ClientSideRowModel, GridOptions, NodeId, RowNode, RowNodeTransaction};
use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::default_strategy::DefaultStrategy;
use crate::error::SelectionError;
use crate::group_strategy::GroupSelectsChildrenStrategy;
use crate::strategy::{SelectionContext, SelectionStrategy, SetSelectedParams};

impl SelectionContext for ClientSideRowModel {
    fn root(&self) -> NodeId {
        ClientSideRowModel::root(self)
    }

    fn node(&self, handle: NodeId) -> Option<&RowNode> {
        ClientSideRowModel::node(self, handle)
    }

    fn lookup(&self, id: &str) -> Option<NodeId> {
        self.arena().lookup(id)
    }

    fn visit_nodes(&self, visitor: &mut dyn FnMut(&RowNode)) {
        self.for_each_node(|node, _| visitor(node));
    }

    fn is_any_filter_present(&self) -> bool {
        ClientSideRowModel::is_any_filter_present(self)
    }
}

pub struct SelectionService {
    strategy: Box<dyn SelectionStrategy>,
    group_selects_children: bool,
}

impl SelectionService {
    pub fn new(options: &GridOptions) -> Self {
        let strategy: Box<dyn SelectionStrategy> = if options.group_selects_children {
            Box::new(GroupSelectsChildrenStrategy::new(options.row_selection))
        } else {
            Box::new(DefaultStrategy::new(options.row_selection))
        };
        SelectionService { strategy, group_selects_children: options.group_selects_children }
    }

    pub fn for_model(model: &ClientSideRowModel) -> Self {
        SelectionService::new(model.options())
    }

    pub fn group_selects_children(&self) -> bool {
        self.group_selects_children
    }

    // ========================================================================
    // SELECTING
    // ========================================================================

    /// Applies the call and returns how many node flags changed.
    pub fn set_nodes_selected(
        &mut self,
        model: &mut ClientSideRowModel,
        params: &SetSelectedParams,
    ) -> Result<usize, SelectionError> {
        self.strategy.set_nodes_selected(&*model, params)?;
        Ok(self.sync_flags(model))
    }

    pub fn select_all(&mut self, model: &mut ClientSideRowModel) -> usize {
        self.strategy.select_all_row_nodes(&*model);
        self.sync_flags(model)
    }

    pub fn deselect_all(&mut self, model: &mut ClientSideRowModel) -> usize {
        self.strategy.deselect_all_row_nodes(&*model);
        self.sync_flags(model)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn is_node_selected(&self, model: &ClientSideRowModel, handle: NodeId) -> Option<bool> {
        self.strategy.is_node_selected(model, handle)
    }

    pub fn get_selected_nodes(&self, model: &ClientSideRowModel) -> Vec<NodeId> {
        self.strategy.get_selected_nodes(model)
    }

    /// Data of the selected nodes that carry data.
    pub fn get_selected_rows(&self, model: &ClientSideRowModel) -> Vec<RowData> {
        self.get_selected_nodes(model)
            .into_iter()
            .filter_map(|h| model.node(h).and_then(|n| n.data.clone()))
            .collect()
    }

    pub fn get_select_all_state(&self, model: &ClientSideRowModel) -> Option<bool> {
        self.strategy.get_select_all_state(model)
    }

    pub fn get_selection_count(&self, model: &ClientSideRowModel) -> i64 {
        self.strategy.get_selection_count(model)
    }

    pub fn is_empty(&self) -> bool {
        self.strategy.is_empty()
    }

    // ========================================================================
    // SERVER-SIDE STATE
    // ========================================================================

    pub fn get_server_side_selection_state(&self) -> Value {
        self.strategy.get_selected_state().to_json()
    }

    /// Replaces the selection with `state`. A malformed state is rejected as a
    /// whole and the current selection kept.
    pub fn set_server_side_selection_state(
        &mut self,
        model: &mut ClientSideRowModel,
        state: &Value,
    ) -> Result<usize, SelectionError> {
        self.strategy.set_selected_state(&*model, state)?;
        Ok(self.sync_flags(model))
    }

    // ========================================================================
    // MODEL UPDATES
    // ========================================================================

    /// Forgets removed rows (and the groups that went with them), then
    /// refreshes the flags so added rows pick up inherited selection.
    pub fn on_transaction(&mut self, model: &mut ClientSideRowModel, result: &RowNodeTransaction) -> usize {
        let mut removed: Vec<String> = Vec::new();
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        for handle in &result.remove {
            let mut current = Some(*handle);
            while let Some(h) = current {
                let Some(node) = model.node(h) else { break };
                if !node.destroyed || !seen.insert(h) {
                    break;
                }
                if model.get_row_node(&node.id).is_none() {
                    removed.push(node.id.clone());
                }
                current = node.parent;
            }
        }
        if !removed.is_empty() {
            log_debug!("SELECT", "dropping selection state of {} removed rows", removed.len());
            self.strategy.delete_selection_state_from_parent(&removed);
        }
        self.on_model_updated(model)
    }

    /// Prunes state made redundant by the current rows and refreshes flags.
    pub fn on_model_updated(&mut self, model: &mut ClientSideRowModel) -> usize {
        self.strategy.prune(&*model);
        self.sync_flags(model)
    }

    fn sync_flags(&self, model: &mut ClientSideRowModel) -> usize {
        let view: &ClientSideRowModel = model;
        let mut updates: Vec<(NodeId, Option<bool>)> = Vec::new();
        view.for_each_node(|node, _| {
            updates.push((node.handle, self.strategy.is_node_selected(view, node.handle)));
        });
        let changed = model.set_selected_flags(&updates);
        log_debug!("SELECT", "synced {} nodes, {} flags changed", updates.len(), changed);
        changed
    }
}
