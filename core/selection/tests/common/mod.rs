//! FILENAME: core/selection/tests/common/mod.rs
//! Test harness and fixtures for selection integration tests.

#![allow(dead_code)]

use engine::{Record, RowData};
use row_model::{ClientSideRowModel, GridCallbacks, GridOptions, NodeId, RowSelectionMode};
use selection::{SelectionError, SelectionService, SetSelectedParams};

pub const IRELAND: &str = "row-group-country-Ireland";
pub const FRANCE: &str = "row-group-country-France";
pub const FRANCE_2000: &str = "row-group-country-France-year-2000";
pub const FRANCE_2004: &str = "row-group-country-France-year-2004";
pub const GERMANY: &str = "row-group-country-Germany";

/// A model plus the selection service bound to it.
pub struct SelectionHarness {
    pub model: ClientSideRowModel,
    pub selection: SelectionService,
}

impl SelectionHarness {
    pub fn build(options: GridOptions, callbacks: GridCallbacks, rows: Vec<RowData>) -> Self {
        let mut model = ClientSideRowModel::new(options, callbacks);
        model.set_row_data(rows);
        let selection = SelectionService::for_model(&model);
        SelectionHarness { model, selection }
    }

    /// Flat rows, flat strategy.
    pub fn flat(mode: RowSelectionMode) -> Self {
        let mut options = GridOptions::default();
        options.row_selection = mode;
        Self::build(options, GridCallbacks::new().with_row_id_field("id"), sample_rows())
    }

    /// Grouped by country then year, group selects children.
    pub fn grouped() -> Self {
        let mut options = GridOptions::default();
        options.group_selects_children = true;
        options.columns.row_group_columns = vec!["country".to_string(), "year".to_string()];
        Self::build(options, GridCallbacks::new().with_row_id_field("id"), sample_rows())
    }

    pub fn handle(&self, id: &str) -> NodeId {
        self.model
            .get_row_node(id)
            .unwrap_or_else(|| panic!("no live node with id {}", id))
            .handle
    }

    pub fn handles(&self, ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|id| self.handle(id)).collect()
    }

    pub fn select(&mut self, ids: &[&str]) -> Result<usize, SelectionError> {
        let params = SetSelectedParams::select(self.handles(ids));
        self.selection.set_nodes_selected(&mut self.model, &params)
    }

    pub fn deselect(&mut self, ids: &[&str]) -> Result<usize, SelectionError> {
        let params = SetSelectedParams::deselect(self.handles(ids));
        self.selection.set_nodes_selected(&mut self.model, &params)
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.selection
            .get_selected_nodes(&self.model)
            .into_iter()
            .map(|h| self.model.arena()[h].id.clone())
            .collect()
    }

    /// The `selected` flag written into the node.
    pub fn flag(&self, id: &str) -> Option<bool> {
        self.model.arena()[self.handle(id)].selected
    }

    pub fn resolved(&self, id: &str) -> Option<bool> {
        self.selection.is_node_selected(&self.model, self.handle(id))
    }

    /// Every live node id, parents first.
    pub fn all_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.model.for_each_node(|node, _| ids.push(node.id.clone()));
        ids
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub fn medal(id: &str, country: &str, year: i32, gold: i32) -> RowData {
    Record::new()
        .with("id", id)
        .with("country", country)
        .with("year", year)
        .with("gold", gold)
        .into_data()
}

/// Five medal rows: Ireland 2004 (1), France 2000 (2, 3), Germany 2004 (4),
/// France 2004 (5).
pub fn sample_rows() -> Vec<RowData> {
    vec![
        medal("1", "Ireland", 2004, 2),
        medal("2", "France", 2000, 3),
        medal("3", "France", 2000, 4),
        medal("4", "Germany", 2004, 5),
        medal("5", "France", 2004, 1),
    ]
}

/// Deterministic pseudo random sequence for property style tests.
pub struct Lcg(pub u64);

impl Lcg {
    pub fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}
