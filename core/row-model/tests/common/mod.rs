//! FILENAME: core/row-model/tests/common/mod.rs
//! Test harness and fixtures for row model integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use engine::{CellValue, Record, RowData};
use row_model::{ClientSideRowModel, GridCallbacks, GridOptions, NodeId, RowNode, RowNodeEvent, RowNodeEventKind};

/// Test harness wrapping a model plus a recorder for its node events.
pub struct TestHarness {
    pub model: ClientSideRowModel,
    events: Rc<RefCell<Vec<RowNodeEvent>>>,
}

impl TestHarness {
    /// Create a harness with default options and row ids taken from `id`.
    pub fn new() -> Self {
        Self::with_options(GridOptions::default())
    }

    pub fn with_options(options: GridOptions) -> Self {
        Self::with_callbacks(options, GridCallbacks::new().with_row_id_field("id"))
    }

    pub fn with_callbacks(options: GridOptions, callbacks: GridCallbacks) -> Self {
        let mut model = ClientSideRowModel::new(options, callbacks);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        model.add_event_listener(move |event| sink.borrow_mut().push(*event));
        TestHarness { model, events }
    }

    /// Grouped by country then year, sample medal rows loaded.
    pub fn with_grouped_sample() -> Self {
        let mut options = GridOptions::default();
        options.columns.row_group_columns = vec!["country".to_string(), "year".to_string()];
        let mut harness = Self::with_options(options);
        harness.model.set_row_data(sample_rows());
        harness
    }

    /// Tree data from `path` fields ("a/b/c"), every level expanded.
    pub fn with_path_tree(rows: Vec<RowData>) -> Self {
        let mut options = GridOptions::default();
        options.tree_data = true;
        options.group_default_expanded = -1;
        let callbacks = path_callbacks();
        let mut harness = Self::with_callbacks(options, callbacks);
        harness.model.set_row_data(rows);
        harness
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    pub fn handle(&self, id: &str) -> NodeId {
        self.model
            .get_row_node(id)
            .unwrap_or_else(|| panic!("no live node with id {}", id))
            .handle
    }

    pub fn node(&self, id: &str) -> &RowNode {
        self.model
            .get_row_node(id)
            .unwrap_or_else(|| panic!("no live node with id {}", id))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.model.get_row_node(id).is_some()
    }

    pub fn displayed_ids(&self) -> Vec<String> {
        self.model.displayed_row_ids()
    }

    pub fn leaf_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.model.for_each_leaf_node(|node, _| ids.push(node.id.clone()));
        ids
    }

    pub fn ids_of(&self, handles: &[NodeId]) -> Vec<String> {
        handles.iter().map(|h| self.model.arena()[*h].id.clone()).collect()
    }

    pub fn children_after_group(&self, id: &str) -> Vec<String> {
        self.ids_of(self.node(id).children_after_group.as_deref().unwrap_or_default())
    }

    pub fn children_after_filter(&self, id: &str) -> Vec<String> {
        self.ids_of(self.node(id).children_after_filter.as_deref().unwrap_or_default())
    }

    pub fn children_after_sort(&self, id: &str) -> Vec<String> {
        self.ids_of(self.node(id).children_after_sort.as_deref().unwrap_or_default())
    }

    pub fn root_children_after_sort(&self) -> Vec<String> {
        self.ids_of(self.model.root_node().children_after_sort.as_deref().unwrap_or_default())
    }

    pub fn root_children_after_filter(&self) -> Vec<String> {
        self.ids_of(self.model.root_node().children_after_filter.as_deref().unwrap_or_default())
    }

    pub fn value(&self, id: &str, col: &str) -> CellValue {
        self.node(id).get_value(col).clone()
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    pub fn take_events(&self) -> Vec<RowNodeEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn events_of_kind(&self, kind: RowNodeEventKind) -> Vec<RowNodeEvent> {
        self.events.borrow().iter().filter(|e| e.kind == kind).copied().collect()
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub fn medal(id: &str, country: &str, year: i32, name: &str, gold: i32) -> RowData {
    Record::new()
        .with("id", id)
        .with("country", country)
        .with("year", year)
        .with("name", name)
        .with("gold", gold)
        .into_data()
}

/// Five medal rows over three countries; no Ireland/2000 row.
pub fn sample_rows() -> Vec<RowData> {
    vec![
        medal("1", "Ireland", 2004, "Aoife", 2),
        medal("2", "France", 2000, "Bruno", 3),
        medal("3", "France", 2000, "Chloe", 4),
        medal("4", "Germany", 2004, "Dieter", 5),
        medal("5", "France", 2004, "Elise", 1),
    ]
}

pub fn scored(id: &str, value: i32) -> RowData {
    Record::new().with("id", id).with("value", value).into_data()
}

/// Tree data row located by a slash separated path.
pub fn path_row(id: &str, path: &str, tag: &str, amount: i32) -> RowData {
    Record::new()
        .with("id", id)
        .with("path", path)
        .with("tag", tag)
        .with("amount", amount)
        .into_data()
}

pub fn path_callbacks() -> GridCallbacks {
    GridCallbacks::new().with_row_id_field("id").with_get_data_path(|data| {
        data.get_text("path")
            .map(|p| p.split('/').map(String::from).collect::<Vec<_>>())
            .unwrap_or_default()
    })
}

/// Nested tree data record.
pub fn nested(id: &str, value: i32, children: Vec<RowData>) -> RowData {
    Record::new()
        .with("id", id)
        .with("value", value)
        .with_children(children)
        .into_data()
}

/// Deterministic pseudo random sequence for property style tests.
pub struct Lcg(pub u64);

impl Lcg {
    pub fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}
