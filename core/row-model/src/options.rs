//! FILENAME: core/row-model/src/options.rs
//! PURPOSE: Grid options and caller callbacks for the client-side row model.
//! CONTEXT: `GridOptions` is plain data (JSON loadable, camelCase keys). The
//! callbacks are closures and live separately in `GridCallbacks`.

use std::fmt;
use std::rc::Rc;

use engine::{CellValue, ColumnModel, GridError, Record};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::node::{NodeId, RowNode, RowNodeArena};

pub const DEFAULT_ROW_HEIGHT: f64 = 25.0;
pub const DEFAULT_ASYNC_WAIT_MILLIS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowSelectionMode {
    Single,
    Multiple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridOptions {
    pub tree_data: bool,
    /// -1 expands every level, n expands levels below n.
    pub group_default_expanded: i32,
    pub group_maintain_order: bool,
    pub group_include_footer: bool,
    pub group_include_total_footer: bool,
    pub group_remove_single_children: bool,
    pub group_remove_lowest_single_children: bool,
    pub group_agg_filtering: bool,
    pub suppress_agg_filtered_only: bool,
    pub exclude_children_when_tree_data_filtering: bool,
    pub always_aggregate_at_root_level: bool,
    pub pivot_mode: bool,
    pub master_detail: bool,
    pub delta_sort: bool,
    pub row_selection: RowSelectionMode,
    pub group_selects_children: bool,
    pub row_height: f64,
    pub async_transaction_wait_millis: u64,
    /// Initial sort, grouping and value columns.
    pub columns: ColumnModel,
}

impl Default for GridOptions {
    fn default() -> Self {
        GridOptions {
            tree_data: false,
            group_default_expanded: 0,
            group_maintain_order: false,
            group_include_footer: false,
            group_include_total_footer: false,
            group_remove_single_children: false,
            group_remove_lowest_single_children: false,
            group_agg_filtering: false,
            suppress_agg_filtered_only: false,
            exclude_children_when_tree_data_filtering: false,
            always_aggregate_at_root_level: false,
            pivot_mode: false,
            master_detail: false,
            delta_sort: true,
            row_selection: RowSelectionMode::Multiple,
            group_selects_children: false,
            row_height: DEFAULT_ROW_HEIGHT,
            async_transaction_wait_millis: DEFAULT_ASYNC_WAIT_MILLIS,
            columns: ColumnModel::default(),
        }
    }
}

impl GridOptions {
    pub fn from_json(json: &str) -> Result<Self, GridError> {
        let options: GridOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if !(self.row_height.is_finite() && self.row_height > 0.0) {
            return Err(GridError::InvalidOptions(format!("rowHeight must be positive, got {}", self.row_height)));
        }
        if self.group_default_expanded < -1 {
            return Err(GridError::InvalidOptions(format!(
                "groupDefaultExpanded must be -1 or more, got {}",
                self.group_default_expanded
            )));
        }
        Ok(())
    }

    /// Whether a new group at `level` starts expanded.
    pub fn is_expanded_by_default(&self, level: i32) -> bool {
        self.group_default_expanded == -1 || level < self.group_default_expanded
    }
}

// ============================================================================
// CALLBACKS
// ============================================================================

pub type GetRowIdFn = Rc<dyn Fn(&Record) -> Option<String>>;
pub type GetDataPathFn = Rc<dyn Fn(&Record) -> Vec<String>>;
pub type PostSortRowsFn = Rc<dyn Fn(&mut Vec<NodeId>, &RowNodeArena)>;
pub type IsRowSelectableFn = Rc<dyn Fn(&RowNode) -> bool>;
pub type IsRowMasterFn = Rc<dyn Fn(&Record) -> bool>;
pub type ExternalFilterFn = Rc<dyn Fn(&RowNode) -> bool>;
pub type CustomAggFn = Rc<dyn Fn(&[CellValue]) -> CellValue>;

/// Caller hooks. All optional.
#[derive(Clone, Default)]
pub struct GridCallbacks {
    pub get_row_id: Option<GetRowIdFn>,
    pub get_data_path: Option<GetDataPathFn>,
    pub post_sort_rows: Option<PostSortRowsFn>,
    pub is_row_selectable: Option<IsRowSelectableFn>,
    pub is_row_master: Option<IsRowMasterFn>,
    pub external_filter: Option<ExternalFilterFn>,
    pub agg_funcs: FxHashMap<String, CustomAggFn>,
}

impl GridCallbacks {
    pub fn new() -> Self {
        GridCallbacks::default()
    }

    pub fn with_get_row_id(mut self, f: impl Fn(&Record) -> Option<String> + 'static) -> Self {
        self.get_row_id = Some(Rc::new(f));
        self
    }

    /// Uses a field of the record as the row id.
    pub fn with_row_id_field(self, field: &str) -> Self {
        let field = field.to_string();
        self.with_get_row_id(move |data| {
            let value = data.get(&field);
            if value.is_empty() {
                None
            } else {
                Some(value.key())
            }
        })
    }

    pub fn with_get_data_path(mut self, f: impl Fn(&Record) -> Vec<String> + 'static) -> Self {
        self.get_data_path = Some(Rc::new(f));
        self
    }

    pub fn with_post_sort_rows(mut self, f: impl Fn(&mut Vec<NodeId>, &RowNodeArena) + 'static) -> Self {
        self.post_sort_rows = Some(Rc::new(f));
        self
    }

    pub fn with_is_row_selectable(mut self, f: impl Fn(&RowNode) -> bool + 'static) -> Self {
        self.is_row_selectable = Some(Rc::new(f));
        self
    }

    pub fn with_is_row_master(mut self, f: impl Fn(&Record) -> bool + 'static) -> Self {
        self.is_row_master = Some(Rc::new(f));
        self
    }

    pub fn with_external_filter(mut self, f: impl Fn(&RowNode) -> bool + 'static) -> Self {
        self.external_filter = Some(Rc::new(f));
        self
    }

    pub fn with_agg_func(mut self, name: &str, f: impl Fn(&[CellValue]) -> CellValue + 'static) -> Self {
        self.agg_funcs.insert(name.to_string(), Rc::new(f));
        self
    }

    /// Row id of a record, `None` when the callback is absent or yields no id.
    pub fn row_id_of(&self, data: &Record) -> Option<Option<String>> {
        self.get_row_id
            .as_ref()
            .map(|f| f(data).filter(|id| !id.is_empty()))
    }
}

impl fmt::Debug for GridCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridCallbacks")
            .field("get_row_id", &self.get_row_id.is_some())
            .field("get_data_path", &self.get_data_path.is_some())
            .field("post_sort_rows", &self.post_sort_rows.is_some())
            .field("is_row_selectable", &self.is_row_selectable.is_some())
            .field("is_row_master", &self.is_row_master.is_some())
            .field("external_filter", &self.external_filter.is_some())
            .field("agg_funcs", &self.agg_funcs.keys().collect::<Vec<_>>())
            .finish()
    }
}
