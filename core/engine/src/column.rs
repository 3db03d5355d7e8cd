//! FILENAME: core/engine/src/column.rs
//! PURPOSE: Column-level configuration consumed by the row model.
//! CONTEXT: Holds the sort model, the row group columns and the value
//! (aggregation) columns. `apply_column_state` mirrors the grid's
//! column-state API: only the attributes present in a state entry change.

use serde::{Deserialize, Serialize};

/// Column id of the auto-generated group column. Sorting on it orders groups
/// by their key.
pub const AUTO_GROUP_COLUMN_ID: &str = "ag-Grid-AutoColumn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One entry of the active sort model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOption {
    pub col_id: String,
    pub direction: SortDirection,
}

impl SortOption {
    pub fn asc(col_id: impl Into<String>) -> Self {
        SortOption { col_id: col_id.into(), direction: SortDirection::Asc }
    }

    pub fn desc(col_id: impl Into<String>) -> Self {
        SortOption { col_id: col_id.into(), direction: SortDirection::Desc }
    }

    pub fn is_ascending(&self) -> bool {
        self.direction == SortDirection::Asc
    }
}

/// Supported aggregation functions for value columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggFuncName {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    First,
    Last,
    /// A caller-registered function, looked up by name.
    Custom(String),
}

impl Default for AggFuncName {
    fn default() -> Self {
        AggFuncName::Sum
    }
}

/// A column that is aggregated on group rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueColumn {
    pub col_id: String,
    pub agg_func: AggFuncName,
}

impl ValueColumn {
    pub fn new(col_id: impl Into<String>, agg_func: AggFuncName) -> Self {
        ValueColumn { col_id: col_id.into(), agg_func }
    }
}

/// A partial column state. Fields left as `None` are not touched.
/// `sort: Some(None)` clears the sort of the column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnState {
    pub col_id: String,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub sort: Option<Option<SortDirection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_group_index: Option<usize>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub agg_func: Option<Option<AggFuncName>>,
}

impl ColumnState {
    pub fn new(col_id: impl Into<String>) -> Self {
        ColumnState { col_id: col_id.into(), ..Default::default() }
    }

    pub fn with_sort(mut self, sort: Option<SortDirection>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_sort_index(mut self, index: usize) -> Self {
        self.sort_index = Some(index);
        self
    }

    pub fn with_row_group(mut self, row_group: bool) -> Self {
        self.row_group = Some(row_group);
        self
    }

    pub fn with_agg_func(mut self, agg_func: Option<AggFuncName>) -> Self {
        self.agg_func = Some(agg_func);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStateParams {
    pub state: Vec<ColumnState>,
    /// When true, columns absent from `state` lose their sort.
    #[serde(default)]
    pub clear_other_sorts: bool,
}

/// What changed after applying column state. The row model uses this to pick
/// the first pipeline step that has to re-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnChanges {
    pub sort_changed: bool,
    pub row_group_changed: bool,
    pub agg_changed: bool,
}

impl ColumnChanges {
    pub fn any(&self) -> bool {
        self.sort_changed || self.row_group_changed || self.agg_changed
    }
}

/// Column configuration relevant to the row model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnModel {
    pub sort_model: Vec<SortOption>,
    pub row_group_columns: Vec<String>,
    pub value_columns: Vec<ValueColumn>,
}

impl ColumnModel {
    pub fn new() -> Self {
        ColumnModel::default()
    }

    pub fn is_row_group_column(&self, col_id: &str) -> bool {
        self.row_group_columns.iter().any(|c| c == col_id)
    }

    /// True if the sort model targets a grouping column (or the auto group column).
    pub fn sort_contains_group_columns(&self) -> bool {
        self.sort_model
            .iter()
            .any(|s| s.col_id == AUTO_GROUP_COLUMN_ID || self.is_row_group_column(&s.col_id))
    }

    pub fn apply_column_state(&mut self, params: &ColumnStateParams) -> ColumnChanges {
        let mut changes = ColumnChanges::default();

        // Sort
        let mut sorts: Vec<(usize, SortOption)> = Vec::new();
        let explicitly_stated: Vec<&str> = params
            .state
            .iter()
            .filter(|s| s.sort.is_some())
            .map(|s| s.col_id.as_str())
            .collect();

        for (pos, existing) in self.sort_model.iter().enumerate() {
            let keep = !params.clear_other_sorts && !explicitly_stated.contains(&existing.col_id.as_str());
            if keep {
                sorts.push((pos, existing.clone()));
            }
        }
        let base = self.sort_model.len();
        for (pos, state) in params.state.iter().enumerate() {
            if let Some(Some(direction)) = state.sort {
                let order = state.sort_index.unwrap_or(base + pos);
                sorts.push((order, SortOption { col_id: state.col_id.clone(), direction }));
            }
        }
        sorts.sort_by_key(|(order, _)| *order);
        let new_sort: Vec<SortOption> = sorts.into_iter().map(|(_, s)| s).collect();
        if new_sort != self.sort_model {
            self.sort_model = new_sort;
            changes.sort_changed = true;
        }

        // Row grouping
        let mut groups = self.row_group_columns.clone();
        for state in &params.state {
            match state.row_group {
                Some(true) => {
                    groups.retain(|c| c != &state.col_id);
                    let index = state.row_group_index.unwrap_or(groups.len()).min(groups.len());
                    groups.insert(index, state.col_id.clone());
                }
                Some(false) => groups.retain(|c| c != &state.col_id),
                None => {}
            }
        }
        if groups != self.row_group_columns {
            self.row_group_columns = groups;
            changes.row_group_changed = true;
        }

        // Aggregation
        for state in &params.state {
            if let Some(agg) = &state.agg_func {
                let before = self.value_columns.clone();
                self.value_columns.retain(|v| v.col_id != state.col_id);
                if let Some(agg_func) = agg {
                    self.value_columns.push(ValueColumn::new(state.col_id.clone(), agg_func.clone()));
                }
                if before != self.value_columns {
                    changes.agg_changed = true;
                }
            }
        }

        changes
    }
}

/// serde helper: distinguishes an absent attribute from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<Option<T>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<T>>, D::Error> {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_sort_state() {
        let mut model = ColumnModel::new();
        let changes = model.apply_column_state(&ColumnStateParams {
            state: vec![
                ColumnState::new("year").with_sort(Some(SortDirection::Desc)).with_sort_index(1),
                ColumnState::new("name").with_sort(Some(SortDirection::Asc)).with_sort_index(0),
            ],
            clear_other_sorts: false,
        });

        assert!(changes.sort_changed);
        assert_eq!(model.sort_model, vec![SortOption::asc("name"), SortOption::desc("year")]);

        let changes = model.apply_column_state(&ColumnStateParams {
            state: vec![ColumnState::new("name").with_sort(None)],
            clear_other_sorts: false,
        });
        assert!(changes.sort_changed);
        assert_eq!(model.sort_model, vec![SortOption::desc("year")]);
    }

    #[test]
    fn test_unchanged_state_reports_nothing() {
        let mut model = ColumnModel::new();
        model.sort_model.push(SortOption::asc("name"));
        let changes = model.apply_column_state(&ColumnStateParams {
            state: vec![ColumnState::new("name").with_sort(Some(SortDirection::Asc))],
            clear_other_sorts: false,
        });
        assert!(!changes.any());
    }

    #[test]
    fn test_row_group_and_agg_state() {
        let mut model = ColumnModel::new();
        let changes = model.apply_column_state(&ColumnStateParams {
            state: vec![
                ColumnState::new("country").with_row_group(true),
                ColumnState::new("gold").with_agg_func(Some(AggFuncName::Sum)),
            ],
            clear_other_sorts: false,
        });
        assert!(changes.row_group_changed);
        assert!(changes.agg_changed);
        assert_eq!(model.row_group_columns, vec!["country".to_string()]);
        assert_eq!(model.value_columns[0].col_id, "gold");
    }

    #[test]
    fn test_deserialize_null_sort() {
        let params: ColumnStateParams = serde_json::from_str(
            r#"{"state":[{"colId":"country","sort":null},{"colId":"year","sort":"asc"}]}"#,
        )
        .unwrap();
        assert_eq!(params.state[0].sort, Some(None));
        assert_eq!(params.state[1].sort, Some(Some(SortDirection::Asc)));
        assert_eq!(params.state[1].row_group, None);
    }
}
