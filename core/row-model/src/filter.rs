//! FILENAME: core/row-model/src/filter.rs
//! PURPOSE: Filter model and the two filter passes of the pipeline.
//! CONTEXT: The filter pass reads `children_after_group` and writes
//! `children_after_filter` and `all_children_count`. The aggregate filter pass
//! runs after aggregation, reads `children_after_filter` and writes
//! `children_after_agg_filter`. Both skip subtrees the changed path allows.

use std::collections::BTreeMap;

use engine::{log_debug, CellValue, Record};
use serde::{Deserialize, Serialize};

use crate::changed_path::ChangedPath;
use crate::node::{NodeId, RowNode, RowNodeArena};
use crate::options::ExternalFilterFn;

// ============================================================================
// FILTER MODEL
// ============================================================================

/// Condition applied to one column. Text comparisons ignore case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterCondition {
    Equals { value: CellValue },
    NotEqual { value: CellValue },
    Contains { text: String },
    StartsWith { text: String },
    GreaterThan { value: f64 },
    LessThan { value: f64 },
    /// Inclusive on both ends.
    InRange { from: f64, to: f64 },
    Blank,
    NotBlank,
    /// Set filter: the value's key must be one of `values`.
    In { values: Vec<CellValue> },
}

impl FilterCondition {
    pub fn matches(&self, value: &CellValue) -> bool {
        match self {
            FilterCondition::Equals { value: expected } => values_equal(value, expected),
            FilterCondition::NotEqual { value: expected } => !values_equal(value, expected),
            FilterCondition::Contains { text } => value.key().to_lowercase().contains(&text.to_lowercase()),
            FilterCondition::StartsWith { text } => value.key().to_lowercase().starts_with(&text.to_lowercase()),
            FilterCondition::GreaterThan { value: bound } => value.as_number().map_or(false, |n| n > *bound),
            FilterCondition::LessThan { value: bound } => value.as_number().map_or(false, |n| n < *bound),
            FilterCondition::InRange { from, to } => value.as_number().map_or(false, |n| n >= *from && n <= *to),
            FilterCondition::Blank => value.is_empty(),
            FilterCondition::NotBlank => !value.is_empty(),
            FilterCondition::In { values } => values.iter().any(|v| values_equal(value, v)),
        }
    }
}

fn values_equal(a: &CellValue, b: &CellValue) -> bool {
    match (a, b) {
        (CellValue::Text(x), CellValue::Text(y)) => x.eq_ignore_ascii_case(y),
        _ => a.compare(b) == std::cmp::Ordering::Equal,
    }
}

/// Column conditions (all must pass) plus an optional quick filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterModel {
    pub columns: BTreeMap<String, FilterCondition>,
    /// Matches when any field contains the text.
    pub quick_filter: Option<String>,
}

impl FilterModel {
    pub fn new() -> Self {
        FilterModel::default()
    }

    pub fn with_condition(mut self, col_id: &str, condition: FilterCondition) -> Self {
        self.columns.insert(col_id.to_string(), condition);
        self
    }

    pub fn with_quick_filter(mut self, text: &str) -> Self {
        self.quick_filter = Some(text.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.quick_filter.as_deref().map_or(true, |q| q.trim().is_empty())
    }

    pub fn passes(&self, record: &Record) -> bool {
        self.passes_with(|col| record.get(col)) && self.passes_quick_filter(record)
    }

    /// Column conditions only, reading values through `value_of`.
    pub fn passes_with<'a>(&self, value_of: impl Fn(&str) -> &'a CellValue) -> bool {
        self.columns.iter().all(|(col, condition)| condition.matches(value_of(col)))
    }

    pub(crate) fn passes_quick_filter(&self, record: &Record) -> bool {
        let text = match self.quick_filter.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_lowercase(),
            _ => return true,
        };
        record.fields.values().any(|v| v.key().to_lowercase().contains(&text))
    }
}

// ============================================================================
// FILTER PASS
// ============================================================================

pub(crate) struct FilterStage<'a> {
    pub arena: &'a mut RowNodeArena,
    pub filter: &'a FilterModel,
    pub external: Option<&'a ExternalFilterFn>,
    pub tree_data: bool,
    pub exclude_children_when_tree_data_filtering: bool,
    /// Column conditions are left to the aggregate filter pass.
    pub defer_column_filters: bool,
}

impl FilterStage<'_> {
    pub fn is_active(&self) -> bool {
        !self.filter.is_empty() || self.external.is_some()
    }

    /// Evaluates the row predicate. `None` for nodes without data.
    fn node_passes(&self, node: &RowNode) -> Option<bool> {
        let data = node.data.as_ref()?;
        let own = if self.defer_column_filters {
            self.filter.passes_quick_filter(data)
        } else {
            self.filter.passes(data)
        };
        let passes = own && self.external.map_or(true, |f| f(node));
        Some(passes)
    }

    pub fn execute(&mut self, root: NodeId, path: &ChangedPath) {
        if self.tree_data {
            self.filter_tree(root, false, path);
        } else {
            self.filter_group(root, path);
        }
        log_debug!("FILTER", "filtered, active={} tree={}", self.is_active(), self.tree_data);
    }

    fn filter_group(&mut self, handle: NodeId, path: &ChangedPath) {
        if path.can_skip(handle) {
            return;
        }
        let children = self.arena[handle].children_after_group.clone().unwrap_or_default();
        for child in &children {
            if self.arena[*child].has_children() {
                self.filter_group(*child, path);
            }
        }

        let kept: Vec<NodeId> = if !self.is_active() {
            children
        } else {
            children
                .into_iter()
                .filter(|c| {
                    let node = &self.arena[*c];
                    if node.group && node.data.is_none() {
                        node.children_after_filter.as_ref().map_or(false, |k| !k.is_empty())
                    } else {
                        self.node_passes(node).unwrap_or(true)
                    }
                })
                .collect()
        };
        self.finish(handle, kept);
    }

    fn filter_tree(&mut self, handle: NodeId, included_by_parent: bool, path: &ChangedPath) {
        let skippable = path.can_skip(handle) && self.arena[handle].included_by_parent == included_by_parent;
        if skippable {
            return;
        }
        self.arena[handle].included_by_parent = included_by_parent;

        let children = self.arena[handle].children_after_group.clone().unwrap_or_default();
        let active = self.is_active();
        let own = if active { self.node_passes(&self.arena[handle]) } else { None };
        let include_all = !active
            || included_by_parent
            || (!self.exclude_children_when_tree_data_filtering && own == Some(true));

        for child in &children {
            if self.arena[*child].has_children() {
                self.filter_tree(*child, include_all, path);
            }
        }

        let kept: Vec<NodeId> = if include_all {
            children
        } else {
            children.into_iter().filter(|c| self.tree_child_kept(*c)).collect()
        };
        self.finish(handle, kept);
    }

    fn tree_child_kept(&self, child: NodeId) -> bool {
        let node = &self.arena[child];
        let has_kept_children = node.has_children()
            && node.children_after_filter.as_ref().map_or(false, |k| !k.is_empty());
        match self.node_passes(node) {
            Some(true) => true,
            Some(false) if self.exclude_children_when_tree_data_filtering => false,
            Some(false) | None => has_kept_children,
        }
    }

    fn finish(&mut self, handle: NodeId, kept: Vec<NodeId>) {
        let count: usize = kept
            .iter()
            .map(|c| {
                let node = &self.arena[*c];
                let below = if node.has_children() { node.all_children_count.unwrap_or(0) } else { 0 };
                let own = usize::from(node.data.is_some());
                below + own
            })
            .sum();
        self.arena[handle].children_after_filter = Some(kept);
        self.arena.set_all_children_count(handle, Some(count));
    }
}

// ============================================================================
// AGGREGATE FILTER PASS
// ============================================================================

pub(crate) struct AggFilterStage<'a> {
    pub arena: &'a mut RowNodeArena,
    pub filter: &'a FilterModel,
    /// Filter groups on their aggregate values.
    pub group_agg_filtering: bool,
}

impl AggFilterStage<'_> {
    pub fn execute(&mut self, root: NodeId, path: &ChangedPath) {
        let filtering = self.group_agg_filtering && !self.filter.columns.is_empty();
        if filtering {
            // Group inclusion flows top-down, nothing can be skipped.
            self.filter_aggregates(root, false);
        } else {
            self.copy_filtered(root, path);
        }
    }

    fn copy_filtered(&mut self, handle: NodeId, path: &ChangedPath) {
        if path.can_skip(handle) {
            return;
        }
        let children = self.arena[handle].children_after_filter.clone().unwrap_or_default();
        for child in &children {
            if self.arena[*child].has_children() {
                self.copy_filtered(*child, path);
            }
        }
        self.arena[handle].children_after_agg_filter = Some(children);
    }

    /// Groups are tested on their aggregates, leaves on their data.
    fn node_passes(&self, node: &RowNode) -> bool {
        self.filter.passes_with(|col| node.get_value(col))
    }

    fn filter_aggregates(&mut self, handle: NodeId, include_all: bool) {
        let children = self.arena[handle].children_after_filter.clone().unwrap_or_default();
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            if !self.arena[child].has_children() {
                if include_all || self.node_passes(&self.arena[child]) {
                    kept.push(child);
                }
                continue;
            }
            let passes = include_all || self.node_passes(&self.arena[child]);
            self.filter_aggregates(child, passes);
            let has_kept = self.arena[child]
                .children_after_agg_filter
                .as_ref()
                .map_or(false, |k| !k.is_empty());
            if passes || has_kept {
                kept.push(child);
            }
        }
        self.arena[handle].children_after_agg_filter = Some(kept);
    }
}
