//! FILENAME: core/row-model/src/aggregation.rs
//! PURPOSE: Aggregation stage. Computes `agg_data` for group nodes bottom-up.
//! CONTEXT: Each group keeps one accumulator per value column. A parent merges
//! the accumulators of its child groups and adds the values of its leaves, so
//! averages stay exact across levels. Only groups on the changed path are
//! recomputed; the rest keep their cached values.

use engine::{log_debug, log_warn, AggFuncName, CellValue, ValueColumn};
use rustc_hash::FxHashMap;

use crate::changed_path::ChangedPath;
use crate::node::{NodeId, RowNodeArena};
use crate::options::CustomAggFn;

// ============================================================================
// ACCUMULATOR
// ============================================================================

/// Running aggregate over a set of values. Mergeable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateAccumulator {
    pub sum: f64,
    /// Rows contributing, numeric or not.
    pub count: u64,
    pub count_numbers: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub first: Option<CellValue>,
    pub last: Option<CellValue>,
}

impl AggregateAccumulator {
    pub fn new() -> Self {
        AggregateAccumulator::default()
    }

    pub fn add_value(&mut self, value: &CellValue) {
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(value.clone());
        }
        self.last = Some(value.clone());

        if let Some(n) = value.as_number() {
            self.count_numbers += 1;
            self.sum += n;
            self.min = Some(self.min.map_or(n, |m| m.min(n)));
            self.max = Some(self.max.map_or(n, |m| m.max(n)));
        }
    }

    pub fn merge(&mut self, other: &AggregateAccumulator) {
        if other.count == 0 {
            return;
        }
        self.sum += other.sum;
        self.count += other.count;
        self.count_numbers += other.count_numbers;

        if let Some(other_min) = other.min {
            self.min = Some(self.min.map_or(other_min, |m| m.min(other_min)));
        }
        if let Some(other_max) = other.max {
            self.max = Some(self.max.map_or(other_max, |m| m.max(other_max)));
        }
        if self.first.is_none() {
            self.first = other.first.clone();
        }
        if other.last.is_some() {
            self.last = other.last.clone();
        }
    }

    /// Final value for a built-in function. Numeric functions over no numbers
    /// give `Empty`.
    pub fn compute(&self, func: &AggFuncName) -> CellValue {
        let numeric = |v: f64| {
            if self.count_numbers > 0 {
                CellValue::Number(v)
            } else {
                CellValue::Empty
            }
        };
        match func {
            AggFuncName::Sum => numeric(self.sum),
            AggFuncName::Avg => numeric(self.sum / self.count_numbers.max(1) as f64),
            AggFuncName::Min => self.min.map_or(CellValue::Empty, CellValue::Number),
            AggFuncName::Max => self.max.map_or(CellValue::Empty, CellValue::Number),
            AggFuncName::Count => CellValue::Number(self.count as f64),
            AggFuncName::First => self.first.clone().unwrap_or_default(),
            AggFuncName::Last => self.last.clone().unwrap_or_default(),
            AggFuncName::Custom(_) => CellValue::Empty,
        }
    }
}

// ============================================================================
// STAGE
// ============================================================================

pub(crate) struct AggregationStage<'a> {
    pub arena: &'a mut RowNodeArena,
    pub value_columns: &'a [ValueColumn],
    pub custom_funcs: &'a FxHashMap<String, CustomAggFn>,
    /// Aggregate over `children_after_group` instead of the filtered children.
    pub use_unfiltered: bool,
    pub aggregate_root: bool,
}

impl AggregationStage<'_> {
    pub fn execute(&mut self, root: NodeId, path: &ChangedPath) {
        let mut recomputed = 0usize;
        self.aggregate(root, root, path, &mut recomputed);
        log_debug!("AGG", "recomputed {} groups", recomputed);
    }

    fn aggregate(&mut self, handle: NodeId, root: NodeId, path: &ChangedPath, recomputed: &mut usize) {
        if path.can_skip(handle) {
            return;
        }
        let node = &self.arena[handle];
        let children = if self.use_unfiltered {
            node.children_after_group.clone()
        } else {
            node.children_after_filter.clone()
        }
        .unwrap_or_default();

        for child in &children {
            if self.arena[*child].has_children() {
                self.aggregate(*child, root, path, recomputed);
            }
        }

        if self.value_columns.is_empty() || (handle == root && !self.aggregate_root) {
            let node = &mut self.arena[handle];
            node.agg_data = None;
            node.agg_accumulators = None;
            return;
        }

        let mut accumulators: FxHashMap<String, AggregateAccumulator> = FxHashMap::default();
        let mut agg_data: FxHashMap<String, CellValue> = FxHashMap::default();
        for column in self.value_columns {
            let mut acc = AggregateAccumulator::new();
            let mut child_values: Vec<CellValue> = Vec::new();
            for child in &children {
                let c = &self.arena[*child];
                let child_acc = if c.has_children() {
                    c.agg_accumulators.as_ref().and_then(|a| a.get(&column.col_id))
                } else {
                    None
                };
                match child_acc {
                    Some(child_acc) => acc.merge(child_acc),
                    None if c.has_children() => {}
                    None => acc.add_value(c.data.as_ref().map_or(&CellValue::Empty, |d| d.get(&column.col_id))),
                }
                if let AggFuncName::Custom(_) = column.agg_func {
                    child_values.push(c.get_value(&column.col_id).clone());
                }
            }

            let value = match &column.agg_func {
                AggFuncName::Custom(name) => match self.custom_funcs.get(name) {
                    Some(f) => f(&child_values),
                    None => {
                        log_warn!("AGG", "unknown aggregation function '{}' for {}", name, column.col_id);
                        CellValue::Empty
                    }
                },
                builtin => acc.compute(builtin),
            };
            agg_data.insert(column.col_id.clone(), value);
            accumulators.insert(column.col_id.clone(), acc);
        }

        let node = &mut self.arena[handle];
        node.agg_data = Some(agg_data);
        node.agg_accumulators = Some(accumulators);
        *recomputed += 1;
    }
}
