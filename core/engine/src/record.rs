//! FILENAME: core/engine/src/record.rs
//! PURPOSE: The caller-supplied row record and the shared reference to it.
//! CONTEXT: Row nodes never own caller data. They hold a `RowData` (an `Rc`)
//! so that identity of the record can be checked with `Rc::ptr_eq` when no
//! row id function is configured.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::cell::CellValue;

/// Shared reference to a caller record.
pub type RowData = Rc<Record>;

static EMPTY: CellValue = CellValue::Empty;

/// A single caller record: named fields plus optional nested children
/// (used by tree data in nested mode).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: BTreeMap<String, CellValue>,
    pub children: Vec<RowData>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Builder-style nested children setter.
    pub fn with_children(mut self, children: Vec<RowData>) -> Self {
        self.children = children;
        self
    }

    /// Reads a field. Absent fields read as `CellValue::Empty`.
    pub fn get(&self, field: &str) -> &CellValue {
        self.fields.get(field).unwrap_or(&EMPTY)
    }

    pub fn get_text(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(CellValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn into_data(self) -> RowData {
        Rc::new(self)
    }
}

/// Returns true when both references point at the same record.
pub fn same_data(a: &RowData, b: &RowData) -> bool {
    Rc::ptr_eq(a, b)
}
