//! FILENAME: core/engine/src/cell.rs
//! PURPOSE: Defines the value type held in a single field of a row.
//! CONTEXT: Every stage of the row model reads field values through `CellValue`.
//! Grouping turns them into string keys, the sort stage orders them, and the
//! aggregation stage folds the numeric ones.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Represents the raw data within one field of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the key used when this value becomes a group.
    /// Empty values all land in the same `""` group.
    pub fn key(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                // Format without unnecessary decimal places
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{:.0}", n)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => {
                if *b { "true" } else { "false" }.to_string()
            }
        }
    }

    /// Total order used by sorting.
    /// Empty < Number < Text < Boolean, NaN compares equal to everything numeric.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Empty, CellValue::Empty) => Ordering::Equal,
            (CellValue::Empty, _) => Ordering::Less,
            (_, CellValue::Empty) => Ordering::Greater,

            (CellValue::Number(a), CellValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (CellValue::Number(_), _) => Ordering::Less,
            (_, CellValue::Number(_)) => Ordering::Greater,

            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            (CellValue::Text(_), _) => Ordering::Less,
            (_, CellValue::Text(_)) => Ordering::Greater,

            (CellValue::Boolean(a), CellValue::Boolean(b)) => a.cmp(b),
        }
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_across_types() {
        let mut values = vec![
            CellValue::Boolean(false),
            CellValue::Text("b".into()),
            CellValue::Number(2.0),
            CellValue::Empty,
            CellValue::Number(-1.0),
            CellValue::Text("a".into()),
        ];
        values.sort_by(|a, b| a.compare(b));

        assert_eq!(
            values,
            vec![
                CellValue::Empty,
                CellValue::Number(-1.0),
                CellValue::Number(2.0),
                CellValue::Text("a".into()),
                CellValue::Text("b".into()),
                CellValue::Boolean(false),
            ]
        );
    }

    #[test]
    fn test_group_keys() {
        assert_eq!(CellValue::Number(2000.0).key(), "2000");
        assert_eq!(CellValue::Number(1.5).key(), "1.5");
        assert_eq!(CellValue::Empty.key(), "");
        assert_eq!(CellValue::from("Ireland").key(), "Ireland");
    }

    #[test]
    fn test_nan_is_stable() {
        let nan = CellValue::Number(f64::NAN);
        assert_eq!(nan.compare(&CellValue::Number(1.0)), Ordering::Equal);
    }
}
