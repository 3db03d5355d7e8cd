//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Shared types for the client-side row model.
//! CONTEXT: Re-exports the value, record, column and error types used by the
//! `row-model` and `row-selection` crates, plus the logging macros.

pub mod cell;
pub mod column;
pub mod error;
pub mod logging;
pub mod record;

// Re-export commonly used types at the crate root
pub use cell::CellValue;
pub use column::{
    AggFuncName, ColumnChanges, ColumnModel, ColumnState, ColumnStateParams, SortDirection,
    SortOption, ValueColumn, AUTO_GROUP_COLUMN_ID,
};
pub use error::{ErrorCode, GridError};
pub use record::{same_data, Record, RowData};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_records() {
        let data = Record::new().with("country", "Ireland").with("year", 2000).into_data();
        assert_eq!(data.get("year"), &CellValue::Number(2000.0));
        assert_eq!(data.get("country").key(), "Ireland");
    }

    #[test]
    fn it_reports_error_codes() {
        let err = GridError::DuplicateRowId("a".to_string());
        assert_eq!(err.code(), ErrorCode::DuplicateRowId);
        assert_eq!(err.to_string(), "Duplicate row id on add: a");
    }
}
