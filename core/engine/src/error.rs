//! FILENAME: core/engine/src/error.rs
//! PURPOSE: Error taxonomy for caller input problems reported by the row model.
//! CONTEXT: None of these abort a call. The offending sub-operation is skipped,
//! the error is logged and returned to the caller in the call's result.

use serde::Serialize;
use thiserror::Error;

/// Stable, distinguishable code per error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DuplicateRowId,
    UpdateRowNotFound,
    RemoveRowNotFound,
    MissingRowId,
    InvalidRowNode,
    InvalidOptions,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Duplicate row id on add: {0}")]
    DuplicateRowId(String),

    #[error("Could not find row id={0} to update")]
    UpdateRowNotFound(String),

    #[error("Could not find row id={0} to remove")]
    RemoveRowNotFound(String),

    #[error("Row id function returned no id for a row, row skipped")]
    MissingRowId,

    #[error("Row node is not part of this model: {0}")]
    InvalidRowNode(String),

    #[error("Invalid grid options: {0}")]
    InvalidOptions(String),
}

impl GridError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GridError::DuplicateRowId(_) => ErrorCode::DuplicateRowId,
            GridError::UpdateRowNotFound(_) => ErrorCode::UpdateRowNotFound,
            GridError::RemoveRowNotFound(_) => ErrorCode::RemoveRowNotFound,
            GridError::MissingRowId => ErrorCode::MissingRowId,
            GridError::InvalidRowNode(_) => ErrorCode::InvalidRowNode,
            GridError::InvalidOptions(_) => ErrorCode::InvalidOptions,
        }
    }
}

impl From<serde_json::Error> for GridError {
    fn from(e: serde_json::Error) -> Self {
        GridError::InvalidOptions(e.to_string())
    }
}
