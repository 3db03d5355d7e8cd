//! FILENAME: core/selection/src/error.rs
//! PURPOSE: Errors for rejected selection calls and malformed selection state.
//! CONTEXT: A rejected call leaves the stored selection untouched. Each
//! violation of the state format has its own variant so callers can tell
//! which rule was broken.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Cannot select multiple rows when row selection is set to single")]
    MultipleNodesInSingleMode,

    #[error("Selection state must be an object")]
    NotAnObject,

    #[error("selectAll must be a boolean")]
    SelectAllNotBoolean,

    #[error("toggledNodes must be an array")]
    ToggledNodesNotArray,

    #[error("toggledNodes[{index}] must be a string")]
    ToggledNodeNotString { index: usize },

    #[error("nodeId must be a string")]
    NodeIdNotString,

    #[error("selectAllChildren must be a boolean")]
    SelectAllChildrenNotBoolean,

    #[error("Nested selection state has no nodeId")]
    MissingNodeId,

    #[error("Node id {0} appears more than once under the same parent")]
    DuplicateNodeId(String),

    #[error("Nested selection state for {0} has no selectAllChildren")]
    MissingSelectAllChildren(String),

    #[error("Selection state for {0} repeats its parent and toggles nothing")]
    RedundantState(String),
}
