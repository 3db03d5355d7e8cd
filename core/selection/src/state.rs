//! FILENAME: core/selection/src/state.rs
//! PURPOSE: Wire format of the server-side selection state.
//! CONTEXT: Two shapes, one per strategy:
//! - flat: `{"selectAll": bool, "toggledNodes": [id]}`
//! - recursive: `{"nodeId"?: id, "selectAllChildren"?: bool, "toggledNodes"?: [state]}`
//!
//! Both are parsed from `serde_json::Value` by hand so that every malformed
//! input maps to its own `SelectionError`.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SelectionError;

// ============================================================================
// FLAT STATE
// ============================================================================

/// Selection of the flat strategy: a node is selected when exactly one of
/// `select_all` and "id is toggled" holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub select_all: bool,
    pub toggled_nodes: Vec<String>,
}

impl SelectionState {
    pub fn from_json(value: &Value) -> Result<Self, SelectionError> {
        let object = value.as_object().ok_or(SelectionError::NotAnObject)?;
        let select_all = object
            .get("selectAll")
            .and_then(Value::as_bool)
            .ok_or(SelectionError::SelectAllNotBoolean)?;
        let toggled = object
            .get("toggledNodes")
            .and_then(Value::as_array)
            .ok_or(SelectionError::ToggledNodesNotArray)?;

        let mut toggled_nodes = Vec::with_capacity(toggled.len());
        for (index, id) in toggled.iter().enumerate() {
            let id = id.as_str().ok_or(SelectionError::ToggledNodeNotString { index })?;
            toggled_nodes.push(id.to_string());
        }
        Ok(SelectionState { select_all, toggled_nodes })
    }
}

// ============================================================================
// RECURSIVE STATE
// ============================================================================

/// One level of the group-selects-children toggle tree. The root has no
/// `node_id`; every nested entry must have one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecursiveSelectionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_all_children: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggled_nodes: Option<Vec<RecursiveSelectionState>>,
}

impl RecursiveSelectionState {
    /// Parses and validates a recursive state. Nested entries must carry
    /// `selectAllChildren`, and an entry that repeats its parent's value
    /// without toggled children of its own is rejected as redundant.
    pub fn from_json(value: &Value) -> Result<Self, SelectionError> {
        parse_recursive(value, None)
    }

    /// Number of entries that switch selection on below a deselected parent.
    pub fn selected_entry_count(&self) -> usize {
        fn count(state: &RecursiveSelectionState, parent: bool) -> usize {
            let value = state.select_all_children.unwrap_or(parent);
            let own = usize::from(value && !parent);
            own + state.toggled_nodes.iter().flatten().map(|c| count(c, value)).sum::<usize>()
        }
        count(self, false)
    }
}

/// `parent` is the parent's effective `selectAllChildren`, `None` at the root.
fn parse_recursive(value: &Value, parent: Option<bool>) -> Result<RecursiveSelectionState, SelectionError> {
    let object: &Map<String, Value> = value.as_object().ok_or(SelectionError::NotAnObject)?;

    let node_id = match object.get("nodeId") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id.clone()),
        Some(_) => return Err(SelectionError::NodeIdNotString),
    };
    if parent.is_some() && node_id.is_none() {
        return Err(SelectionError::MissingNodeId);
    }

    let select_all_children = match object.get("selectAllChildren") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => return Err(SelectionError::SelectAllChildrenNotBoolean),
    };
    let effective = match (parent, select_all_children) {
        (None, value) => value.unwrap_or(false),
        (Some(_), Some(value)) => value,
        (Some(_), None) => {
            return Err(SelectionError::MissingSelectAllChildren(node_id.unwrap_or_default()));
        }
    };

    let toggled_nodes = match object.get("toggledNodes") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            let mut children = Vec::with_capacity(items.len());
            for item in items {
                let child = parse_recursive(item, Some(effective))?;
                if let Some(id) = item.get("nodeId").and_then(Value::as_str) {
                    if !seen.insert(id) {
                        return Err(SelectionError::DuplicateNodeId(id.to_string()));
                    }
                }
                children.push(child);
            }
            Some(children)
        }
        Some(_) => return Err(SelectionError::ToggledNodesNotArray),
    };

    let has_toggled = toggled_nodes.as_ref().map_or(false, |c| !c.is_empty());
    if parent == Some(effective) && !has_toggled {
        return Err(SelectionError::RedundantState(node_id.unwrap_or_default()));
    }

    Ok(RecursiveSelectionState { node_id, select_all_children, toggled_nodes })
}

// ============================================================================
// EITHER SHAPE
// ============================================================================

/// State as exchanged with the server, in the shape of the active strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerSideSelectionState {
    Flat(SelectionState),
    Recursive(RecursiveSelectionState),
}

impl ServerSideSelectionState {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_state_parses() {
        let state = SelectionState::from_json(&json!({"selectAll": true, "toggledNodes": ["a", "b"]})).unwrap();
        assert!(state.select_all);
        assert_eq!(state.toggled_nodes, vec!["a", "b"]);
    }

    #[test]
    fn test_flat_state_errors() {
        let cases = [
            (json!([]), SelectionError::NotAnObject),
            (json!({"toggledNodes": []}), SelectionError::SelectAllNotBoolean),
            (json!({"selectAll": "yes", "toggledNodes": []}), SelectionError::SelectAllNotBoolean),
            (json!({"selectAll": false}), SelectionError::ToggledNodesNotArray),
            (json!({"selectAll": false, "toggledNodes": "a"}), SelectionError::ToggledNodesNotArray),
            (
                json!({"selectAll": false, "toggledNodes": ["a", 7]}),
                SelectionError::ToggledNodeNotString { index: 1 },
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(SelectionState::from_json(&input), Err(expected), "input {}", input);
        }
    }

    #[test]
    fn test_recursive_state_parses() {
        let input = json!({
            "selectAllChildren": false,
            "toggledNodes": [
                {"nodeId": "g1", "selectAllChildren": true},
                {"nodeId": "g2", "selectAllChildren": false, "toggledNodes": [{"nodeId": "x", "selectAllChildren": true}]}
            ]
        });
        let state = RecursiveSelectionState::from_json(&input).unwrap();
        assert_eq!(state.node_id, None);
        let children = state.toggled_nodes.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].select_all_children, Some(false));
        assert_eq!(children[1].toggled_nodes.as_ref().unwrap()[0].node_id.as_deref(), Some("x"));
    }

    #[test]
    fn test_recursive_state_errors() {
        let cases = [
            (json!("x"), SelectionError::NotAnObject),
            (json!({"nodeId": 3}), SelectionError::NodeIdNotString),
            (json!({"selectAllChildren": 1}), SelectionError::SelectAllChildrenNotBoolean),
            (json!({"toggledNodes": {}}), SelectionError::ToggledNodesNotArray),
            (json!({"toggledNodes": [{"selectAllChildren": true}]}), SelectionError::MissingNodeId),
            (json!({"toggledNodes": [3]}), SelectionError::NotAnObject),
            (
                json!({"toggledNodes": [{"nodeId": "a", "selectAllChildren": true}, {"nodeId": "a", "selectAllChildren": true}]}),
                SelectionError::DuplicateNodeId("a".to_string()),
            ),
            (
                json!({"toggledNodes": [{"nodeId": "a"}]}),
                SelectionError::MissingSelectAllChildren("a".to_string()),
            ),
            (
                json!({"selectAllChildren": true, "toggledNodes": [{"nodeId": "a", "selectAllChildren": true}]}),
                SelectionError::RedundantState("a".to_string()),
            ),
            (
                json!({"toggledNodes": [{"nodeId": "a", "selectAllChildren": false, "toggledNodes": []}]}),
                SelectionError::RedundantState("a".to_string()),
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(RecursiveSelectionState::from_json(&input), Err(expected), "input {}", input);
        }
    }

    #[test]
    fn test_intermediate_levels_are_not_redundant() {
        // "g" repeats the root's value but carries a toggled child.
        let input = json!({
            "selectAllChildren": false,
            "toggledNodes": [
                {"nodeId": "g", "selectAllChildren": false, "toggledNodes": [{"nodeId": "x", "selectAllChildren": true}]},
                {"nodeId": "h", "selectAllChildren": true}
            ]
        });
        let state = RecursiveSelectionState::from_json(&input).unwrap();
        assert_eq!(state.selected_entry_count(), 2);
    }

    #[test]
    fn test_serialized_shapes() {
        let flat = ServerSideSelectionState::Flat(SelectionState {
            select_all: false,
            toggled_nodes: vec!["a".to_string()],
        });
        assert_eq!(flat.to_json(), json!({"selectAll": false, "toggledNodes": ["a"]}));

        let recursive = ServerSideSelectionState::Recursive(RecursiveSelectionState {
            node_id: None,
            select_all_children: Some(true),
            toggled_nodes: None,
        });
        assert_eq!(recursive.to_json(), json!({"selectAllChildren": true}));
    }
}
