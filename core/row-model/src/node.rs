//! FILENAME: core/row-model/src/node.rs
//! PURPOSE: The RowNode entity and the arena that owns every node of a model.
//! CONTEXT: Nodes reference each other by `NodeId`. A parent owns its children
//! positionally through its child arrays; the child's `parent` field is a plain
//! back-reference used for traversal only. Handles are never reused, so two
//! equal `NodeId`s always denote the same node instance.
//!
//! FIELD OWNERSHIP (each field has exactly one writing stage):
//! - `all_leaf_children` on the root: transaction applier / full load
//! - `all_leaf_children` on groups, `children_after_group`, `children_map`,
//!   `parent`, `level`, `group`, `leaf_group`, `key`, `group_value`: group/tree stage
//! - `children_after_filter`, `all_children_count`: filter stage
//! - `agg_data`: aggregation stage
//! - `children_after_agg_filter`: aggregate filter pass
//! - `children_after_sort`, `first_child`, `last_child`, `child_index`: sort stage
//! - `row_index`, `row_top`, `old_row_top`, `ui_level`: flattener
//! - `selected`: selection service

use std::ops::{Index, IndexMut};

use engine::{CellValue, RowData};
use rustc_hash::FxHashMap;

use crate::aggregation::AggregateAccumulator;

pub const ROOT_NODE_ID: &str = "ROOT_NODE_ID";
pub const GROUP_ID_PREFIX: &str = "row-group-";
pub const PINNED_TOP_ID_PREFIX: &str = "t-";
pub const PINNED_BOTTOM_ID_PREFIX: &str = "b-";
pub const FOOTER_ID_PREFIX: &str = "rowGroupFooter_";
pub const DETAIL_ID_PREFIX: &str = "detail_";

// ============================================================================
// HANDLES & EVENTS
// ============================================================================

/// Handle of a node inside a `RowNodeArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowPinned {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowNodeEventKind {
    FirstChildChanged,
    LastChildChanged,
    ChildIndexChanged,
    RowIndexChanged,
    TopChanged,
    UiLevelChanged,
    DataChanged,
    ExpandedChanged,
    SelectionChanged,
    AllChildrenCountChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowNodeEvent {
    pub node: NodeId,
    pub kind: RowNodeEventKind,
}

/// Identifier returned by `RowNodeListeners::add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&RowNodeEvent)>;

/// Observers of node events, scoped to one model. Delivery is synchronous and
/// in subscription order.
#[derive(Default)]
pub struct RowNodeListeners {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

impl RowNodeListeners {
    pub fn add(&mut self, listener: impl FnMut(&RowNodeEvent) + 'static) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        before != self.listeners.len()
    }

    pub fn dispatch(&mut self, events: &[RowNodeEvent]) {
        for event in events {
            for (_, listener) in self.listeners.iter_mut() {
                listener(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for RowNodeListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowNodeListeners").field("count", &self.listeners.len()).finish()
    }
}

// ============================================================================
// ROW NODE
// ============================================================================

/// The unit entity of the row model.
#[derive(Debug, Clone)]
pub struct RowNode {
    /// This node's own handle.
    pub handle: NodeId,
    /// Row id, stable for the node's life (except through `set_data_and_id`).
    pub id: String,
    pub data: Option<RowData>,

    pub parent: Option<NodeId>,
    pub level: i32,
    pub ui_level: i32,

    pub group: bool,
    pub leaf_group: bool,
    pub footer: bool,
    pub sibling: Option<NodeId>,
    pub master: bool,
    pub detail: bool,
    pub detail_node: Option<NodeId>,
    pub row_pinned: Option<RowPinned>,

    /// Group key (group value as a string), also set on tree-data nodes.
    pub key: Option<String>,
    pub group_value: CellValue,
    pub row_group_column: Option<String>,

    pub all_leaf_children: Option<Vec<NodeId>>,
    pub children_after_group: Option<Vec<NodeId>>,
    pub children_after_filter: Option<Vec<NodeId>>,
    pub children_after_agg_filter: Option<Vec<NodeId>>,
    pub children_after_sort: Option<Vec<NodeId>>,
    /// Child groups by key (row grouping only).
    pub children_map: Option<FxHashMap<String, NodeId>>,
    /// Number of leaf descendants that passed the filter.
    pub all_children_count: Option<usize>,

    pub agg_data: Option<FxHashMap<String, CellValue>>,
    pub(crate) agg_accumulators: Option<FxHashMap<String, AggregateAccumulator>>,

    pub row_index: Option<usize>,
    pub row_top: Option<f64>,
    pub old_row_top: Option<f64>,

    pub selectable: bool,
    /// `Some(true)`/`Some(false)`, or `None` for a partially selected group.
    pub selected: Option<bool>,
    pub expanded: bool,

    pub first_child: bool,
    pub last_child: bool,
    pub child_index: usize,

    /// Position in the root's `all_leaf_children`.
    pub source_row_index: usize,
    /// Structural parent for nested tree data.
    pub tree_parent: Option<NodeId>,
    /// Inclusion flag the filter stage last received from the ancestors.
    pub(crate) included_by_parent: bool,

    pub destroyed: bool,
    pub daemon: bool,
}

impl RowNode {
    fn new(handle: NodeId, id: String, data: Option<RowData>) -> Self {
        RowNode {
            handle,
            id,
            data,
            parent: None,
            level: 0,
            ui_level: 0,
            group: false,
            leaf_group: false,
            footer: false,
            sibling: None,
            master: false,
            detail: false,
            detail_node: None,
            row_pinned: None,
            key: None,
            group_value: CellValue::Empty,
            row_group_column: None,
            all_leaf_children: None,
            children_after_group: None,
            children_after_filter: None,
            children_after_agg_filter: None,
            children_after_sort: None,
            children_map: None,
            all_children_count: None,
            agg_data: None,
            agg_accumulators: None,
            row_index: None,
            row_top: None,
            old_row_top: None,
            selectable: true,
            selected: Some(false),
            expanded: false,
            first_child: false,
            last_child: false,
            child_index: 0,
            source_row_index: 0,
            tree_parent: None,
            included_by_parent: false,
            destroyed: false,
            daemon: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_NODE_ID
    }

    /// A group without caller data (row-group or tree-data filler).
    pub fn is_filler(&self) -> bool {
        self.group && self.data.is_none()
    }

    pub fn has_children(&self) -> bool {
        self.children_after_group.as_ref().map_or(false, |c| !c.is_empty())
    }

    pub fn is_selected(&self) -> Option<bool> {
        self.selected
    }

    /// Read a field the way the grid shows it: aggregate value on groups,
    /// data value otherwise.
    pub fn get_value(&self, col_id: &str) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        if let Some(value) = self.agg_data.as_ref().and_then(|agg| agg.get(col_id)) {
            return value;
        }
        if self.group && self.row_group_column.as_deref() == Some(col_id) {
            return &self.group_value;
        }
        match &self.data {
            Some(data) => data.get(col_id),
            None => &EMPTY,
        }
    }
}

// ============================================================================
// ARENA
// ============================================================================

/// Owns every node of a model, live or detached.
#[derive(Debug, Default)]
pub struct RowNodeArena {
    nodes: FxHashMap<NodeId, RowNode>,
    next_handle: u32,
    by_row_id: FxHashMap<String, NodeId>,
    events: Vec<RowNodeEvent>,
}

impl RowNodeArena {
    pub fn new() -> Self {
        RowNodeArena::default()
    }

    fn allocate(&mut self, id: String, data: Option<RowData>) -> NodeId {
        let handle = NodeId(self.next_handle);
        self.next_handle += 1;
        self.nodes.insert(handle, RowNode::new(handle, id, data));
        handle
    }

    /// Creates a node and makes it resolvable by its row id.
    pub fn create_node(&mut self, id: String, data: Option<RowData>) -> NodeId {
        let handle = self.allocate(id.clone(), data);
        self.by_row_id.insert(id, handle);
        handle
    }

    /// Creates a node that is not resolvable by row id (footers, details,
    /// pinned rows, daemons).
    pub fn create_detached(&mut self, id: String, data: Option<RowData>) -> NodeId {
        self.allocate(id, data)
    }

    pub fn get(&self, handle: NodeId) -> Option<&RowNode> {
        self.nodes.get(&handle)
    }

    pub fn get_mut(&mut self, handle: NodeId) -> Option<&mut RowNode> {
        self.nodes.get_mut(&handle)
    }

    pub fn contains(&self, handle: NodeId) -> bool {
        self.nodes.contains_key(&handle)
    }

    /// Resolves a live node by row id.
    pub fn lookup(&self, row_id: &str) -> Option<NodeId> {
        self.by_row_id.get(row_id).copied()
    }

    pub fn register(&mut self, handle: NodeId) {
        if let Some(node) = self.nodes.get(&handle) {
            self.by_row_id.insert(node.id.clone(), handle);
        }
    }

    pub fn unregister(&mut self, handle: NodeId) {
        if let Some(node) = self.nodes.get(&handle) {
            if self.by_row_id.get(&node.id) == Some(&handle) {
                self.by_row_id.remove(&node.id);
            }
        }
    }

    pub fn is_registered(&self, handle: NodeId) -> bool {
        self.nodes
            .get(&handle)
            .map_or(false, |n| self.by_row_id.get(&n.id) == Some(&handle))
    }

    /// Marks a node as destroyed and detaches it from the id index. The node
    /// stays readable (the last parent is kept) until `release_detached`.
    /// A group's footer and a master's detail row go with it.
    pub fn destroy(&mut self, handle: NodeId) {
        self.unregister(handle);
        let companions = match self.nodes.get_mut(&handle) {
            Some(node) => {
                node.destroyed = true;
                node.row_index = None;
                let footer = if node.footer { None } else { node.sibling.take() };
                [footer, node.detail_node.take()]
            }
            None => return,
        };
        for companion in companions.into_iter().flatten() {
            if let Some(node) = self.nodes.get_mut(&companion) {
                node.destroyed = true;
                node.row_index = None;
            }
        }
    }

    /// Drops destroyed and daemon nodes. Handles to them become dangling.
    pub fn release_detached(&mut self) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, n| !n.destroyed && !n.daemon);
        before - self.nodes.len()
    }

    /// Number of nodes stored, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes resolvable by row id.
    pub fn live_count(&self) -> usize {
        self.by_row_id.len()
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    pub fn emit(&mut self, node: NodeId, kind: RowNodeEventKind) {
        self.events.push(RowNodeEvent { node, kind });
    }

    pub fn take_events(&mut self) -> Vec<RowNodeEvent> {
        std::mem::take(&mut self.events)
    }

    // Change-aware setters: an event is queued only when the value changes.

    pub fn set_first_child(&mut self, handle: NodeId, value: bool) {
        let node = &mut self[handle];
        if node.first_child != value {
            node.first_child = value;
            self.emit(handle, RowNodeEventKind::FirstChildChanged);
        }
    }

    pub fn set_last_child(&mut self, handle: NodeId, value: bool) {
        let node = &mut self[handle];
        if node.last_child != value {
            node.last_child = value;
            self.emit(handle, RowNodeEventKind::LastChildChanged);
        }
    }

    pub fn set_child_index(&mut self, handle: NodeId, value: usize) {
        let node = &mut self[handle];
        if node.child_index != value {
            node.child_index = value;
            self.emit(handle, RowNodeEventKind::ChildIndexChanged);
        }
    }

    pub fn set_row_index(&mut self, handle: NodeId, value: Option<usize>) {
        let node = &mut self[handle];
        if node.row_index != value {
            node.row_index = value;
            self.emit(handle, RowNodeEventKind::RowIndexChanged);
        }
    }

    pub fn set_row_top(&mut self, handle: NodeId, value: Option<f64>) {
        let node = &mut self[handle];
        if node.row_top != value {
            node.old_row_top = node.row_top;
            node.row_top = value;
            self.emit(handle, RowNodeEventKind::TopChanged);
        }
    }

    pub fn set_ui_level(&mut self, handle: NodeId, value: i32) {
        let node = &mut self[handle];
        if node.ui_level != value {
            node.ui_level = value;
            self.emit(handle, RowNodeEventKind::UiLevelChanged);
        }
    }

    pub fn set_expanded(&mut self, handle: NodeId, value: bool) -> bool {
        let node = &mut self[handle];
        if node.expanded == value {
            return false;
        }
        node.expanded = value;
        self.emit(handle, RowNodeEventKind::ExpandedChanged);
        true
    }

    pub fn set_selected(&mut self, handle: NodeId, value: Option<bool>) -> bool {
        let node = &mut self[handle];
        if node.selected == value {
            return false;
        }
        node.selected = value;
        self.emit(handle, RowNodeEventKind::SelectionChanged);
        true
    }

    pub fn set_all_children_count(&mut self, handle: NodeId, value: Option<usize>) {
        let node = &mut self[handle];
        if node.all_children_count != value {
            node.all_children_count = value;
            self.emit(handle, RowNodeEventKind::AllChildrenCountChanged);
        }
    }

    /// Replaces the data of a node in place, keeping its identity.
    pub fn set_data(&mut self, handle: NodeId, data: RowData) {
        self[handle].data = Some(data);
        self.emit(handle, RowNodeEventKind::DataChanged);
    }

    /// Rebinds a node to new data and a new id. A daemon copy keeps the old
    /// id and data so collaborators holding the old id can still resolve it.
    pub fn set_data_and_id(&mut self, handle: NodeId, data: RowData, id: String) -> Option<NodeId> {
        let old = self.get(handle)?.clone();
        let daemon = self.allocate(old.id.clone(), old.data.clone());
        {
            let d = &mut self[daemon];
            d.daemon = true;
            d.parent = old.parent;
            d.level = old.level;
            d.selected = old.selected;
            d.selectable = old.selectable;
        }

        self.unregister(handle);
        let node = &mut self[handle];
        node.id = id;
        node.data = Some(data);
        self.register(handle);
        self.emit(handle, RowNodeEventKind::DataChanged);
        Some(daemon)
    }

    // ------------------------------------------------------------------------
    // Traversal helpers
    // ------------------------------------------------------------------------

    /// Parent chain, nearest first, root included.
    pub fn ancestors(&self, handle: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = self.get(handle).and_then(|n| n.parent);
        while let Some(h) = current {
            result.push(h);
            current = self.get(h).and_then(|n| n.parent);
        }
        result
    }

    /// Ids from the top-level ancestor down to the node itself, root excluded.
    pub fn route_to_node(&self, handle: NodeId) -> Vec<String> {
        let mut route: Vec<String> = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            match self.get(h) {
                Some(node) if !node.is_root() => {
                    route.push(node.id.clone());
                    current = node.parent;
                }
                _ => break,
            }
        }
        route.reverse();
        route
    }

    /// Returns the footer sibling of a group, creating it on first use.
    pub fn footer_for(&mut self, group: NodeId) -> NodeId {
        if let Some(existing) = self[group].sibling {
            return existing;
        }
        let source = self[group].clone();
        let footer = self.allocate(format!("{}{}", FOOTER_ID_PREFIX, source.id), None);
        {
            let f = &mut self[footer];
            f.footer = true;
            f.group = true;
            f.parent = source.parent;
            f.level = source.level;
            f.key = source.key.clone();
            f.group_value = source.group_value.clone();
            f.row_group_column = source.row_group_column.clone();
            f.sibling = Some(group);
        }
        self[group].sibling = Some(footer);
        footer
    }

    /// Returns the detail row of a master row, creating it on first use.
    pub fn detail_for(&mut self, master: NodeId) -> NodeId {
        if let Some(existing) = self[master].detail_node {
            return existing;
        }
        let (id, data, level) = {
            let m = &self[master];
            (format!("{}{}", DETAIL_ID_PREFIX, m.id), m.data.clone(), m.level)
        };
        let detail = self.allocate(id, data);
        {
            let d = &mut self[detail];
            d.detail = true;
            d.parent = Some(master);
            d.level = level + 1;
            d.selectable = false;
        }
        self[master].detail_node = Some(detail);
        detail
    }
}

impl Index<NodeId> for RowNodeArena {
    type Output = RowNode;

    /// Panics on a released handle, like indexing a slice out of bounds.
    fn index(&self, handle: NodeId) -> &RowNode {
        &self.nodes[&handle]
    }
}

impl IndexMut<NodeId> for RowNodeArena {
    fn index_mut(&mut self, handle: NodeId) -> &mut RowNode {
        self.nodes.get_mut(&handle).expect("dangling NodeId")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::Record;

    #[test]
    fn test_handles_are_unique() {
        let mut arena = RowNodeArena::new();
        let a = arena.create_node("a".into(), None);
        arena.destroy(a);
        arena.release_detached();
        let b = arena.create_node("a".into(), None);
        assert_ne!(a, b);
        assert_eq!(arena.lookup("a"), Some(b));
    }

    #[test]
    fn test_setters_emit_only_on_change() {
        let mut arena = RowNodeArena::new();
        let a = arena.create_node("a".into(), None);
        arena.set_first_child(a, false);
        arena.set_child_index(a, 0);
        assert!(arena.take_events().is_empty());

        arena.set_first_child(a, true);
        arena.set_child_index(a, 3);
        arena.set_child_index(a, 3);
        let kinds: Vec<_> = arena.take_events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![RowNodeEventKind::FirstChildChanged, RowNodeEventKind::ChildIndexChanged]);
    }

    #[test]
    fn test_set_data_and_id_leaves_daemon() {
        let mut arena = RowNodeArena::new();
        let first = Record::new().with("id", "1").into_data();
        let second = Record::new().with("id", "2").into_data();
        let node = arena.create_node("1".into(), Some(first.clone()));

        let daemon = arena.set_data_and_id(node, second, "2".into()).unwrap();

        assert_eq!(arena.lookup("2"), Some(node));
        assert_eq!(arena.lookup("1"), None);
        assert!(arena[daemon].daemon);
        assert_eq!(arena[daemon].id, "1");
        assert!(std::rc::Rc::ptr_eq(arena[daemon].data.as_ref().unwrap(), &first));
        assert_eq!(arena.release_detached(), 1);
    }

    #[test]
    fn test_route_to_node() {
        let mut arena = RowNodeArena::new();
        let root = arena.create_node(ROOT_NODE_ID.into(), None);
        let group = arena.create_node("g".into(), None);
        let leaf = arena.create_node("l".into(), None);
        arena[group].parent = Some(root);
        arena[leaf].parent = Some(group);

        assert_eq!(arena.route_to_node(leaf), vec!["g".to_string(), "l".to_string()]);
        assert_eq!(arena.ancestors(leaf), vec![group, root]);
    }

    #[test]
    fn test_listeners_in_subscription_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = RowNodeListeners::default();
        let s1 = seen.clone();
        listeners.add(move |_| s1.borrow_mut().push(1));
        let s2 = seen.clone();
        let second = listeners.add(move |_| s2.borrow_mut().push(2));

        let event = RowNodeEvent { node: NodeId(0), kind: RowNodeEventKind::DataChanged };
        listeners.dispatch(&[event]);
        assert!(listeners.remove(second));
        listeners.dispatch(&[event]);

        assert_eq!(*seen.borrow(), vec![1, 2, 1]);
    }
}
