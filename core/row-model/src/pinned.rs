//! FILENAME: core/row-model/src/pinned.rs
//! PURPOSE: Rows pinned to the top or bottom of the grid.
//! CONTEXT: Pinned rows do not take part in the pipeline. They are detached
//! nodes with their own index space and ids `t-N` / `b-N` unless the caller
//! supplies row ids.

use engine::{log_debug, RowData};

use crate::node::{NodeId, RowNodeArena, RowPinned, PINNED_BOTTOM_ID_PREFIX, PINNED_TOP_ID_PREFIX};
use crate::options::GridCallbacks;

#[derive(Debug, Default)]
pub struct PinnedRowModel {
    top: Vec<NodeId>,
    bottom: Vec<NodeId>,
}

impl PinnedRowModel {
    pub fn new() -> Self {
        PinnedRowModel::default()
    }

    pub fn top(&self) -> &[NodeId] {
        &self.top
    }

    pub fn bottom(&self) -> &[NodeId] {
        &self.bottom
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_empty() && self.bottom.is_empty()
    }

    pub(crate) fn set_rows(
        &mut self,
        arena: &mut RowNodeArena,
        pinned: RowPinned,
        rows: &[RowData],
        callbacks: &GridCallbacks,
        row_height: f64,
    ) {
        let (list, prefix) = match pinned {
            RowPinned::Top => (&mut self.top, PINNED_TOP_ID_PREFIX),
            RowPinned::Bottom => (&mut self.bottom, PINNED_BOTTOM_ID_PREFIX),
        };
        for old in list.drain(..) {
            arena.destroy(old);
        }
        for (index, data) in rows.iter().enumerate() {
            let id = callbacks
                .row_id_of(data)
                .flatten()
                .unwrap_or_else(|| format!("{}{}", prefix, index));
            let handle = arena.create_detached(id, Some(data.clone()));
            let node = &mut arena[handle];
            node.row_pinned = Some(pinned);
            node.row_index = Some(index);
            node.row_top = Some(index as f64 * row_height);
            list.push(handle);
        }
        log_debug!("MODEL", "pinned {:?}: {} rows", pinned, rows.len());
    }

    pub fn find(&self, arena: &RowNodeArena, id: &str) -> Option<NodeId> {
        self.top
            .iter()
            .chain(self.bottom.iter())
            .copied()
            .find(|h| arena.get(*h).map_or(false, |n| n.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::Record;

    #[test]
    fn test_pinned_ids_and_indices() {
        let mut arena = RowNodeArena::new();
        let mut pinned = PinnedRowModel::new();
        let rows = vec![Record::new().with("n", 1).into_data(), Record::new().with("n", 2).into_data()];
        pinned.set_rows(&mut arena, RowPinned::Top, &rows, &GridCallbacks::default(), 25.0);
        pinned.set_rows(&mut arena, RowPinned::Bottom, &rows[..1], &GridCallbacks::default(), 25.0);

        let ids: Vec<&str> = pinned.top().iter().map(|h| arena[*h].id.as_str()).collect();
        assert_eq!(ids, vec!["t-0", "t-1"]);
        assert_eq!(arena[pinned.top()[1]].row_top, Some(25.0));
        assert_eq!(arena[pinned.bottom()[0]].id, "b-0");
        assert_eq!(pinned.find(&arena, "t-1"), Some(pinned.top()[1]));
        // Not part of the id index of the main model.
        assert_eq!(arena.lookup("t-0"), None);

        pinned.set_rows(&mut arena, RowPinned::Top, &[], &GridCallbacks::default(), 25.0);
        assert!(pinned.top().is_empty());
        assert_eq!(arena.release_detached(), 2);
    }
}
