//! FILENAME: core/row-model/src/flatten.rs
//! PURPOSE: Flattener. Turns the sorted tree into the list of displayed rows.
//! CONTEXT: Walks `children_after_sort` depth-first, descending into expanded
//! groups only. Writes `row_index`, `row_top`, `old_row_top` and `ui_level`.
//! Rows that were displayed before but not anymore get their index cleared.

use engine::log_debug;
use rustc_hash::FxHashSet;

use crate::node::{NodeId, RowNodeArena};

pub(crate) struct FlattenParams {
    pub row_height: f64,
    pub group_include_footer: bool,
    pub group_include_total_footer: bool,
    pub remove_single_children: bool,
    pub remove_lowest_single_children: bool,
    pub pivot_mode: bool,
    pub master_detail: bool,
}

pub(crate) fn flatten(
    arena: &mut RowNodeArena,
    root: NodeId,
    params: &FlattenParams,
    previous: &[NodeId],
) -> Vec<NodeId> {
    let mut rows: Vec<NodeId> = Vec::new();
    let top = arena[root].children_after_sort.clone().unwrap_or_default();
    add_rows(arena, &top, 0, params, &mut rows);

    if params.group_include_total_footer && !top.is_empty() {
        let footer = arena.footer_for(root);
        arena.set_ui_level(footer, 0);
        rows.push(footer);
    }

    for (index, handle) in rows.iter().enumerate() {
        arena.set_row_index(*handle, Some(index));
        arena.set_row_top(*handle, Some(index as f64 * params.row_height));
    }

    let displayed: FxHashSet<NodeId> = rows.iter().copied().collect();
    for handle in previous {
        if !displayed.contains(handle) && arena.contains(*handle) {
            arena.set_row_index(*handle, None);
            arena.set_row_top(*handle, None);
        }
    }

    log_debug!("FLAT", "{} rows displayed", rows.len());
    rows
}

fn add_rows(arena: &mut RowNodeArena, list: &[NodeId], ui_level: i32, params: &FlattenParams, rows: &mut Vec<NodeId>) {
    for handle in list {
        let (is_group, leaf_group, expanded, children, master) = {
            let node = &arena[*handle];
            let children = node.children_after_sort.clone().unwrap_or_default();
            (node.group && node.has_children(), node.leaf_group, node.expanded, children, node.master)
        };

        if !is_group {
            rows.push(*handle);
            arena.set_ui_level(*handle, ui_level);
            if params.master_detail && master && expanded {
                let detail = arena.detail_for(*handle);
                arena.set_ui_level(detail, ui_level + 1);
                rows.push(detail);
            }
            continue;
        }

        let single_child = children.len() == 1;
        let hidden = single_child
            && (params.remove_single_children || (params.remove_lowest_single_children && leaf_group));
        if !hidden {
            rows.push(*handle);
            arena.set_ui_level(*handle, ui_level);
        }

        if params.pivot_mode && leaf_group {
            continue;
        }
        if hidden || expanded {
            let child_level = if hidden { ui_level } else { ui_level + 1 };
            add_rows(arena, &children, child_level, params, rows);
            if params.group_include_footer && !hidden {
                let footer = arena.footer_for(*handle);
                arena.set_ui_level(footer, ui_level);
                rows.push(footer);
            }
        }
    }
}
