//! FILENAME: core/row-model/src/model.rs
//! PURPOSE: The client-side row model. Owns the node arena and runs the
//! pipeline: group -> filter -> aggregate -> aggregate filter -> sort -> flatten.
//! CONTEXT: Every mutating call runs the pipeline from the first step its
//! change affects. Transaction refreshes carry the changed rows so the stages
//! can limit themselves to the changed path. Node events are queued while the
//! stages run and delivered to listeners at the end of the run.

use engine::{
    log_debug, log_info, ColumnChanges, ColumnModel, ColumnStateParams, GridError, RowData, SortOption,
    ValueColumn,
};

use crate::aggregation::AggregationStage;
use crate::batch::{AsyncTransactionQueue, TransactionCallback};
use crate::changed_path::{ChangedPath, ChangedRowNodes};
use crate::filter::{AggFilterStage, FilterModel, FilterStage};
use crate::flatten::{flatten, FlattenParams};
use crate::grouping::{GroupParams, GroupStage};
use crate::node::{ListenerId, NodeId, RowNode, RowNodeArena, RowNodeEvent, RowNodeListeners, RowPinned, ROOT_NODE_ID};
use crate::options::{GridCallbacks, GridOptions};
use crate::pinned::PinnedRowModel;
use crate::sort::{SortParams, SortStage, SortStats};
use crate::transaction::{diff_row_data, RowDataTransaction, RowNodeTransaction, TransactionApplier};

/// First pipeline step a refresh runs. Later steps always run too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefreshStep {
    Everything,
    Filter,
    Aggregate,
    FilterAggregates,
    Sort,
    Map,
}

pub struct ClientSideRowModel {
    arena: RowNodeArena,
    root: NodeId,
    options: GridOptions,
    callbacks: GridCallbacks,
    columns: ColumnModel,
    filter_model: FilterModel,
    group_stage: GroupStage,
    sort_stage: SortStage,
    pinned: PinnedRowModel,
    rows_to_display: Vec<NodeId>,
    async_queue: AsyncTransactionQueue,
    listeners: RowNodeListeners,
    id_sequence: u64,
}

impl std::fmt::Debug for ClientSideRowModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSideRowModel")
            .field("nodes", &self.arena.len())
            .field("rows_to_display", &self.rows_to_display.len())
            .field("pending_transactions", &self.async_queue.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ClientSideRowModel {
    pub fn new(options: GridOptions, callbacks: GridCallbacks) -> Self {
        let mut arena = RowNodeArena::new();
        let root = arena.create_node(ROOT_NODE_ID.to_string(), None);
        {
            let r = &mut arena[root];
            r.group = true;
            r.expanded = true;
            r.level = -1;
            r.all_leaf_children = Some(Vec::new());
        }
        let columns = options.columns.clone();
        let mut model = ClientSideRowModel {
            arena,
            root,
            options,
            callbacks,
            columns,
            filter_model: FilterModel::default(),
            group_stage: GroupStage::new(),
            sort_stage: SortStage::new(),
            pinned: PinnedRowModel::new(),
            rows_to_display: Vec::new(),
            async_queue: AsyncTransactionQueue::new(),
            listeners: RowNodeListeners::default(),
            id_sequence: 0,
        };
        model.refresh(RefreshStep::Everything, None);
        model
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn arena(&self) -> &RowNodeArena {
        &self.arena
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &RowNode {
        &self.arena[self.root]
    }

    pub fn node(&self, handle: NodeId) -> Option<&RowNode> {
        self.arena.get(handle)
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn callbacks(&self) -> &GridCallbacks {
        &self.callbacks
    }

    pub fn columns(&self) -> &ColumnModel {
        &self.columns
    }

    pub fn filter_model(&self) -> &FilterModel {
        &self.filter_model
    }

    pub fn pinned(&self) -> &PinnedRowModel {
        &self.pinned
    }

    pub fn group_stage(&self) -> &GroupStage {
        &self.group_stage
    }

    pub fn sort_stats(&self) -> SortStats {
        self.sort_stage.last_stats()
    }

    pub fn is_any_filter_present(&self) -> bool {
        !self.filter_model.is_empty() || self.callbacks.external_filter.is_some()
    }

    /// Live node by row id, pinned rows included.
    pub fn get_row_node(&self, id: &str) -> Option<&RowNode> {
        self.arena
            .lookup(id)
            .or_else(|| self.pinned.find(&self.arena, id))
            .and_then(|h| self.arena.get(h))
    }

    pub fn rows_to_display(&self) -> &[NodeId] {
        &self.rows_to_display
    }

    pub fn get_row_count(&self) -> usize {
        self.rows_to_display.len()
    }

    pub fn get_row(&self, index: usize) -> Option<&RowNode> {
        self.rows_to_display.get(index).and_then(|h| self.arena.get(*h))
    }

    /// Ids of the displayed rows, in display order.
    pub fn displayed_row_ids(&self) -> Vec<String> {
        self.rows_to_display.iter().map(|h| self.arena[*h].id.clone()).collect()
    }

    // ========================================================================
    // TRAVERSAL
    // ========================================================================

    /// Depth-first over `children_after_group`, groups included.
    pub fn for_each_node(&self, mut callback: impl FnMut(&RowNode, usize)) {
        let mut index = 0;
        self.walk(self.root, &|n| n.children_after_group.as_ref(), &mut callback, &mut index);
    }

    /// Depth-first over `children_after_sort`, ignoring expansion.
    pub fn for_each_node_after_filter_and_sort(&self, mut callback: impl FnMut(&RowNode, usize)) {
        let mut index = 0;
        self.walk(self.root, &|n| n.children_after_sort.as_ref(), &mut callback, &mut index);
    }

    /// Every leaf in source order.
    pub fn for_each_leaf_node(&self, mut callback: impl FnMut(&RowNode, usize)) {
        for (index, handle) in self.arena[self.root].all_leaf_children.iter().flatten().enumerate() {
            callback(&self.arena[*handle], index);
        }
    }

    fn walk(
        &self,
        handle: NodeId,
        children_of: &dyn Fn(&RowNode) -> Option<&Vec<NodeId>>,
        callback: &mut dyn FnMut(&RowNode, usize),
        index: &mut usize,
    ) {
        let node = &self.arena[handle];
        let Some(children) = children_of(node) else { return };
        for child in children {
            let child_node = &self.arena[*child];
            callback(child_node, *index);
            *index += 1;
            if child_node.has_children() {
                self.walk(*child, children_of, callback, index);
            }
        }
    }

    // ========================================================================
    // ROW DATA & TRANSACTIONS
    // ========================================================================

    /// Nested records are expanded into nodes only in tree data mode, and only
    /// when no data path callback defines the hierarchy.
    fn nested(&self) -> bool {
        self.options.tree_data && self.callbacks.get_data_path.is_none()
    }

    /// Caller records at the top of the current structure.
    fn top_level_rows(&self) -> Vec<RowData> {
        self.arena[self.root]
            .all_leaf_children
            .iter()
            .flatten()
            .map(|h| &self.arena[*h])
            .filter(|n| n.tree_parent.is_none())
            .filter_map(|n| n.data.clone())
            .collect()
    }

    /// Replaces all row data. With a row id callback and existing rows, the new
    /// list is diffed against the live nodes so unchanged ids keep their node.
    /// Pending async transactions are discarded.
    pub fn set_row_data(&mut self, rows: Vec<RowData>) -> RowNodeTransaction {
        let discarded = self.async_queue.discard();
        if discarded > 0 {
            log_info!("MODEL", "set_row_data discarded {} pending async transactions", discarded);
        }

        let has_rows = self.arena[self.root].all_leaf_children.as_ref().map_or(false, |l| !l.is_empty());
        if self.callbacks.get_row_id.is_some() && has_rows {
            self.apply_row_data_diff(&rows)
        } else {
            self.load_row_data(rows)
        }
    }

    fn load_row_data(&mut self, rows: Vec<RowData>) -> RowNodeTransaction {
        let old = self.arena[self.root].all_leaf_children.take().unwrap_or_default();
        for handle in &old {
            self.arena.destroy(*handle);
        }
        self.arena[self.root].all_leaf_children = Some(Vec::new());
        self.id_sequence = 0;

        let mut changed = ChangedRowNodes::new();
        let nested = self.nested();
        let mut result = TransactionApplier {
            arena: &mut self.arena,
            root: self.root,
            callbacks: &self.callbacks,
            id_sequence: &mut self.id_sequence,
            nested,
        }
        .apply(&RowDataTransaction::new().with_add(rows), &mut changed);
        result.remove = old;

        self.refresh_row_flags(&result.add);
        log_info!("MODEL", "loaded {} rows", result.add.len());
        self.refresh(RefreshStep::Everything, None);
        result
    }

    fn apply_row_data_diff(&mut self, rows: &[RowData]) -> RowNodeTransaction {
        let nested = self.nested();
        let diff = diff_row_data(&self.arena, self.root, &self.callbacks, rows, nested);
        let mut changed = ChangedRowNodes::new();

        let mut applier = TransactionApplier {
            arena: &mut self.arena,
            root: self.root,
            callbacks: &self.callbacks,
            id_sequence: &mut self.id_sequence,
            nested: false,
        };
        let mut result = applier.apply(&diff.transaction, &mut changed);

        let order: Vec<NodeId> = diff.order.iter().filter_map(|id| applier.arena.lookup(id)).collect();
        applier.reorder(order, &mut changed);

        if nested {
            for (id, parent_id) in &diff.parents {
                let Some(handle) = self.arena.lookup(id) else { continue };
                let parent = parent_id.as_deref().and_then(|p| self.arena.lookup(p));
                self.arena[handle].tree_parent = parent;
            }
        }

        let mut warnings = diff.warnings;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;

        let touched: Vec<NodeId> = result.add.iter().chain(&result.update).copied().collect();
        self.refresh_row_flags(&touched);
        log_debug!(
            "MODEL",
            "row data diff: add={} update={} remove={} reordered={}",
            result.add.len(),
            result.update.len(),
            result.remove.len(),
            changed.reordered
        );
        self.refresh(RefreshStep::Everything, Some(&changed));
        result
    }

    /// Applies a transaction and runs the pipeline before returning.
    pub fn apply_transaction(&mut self, transaction: RowDataTransaction) -> RowNodeTransaction {
        let mut changed = ChangedRowNodes::new();
        let result = self.apply_transaction_to_leaves(&transaction, &mut changed);
        self.refresh(RefreshStep::Everything, Some(&changed));
        result
    }

    fn apply_transaction_to_leaves(
        &mut self,
        transaction: &RowDataTransaction,
        changed: &mut ChangedRowNodes,
    ) -> RowNodeTransaction {
        let nested = self.nested();
        let result = TransactionApplier {
            arena: &mut self.arena,
            root: self.root,
            callbacks: &self.callbacks,
            id_sequence: &mut self.id_sequence,
            nested,
        }
        .apply(transaction, changed);
        let touched: Vec<NodeId> = result.add.iter().chain(&result.update).copied().collect();
        self.refresh_row_flags(&touched);
        result
    }

    /// Queues a transaction for the next `flush_async_transactions`.
    pub fn apply_transaction_async(&mut self, transaction: RowDataTransaction, callback: Option<TransactionCallback>) {
        self.async_queue.push(transaction, callback);
        log_debug!("TXN", "queued async transaction, {} pending", self.async_queue.len());
    }

    pub fn has_pending_transactions(&self) -> bool {
        !self.async_queue.is_empty()
    }

    /// Applies queued transactions in submission order with a single pipeline
    /// run. Callbacks are invoked afterwards, in the same order.
    pub fn flush_async_transactions(&mut self) -> Vec<RowNodeTransaction> {
        let queued = self.async_queue.drain();
        if queued.is_empty() {
            return Vec::new();
        }
        let mut changed = ChangedRowNodes::new();
        let mut applied: Vec<(RowNodeTransaction, Option<TransactionCallback>)> = Vec::with_capacity(queued.len());
        for item in queued {
            let mut own = ChangedRowNodes::new();
            let result = self.apply_transaction_to_leaves(&item.transaction, &mut own);
            changed.merge(&own);
            applied.push((result, item.callback));
        }
        log_debug!("TXN", "flushed {} async transactions", applied.len());
        self.refresh(RefreshStep::Everything, Some(&changed));

        applied
            .into_iter()
            .map(|(result, callback)| {
                if let Some(callback) = callback {
                    callback(&result);
                }
                result
            })
            .collect()
    }

    /// Moves leaves so the first moved node lands at `to_index`. Returns the
    /// nodes actually moved.
    pub fn move_rows(&mut self, nodes: &[NodeId], to_index: usize) -> Vec<NodeId> {
        let mut changed = ChangedRowNodes::new();
        let moved = TransactionApplier {
            arena: &mut self.arena,
            root: self.root,
            callbacks: &self.callbacks,
            id_sequence: &mut self.id_sequence,
            nested: false,
        }
        .move_rows(nodes, to_index, &mut changed);
        if !changed.is_empty() {
            self.refresh(RefreshStep::Everything, Some(&changed));
        }
        moved
    }

    /// Rebinds a leaf to new data and a new id. The previous identity lives on
    /// as a daemon node, which is returned.
    pub fn set_row_node_data_and_id(
        &mut self,
        handle: NodeId,
        data: RowData,
        id: Option<String>,
    ) -> Result<NodeId, GridError> {
        let is_leaf = self
            .arena
            .get(handle)
            .map_or(false, |n| !n.destroyed && n.data.is_some() && self.arena.is_registered(handle));
        if !is_leaf {
            return Err(GridError::InvalidRowNode(format!("{:?}", handle)));
        }
        let id = match id.or_else(|| self.callbacks.row_id_of(&data).flatten()) {
            Some(id) => id,
            None if self.callbacks.get_row_id.is_some() => return Err(GridError::MissingRowId),
            None => {
                let id = self.id_sequence.to_string();
                self.id_sequence += 1;
                id
            }
        };
        if self.arena.lookup(&id).map_or(false, |existing| existing != handle) {
            return Err(GridError::DuplicateRowId(id));
        }

        let daemon = self
            .arena
            .set_data_and_id(handle, data, id)
            .ok_or_else(|| GridError::InvalidRowNode(format!("{:?}", handle)))?;
        self.refresh_row_flags(&[handle]);

        let mut changed = ChangedRowNodes::new();
        changed.update(handle);
        self.refresh(RefreshStep::Everything, Some(&changed));
        Ok(daemon)
    }

    /// Drops destroyed and daemon nodes from the arena.
    pub fn release_detached_nodes(&mut self) -> usize {
        let released = self.arena.release_detached();
        log_debug!("MODEL", "released {} detached nodes", released);
        released
    }

    fn refresh_row_flags(&mut self, handles: &[NodeId]) {
        for handle in handles {
            let Some(node) = self.arena.get(*handle) else { continue };
            let selectable = self.callbacks.is_row_selectable.as_ref().map_or(true, |f| f(node));
            let master = self.options.master_detail
                && match (&self.callbacks.is_row_master, &node.data) {
                    (Some(f), Some(data)) => f(data),
                    _ => false,
                };
            let node = &mut self.arena[*handle];
            node.selectable = selectable;
            node.master = master;
        }
    }

    // ========================================================================
    // PINNED ROWS
    // ========================================================================

    pub fn set_pinned_top_row_data(&mut self, rows: Vec<RowData>) {
        self.pinned
            .set_rows(&mut self.arena, RowPinned::Top, &rows, &self.callbacks, self.options.row_height);
    }

    pub fn set_pinned_bottom_row_data(&mut self, rows: Vec<RowData>) {
        self.pinned
            .set_rows(&mut self.arena, RowPinned::Bottom, &rows, &self.callbacks, self.options.row_height);
    }

    // ========================================================================
    // CONFIGURATION CHANGES
    // ========================================================================

    pub fn apply_column_state(&mut self, params: &ColumnStateParams) -> ColumnChanges {
        let changes = self.columns.apply_column_state(params);
        let step = if changes.row_group_changed {
            Some(RefreshStep::Everything)
        } else if changes.agg_changed {
            Some(RefreshStep::Aggregate)
        } else if changes.sort_changed {
            Some(RefreshStep::Sort)
        } else {
            None
        };
        if let Some(step) = step {
            log_debug!("MODEL", "column state changed {:?}, refresh from {:?}", changes, step);
            self.refresh(step, None);
        }
        changes
    }

    pub fn set_sort_model(&mut self, sort_model: Vec<SortOption>) {
        if self.columns.sort_model != sort_model {
            self.columns.sort_model = sort_model;
            self.refresh(RefreshStep::Sort, None);
        }
    }

    pub fn set_row_group_columns(&mut self, columns: Vec<String>) {
        if self.columns.row_group_columns != columns {
            self.columns.row_group_columns = columns;
            self.refresh(RefreshStep::Everything, None);
        }
    }

    pub fn set_value_columns(&mut self, columns: Vec<ValueColumn>) {
        if self.columns.value_columns != columns {
            self.columns.value_columns = columns;
            self.refresh(RefreshStep::Aggregate, None);
        }
    }

    pub fn set_filter_model(&mut self, filter_model: FilterModel) {
        if self.filter_model != filter_model {
            self.filter_model = filter_model;
            self.refresh(RefreshStep::Filter, None);
        }
    }

    /// Re-runs filtering, e.g. after the external filter's inputs changed.
    pub fn on_filter_changed(&mut self) {
        self.refresh(RefreshStep::Filter, None);
    }

    /// Switches tree data on or off. Pending async transactions are applied
    /// first, against the current mode.
    pub fn set_tree_data(&mut self, tree_data: bool) {
        if self.options.tree_data == tree_data {
            return;
        }
        if self.has_pending_transactions() {
            log_info!("MODEL", "flushing async transactions before tree data toggle");
            self.flush_async_transactions();
        }
        let reload = self.callbacks.get_data_path.is_none();
        let rows = if reload { self.top_level_rows() } else { Vec::new() };
        self.options.tree_data = tree_data;
        if reload {
            // Nested records are expanded or collapsed by reloading them.
            self.set_row_data(rows);
        } else {
            self.refresh(RefreshStep::Everything, None);
        }
    }

    /// Changes options and runs the whole pipeline. Invalid options are
    /// rejected and the previous ones kept.
    pub fn update_options(&mut self, update: impl FnOnce(&mut GridOptions)) -> Result<(), GridError> {
        let mut options = self.options.clone();
        update(&mut options);
        options.validate()?;
        if options.tree_data != self.options.tree_data && self.has_pending_transactions() {
            self.flush_async_transactions();
        }
        if options.columns != self.options.columns {
            self.columns = options.columns.clone();
        }
        self.options = options;
        self.refresh(RefreshStep::Everything, None);
        Ok(())
    }

    pub fn set_expanded(&mut self, handle: NodeId, expanded: bool) {
        if self.arena.contains(handle) && self.arena.set_expanded(handle, expanded) {
            self.refresh(RefreshStep::Map, None);
        }
    }

    /// Expands or collapses every group.
    pub fn expand_all(&mut self, expanded: bool) {
        let mut groups = Vec::new();
        self.for_each_node(|node, _| {
            if node.has_children() {
                groups.push(node.handle);
            }
        });
        let mut any = false;
        for handle in groups {
            any |= self.arena.set_expanded(handle, expanded);
        }
        if any {
            self.refresh(RefreshStep::Map, None);
        }
    }

    // ========================================================================
    // EVENTS & SELECTION FLAGS
    // ========================================================================

    pub fn add_event_listener(&mut self, listener: impl FnMut(&RowNodeEvent) + 'static) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Writes `selected` flags and delivers the resulting events. Used by the
    /// selection service, the only writer of the flag.
    pub fn set_selected_flags(&mut self, updates: &[(NodeId, Option<bool>)]) -> usize {
        let mut changed = 0;
        for (handle, selected) in updates {
            if self.arena.contains(*handle) && self.arena.set_selected(*handle, *selected) {
                changed += 1;
            }
        }
        self.dispatch_events();
        changed
    }

    fn dispatch_events(&mut self) {
        let events = self.arena.take_events();
        if !events.is_empty() {
            self.listeners.dispatch(&events);
        }
    }

    // ========================================================================
    // PIPELINE
    // ========================================================================

    /// Runs the pipeline from `step` without changed-path information.
    pub fn refresh_model(&mut self, step: RefreshStep) {
        self.refresh(step, None);
    }

    fn refresh(&mut self, step: RefreshStep, changed: Option<&ChangedRowNodes>) {
        // A change of grouping mode restructures every node, so the changed
        // path cannot describe it.
        let mode_changed = {
            let params = GroupParams {
                group_columns: &self.columns.row_group_columns,
                options: &self.options,
                callbacks: &self.callbacks,
            };
            self.group_stage.mode() != Some(params.mode())
        };
        let transactional = step == RefreshStep::Everything && changed.is_some() && !mode_changed;
        let changed = if transactional { changed } else { None };
        let mut path = if transactional { ChangedPath::active() } else { ChangedPath::inactive() };

        let ClientSideRowModel {
            arena,
            root,
            options,
            callbacks,
            columns,
            filter_model,
            group_stage,
            sort_stage,
            rows_to_display,
            listeners,
            ..
        } = self;
        let root = *root;

        if step <= RefreshStep::Everything {
            let params = GroupParams {
                group_columns: &columns.row_group_columns,
                options,
                callbacks,
            };
            group_stage.execute(arena, root, &params, changed, &mut path);
        }

        if step <= RefreshStep::Filter {
            FilterStage {
                arena: &mut *arena,
                filter: filter_model,
                external: callbacks.external_filter.as_ref(),
                tree_data: options.tree_data,
                exclude_children_when_tree_data_filtering: options.exclude_children_when_tree_data_filtering,
                defer_column_filters: options.group_agg_filtering,
            }
            .execute(root, &path);
        }

        if step <= RefreshStep::Aggregate {
            AggregationStage {
                arena: &mut *arena,
                value_columns: &columns.value_columns,
                custom_funcs: &callbacks.agg_funcs,
                use_unfiltered: options.suppress_agg_filtered_only,
                aggregate_root: options.always_aggregate_at_root_level || options.group_include_total_footer,
            }
            .execute(root, &path);
        }

        if step <= RefreshStep::FilterAggregates {
            AggFilterStage {
                arena: &mut *arena,
                filter: filter_model,
                group_agg_filtering: options.group_agg_filtering,
            }
            .execute(root, &path);
        }

        if step <= RefreshStep::Sort {
            let params = SortParams {
                sort_model: &columns.sort_model,
                sort_contains_group_columns: columns.sort_contains_group_columns(),
                row_grouping: !options.tree_data && !columns.row_group_columns.is_empty(),
                group_maintain_order: options.group_maintain_order,
                pivot_mode: options.pivot_mode,
                delta_sort: options.delta_sort,
                post_sort_rows: callbacks.post_sort_rows.as_ref(),
                changed_rows: changed,
            };
            sort_stage.execute(arena, root, &params, &path);
        }

        let previous = std::mem::take(rows_to_display);
        let flatten_params = FlattenParams {
            row_height: options.row_height,
            group_include_footer: options.group_include_footer,
            group_include_total_footer: options.group_include_total_footer,
            remove_single_children: options.group_remove_single_children,
            remove_lowest_single_children: options.group_remove_lowest_single_children,
            pivot_mode: options.pivot_mode,
            master_detail: options.master_detail,
        };
        *rows_to_display = flatten(arena, root, &flatten_params, &previous);

        let events = arena.take_events();
        if !events.is_empty() {
            listeners.dispatch(&events);
        }
        log_debug!(
            "MODEL",
            "refreshed from {:?}: {} rows displayed, {} events, changed path {}",
            step,
            rows_to_display.len(),
            events.len(),
            if path.is_active() { path.len().to_string() } else { String::from("inactive") }
        );
    }
}
