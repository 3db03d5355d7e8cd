//! FILENAME: core/row-model/src/lib.rs
//! PURPOSE: Client-side row model for a data grid.
//! CONTEXT: `ClientSideRowModel` owns every row node and turns row data plus
//! transactions into the list of displayed rows. The stages live in their own
//! modules and are driven from `model.rs` in pipeline order.

pub mod aggregation;
pub mod batch;
pub mod changed_path;
pub mod filter;
mod flatten;
pub mod grouping;
pub mod model;
pub mod node;
pub mod options;
pub mod pinned;
pub mod sort;
pub mod transaction;
pub mod tree;

pub use aggregation::AggregateAccumulator;
pub use batch::{AsyncTransactionQueue, TransactionCallback};
pub use changed_path::{ChangedPath, ChangedRowNodes};
pub use filter::{FilterCondition, FilterModel};
pub use grouping::{GroupMode, GroupStage};
pub use model::{ClientSideRowModel, RefreshStep};
pub use node::{
    ListenerId, NodeId, RowNode, RowNodeArena, RowNodeEvent, RowNodeEventKind, RowNodeListeners, RowPinned,
    GROUP_ID_PREFIX, ROOT_NODE_ID,
};
pub use options::{GridCallbacks, GridOptions, RowSelectionMode};
pub use pinned::PinnedRowModel;
pub use sort::{SortStage, SortStats};
pub use transaction::{RowDataTransaction, RowNodeTransaction};
pub use tree::TreeBuilder;
