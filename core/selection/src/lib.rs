//! FILENAME: core/selection/src/lib.rs
//! PURPOSE: Row selection for the client-side row model.
//! CONTEXT: Two strategies behind one trait: flat (select-all flag plus toggled
//! ids) and group-selects-children (toggle tree). `SelectionService` owns the
//! strategy chosen from the grid options and keeps node flags in sync.

pub mod default_strategy;
pub mod error;
pub mod group_strategy;
pub mod service;
pub mod state;
pub mod strategy;

pub use default_strategy::DefaultStrategy;
pub use error::SelectionError;
pub use group_strategy::GroupSelectsChildrenStrategy;
pub use service::SelectionService;
pub use state::{RecursiveSelectionState, SelectionState, ServerSideSelectionState};
pub use strategy::{SelectionContext, SelectionStrategy, SetSelectedParams};
