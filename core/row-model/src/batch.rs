//! FILENAME: core/row-model/src/batch.rs
//! PURPOSE: Queue for asynchronous transactions.
//! CONTEXT: The host flushes the queue on its next tick through
//! `ClientSideRowModel::flush_async_transactions`. Queued transactions are
//! applied in submission order and share one pipeline run.

use std::collections::VecDeque;
use std::fmt;

use crate::transaction::{RowDataTransaction, RowNodeTransaction};

/// Invoked with the result of a queued transaction once it has been applied.
pub type TransactionCallback = Box<dyn FnOnce(&RowNodeTransaction)>;

pub(crate) struct QueuedTransaction {
    pub transaction: RowDataTransaction,
    pub callback: Option<TransactionCallback>,
}

#[derive(Default)]
pub struct AsyncTransactionQueue {
    pending: VecDeque<QueuedTransaction>,
}

impl AsyncTransactionQueue {
    pub fn new() -> Self {
        AsyncTransactionQueue::default()
    }

    pub fn push(&mut self, transaction: RowDataTransaction, callback: Option<TransactionCallback>) {
        self.pending.push_back(QueuedTransaction { transaction, callback });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes every queued transaction in submission order.
    pub(crate) fn drain(&mut self) -> Vec<QueuedTransaction> {
        self.pending.drain(..).collect()
    }

    /// Drops every queued transaction without applying it. Callbacks are not
    /// invoked. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

impl fmt::Debug for AsyncTransactionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTransactionQueue").field("pending", &self.pending.len()).finish()
    }
}
