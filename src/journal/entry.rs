//! Journal entry types.

use crate::types::{ItemRowId, LineItem, OrderId, OrderSummary};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single journal entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal, starting at 1.
    pub seq: u64,
    /// Microseconds since the Unix epoch when the entry was written.
    pub timestamp: i64,
    pub op: JournalOp,
}

/// Mutations recorded in the journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalOp {
    /// Insert or overwrite one summary row.
    UpsertSummary(OrderSummary),
    /// Insert summary rows whose order id is not present yet.
    InsertSummaries(Vec<OrderSummary>),
    /// Drop every item row of an order, then insert `items` with consecutive
    /// row ids starting at `first_row`.
    ReplaceItems {
        order_id: OrderId,
        report_date: NaiveDate,
        first_row: ItemRowId,
        items: Vec<LineItem>,
    },
    DeleteSummary(OrderId),
    DeleteItems(OrderId),
    /// Delete summary and item rows of every order id at or above the bound.
    PurgeFrom(OrderId),
}

impl JournalOp {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            JournalOp::UpsertSummary(_) => "upsert_summary",
            JournalOp::InsertSummaries(_) => "insert_summaries",
            JournalOp::ReplaceItems { .. } => "replace_items",
            JournalOp::DeleteSummary(_) => "delete_summary",
            JournalOp::DeleteItems(_) => "delete_items",
            JournalOp::PurgeFrom(_) => "purge_from",
        }
    }
}
