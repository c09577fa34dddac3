//! Read model storage.
//!
//! Two flat tables (order summaries and order line items) plus the migration
//! state record. [`ReadModel`] is the file-backed implementation; engines only
//! see the [`ReadModelStore`] trait.

mod store;
mod tables;

pub use store::{ReadModel, ReadModelStats};

use crate::error::Result;
use crate::migration::MigrationState;
use crate::types::{LineItem, OrderId, OrderLineItem, OrderSummary};
use chrono::NaiveDate;

/// Storage operations used by the sync, migration, seed and query engines.
///
/// Reads are served from memory and never fail; writes are journaled first.
pub trait ReadModelStore: Send + Sync {
    /// Insert the summary row, or overwrite total and date if it exists.
    fn upsert_summary(&self, summary: &OrderSummary) -> Result<()>;

    /// Replace every item row of `order_id` with `items`, as one unit.
    /// Returns the number of rows inserted.
    fn replace_items(
        &self,
        order_id: OrderId,
        report_date: NaiveDate,
        items: &[LineItem],
    ) -> Result<usize>;

    /// Returns whether a row was removed.
    fn delete_summary(&self, order_id: OrderId) -> Result<bool>;

    /// Returns the number of item rows removed.
    fn delete_items(&self, order_id: OrderId) -> Result<usize>;

    /// Insert summaries whose order id is not present yet; existing ids and
    /// repeated ids within the batch are skipped. Returns the rows written.
    fn insert_summaries_ignore(&self, rows: &[OrderSummary]) -> Result<usize>;

    fn summary(&self, order_id: OrderId) -> Option<OrderSummary>;

    fn items_for_order(&self, order_id: OrderId) -> Vec<OrderLineItem>;

    /// Summaries with `start <= report_date <= end`, by date then order id.
    fn summaries_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<OrderSummary>;

    /// Item rows with `start <= report_date <= end`, by date then row id.
    fn items_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<OrderLineItem>;

    /// Every order id with a summary row, ascending.
    fn order_ids(&self) -> Vec<OrderId>;

    fn has_items(&self, order_id: OrderId) -> bool;

    /// Delete summary and item rows of every order id `>= min_id`.
    /// Returns the number of rows removed from both tables.
    fn purge_orders_from(&self, min_id: OrderId) -> Result<usize>;

    fn load_migration_state(&self) -> Result<Option<MigrationState>>;

    fn save_migration_state(&self, state: &MigrationState) -> Result<()>;

    /// Incremented by every write that changed a table.
    fn generation(&self) -> u64;
}
