//! Idempotent order writes.
//!
//! [`SyncEngine`] turns one order snapshot into an upsert of its summary row
//! and a full replacement of its line items. Syncing the same snapshot twice
//! leaves the read model exactly as syncing it once.

mod locks;

pub use locks::OrderLocks;

use crate::commerce::{CommerceOrder, OrderSnapshot};
use crate::error::{ReadModelError, Result};
use crate::storage::ReadModelStore;
use crate::types::{LineItem, Money, OrderId, OrderSummary};
use chrono::NaiveDate;
use std::sync::Arc;

/// Result of a successful sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub order_id: OrderId,
    pub items_written: usize,
}

/// The only writer of summary and item rows on the live path.
pub struct SyncEngine {
    store: Arc<dyn ReadModelStore>,
    locks: OrderLocks,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ReadModelStore>) -> Self {
        Self::with_locks(store, OrderLocks::default())
    }

    pub fn with_locks(store: Arc<dyn ReadModelStore>, locks: OrderLocks) -> Self {
        Self { store, locks }
    }

    /// Write the summary row and replace the item set of `order_id`.
    ///
    /// Rejects negative totals and zero quantities before touching storage.
    pub fn sync(
        &self,
        order_id: OrderId,
        total: Money,
        report_date: NaiveDate,
        items: &[LineItem],
    ) -> Result<SyncReport> {
        Self::validate(order_id, total, items)?;

        let _guard = self.locks.lock(order_id);
        self.store
            .upsert_summary(&OrderSummary::new(order_id, total, report_date))?;
        let items_written = self.store.replace_items(order_id, report_date, items)?;

        tracing::debug!(
            order_id = %order_id,
            total = %total,
            report_date = %report_date,
            items = items_written,
            "synced order"
        );

        Ok(SyncReport {
            order_id,
            items_written,
        })
    }

    /// Extract a snapshot from a commerce order and sync it.
    pub fn sync_order(
        &self,
        order: &dyn CommerceOrder,
        fallback_date: NaiveDate,
    ) -> Result<SyncReport> {
        let snapshot = OrderSnapshot::extract(order, fallback_date)?;
        self.sync(
            snapshot.order_id,
            snapshot.total,
            snapshot.report_date,
            &snapshot.items,
        )
    }

    /// Replace only the item set of an order that already has a summary row.
    /// Items are dated with the summary's report date.
    pub fn backfill_items(&self, order_id: OrderId, items: &[LineItem]) -> Result<usize> {
        let _guard = self.locks.lock(order_id);
        let summary = self.store.summary(order_id).ok_or_else(|| {
            ReadModelError::InvalidOrder {
                order_id,
                reason: "no summary row".into(),
            }
        })?;
        Self::validate(order_id, summary.total, items)?;
        self.store
            .replace_items(order_id, summary.report_date, items)
    }

    /// Remove the summary row and every item row. Returns whether anything
    /// existed.
    pub fn delete(&self, order_id: OrderId) -> Result<bool> {
        let _guard = self.locks.lock(order_id);
        let items_removed = self.store.delete_items(order_id)?;
        let summary_removed = self.store.delete_summary(order_id)?;

        tracing::debug!(
            order_id = %order_id,
            items = items_removed,
            summary = summary_removed,
            "deleted order"
        );

        Ok(summary_removed || items_removed > 0)
    }

    pub fn store(&self) -> &Arc<dyn ReadModelStore> {
        &self.store
    }

    fn validate(order_id: OrderId, total: Money, items: &[LineItem]) -> Result<()> {
        if total.is_negative() {
            return Err(ReadModelError::InvalidOrder {
                order_id,
                reason: format!("negative total {}", total),
            });
        }
        if let Some(line) = items.iter().find(|line| line.quantity == 0) {
            return Err(ReadModelError::InvalidOrder {
                order_id,
                reason: format!("zero quantity for product {}", line.product_id),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::storage::ReadModel;
    use crate::types::ProductId;
    use tempfile::TempDir;

    fn test_engine(dir: &TempDir) -> SyncEngine {
        let store = ReadModel::create(StorageConfig {
            path: dir.path().join("readmodel"),
            ..StorageConfig::default()
        })
        .unwrap();
        SyncEngine::new(Arc::new(store))
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    #[test]
    fn test_sync_writes_both_tables() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);

        let report = engine
            .sync(
                OrderId(1),
                Money::from_units(30),
                date(20),
                &[
                    LineItem::new(ProductId(1), "Widget", 2, Money::from_units(20)),
                    LineItem::new(ProductId(2), "Gadget", 1, Money::from_units(10)),
                ],
            )
            .unwrap();

        assert_eq!(report.items_written, 2);
        let summary = engine.store().summary(OrderId(1)).unwrap();
        assert_eq!(summary.total, Money::from_units(30));
        assert!(engine
            .store()
            .items_for_order(OrderId(1))
            .iter()
            .all(|item| item.report_date == date(20)));
    }

    #[test]
    fn test_resync_overwrites() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);
        let line = LineItem::new(ProductId(1), "Widget", 1, Money::from_units(10));

        engine
            .sync(OrderId(1), Money::from_units(10), date(20), &[line.clone(), line.clone()])
            .unwrap();
        engine
            .sync(OrderId(1), Money::from_units(99), date(22), &[line])
            .unwrap();

        let summary = engine.store().summary(OrderId(1)).unwrap();
        assert_eq!(summary.total, Money::from_units(99));
        assert_eq!(summary.report_date, date(22));
        let items = engine.store().items_for_order(OrderId(1));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].report_date, date(22));
    }

    #[test]
    fn test_rejects_invalid_input() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);

        let negative = engine.sync(OrderId(1), Money::from_cents(-1), date(20), &[]);
        assert!(matches!(negative, Err(ReadModelError::InvalidOrder { .. })));

        let zero_qty = engine.sync(
            OrderId(1),
            Money::from_units(1),
            date(20),
            &[LineItem::new(ProductId(1), "Widget", 0, Money::ZERO)],
        );
        assert!(matches!(zero_qty, Err(ReadModelError::InvalidOrder { .. })));

        assert!(engine.store().summary(OrderId(1)).is_none());
    }

    #[test]
    fn test_delete_missing_order() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);
        assert!(!engine.delete(OrderId(42)).unwrap());
    }
}
