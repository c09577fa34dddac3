//! Resumable backfill of historical orders.

use super::state::{MigrationState, MigrationStatus};
use crate::commerce::OrderSource;
use crate::error::{ReadModelError, Result};
use crate::storage::ReadModelStore;
use crate::sync::SyncEngine;
use crate::types::{Clock, OrderStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Result of one `migrate_batch` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Orders fetched by this batch; the next cursor is `offset + fetched`.
    #[serde(skip)]
    pub fetched: u64,
    pub migrated_count: u64,
    pub error_count: u64,
    pub status: MigrationStatus,
    /// Failures of this batch only.
    pub errors: Vec<String>,
}

/// Result of `backfill_missing_items`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemBackfillReport {
    /// Summary rows found without item rows.
    pub orders_missing_items: u64,
    pub items_written: u64,
    pub errors: Vec<String>,
}

/// Drives the backfill state machine.
///
/// `not_needed` and `completed` are terminal. A `pending` migration moves to
/// `in_progress` on the first batch and to `completed` once the cursor runs
/// past the last eligible order. Per-order failures are counted and recorded,
/// never fatal.
pub struct MigrationCoordinator {
    store: Arc<dyn ReadModelStore>,
    orders: Arc<dyn OrderSource>,
    engine: Arc<SyncEngine>,
    clock: Arc<dyn Clock>,
    /// Held around state reads and writes, never around order fetch/sync.
    state_lock: Mutex<()>,
    max_retained_errors: usize,
}

impl MigrationCoordinator {
    pub const DEFAULT_MAX_RETAINED_ERRORS: usize = 100;

    pub fn new(
        store: Arc<dyn ReadModelStore>,
        orders: Arc<dyn OrderSource>,
        engine: Arc<SyncEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            orders,
            engine,
            clock,
            state_lock: Mutex::new(()),
            max_retained_errors: Self::DEFAULT_MAX_RETAINED_ERRORS,
        }
    }

    pub fn with_max_retained_errors(mut self, max: usize) -> Self {
        self.max_retained_errors = max;
        self
    }

    /// Count eligible orders and persist the initial state. Runs once; later
    /// calls return the stored state.
    pub fn initialize(&self) -> Result<MigrationState> {
        let _lock = self.state_lock.lock();
        self.load_or_detect()
    }

    /// The stored state, or a `not_needed` default before initialization.
    pub fn state(&self) -> Result<MigrationState> {
        Ok(self.store.load_migration_state()?.unwrap_or_default())
    }

    /// Sync up to `batch_size` eligible orders starting at `offset`.
    pub fn migrate_batch(&self, offset: u64, batch_size: usize) -> Result<BatchReport> {
        if batch_size == 0 {
            return Err(ReadModelError::Validation(
                "batch_size must be at least 1".into(),
            ));
        }

        let starting_status = {
            let _lock = self.state_lock.lock();
            let mut state = self.load_or_detect()?;
            match state.status {
                MigrationStatus::NotNeeded => {
                    return Ok(Self::report(&state, 0, Vec::new()));
                }
                MigrationStatus::Pending => {
                    state.status = MigrationStatus::InProgress;
                    if state.started_at.is_none() {
                        state.started_at = Some(self.clock.now());
                    }
                    self.store.save_migration_state(&state)?;
                    tracing::info!(total_orders = state.total_orders, "migration started");
                }
                _ => {}
            }
            state.status
        };

        let orders = self
            .orders
            .list_orders(&OrderStatus::eligible(), offset, batch_size)?;
        let fetched = orders.len() as u64;
        let fallback_date = self.clock.today();

        let mut batch_errors = Vec::new();
        for order in &orders {
            if let Err(e) = self.engine.sync_order(order.as_ref(), fallback_date) {
                tracing::warn!(order_id = %order.id(), error = %e, "failed to migrate order");
                batch_errors.push(format!("Order #{}: {}", order.id(), e));
            }
        }

        let _lock = self.state_lock.lock();
        let mut state = self.load_or_detect()?;

        // A finished migration is only re-synced; its record stays as it was
        if starting_status == MigrationStatus::Completed {
            return Ok(Self::report(&state, fetched, batch_errors));
        }

        let cursor = offset.saturating_add(fetched).min(state.total_orders);
        state.migrated_count = state.migrated_count.max(cursor);
        state.error_count += batch_errors.len() as u64;
        let room = self.max_retained_errors.saturating_sub(state.errors.len());
        state
            .errors
            .extend(batch_errors.iter().take(room).cloned());

        let exhausted =
            fetched < batch_size as u64 || offset.saturating_add(fetched) >= state.total_orders;
        if exhausted && state.status == MigrationStatus::InProgress {
            state.status = MigrationStatus::Completed;
            if state.completed_at.is_none() {
                state.completed_at = Some(self.clock.now());
            }
            tracing::info!(
                migrated = state.migrated_count,
                errors = state.error_count,
                "migration completed"
            );
        }

        self.store.save_migration_state(&state)?;

        tracing::debug!(
            offset,
            fetched,
            failed = batch_errors.len(),
            migrated = state.migrated_count,
            "migrated batch"
        );

        Ok(Self::report(&state, fetched, batch_errors))
    }

    /// Re-extract line items for summary rows that have none.
    pub fn backfill_missing_items(&self) -> Result<ItemBackfillReport> {
        let mut report = ItemBackfillReport::default();

        for order_id in self.store.order_ids() {
            if self.store.has_items(order_id) {
                continue;
            }
            report.orders_missing_items += 1;

            let written = match self.orders.get_order(order_id) {
                Ok(Some(order)) => order
                    .items()
                    .and_then(|items| self.engine.backfill_items(order_id, &items)),
                Ok(None) => Err(ReadModelError::Commerce("order not found".into())),
                Err(e) => Err(e),
            };

            match written {
                Ok(count) => report.items_written += count as u64,
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "failed to backfill items");
                    report.errors.push(format!("Order #{}: {}", order_id, e));
                }
            }
        }

        tracing::info!(
            orders = report.orders_missing_items,
            items = report.items_written,
            errors = report.errors.len(),
            "backfilled missing line items"
        );

        Ok(report)
    }

    /// Caller holds `state_lock`.
    fn load_or_detect(&self) -> Result<MigrationState> {
        if let Some(state) = self.store.load_migration_state()? {
            return Ok(state);
        }

        let total_orders = self.orders.count_orders(&OrderStatus::eligible())?;
        let state = MigrationState::detected(total_orders);
        self.store.save_migration_state(&state)?;

        tracing::info!(total_orders, status = %state.status, "detected migration state");
        Ok(state)
    }

    fn report(state: &MigrationState, fetched: u64, errors: Vec<String>) -> BatchReport {
        BatchReport {
            fetched,
            migrated_count: state.migrated_count,
            error_count: state.error_count,
            status: state.status,
            errors,
        }
    }
}
