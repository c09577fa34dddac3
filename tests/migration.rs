//! Integration tests for the backfill coordinator and stepper.

use chrono::NaiveDate;
use orderlens::{
    cancellation, CommerceOrder, FixedClock, InMemoryCommerce, LineItem, MigrationCoordinator,
    MigrationCursor, MigrationState, MigrationStatus, MigrationStepper, Money, OrderDraft, OrderId,
    OrderStatus, ReadModel, ReadModelStore, StepDriver, StorageConfig, SyncEngine,
};
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn storage_config(dir: &TempDir) -> StorageConfig {
    StorageConfig {
        path: dir.path().join("readmodel"),
        create_if_missing: true,
        sync_interval: 100,
        query_cache_size: 8,
    }
}

fn test_store(dir: &TempDir) -> Arc<ReadModel> {
    Arc::new(ReadModel::create(storage_config(dir)).unwrap())
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
}

/// Commerce with `eligible` completed/processing orders (ids 1..) interleaved
/// with cancelled ones that the backfill must skip.
fn seeded_commerce(eligible: u64) -> Arc<InMemoryCommerce> {
    let commerce = Arc::new(InMemoryCommerce::new());
    let product = commerce.add_product("Widget", Money::from_units(10), &[]);
    for i in 1..=eligible {
        let status = if i % 2 == 0 {
            OrderStatus::Processing
        } else {
            OrderStatus::Completed
        };
        commerce
            .insert_order(
                OrderDraft::new(OrderId(i * 10))
                    .status(status)
                    .completed_on(date(1 + (i % 28) as u32))
                    .line(product, 1 + (i % 3) as u32),
            )
            .unwrap();
        commerce
            .insert_order(
                OrderDraft::new(OrderId(i * 10 + 1))
                    .status(OrderStatus::Cancelled)
                    .line(product, 1),
            )
            .unwrap();
    }
    commerce
}

fn coordinator(store: &Arc<ReadModel>, commerce: &Arc<InMemoryCommerce>) -> MigrationCoordinator {
    let engine = Arc::new(SyncEngine::new(store.clone()));
    MigrationCoordinator::new(
        store.clone(),
        commerce.clone(),
        engine,
        Arc::new(FixedClock::on(date(31))),
    )
}

/// Run batches of `batch_size` from offset 0 until the migration finishes.
fn run_to_end(coordinator: &MigrationCoordinator, batch_size: usize) -> MigrationState {
    let mut offset = 0;
    for _ in 0..10_000 {
        let report = coordinator.migrate_batch(offset, batch_size).unwrap();
        offset += report.fetched;
        if report.status.is_terminal() {
            return coordinator.state().unwrap();
        }
    }
    panic!("migration did not finish");
}

#[test]
fn test_full_migration() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(12);
    let coordinator = coordinator(&store, &commerce);

    let initial = coordinator.initialize().unwrap();
    assert_eq!(initial.status, MigrationStatus::Pending);
    assert_eq!(initial.total_orders, 12);

    let first = coordinator.migrate_batch(0, 5).unwrap();
    assert_eq!(first.status, MigrationStatus::InProgress);
    assert_eq!(first.migrated_count, 5);
    assert!(coordinator.state().unwrap().started_at.is_some());

    let state = run_to_end(&coordinator, 5);
    assert_eq!(state.status, MigrationStatus::Completed);
    assert_eq!(state.migrated_count, 12);
    assert_eq!(state.error_count, 0);
    assert!(state.completed_at.is_some());

    // Only eligible orders landed in the read model
    assert_eq!(store.order_ids().len(), 12);
    assert!(store.summary(OrderId(11)).is_none());
    assert!(store.has_items(OrderId(120)));
}

#[test]
fn test_exact_batch_completes() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(4);
    let coordinator = coordinator(&store, &commerce);

    let report = coordinator.migrate_batch(0, 4).unwrap();
    assert_eq!(report.fetched, 4);
    assert_eq!(report.status, MigrationStatus::Completed);
}

#[test]
fn test_failing_order_is_recorded_not_retried() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(6);
    commerce.corrupt_order(OrderId(30));
    let coordinator = coordinator(&store, &commerce);

    let report = coordinator.migrate_batch(0, 6).unwrap();

    assert_eq!(report.migrated_count, 6);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Order #30: "));
    assert!(store.summary(OrderId(30)).is_none());
    assert_eq!(store.order_ids().len(), 5);

    let state = coordinator.state().unwrap();
    assert_eq!(state.errors, report.errors);
}

#[test]
fn test_error_list_is_bounded() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(10);
    for i in 1..=10 {
        commerce.corrupt_order(OrderId(i * 10));
    }
    let coordinator = coordinator(&store, &commerce).with_max_retained_errors(3);

    let state = run_to_end(&coordinator, 4);

    assert_eq!(state.error_count, 10);
    assert_eq!(state.errors.len(), 3);
    assert!(state.errors[0].starts_with("Order #10: "));
    assert_eq!(state.status, MigrationStatus::Completed);
}

#[test]
fn test_completed_migration_resyncs_without_state_change() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(3);
    let coordinator = coordinator(&store, &commerce);

    let finished = run_to_end(&coordinator, 10);
    store.delete_summary(OrderId(10)).unwrap();

    let report = coordinator.migrate_batch(0, 10).unwrap();

    assert_eq!(report.status, MigrationStatus::Completed);
    assert_eq!(coordinator.state().unwrap(), finished);
    assert!(store.summary(OrderId(10)).is_some());
}

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let commerce = seeded_commerce(8);

    {
        let store = test_store(&dir);
        let coordinator = coordinator(&store, &commerce);
        coordinator.migrate_batch(0, 3).unwrap();
    }

    let store = Arc::new(ReadModel::open(storage_config(&dir)).unwrap());
    let coordinator = coordinator(&store, &commerce);
    let state = coordinator.state().unwrap();
    assert_eq!(state.status, MigrationStatus::InProgress);
    assert_eq!(state.migrated_count, 3);

    let report = coordinator.migrate_batch(3, 10).unwrap();
    assert_eq!(report.status, MigrationStatus::Completed);
    assert_eq!(report.migrated_count, 8);
    assert_eq!(store.order_ids().len(), 8);
}

#[test]
fn test_backfill_missing_items() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(4);
    let coordinator = coordinator(&store, &commerce);
    run_to_end(&coordinator, 10);

    store.delete_items(OrderId(20)).unwrap();
    store.delete_items(OrderId(40)).unwrap();
    commerce.remove_order(OrderId(40));

    let report = coordinator.backfill_missing_items().unwrap();

    assert_eq!(report.orders_missing_items, 2);
    assert_eq!(report.items_written, 1);
    assert_eq!(report.errors, vec!["Order #40: Commerce error: order not found".to_string()]);

    let items = store.items_for_order(OrderId(20));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].report_date, store.summary(OrderId(20)).unwrap().report_date);
}

#[test]
fn test_stepper_drives_migration() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(7);
    let coordinator = Arc::new(coordinator(&store, &commerce));

    let (tx, rx) = crossbeam_channel::unbounded();
    let driver = StepDriver::new(MigrationStepper::new(coordinator.clone()), 3).with_progress(tx);
    let report = driver.run(MigrationCursor::default()).unwrap();

    assert!(report.finished);
    assert_eq!(report.state, MigrationCursor { offset: 7 });
    assert_eq!(report.steps, 3);
    let offsets: Vec<u64> = rx.try_iter().map(|c| c.offset).collect();
    assert_eq!(offsets, vec![3, 6, 7]);
    assert_eq!(coordinator.state().unwrap().status, MigrationStatus::Completed);
}

#[test]
fn test_stepper_cancelled_midway_resumes() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(9);
    let coordinator = Arc::new(coordinator(&store, &commerce));

    let (handle, token) = cancellation();
    handle.cancel();
    let driver = StepDriver::new(MigrationStepper::new(coordinator.clone()), 2).with_cancel(token);
    let stopped = driver.run(MigrationCursor { offset: 0 }).unwrap();
    assert!(!stopped.finished);
    assert_eq!(stopped.steps, 0);

    // A fresh driver picks up from the returned cursor
    let resumed = StepDriver::new(MigrationStepper::new(coordinator.clone()), 2)
        .run(stopped.state)
        .unwrap();
    assert!(resumed.finished);
    assert_eq!(coordinator.state().unwrap().migrated_count, 9);
}

#[test]
fn test_items_match_order_lines() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(2);
    let coordinator = coordinator(&store, &commerce);
    run_to_end(&coordinator, 10);

    let items: Vec<LineItem> = store
        .items_for_order(OrderId(20))
        .into_iter()
        .map(|i| LineItem::new(i.product_id, i.product_name, i.quantity, i.line_total))
        .collect();
    let order = orderlens::OrderSource::get_order(commerce.as_ref(), OrderId(20))
        .unwrap()
        .unwrap();
    assert_eq!(items, order.items().unwrap());
}

#[test]
fn test_undated_processing_order_keeps_creation_date() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = Arc::new(InMemoryCommerce::new());
    let product = commerce.add_product("Widget", Money::from_units(10), &[]);
    commerce
        .insert_order(
            OrderDraft::new(OrderId(1))
                .status(OrderStatus::Processing)
                .created_on(date(5))
                .line(product, 1),
        )
        .unwrap();
    commerce
        .insert_order(
            OrderDraft::new(OrderId(2))
                .status(OrderStatus::Completed)
                .created_on(date(5))
                .completed_on(date(9))
                .line(product, 1),
        )
        .unwrap();
    let coordinator = coordinator(&store, &commerce);

    let state = run_to_end(&coordinator, 10);
    assert_eq!(state.status, MigrationStatus::Completed);

    // Placed on the 5th, migrated on the 31st
    assert_eq!(store.summary(OrderId(1)).unwrap().report_date, date(5));
    assert_eq!(store.items_for_order(OrderId(1))[0].report_date, date(5));
    assert_eq!(store.summary(OrderId(2)).unwrap().report_date, date(9));

    // Re-running keeps the row where it was
    coordinator.migrate_batch(0, 10).unwrap();
    assert_eq!(store.summary(OrderId(1)).unwrap().report_date, date(5));
}

#[test]
fn test_concurrent_batches_keep_counts() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let commerce = seeded_commerce(40);
    for i in [3, 7, 15, 23] {
        commerce.corrupt_order(OrderId(i * 10));
    }
    let coordinator = Arc::new(coordinator(&store, &commerce));

    // Start the run so every concurrent batch sees it in progress
    let first = coordinator.migrate_batch(0, 1).unwrap();
    assert_eq!(first.status, MigrationStatus::InProgress);

    // Disjoint and overlapping windows, each issued twice; none reaches the end
    let windows = [(1u64, 9usize), (10, 10), (20, 10), (5, 10), (15, 10), (25, 5)];
    let calls: Vec<(u64, usize)> = windows.iter().chain(windows.iter()).copied().collect();
    let barrier = Arc::new(Barrier::new(calls.len()));

    let reports: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = calls
            .iter()
            .map(|&(offset, size)| {
                let coordinator = Arc::clone(&coordinator);
                let barrier = Arc::clone(&barrier);
                scope.spawn(move || {
                    barrier.wait();
                    coordinator.migrate_batch(offset, size).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let failures: u64 = reports.iter().map(|r| r.errors.len() as u64).sum();
    assert_eq!(failures, 14);

    let state = coordinator.state().unwrap();
    assert_eq!(state.status, MigrationStatus::InProgress);
    assert_eq!(state.error_count, failures);
    assert_eq!(state.errors.len() as u64, failures);
    assert_eq!(state.migrated_count, 30);

    let last = coordinator.migrate_batch(30, 10).unwrap();
    assert_eq!(last.status, MigrationStatus::Completed);
    assert_eq!(last.migrated_count, 40);
    assert_eq!(last.error_count, failures);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// One pass with batch N ends in the same state as ceil(N/k) batches of k.
    #[test]
    fn prop_backfill_is_resumable(orders in 1u64..30, batch in 1usize..12, failing in 0u64..30) {
        let commerce = seeded_commerce(orders);
        commerce.corrupt_order(OrderId((failing % orders + 1) * 10));

        let one_dir = TempDir::new().unwrap();
        let one_store = test_store(&one_dir);
        let single = run_to_end(&coordinator(&one_store, &commerce), orders as usize);

        let split_dir = TempDir::new().unwrap();
        let split_store = test_store(&split_dir);
        let split = run_to_end(&coordinator(&split_store, &commerce), batch);

        prop_assert_eq!(&single, &split);
        prop_assert_eq!(single.migrated_count, orders);
        prop_assert_eq!(single.error_count, 1);
        prop_assert_eq!(one_store.order_ids(), split_store.order_ids());
    }
}
