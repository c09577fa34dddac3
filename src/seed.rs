//! Demo data generation.
//!
//! Demo orders are created in the commerce system and then pushed through the
//! regular "order completed" path, so they exercise exactly the code real
//! orders do. Their ids start at a fixed offset, which lets
//! [`Seeder::clean_dummy_data`] remove them again.

use crate::commerce::{InMemoryCommerce, OrderDraft};
use crate::error::Result;
use crate::lifecycle::{LifecycleRouter, RouteOutcome};
use crate::migration::{StepOutcome, Stepper};
use crate::storage::ReadModelStore;
use crate::types::{Clock, Money, OrderId, OrderStatus, OrderSummary, ProductId};
use chrono::Duration;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;

const DEMO_PRODUCT_PREFIX: &str = "Speed Demo Product";
const MIN_DEMO_PRODUCTS: usize = 5;
const DEMO_PRODUCTS_CREATED: usize = 20;
const ORDER_MAX_DAYS_AGO: i64 = 90;
const SUMMARY_MAX_DAYS_AGO: i64 = 60;
const SUMMARY_CHUNK: usize = 100;

/// Creates demo orders in a commerce system.
pub trait OrderGenerator: Send + Sync {
    /// Create `count` completed orders and return their ids.
    fn generate(&self, count: usize) -> Result<Vec<OrderId>>;

    /// Delete every order and product this generator created. Returns the
    /// number of orders removed.
    fn remove_generated(&self) -> Result<usize>;
}

/// Completed orders of 1-3 random demo products (quantity 1-3 each), dated
/// up to 90 days back.
pub struct DemoOrderGenerator {
    commerce: Arc<InMemoryCommerce>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    id_floor: OrderId,
}

impl DemoOrderGenerator {
    pub fn new(commerce: Arc<InMemoryCommerce>, clock: Arc<dyn Clock>, id_floor: OrderId) -> Self {
        Self {
            commerce,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
            id_floor,
        }
    }

    /// Deterministic output for a given seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Create demo products when fewer than five exist.
    pub fn ensure_products(&self) -> Vec<ProductId> {
        let existing = self.commerce.products_named(DEMO_PRODUCT_PREFIX);
        if existing.len() >= MIN_DEMO_PRODUCTS {
            return existing.into_iter().map(|(id, _)| id).collect();
        }

        let mut rng = self.rng.lock();
        for _ in 0..DEMO_PRODUCTS_CREATED {
            let name = format!("{} #{}", DEMO_PRODUCT_PREFIX, rng.gen_range(1000..=9999));
            let price = Money::from_units(rng.gen_range(10..=100));
            self.commerce.add_product(name, price, &[]);
        }
        tracing::info!(count = DEMO_PRODUCTS_CREATED, "created demo products");

        self.commerce
            .products_named(DEMO_PRODUCT_PREFIX)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }
}

impl OrderGenerator for DemoOrderGenerator {
    fn generate(&self, count: usize) -> Result<Vec<OrderId>> {
        let products = self.ensure_products();
        let today = self.clock.today();
        let mut rng = self.rng.lock();
        let mut ids = Vec::with_capacity(count);

        for _ in 0..count {
            let id = self.commerce.next_order_id(self.id_floor);
            let date = today - Duration::days(rng.gen_range(0..=ORDER_MAX_DAYS_AGO));

            let mut draft = OrderDraft::new(id)
                .status(OrderStatus::Completed)
                .created_on(date)
                .completed_on(date);
            for _ in 0..rng.gen_range(1..=3) {
                if let Some(product) = products.choose(&mut *rng) {
                    draft = draft.line(*product, rng.gen_range(1..=3));
                }
            }

            self.commerce.insert_order(draft)?;
            ids.push(id);
        }

        Ok(ids)
    }

    fn remove_generated(&self) -> Result<usize> {
        let orders = self.commerce.remove_orders_from(self.id_floor);
        let products = self.commerce.remove_products_named(DEMO_PRODUCT_PREFIX);
        tracing::info!(orders, products, "removed demo orders and products");
        Ok(orders)
    }
}

/// Result of [`Seeder::seed_batch`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Orders that reached the read model.
    pub count: usize,
    #[serde(skip)]
    pub failed: usize,
}

/// Fills the read model with demo data.
pub struct Seeder {
    generator: Arc<dyn OrderGenerator>,
    router: Arc<LifecycleRouter>,
    store: Arc<dyn ReadModelStore>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    dummy_offset: OrderId,
}

impl Seeder {
    pub fn new(
        generator: Arc<dyn OrderGenerator>,
        router: Arc<LifecycleRouter>,
        store: Arc<dyn ReadModelStore>,
        clock: Arc<dyn Clock>,
        dummy_offset: OrderId,
    ) -> Self {
        Self {
            generator,
            router,
            store,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
            dummy_offset,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Generate `count` orders and sync each through the completion path.
    pub fn seed_batch(&self, count: usize) -> Result<SeedReport> {
        let ids = self.generator.generate(count)?;

        let mut report = SeedReport {
            count: 0,
            failed: 0,
        };
        for id in ids {
            match self.router.on_order_completed(id) {
                RouteOutcome::Synced { .. } => report.count += 1,
                _ => report.failed += 1,
            }
        }

        tracing::info!(count = report.count, failed = report.failed, "seeded demo orders");
        Ok(report)
    }

    /// Bulk-insert `count` summary rows without orders behind them, numbered
    /// from the dummy offset. Rows whose id already exists are skipped.
    /// Returns the rows written.
    pub fn seed_summaries(&self, count: usize) -> Result<usize> {
        let today = self.clock.today();
        let rows: Vec<OrderSummary> = {
            let mut rng = self.rng.lock();
            (0..count as u64)
                .map(|i| {
                    let cents = rng.gen_range(20..=300) * 100 + rng.gen_range(0..=99);
                    let date = today - Duration::days(rng.gen_range(0..=SUMMARY_MAX_DAYS_AGO));
                    OrderSummary::new(
                        OrderId(self.dummy_offset.0 + i),
                        Money::from_cents(cents),
                        date,
                    )
                })
                .collect()
        };

        let mut written = 0;
        for chunk in rows.chunks(SUMMARY_CHUNK) {
            written += self.store.insert_summaries_ignore(chunk)?;
        }

        tracing::info!(requested = count, written, "bulk-seeded summaries");
        Ok(written)
    }

    /// Delete the generated orders and products from the commerce system,
    /// then every read model row at or above the dummy offset. Returns the
    /// read model rows removed.
    pub fn clean_dummy_data(&self) -> Result<usize> {
        self.generator.remove_generated()?;
        let removed = self.store.purge_orders_from(self.dummy_offset)?;
        tracing::info!(removed, "removed demo rows");
        Ok(removed)
    }
}

/// Progress of a seeding run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedProgress {
    pub generated: usize,
    pub target: usize,
}

/// Seeding as a stepper: each step seeds one batch.
pub struct SeedStepper {
    seeder: Arc<Seeder>,
}

impl SeedStepper {
    pub fn new(seeder: Arc<Seeder>) -> Self {
        Self { seeder }
    }
}

impl Stepper for SeedStepper {
    type State = SeedProgress;

    fn step(&self, state: SeedProgress, step_size: usize) -> Result<StepOutcome<SeedProgress>> {
        let batch = step_size
            .max(1)
            .min(state.target.saturating_sub(state.generated));
        if batch > 0 {
            self.seeder.seed_batch(batch)?;
        }
        let generated = state.generated + batch;
        Ok(StepOutcome {
            state: SeedProgress {
                generated,
                target: state.target,
            },
            done: generated >= state.target,
        })
    }
}
