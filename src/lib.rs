//! # orderlens
//!
//! A query-optimized read model of an external order ledger, kept in sync by
//! idempotent per-order writes, filled from history by a resumable backfill,
//! and aggregated into dashboard statistics.
//!
//! ## Core Concepts
//!
//! - **Read model**: flat order-summary and line-item tables, journaled to disk
//! - **Sync**: one order snapshot becomes an upsert plus a full item replacement
//! - **Lifecycle**: status changes decide between sync, removal and no-op
//! - **Migration**: offset-paginated backfill with persistent progress
//! - **Queries**: KPIs, time series, weekday histogram, leaderboards, categories
//!
//! ## Example
//!
//! ```ignore
//! use orderlens::{Config, OrderLens, Collaborators, DateRange};
//!
//! let lens = OrderLens::open(&Config::load("orderlens.toml")?, collaborators)?;
//!
//! // Backfill history in batches of 100
//! let mut offset = 0;
//! loop {
//!     let report = lens.migration.migrate_batch(offset, 100)?;
//!     offset += report.fetched;
//!     if report.status.is_terminal() {
//!         break;
//!     }
//! }
//!
//! let dashboard = lens.queries.dashboard(DateRange::parse("2026-01-01", "2026-01-31")?);
//! ```

pub mod api;
pub mod commerce;
pub mod config;
pub mod error;
pub mod journal;
pub mod lifecycle;
pub mod migration;
pub mod query;
pub mod seed;
pub mod service;
pub mod storage;
pub mod sync;
pub mod types;

// Re-exports
pub use api::{
    AnalyticsApi, ApiAction, ApiResponse, Capability, DashboardRequest, Gatekeeper,
    MigrateRequest, RequestContext, SeedRequest, StaticGatekeeper,
};
pub use commerce::{
    Category, CategoryLookup, CommerceOrder, InMemoryCommerce, OrderDraft, OrderSnapshot,
    OrderSource,
};
pub use config::{Config, Limits, StorageConfig};
pub use error::{ReadModelError, Result};
pub use journal::{Journal, JournalEntry, JournalOp};
pub use lifecycle::{decide, LifecycleRouter, RouteDecision, RouteOutcome};
pub use migration::{
    cancellation, BatchReport, CancelHandle, CancelToken, DriveReport, ItemBackfillReport,
    MigrationCoordinator, MigrationCursor, MigrationState, MigrationStatus, MigrationStepper,
    StepDriver, StepOutcome, Stepper,
};
pub use query::{
    CachedDashboard, CategoryRank, DailySales, Dashboard, DashboardCache, DateRange, ExtremeDays,
    Kpis, ProductRank, ProductSales, QueryEngine, WeekdaySales,
};
pub use seed::{
    DemoOrderGenerator, OrderGenerator, SeedProgress, SeedReport, SeedStepper, Seeder,
};
pub use service::{Collaborators, OrderLens};
pub use storage::{ReadModel, ReadModelStats, ReadModelStore};
pub use sync::{OrderLocks, SyncEngine, SyncReport};
pub use types::*;
