//! Wiring of all components from one [`Config`].

use crate::api::{AnalyticsApi, Gatekeeper};
use crate::commerce::{CategoryLookup, OrderSource};
use crate::config::Config;
use crate::error::Result;
use crate::lifecycle::LifecycleRouter;
use crate::migration::MigrationCoordinator;
use crate::query::QueryEngine;
use crate::seed::{OrderGenerator, Seeder};
use crate::storage::{ReadModel, ReadModelStore};
use crate::sync::SyncEngine;
use crate::types::{Clock, OrderId};
use std::sync::Arc;

/// What the hosting platform provides.
#[derive(Clone)]
pub struct Collaborators {
    pub orders: Arc<dyn OrderSource>,
    pub categories: Arc<dyn CategoryLookup>,
    pub generator: Arc<dyn OrderGenerator>,
    pub gatekeeper: Arc<dyn Gatekeeper>,
    pub clock: Arc<dyn Clock>,
}

/// A fully wired read model.
pub struct OrderLens {
    pub store: Arc<ReadModel>,
    pub engine: Arc<SyncEngine>,
    pub router: Arc<LifecycleRouter>,
    pub migration: Arc<MigrationCoordinator>,
    pub queries: Arc<QueryEngine>,
    pub seeder: Arc<Seeder>,
    pub api: AnalyticsApi,
}

impl OrderLens {
    /// Open (or create) the store at `config.storage.path`, build every
    /// engine on top of it and detect the migration backlog.
    pub fn open(config: &Config, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            orders,
            categories,
            generator,
            gatekeeper,
            clock,
        } = collaborators;
        let limits = &config.limits;

        let store = Arc::new(ReadModel::open_or_create(config.storage.clone())?);
        let shared: Arc<dyn ReadModelStore> = store.clone();

        let engine = Arc::new(SyncEngine::new(Arc::clone(&shared)));
        let router = Arc::new(LifecycleRouter::new(
            Arc::clone(&engine),
            Arc::clone(&orders),
            Arc::clone(&clock),
        ));
        let migration = Arc::new(
            MigrationCoordinator::new(
                Arc::clone(&shared),
                orders,
                Arc::clone(&engine),
                Arc::clone(&clock),
            )
            .with_max_retained_errors(limits.max_retained_errors),
        );
        // Count the backlog before any live sync or seed can add to it.
        let migration_state = migration.initialize()?;
        let queries = Arc::new(
            QueryEngine::new(Arc::clone(&shared), categories)
                .with_limits(limits.leaderboard_limit, limits.category_limit)
                .with_cache_size(config.storage.query_cache_size),
        );
        let seeder = Arc::new(Seeder::new(
            generator,
            Arc::clone(&router),
            shared,
            Arc::clone(&clock),
            OrderId(limits.dummy_order_id_offset),
        ));
        let api = AnalyticsApi::new(
            gatekeeper,
            Arc::clone(&queries),
            Arc::clone(&seeder),
            Arc::clone(&migration),
            clock,
            limits.clone(),
        );

        tracing::info!(
            path = %config.storage.path.display(),
            migration = %migration_state.status,
            "read model ready"
        );

        Ok(Self {
            store,
            engine,
            router,
            migration,
            queries,
            seeder,
            api,
        })
    }
}
