//! LRU cache for dashboard results.

use super::types::{Dashboard, DateRange};
use super::ProductSales;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A dashboard whose `top_categories` is left empty, plus the per-product
/// totals the category rollup is rebuilt from.
///
/// Category membership lives in the commerce system, not the read model, so
/// the store generation says nothing about it; the rollup is redone on every
/// hit.
#[derive(Clone, Debug)]
pub struct CachedDashboard {
    pub dashboard: Dashboard,
    pub product_sales: ProductSales,
}

/// Dashboards keyed by range and the store generation they were computed at.
///
/// A write bumps the generation, so older entries simply stop matching and
/// age out.
pub struct DashboardCache {
    entries: Mutex<LruCache<(DateRange, u64), Arc<CachedDashboard>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DashboardCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, range: DateRange, generation: u64) -> Option<Arc<CachedDashboard>> {
        let found = self.entries.lock().get(&(range, generation)).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn put(&self, range: DateRange, generation: u64, entry: Arc<CachedDashboard>) {
        self.entries.lock().put((range, generation), entry);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// (hits, misses) since creation.
    pub fn hit_stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
