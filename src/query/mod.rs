//! Read-only statistics over the read model.
//!
//! Every query takes an inclusive [`DateRange`] and only reads the flat
//! tables, so results are eventually consistent with ongoing syncs. Grouping
//! happens in memory over the rows of the range.

mod cache;
mod types;

pub use cache::{CachedDashboard, DashboardCache};
pub use types::{
    CategoryRank, DailySales, Dashboard, DateRange, ExtremeDays, Kpis, ProductRank, WeekdaySales,
};

use crate::commerce::{Category, CategoryLookup};
use crate::storage::ReadModelStore;
use crate::types::{CategoryId, Money, OrderLineItem, OrderSummary, ProductId};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Quantity sold and revenue per product id, across snapshot names.
pub type ProductSales = BTreeMap<ProductId, (u64, Money)>;

/// Aggregation queries and the cached dashboard bundle.
pub struct QueryEngine {
    store: Arc<dyn ReadModelStore>,
    categories: Arc<dyn CategoryLookup>,
    cache: DashboardCache,
    leaderboard_limit: usize,
    category_limit: usize,
}

impl QueryEngine {
    pub const DEFAULT_LIMIT: usize = 5;
    pub const DEFAULT_CACHE_SIZE: usize = 64;

    pub fn new(store: Arc<dyn ReadModelStore>, categories: Arc<dyn CategoryLookup>) -> Self {
        Self {
            store,
            categories,
            cache: DashboardCache::new(Self::DEFAULT_CACHE_SIZE),
            leaderboard_limit: Self::DEFAULT_LIMIT,
            category_limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Row limits used by [`QueryEngine::dashboard`].
    pub fn with_limits(mut self, leaderboard_limit: usize, category_limit: usize) -> Self {
        self.leaderboard_limit = leaderboard_limit;
        self.category_limit = category_limit;
        self
    }

    pub fn with_cache_size(mut self, capacity: usize) -> Self {
        self.cache = DashboardCache::new(capacity);
        self
    }

    pub fn kpis(&self, range: DateRange) -> Kpis {
        kpis_of(&self.summaries(range))
    }

    /// Revenue per day, ascending; days without orders are absent.
    pub fn daily_sales(&self, range: DateRange) -> Vec<DailySales> {
        daily_totals(&self.summaries(range))
            .into_iter()
            .map(|(report_date, total_sales)| DailySales {
                report_date,
                total_sales,
            })
            .collect()
    }

    pub fn weekday_sales(&self, range: DateRange) -> Vec<WeekdaySales> {
        weekday_sales_of(&self.summaries(range))
    }

    pub fn extreme_days(&self, range: DateRange) -> ExtremeDays {
        extremes_of(&daily_totals(&self.summaries(range)))
    }

    /// Best sellers by quantity.
    pub fn top_products(&self, range: DateRange, limit: usize) -> Vec<ProductRank> {
        rank_products(&self.items(range), limit, true)
    }

    /// Worst sellers by quantity. Only products sold in the range appear.
    pub fn bottom_products(&self, range: DateRange, limit: usize) -> Vec<ProductRank> {
        rank_products(&self.items(range), limit, false)
    }

    /// Revenue per category. A product in several categories counts toward
    /// each; products without a category are left out.
    pub fn top_categories(&self, range: DateRange, limit: usize) -> Vec<CategoryRank> {
        self.category_ranks(&sales_by_product(&self.items(range)), limit)
    }

    /// All statistics for `range`. Everything computed from the read model is
    /// served from cache while the store is unchanged; the category rollup is
    /// redone against current category membership on every call.
    pub fn dashboard(&self, range: DateRange) -> Dashboard {
        let generation = self.store.generation();
        if let Some(hit) = self.cache.get(range, generation) {
            let mut dashboard = hit.dashboard.clone();
            dashboard.top_categories =
                self.category_ranks(&hit.product_sales, self.category_limit);
            return dashboard;
        }

        let summaries = self.summaries(range);
        let items = self.items(range);
        let days = daily_totals(&summaries);
        let product_sales = sales_by_product(&items);

        let mut dashboard = Dashboard {
            kpis: kpis_of(&summaries),
            chart: days
                .iter()
                .map(|(report_date, total_sales)| DailySales {
                    report_date: *report_date,
                    total_sales: *total_sales,
                })
                .collect(),
            leaderboard: rank_products(&items, self.leaderboard_limit, true),
            weekday_sales: weekday_sales_of(&summaries),
            extreme_days: extremes_of(&days),
            bottom_products: rank_products(&items, self.leaderboard_limit, false),
            top_categories: Vec::new(),
            period: range,
        };

        tracing::debug!(
            start = %range.start,
            end = %range.end,
            orders = dashboard.kpis.orders,
            generation,
            "computed dashboard"
        );

        let top_categories = self.category_ranks(&product_sales, self.category_limit);
        self.cache.put(
            range,
            generation,
            Arc::new(CachedDashboard {
                dashboard: dashboard.clone(),
                product_sales,
            }),
        );
        dashboard.top_categories = top_categories;
        dashboard
    }

    pub fn cache(&self) -> &DashboardCache {
        &self.cache
    }

    fn summaries(&self, range: DateRange) -> Vec<OrderSummary> {
        self.store.summaries_between(range.start, range.end)
    }

    fn items(&self, range: DateRange) -> Vec<OrderLineItem> {
        self.store.items_between(range.start, range.end)
    }

    fn category_ranks(&self, sales: &ProductSales, limit: usize) -> Vec<CategoryRank> {
        let mut totals: BTreeMap<CategoryId, CategoryRank> = BTreeMap::new();

        for (product_id, (sold, revenue)) in sales {
            for Category { id, name } in self.categories.categories_for(*product_id) {
                let rank = totals.entry(id).or_insert_with(|| CategoryRank {
                    category_id: id,
                    category_name: name,
                    total_revenue: Money::ZERO,
                    total_sold: 0,
                });
                rank.total_revenue += *revenue;
                rank.total_sold += sold;
            }
        }

        let mut ranks: Vec<CategoryRank> = totals.into_values().collect();
        ranks.sort_by(|a, b| {
            b.total_revenue
                .cmp(&a.total_revenue)
                .then(a.category_id.cmp(&b.category_id))
        });
        ranks.truncate(limit);
        ranks
    }
}

fn kpis_of(summaries: &[OrderSummary]) -> Kpis {
    let revenue: Money = summaries.iter().map(|s| s.total).sum();
    let orders = summaries.len() as u64;
    Kpis {
        revenue,
        orders,
        aov: Money::mean(revenue, orders),
        max_order: summaries
            .iter()
            .map(|s| s.total)
            .max()
            .unwrap_or(Money::ZERO),
    }
}

fn daily_totals(summaries: &[OrderSummary]) -> BTreeMap<NaiveDate, Money> {
    let mut days = BTreeMap::new();
    for summary in summaries {
        *days.entry(summary.report_date).or_insert(Money::ZERO) += summary.total;
    }
    days
}

fn weekday_sales_of(summaries: &[OrderSummary]) -> Vec<WeekdaySales> {
    let mut weekdays: BTreeMap<u32, (Money, u64)> = BTreeMap::new();
    for summary in summaries {
        let slot = weekdays
            .entry(summary.report_date.weekday().number_from_sunday())
            .or_insert((Money::ZERO, 0));
        slot.0 += summary.total;
        slot.1 += 1;
    }
    weekdays
        .into_iter()
        .map(|(weekday, (total_sales, order_count))| WeekdaySales {
            weekday,
            total_sales,
            order_count,
        })
        .collect()
}

/// Ties go to the earliest date.
fn extremes_of(days: &BTreeMap<NaiveDate, Money>) -> ExtremeDays {
    let mut best: Option<(NaiveDate, Money)> = None;
    let mut worst: Option<(NaiveDate, Money)> = None;

    for (date, total) in days {
        if best.map_or(true, |(_, b)| *total > b) {
            best = Some((*date, *total));
        }
        if worst.map_or(true, |(_, w)| *total < w) {
            worst = Some((*date, *total));
        }
    }

    ExtremeDays {
        best_day: best.map(|(d, _)| d),
        best_total: best.map_or(Money::ZERO, |(_, t)| t),
        worst_day: worst.map(|(d, _)| d),
        worst_total: worst.map_or(Money::ZERO, |(_, t)| t),
    }
}

fn sales_by_product(items: &[OrderLineItem]) -> ProductSales {
    let mut sales = ProductSales::new();
    for item in items {
        let slot = sales.entry(item.product_id).or_insert((0, Money::ZERO));
        slot.0 += u64::from(item.quantity);
        slot.1 += item.line_total;
    }
    sales
}

/// Quantity and revenue per (product id, snapshot name).
fn product_totals(items: &[OrderLineItem]) -> Vec<ProductRank> {
    let mut totals: BTreeMap<(ProductId, &str), (u64, Money)> = BTreeMap::new();
    for item in items {
        let slot = totals
            .entry((item.product_id, item.product_name.as_str()))
            .or_insert((0, Money::ZERO));
        slot.0 += u64::from(item.quantity);
        slot.1 += item.line_total;
    }
    totals
        .into_iter()
        .map(|((product_id, name), (total_sold, total_revenue))| ProductRank {
            product_id,
            product_name: name.to_string(),
            total_sold,
            total_revenue,
        })
        .collect()
}

fn rank_products(items: &[OrderLineItem], limit: usize, best_first: bool) -> Vec<ProductRank> {
    let mut ranks = product_totals(items);
    ranks.sort_by(|a, b| {
        let by_sold = if best_first {
            b.total_sold.cmp(&a.total_sold)
        } else {
            a.total_sold.cmp(&b.total_sold)
        };
        by_sold
            .then(a.product_id.cmp(&b.product_id))
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    ranks.truncate(limit);
    ranks
}
